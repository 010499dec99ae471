use tokio::sync::watch;
use tracing::info;

use crate::app::ClinicContext;
use crate::error::QueueError;
use crate::models::{DoctorId, QueueSnapshot, Token, TokenId};
use crate::store::{RefreshOutcome, ViewLease};
use crate::subscription::{SubscriptionHandle, SubscriptionStatus};
use crate::ui::perform;

/// A mounted doctor dashboard.
///
/// Owns the doctor's subscription and store lease for as long as it lives.
/// Dropping it closes the subscription, then releases the lease; pulls still
/// in flight at that point are discarded.
pub struct DoctorDashboard {
    ctx: ClinicContext,
    // Declaration order is drop order.
    subscription: SubscriptionHandle,
    lease: ViewLease,
}

impl DoctorDashboard {
    /// Opens the push subscription, then performs the initial pull.
    pub async fn mount(ctx: &ClinicContext, doctor_id: DoctorId) -> Self {
        let lease = ctx.store.attach(doctor_id);
        let store = ctx.store.clone();
        let subscription = ctx.subscriptions.open(doctor_id, move || {
            let store = store.clone();
            async move {
                store.refresh_on_signal(doctor_id).await;
            }
        });
        info!(doctor_id, "Dashboard mounted");

        let dashboard = Self {
            ctx: ctx.clone(),
            subscription,
            lease,
        };
        ctx.store.refresh(doctor_id).await;
        dashboard
    }

    /// Closes this dashboard and mounts a fresh one for `doctor_id`.
    pub async fn switch_doctor(self, doctor_id: DoctorId) -> Self {
        let ctx = self.ctx.clone();
        drop(self);
        Self::mount(&ctx, doctor_id).await
    }

    pub fn unmount(self) {}

    pub fn doctor_id(&self) -> DoctorId {
        self.lease.doctor_id()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.lease.snapshot()
    }

    /// Fires whenever a pull for this doctor is applied.
    pub fn changes(&self) -> watch::Receiver<Option<QueueSnapshot>> {
        self.lease.changes()
    }

    pub fn connection(&self) -> SubscriptionStatus {
        self.subscription.status()
    }

    pub fn connection_changes(&self) -> watch::Receiver<SubscriptionStatus> {
        self.subscription.status_changes()
    }

    pub async fn refresh(&self) -> RefreshOutcome<QueueSnapshot> {
        self.ctx.store.refresh(self.doctor_id()).await
    }

    /// Moves the head of the waiting list to pending.
    pub async fn call_next(&self) -> Result<Token, QueueError> {
        let doctor_id = self.doctor_id();
        let token = perform(
            &self.ctx.notifier,
            "call_next",
            "Called next",
            |e| {
                if e.is_rejection() {
                    "No patients waiting".to_string()
                } else {
                    "Could not call next patient".to_string()
                }
            },
            self.ctx.api.call_next(doctor_id),
        )
        .await?;
        self.ctx.store.refresh_after_mutation(doctor_id).await;
        Ok(token)
    }

    pub async fn mark_served(&self, token_id: TokenId) -> Result<Token, QueueError> {
        let token = perform(
            &self.ctx.notifier,
            "mark_served",
            "Marked served",
            |_| "Error marking served".to_string(),
            self.ctx.api.mark_served(token_id),
        )
        .await?;
        self.ctx.store.refresh_after_mutation(self.doctor_id()).await;
        Ok(token)
    }

    pub async fn mark_absent(&self, token_id: TokenId) -> Result<Token, QueueError> {
        let token = perform(
            &self.ctx.notifier,
            "mark_absent",
            "Marked absent",
            |_| "Error marking absent".to_string(),
            self.ctx.api.mark_absent(token_id),
        )
        .await?;
        self.ctx.store.refresh_after_mutation(self.doctor_id()).await;
        Ok(token)
    }
}

impl Drop for DoctorDashboard {
    fn drop(&mut self) {
        info!(doctor_id = self.lease.doctor_id(), "Dashboard unmounted");
    }
}
