//! Queue view store.
//!
//! Holds the three token lists of every doctor some view is showing, plus the
//! doctor roster. Both are only ever replaced wholesale by a fresh pull.
//!
//! ```text
//! view mounts ──► attach(doctor) ──► ViewLease ──┐
//!                                                 │ drop
//! refresh(doctor):                                ▼
//!   issue seq n ─► pull waiting+pending+completed ─► entry still leased? (epoch)
//!                                                    ├─ no  → Discarded
//!                                                    └─ yes → n newest seen?
//!                                                             ├─ yes → Applied
//!                                                             └─ no  → Superseded
//! ```
//!
//! ## Rules
//! - Last *issued* pull wins; an older response arriving late is dropped.
//! - A failed pull keeps the previous lists.
//! - Only user-triggered pulls notify on failure; pulls that follow a mutation
//!   or a push signal log instead.
//! - Once the last lease for a doctor is dropped, in-flight pulls for it are no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, instrument, warn};

use crate::api::QueueService;
use crate::error::QueueError;
use crate::models::{Doctor, DoctorId, QueueSnapshot};
use crate::notify::Notifier;

/// What a refresh did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome<T> {
    /// The pulled state is now current.
    Applied(T),
    /// A later pull was applied first; carries the current state.
    Superseded(T),
    /// The pull failed; carries the unchanged previous state.
    Failed(T),
    /// No view holds this doctor anymore; nothing was applied.
    Discarded,
}

impl<T> RefreshOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, RefreshOutcome::Applied(_))
    }

    pub fn into_inner(self) -> Option<T> {
        match self {
            RefreshOutcome::Applied(v) | RefreshOutcome::Superseded(v) | RefreshOutcome::Failed(v) => Some(v),
            RefreshOutcome::Discarded => None,
        }
    }
}

/// How a failed pull is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    /// User- or push-triggered: one error notification.
    Notify,
    /// Follows a successful mutation that already notified, or a push
    /// signal that may echo one: log only.
    Log,
}

/// Per-target request sequencing.
#[derive(Debug, Default)]
struct Fence {
    issued: u64,
    applied: u64,
}

impl Fence {
    fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Accepts `seq` if nothing newer has been applied.
    fn admit(&mut self, seq: u64) -> bool {
        if seq > self.applied {
            self.applied = seq;
            true
        } else {
            false
        }
    }

    fn is_current(&self, seq: u64) -> bool {
        seq > self.applied
    }
}

struct DoctorEntry {
    epoch: u64,
    views: usize,
    fence: Fence,
    tx: watch::Sender<Option<QueueSnapshot>>,
}

impl DoctorEntry {
    fn new(epoch: u64) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            epoch,
            views: 0,
            fence: Fence::default(),
            tx,
        }
    }

    fn current(&self) -> QueueSnapshot {
        self.tx.borrow().clone().unwrap_or_default()
    }
}

struct Inner {
    api: Arc<dyn QueueService>,
    notifier: Notifier,
    doctors: DashMap<DoctorId, DoctorEntry>,
    epochs: AtomicU64,
    roster_fence: Mutex<Fence>,
    roster_tx: watch::Sender<Vec<Doctor>>,
}

/// Shared queue state. Clones share state.
#[derive(Clone)]
pub struct QueueViewStore {
    inner: Arc<Inner>,
}

impl QueueViewStore {
    pub fn new(api: Arc<dyn QueueService>, notifier: Notifier) -> Self {
        let (roster_tx, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                api,
                notifier,
                doctors: DashMap::new(),
                epochs: AtomicU64::new(0),
                roster_fence: Mutex::new(Fence::default()),
                roster_tx,
            }),
        }
    }

    /// Registers a view showing `doctor_id`. State is kept while any lease is alive.
    pub fn attach(&self, doctor_id: DoctorId) -> ViewLease {
        let mut entry = self
            .inner
            .doctors
            .entry(doctor_id)
            .or_insert_with(|| DoctorEntry::new(self.inner.epochs.fetch_add(1, Ordering::Relaxed) + 1));
        entry.views += 1;
        debug!(doctor_id, views = entry.views, "View attached");

        ViewLease {
            store: self.clone(),
            doctor_id,
            epoch: entry.epoch,
            rx: entry.tx.subscribe(),
        }
    }

    fn detach(&self, doctor_id: DoctorId, epoch: u64) {
        if let Entry::Occupied(mut slot) = self.inner.doctors.entry(doctor_id) {
            if slot.get().epoch != epoch {
                return;
            }
            let entry = slot.get_mut();
            entry.views = entry.views.saturating_sub(1);
            if entry.views == 0 {
                slot.remove();
                debug!(doctor_id, "Queue state released");
            }
        }
    }

    /// Latest lists for `doctor_id`, if a view holds it and a pull has landed.
    pub fn snapshot(&self, doctor_id: DoctorId) -> Option<QueueSnapshot> {
        self.inner
            .doctors
            .get(&doctor_id)
            .and_then(|entry| entry.tx.borrow().clone())
    }

    pub fn is_tracking(&self, doctor_id: DoctorId) -> bool {
        self.inner.doctors.contains_key(&doctor_id)
    }

    /// Pulls and replaces all three lists. Failures notify once and keep the old lists.
    pub async fn refresh(&self, doctor_id: DoctorId) -> RefreshOutcome<QueueSnapshot> {
        self.refresh_doctor(doctor_id, OnFailure::Notify).await
    }

    /// Same pull, for use right after a successful mutation: failures are only logged.
    pub async fn refresh_after_mutation(&self, doctor_id: DoctorId) -> RefreshOutcome<QueueSnapshot> {
        self.refresh_doctor(doctor_id, OnFailure::Log).await
    }

    /// Pull triggered by a push signal. Failures are only logged, since the
    /// signal may be the echo of this desk's own mutation.
    pub async fn refresh_on_signal(&self, doctor_id: DoctorId) -> RefreshOutcome<QueueSnapshot> {
        self.refresh_doctor(doctor_id, OnFailure::Log).await
    }

    #[instrument(skip(self))]
    async fn refresh_doctor(&self, doctor_id: DoctorId, on_failure: OnFailure) -> RefreshOutcome<QueueSnapshot> {
        let issued = self.inner.doctors.get_mut(&doctor_id).map(|mut entry| {
            let seq = entry.fence.issue();
            (entry.epoch, seq)
        });
        let Some((epoch, seq)) = issued else {
            debug!("No view for doctor, skipping pull");
            return RefreshOutcome::Discarded;
        };

        let pulled = self.pull(doctor_id).await;

        let Some(mut entry) = self.inner.doctors.get_mut(&doctor_id) else {
            debug!(seq, "View closed during pull, dropping result");
            return RefreshOutcome::Discarded;
        };
        if entry.epoch != epoch {
            debug!(seq, "View reopened during pull, dropping result");
            return RefreshOutcome::Discarded;
        }

        match pulled {
            Ok(snapshot) => {
                if !entry.fence.admit(seq) {
                    debug!(seq, applied = entry.fence.applied, "Dropping stale queue response");
                    return RefreshOutcome::Superseded(entry.current());
                }
                let overlaps = snapshot.overlaps();
                if !overlaps.is_empty() {
                    warn!(?overlaps, "Service returned tokens in more than one list");
                }
                entry.tx.send_replace(Some(snapshot.clone()));
                RefreshOutcome::Applied(snapshot)
            }
            Err(e) => {
                let current = entry.fence.is_current(seq);
                let previous = entry.current();
                drop(entry);

                error!(error = %e, label = e.as_label(), seq, "Queue refresh failed");
                if current && on_failure == OnFailure::Notify {
                    self.inner.notifier.error("Unable to load queue");
                }
                RefreshOutcome::Failed(previous)
            }
        }
    }

    async fn pull(&self, doctor_id: DoctorId) -> Result<QueueSnapshot, QueueError> {
        let api = &self.inner.api;
        let (waiting, pending, completed) =
            futures::try_join!(api.waiting(doctor_id), api.pending(doctor_id), api.completed(doctor_id))?;
        Ok(QueueSnapshot {
            waiting,
            pending,
            completed,
        })
    }

    /// Cached doctor list used by the roster and the reception selector.
    pub fn roster(&self) -> Vec<Doctor> {
        self.inner.roster_tx.borrow().clone()
    }

    pub fn roster_changes(&self) -> watch::Receiver<Vec<Doctor>> {
        self.inner.roster_tx.subscribe()
    }

    pub async fn refresh_roster(&self) -> RefreshOutcome<Vec<Doctor>> {
        self.refresh_roster_with(OnFailure::Notify).await
    }

    pub async fn refresh_roster_after_mutation(&self) -> RefreshOutcome<Vec<Doctor>> {
        self.refresh_roster_with(OnFailure::Log).await
    }

    #[instrument(skip(self))]
    async fn refresh_roster_with(&self, on_failure: OnFailure) -> RefreshOutcome<Vec<Doctor>> {
        let seq = self.inner.roster_fence.lock().issue();

        match self.inner.api.list_doctors().await {
            Ok(doctors) => {
                if !self.inner.roster_fence.lock().admit(seq) {
                    debug!(seq, "Dropping stale roster response");
                    return RefreshOutcome::Superseded(self.roster());
                }
                self.inner.roster_tx.send_replace(doctors.clone());
                RefreshOutcome::Applied(doctors)
            }
            Err(e) => {
                error!(error = %e, label = e.as_label(), seq, "Roster refresh failed");
                let current = self.inner.roster_fence.lock().is_current(seq);
                if current && on_failure == OnFailure::Notify {
                    self.inner.notifier.error("Unable to load doctors");
                }
                RefreshOutcome::Failed(self.roster())
            }
        }
    }
}

/// A view's claim on one doctor's queue state. Dropping it detaches the view.
pub struct ViewLease {
    store: QueueViewStore,
    doctor_id: DoctorId,
    epoch: u64,
    rx: watch::Receiver<Option<QueueSnapshot>>,
}

impl ViewLease {
    pub fn doctor_id(&self) -> DoctorId {
        self.doctor_id
    }

    /// Current lists; empty until the first pull lands.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.rx.borrow().clone().unwrap_or_default()
    }

    /// Fires after each applied pull.
    pub fn changes(&self) -> watch::Receiver<Option<QueueSnapshot>> {
        self.rx.clone()
    }
}

impl Drop for ViewLease {
    fn drop(&mut self) {
        self.store.detach(self.doctor_id, self.epoch);
    }
}

impl std::fmt::Debug for ViewLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewLease")
            .field("doctor_id", &self.doctor_id)
            .field("epoch", &self.epoch)
            .finish()
    }
}
