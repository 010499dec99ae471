use tracing::warn;

use crate::app::ClinicContext;
use crate::error::QueueError;
use crate::models::{Doctor, DoctorId, NewDoctor};
use crate::ui::perform;

/// Doctor management screen.
pub struct DoctorRoster {
    ctx: ClinicContext,
}

impl DoctorRoster {
    pub fn new(ctx: &ClinicContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    pub async fn load(&self) -> Vec<Doctor> {
        self.ctx.store.refresh_roster().await;
        self.doctors()
    }

    pub fn doctors(&self) -> Vec<Doctor> {
        self.ctx.store.roster()
    }

    /// Adds an available doctor.
    pub async fn create(&self, name: &str) -> Result<Doctor, QueueError> {
        let doctor = match NewDoctor::available(name) {
            Ok(doctor) => doctor,
            Err(e) => {
                warn!(error = %e, "Doctor form rejected");
                self.ctx.notifier.error("Enter a doctor name");
                return Err(e.into());
            }
        };

        let created = perform(
            &self.ctx.notifier,
            "create_doctor",
            "Doctor created successfully",
            |_| "Failed to create doctor".to_string(),
            self.ctx.api.create_doctor(doctor),
        )
        .await?;
        self.ctx.store.refresh_roster_after_mutation().await;
        Ok(created)
    }

    pub async fn set_availability(&self, doctor_id: DoctorId, available: bool) -> Result<Doctor, QueueError> {
        let updated = perform(
            &self.ctx.notifier,
            "set_availability",
            "Doctor availability updated",
            |_| "Failed to update availability".to_string(),
            self.ctx.api.set_availability(doctor_id, available),
        )
        .await?;
        self.ctx.store.refresh_roster_after_mutation().await;
        Ok(updated)
    }

    /// Flips availability as last seen by this screen.
    pub async fn toggle_availability(&self, doctor: &Doctor) -> Result<Doctor, QueueError> {
        self.set_availability(doctor.id, !doctor.available).await
    }
}
