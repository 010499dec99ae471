use crate::app::ClinicContext;
use crate::error::IntakeError;
use crate::models::{Doctor, DoctorId, IntakeForm, Token, WaitingToken};
use crate::store::ViewLease;

/// Reception screen: doctor selector, intake form and the selected doctor's waiting list.
pub struct ReceptionDesk {
    ctx: ClinicContext,
    selected: Option<ViewLease>,
    pub form: IntakeForm,
}

impl ReceptionDesk {
    pub fn new(ctx: &ClinicContext) -> Self {
        Self {
            ctx: ctx.clone(),
            selected: None,
            form: IntakeForm::default(),
        }
    }

    /// Pulls the doctor roster for the selector.
    pub async fn load_doctors(&self) -> Vec<Doctor> {
        self.ctx.store.refresh_roster().await;
        self.doctors()
    }

    pub fn doctors(&self) -> Vec<Doctor> {
        self.ctx.store.roster()
    }

    /// Changes the selected doctor and pulls their lists. `None` clears the selection.
    pub async fn select_doctor(&mut self, doctor_id: Option<DoctorId>) {
        if self.selected_doctor() == doctor_id {
            return;
        }
        self.selected = None;
        if let Some(doctor_id) = doctor_id {
            self.selected = Some(self.ctx.store.attach(doctor_id));
            self.ctx.store.refresh(doctor_id).await;
        }
    }

    pub fn selected_doctor(&self) -> Option<DoctorId> {
        self.selected.as_ref().map(ViewLease::doctor_id)
    }

    /// Waiting list of the selected doctor, as last pulled.
    pub fn waiting(&self) -> Vec<WaitingToken> {
        self.selected
            .as_ref()
            .map(|lease| lease.snapshot().waiting)
            .unwrap_or_default()
    }

    /// Manual "refresh waiting".
    pub async fn refresh_waiting(&self) -> Vec<WaitingToken> {
        if let Some(doctor_id) = self.selected_doctor() {
            self.ctx.store.refresh(doctor_id).await;
        }
        self.waiting()
    }

    /// Submits the intake form for the selected doctor.
    pub async fn submit(&mut self) -> Result<Token, IntakeError> {
        let doctor_id = self.selected_doctor();
        self.ctx.intake.register_and_enqueue(doctor_id, &mut self.form).await
    }
}
