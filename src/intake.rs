//! Intake transaction: register a patient, then enqueue them.
//!
//! The two steps are sequenced but not atomic. When enqueue fails after the
//! patient was created, the patient record is left on the server as-is and
//! reported back in [`IntakeError::Enqueue`]; there is no retry and no
//! rollback. Every call emits exactly one notification.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::api::QueueService;
use crate::error::{IntakeError, ValidationError};
use crate::models::{DoctorId, IntakeForm, Token};
use crate::notify::Notifier;
use crate::store::QueueViewStore;

#[derive(Clone)]
pub struct IntakeOrchestrator {
    api: Arc<dyn QueueService>,
    store: QueueViewStore,
    notifier: Notifier,
}

impl IntakeOrchestrator {
    pub fn new(api: Arc<dyn QueueService>, store: QueueViewStore, notifier: Notifier) -> Self {
        Self { api, store, notifier }
    }

    /// Registers the patient on `form` and places them in `doctor_id`'s queue.
    ///
    /// On success the form is cleared and the doctor's lists are re-pulled.
    /// On failure the form is left untouched so the operator can resubmit.
    #[instrument(skip(self, form), fields(doctor_id = ?doctor_id))]
    pub async fn register_and_enqueue(
        &self,
        doctor_id: Option<DoctorId>,
        form: &mut IntakeForm,
    ) -> Result<Token, IntakeError> {
        match self.transact(doctor_id, form).await {
            Ok((doctor_id, token)) => {
                form.clear();
                self.notifier.success("Patient created & enqueued successfully");
                self.store.refresh_after_mutation(doctor_id).await;
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, label = e.as_label(), "Intake failed");
                self.notifier.error(failure_message(&e));
                Err(e)
            }
        }
    }

    async fn transact(
        &self,
        doctor_id: Option<DoctorId>,
        form: &IntakeForm,
    ) -> Result<(DoctorId, Token), IntakeError> {
        let doctor_id = doctor_id.ok_or(ValidationError::NoDoctorSelected)?;
        let new_patient = form.to_new_patient()?;

        let patient = self
            .api
            .create_patient(new_patient)
            .await
            .map_err(IntakeError::Registration)?;

        let token = match self.api.enqueue(doctor_id, patient.id).await {
            Ok(token) => token,
            Err(source) => return Err(IntakeError::Enqueue { patient, source }),
        };

        info!(
            patient_id = patient.id,
            token_id = token.id,
            token_number = token.token_number,
            "Intake complete"
        );
        Ok((doctor_id, token))
    }
}

fn failure_message(e: &IntakeError) -> String {
    match e {
        IntakeError::Invalid(ValidationError::NoDoctorSelected) => "Select doctor first".to_string(),
        IntakeError::Invalid(ValidationError::MissingFields(fields)) => {
            format!("Please fill in: {}", fields.join(", "))
        }
        IntakeError::Registration(_) => "Failed to create & enqueue patient".to_string(),
        IntakeError::Enqueue { patient, .. } => format!(
            "Patient {} was registered but could not be enqueued",
            patient.name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockQueueService;
    use crate::error::QueueError;
    use crate::models::{NewPatient, Patient};
    use crate::notify::{Notification, Severity};
    use mockall::predicate::eq;
    use tokio::sync::broadcast;

    fn asha() -> IntakeForm {
        IntakeForm::new("Asha", Some(30), "555-1")
    }

    fn created(id: i64) -> Patient {
        Patient {
            id,
            name: "Asha".into(),
            age: Some(30),
            contact: "555-1".into(),
        }
    }

    fn token(id: i64, number: u32) -> Token {
        Token {
            id,
            token_number: number,
            patient: Some(created(7)),
            doctor: None,
            service_seconds: None,
            missed_count: Some(0),
        }
    }

    fn orchestrator(api: MockQueueService) -> (IntakeOrchestrator, QueueViewStore, Notifier) {
        let api: Arc<dyn QueueService> = Arc::new(api);
        let notifier = Notifier::new();
        let store = QueueViewStore::new(api.clone(), notifier.clone());
        (IntakeOrchestrator::new(api, store.clone(), notifier.clone()), store, notifier)
    }

    fn drain(feed: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
        std::iter::from_fn(|| feed.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn no_doctor_is_rejected_before_any_request() {
        let (intake, _, notifier) = orchestrator(MockQueueService::new());
        let mut feed = notifier.feed();
        let mut form = asha();

        let err = intake.register_and_enqueue(None, &mut form).await.unwrap_err();

        assert!(matches!(err, IntakeError::Invalid(ValidationError::NoDoctorSelected)));
        assert_eq!(form, asha());
        let shown = drain(&mut feed);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].message, "Select doctor first");
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_any_request() {
        let (intake, _, notifier) = orchestrator(MockQueueService::new());
        let mut feed = notifier.feed();
        let mut form = IntakeForm::new("Asha", None, " ");

        let err = intake.register_and_enqueue(Some(1), &mut form).await.unwrap_err();

        assert!(matches!(err, IntakeError::Invalid(ValidationError::MissingFields(_))));
        assert_eq!(drain(&mut feed).len(), 1);
    }

    #[tokio::test]
    async fn success_clears_form_and_refreshes_once() {
        let mut api = MockQueueService::new();
        let mut seq = mockall::Sequence::new();
        api.expect_create_patient()
            .with(eq(NewPatient {
                name: "Asha".into(),
                age: Some(30),
                contact: "555-1".into(),
            }))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(created(7)));
        api.expect_enqueue()
            .with(eq(1), eq(7))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(token(11, 1)));
        api.expect_waiting().times(1).returning(|_| Ok(Vec::new()));
        api.expect_pending().times(1).returning(|_| Ok(Vec::new()));
        api.expect_completed().times(1).returning(|_| Ok(Vec::new()));

        let (intake, store, notifier) = orchestrator(api);
        let _reception = store.attach(1);
        let mut feed = notifier.feed();
        let mut form = asha();

        let token = intake.register_and_enqueue(Some(1), &mut form).await.unwrap();

        assert_eq!(token.id, 11);
        assert!(form.is_empty());
        let shown = drain(&mut feed);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].severity, Severity::Success);
    }

    #[tokio::test]
    async fn enqueue_failure_reports_the_orphaned_patient_once() {
        let mut api = MockQueueService::new();
        api.expect_create_patient().times(1).returning(|_| Ok(created(7)));
        api.expect_enqueue().times(1).returning(|_, _| {
            Err(QueueError::ServerRejection {
                status: 409,
                message: "doctor unavailable".into(),
            })
        });

        let (intake, store, notifier) = orchestrator(api);
        let _reception = store.attach(1);
        let mut feed = notifier.feed();
        let mut form = asha();

        let err = intake.register_and_enqueue(Some(1), &mut form).await.unwrap_err();

        assert_eq!(err.orphaned_patient().map(|p| p.id), Some(7));
        assert_eq!(form, asha());
        let shown = drain(&mut feed);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].severity, Severity::Error);
        assert!(shown[0].message.contains("registered but could not be enqueued"));
    }

    #[tokio::test]
    async fn registration_failure_skips_enqueue() {
        let mut api = MockQueueService::new();
        api.expect_create_patient().times(1).returning(|_| {
            Err(QueueError::ServerRejection {
                status: 400,
                message: "bad patient".into(),
            })
        });
        api.expect_enqueue().never();

        let (intake, _, notifier) = orchestrator(api);
        let mut feed = notifier.feed();
        let mut form = asha();

        let err = intake.register_and_enqueue(Some(1), &mut form).await.unwrap_err();

        assert!(matches!(err, IntakeError::Registration(_)));
        assert_eq!(drain(&mut feed).len(), 1);
    }
}
