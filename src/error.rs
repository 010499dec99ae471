//! Error types for the clinic queue client.
//!
//! - [`QueueError`]: every failure of a call against the queue service.
//! - [`ValidationError`]: input rejected locally, before any request is made.
//! - [`IntakeError`]: outcome of the two-step intake transaction.
//!
//! Each type exposes `as_label()`, a short stable snake_case label used as a
//! structured log field.

use thiserror::Error;

use crate::models::Patient;

/// Failure of a single operation against the queue service.
#[derive(Error, Debug)]
pub enum QueueError {
    /// The request could not complete (connect, timeout, broken stream, undecodable body).
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Input was rejected client-side; no request was issued.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The service answered with a non-success status.
    #[error("server rejected request ({status}): {message}")]
    ServerRejection {
        /// HTTP status code.
        status: u16,
        /// Response body, or the canonical reason when the body was empty.
        message: String,
    },
}

impl QueueError {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Network(_) => "network_error",
            QueueError::Validation(_) => "validation_error",
            QueueError::ServerRejection { .. } => "server_rejection",
        }
    }

    /// True for a non-success status answered by the service.
    pub fn is_rejection(&self) -> bool {
        matches!(self, QueueError::ServerRejection { .. })
    }
}

/// Input rejected before reaching the network layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no doctor selected")]
    NoDoctorSelected,

    /// Required fields that were blank or out of range, sorted by name.
    #[error("invalid or missing fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl ValidationError {
    pub fn as_label(&self) -> &'static str {
        match self {
            ValidationError::NoDoctorSelected => "no_doctor_selected",
            ValidationError::MissingFields(_) => "missing_fields",
        }
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<&'static str> = errors.field_errors().into_keys().collect();
        fields.sort_unstable();
        ValidationError::MissingFields(fields)
    }
}

/// Outcome of a failed intake transaction.
///
/// The two steps are not atomic. [`IntakeError::Enqueue`] means the patient
/// record exists on the server but holds no place in any queue; it is
/// returned to the caller rather than rolled back.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Step 1 failed; nothing was created.
    #[error("patient registration failed: {0}")]
    Registration(#[source] QueueError),

    /// Step 1 succeeded, step 2 failed.
    #[error("patient {} was registered but could not be enqueued: {source}", .patient.id)]
    Enqueue {
        patient: Patient,
        #[source]
        source: QueueError,
    },
}

impl IntakeError {
    pub fn as_label(&self) -> &'static str {
        match self {
            IntakeError::Invalid(e) => e.as_label(),
            IntakeError::Registration(_) => "registration_failed",
            IntakeError::Enqueue { .. } => "enqueue_failed",
        }
    }

    /// The patient left registered but unqueued, if any.
    pub fn orphaned_patient(&self) -> Option<&Patient> {
        match self {
            IntakeError::Enqueue { patient, .. } => Some(patient),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Form {
        #[validate(length(min = 1))]
        name: String,
        #[validate(length(min = 1))]
        contact: String,
    }

    #[test]
    fn validation_errors_list_fields_in_order() {
        let form = Form {
            name: String::new(),
            contact: String::new(),
        };
        let err: ValidationError = form.validate().unwrap_err().into();
        assert_eq!(err, ValidationError::MissingFields(vec!["contact", "name"]));
        assert_eq!(err.to_string(), "invalid or missing fields: contact, name");
    }

    #[test]
    fn enqueue_failure_keeps_the_patient() {
        let patient = Patient {
            id: 7,
            name: "Asha".into(),
            age: Some(30),
            contact: "555-1".into(),
        };
        let err = IntakeError::Enqueue {
            patient,
            source: QueueError::ServerRejection {
                status: 409,
                message: "doctor unavailable".into(),
            },
        };
        assert_eq!(err.as_label(), "enqueue_failed");
        assert_eq!(err.orphaned_patient().map(|p| p.id), Some(7));
        assert!(err.to_string().starts_with("patient 7 was registered"));
    }
}
