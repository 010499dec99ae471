use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ValidationError;
use crate::models::null_as_default;

pub type PatientId = i64;

/// A registered patient, as returned by the queue service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contact: String,
}

/// Body of `POST /api/queue/patients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPatient {
    pub name: String,
    pub age: Option<u32>,
    pub contact: String,
}

/// Reception intake form. Cleared after a successful intake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Validate)]
pub struct IntakeForm {
    #[validate(custom = "not_blank")]
    pub name: String,
    #[validate(range(max = 150))]
    pub age: Option<u32>,
    #[validate(custom = "not_blank")]
    pub contact: String,
}

impl IntakeForm {
    pub fn new(name: impl Into<String>, age: Option<u32>, contact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            contact: contact.into(),
        }
    }

    /// Validates the form and builds the registration request.
    pub fn to_new_patient(&self) -> Result<NewPatient, ValidationError> {
        self.validate()?;
        Ok(NewPatient {
            name: self.name.trim().to_string(),
            age: self.age,
            contact: self.contact.trim().to_string(),
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

pub(crate) fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}
