use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ValidationError;
use crate::models::null_as_default;
use crate::models::patient::not_blank;

pub type DoctorId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub available: bool,
}

/// Body of `POST /api/doctors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Validate)]
pub struct NewDoctor {
    #[validate(custom = "not_blank")]
    pub name: String,
    pub available: bool,
}

impl NewDoctor {
    /// New doctors start out available.
    pub fn available(name: impl Into<String>) -> Result<Self, ValidationError> {
        let doctor = Self {
            name: name.into().trim().to_string(),
            available: true,
        };
        doctor.validate()?;
        Ok(doctor)
    }
}
