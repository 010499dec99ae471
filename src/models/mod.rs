//! Entities exchanged with the queue service.

use serde::{Deserialize, Deserializer};

pub mod doctor;
pub mod patient;
pub mod token;

pub use doctor::{Doctor, DoctorId, NewDoctor};
pub use patient::{IntakeForm, NewPatient, Patient, PatientId};
pub use token::{QueueSnapshot, Token, TokenId, TokenList, WaitingToken};

/// Reads an explicit `null` as the type's default, like a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
