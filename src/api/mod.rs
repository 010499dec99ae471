//! API gateway for the external queue service.
//!
//! Two seams sit here: [`QueueService`] for request/response calls and
//! [`SignalSource`] for the per-doctor push channel. [`ApiClient`] implements
//! both over HTTP.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::QueueError;
use crate::models::{
    Doctor, DoctorId, NewDoctor, NewPatient, Patient, PatientId, Token, TokenId, WaitingToken,
};

pub mod client;
pub mod sse;

pub use client::ApiClient;

/// Request/response operations of the queue service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueService: Send + Sync {
    async fn list_doctors(&self) -> Result<Vec<Doctor>, QueueError>;

    async fn create_doctor(&self, doctor: NewDoctor) -> Result<Doctor, QueueError>;

    async fn set_availability(&self, doctor_id: DoctorId, available: bool) -> Result<Doctor, QueueError>;

    async fn create_patient(&self, patient: NewPatient) -> Result<Patient, QueueError>;

    /// Places an existing patient at the back of a doctor's waiting list.
    async fn enqueue(&self, doctor_id: DoctorId, patient_id: PatientId) -> Result<Token, QueueError>;

    /// Waiting tokens in queue order, with position and ETA.
    async fn waiting(&self, doctor_id: DoctorId) -> Result<Vec<WaitingToken>, QueueError>;

    async fn pending(&self, doctor_id: DoctorId) -> Result<Vec<Token>, QueueError>;

    async fn completed(&self, doctor_id: DoctorId) -> Result<Vec<Token>, QueueError>;

    /// Moves the head of the waiting list to pending. Rejected when nobody waits.
    async fn call_next(&self, doctor_id: DoctorId) -> Result<Token, QueueError>;

    async fn mark_served(&self, token_id: TokenId) -> Result<Token, QueueError>;

    async fn mark_absent(&self, token_id: TokenId) -> Result<Token, QueueError>;
}

/// "Something changed for this doctor, pull again."
///
/// Carries no queue data on purpose; all state comes from the pull path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSignal {
    pub doctor_id: DoctorId,
}

/// Signals from one push connection. Ends when the connection drops.
pub type SignalStream = BoxStream<'static, Result<QueueSignal, QueueError>>;

/// Opens push connections. Each call is a fresh connection.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn connect(&self, doctor_id: DoctorId) -> Result<SignalStream, QueueError>;
}
