use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::api::sse::SseDecoder;
use crate::api::{QueueService, QueueSignal, SignalSource, SignalStream};
use crate::config::ClientConfig;
use crate::error::QueueError;
use crate::models::{
    Doctor, DoctorId, NewDoctor, NewPatient, Patient, PatientId, Token, TokenId, WaitingToken,
};

/// HTTP client for the queue service.
///
/// Cheap to clone; clones share one connection pool. Plain requests carry a
/// per-request timeout, push connections only a connect timeout.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, QueueError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        let mut base_url = config.base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            http,
            base_url,
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path)).timeout(self.request_timeout)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.http.post(self.url(path)).timeout(self.request_timeout)
    }
}

/// Turns a non-success status into [`QueueError::ServerRejection`].
async fn check(response: Response) -> Result<Response, QueueError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown status").to_string()
    } else {
        body
    };
    Err(QueueError::ServerRejection {
        status: status.as_u16(),
        message,
    })
}

async fn read<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, QueueError> {
    let response = check(request.send().await?).await?;
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl QueueService for ApiClient {
    #[instrument(skip(self))]
    async fn list_doctors(&self) -> Result<Vec<Doctor>, QueueError> {
        let doctors: Vec<Doctor> = read(self.get("api/doctors")).await?;
        debug!(count = doctors.len(), "Fetched doctors");
        Ok(doctors)
    }

    #[instrument(skip(self, doctor), fields(name = %doctor.name))]
    async fn create_doctor(&self, doctor: NewDoctor) -> Result<Doctor, QueueError> {
        let created: Doctor = read(self.post("api/doctors").json(&doctor)).await?;
        info!(doctor_id = created.id, "Doctor created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn set_availability(&self, doctor_id: DoctorId, available: bool) -> Result<Doctor, QueueError> {
        read(
            self.post(&format!("api/doctors/{doctor_id}/availability"))
                .query(&[("available", available)]),
        )
        .await
    }

    #[instrument(skip(self, patient))]
    async fn create_patient(&self, patient: NewPatient) -> Result<Patient, QueueError> {
        let created: Patient = read(self.post("api/queue/patients").json(&patient)).await?;
        info!(patient_id = created.id, "Patient registered");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn enqueue(&self, doctor_id: DoctorId, patient_id: PatientId) -> Result<Token, QueueError> {
        let token: Token = read(
            self.post(&format!("api/queue/{doctor_id}/enqueue"))
                .query(&[("patientId", patient_id)]),
        )
        .await?;
        info!(token_id = token.id, token_number = token.token_number, "Patient enqueued");
        Ok(token)
    }

    #[instrument(skip(self))]
    async fn waiting(&self, doctor_id: DoctorId) -> Result<Vec<WaitingToken>, QueueError> {
        read(self.get(&format!("api/queue/{doctor_id}/waiting"))).await
    }

    #[instrument(skip(self))]
    async fn pending(&self, doctor_id: DoctorId) -> Result<Vec<Token>, QueueError> {
        read(self.get(&format!("api/queue/{doctor_id}/pending"))).await
    }

    #[instrument(skip(self))]
    async fn completed(&self, doctor_id: DoctorId) -> Result<Vec<Token>, QueueError> {
        read(self.get(&format!("api/queue/{doctor_id}/completed"))).await
    }

    #[instrument(skip(self))]
    async fn call_next(&self, doctor_id: DoctorId) -> Result<Token, QueueError> {
        read(self.post(&format!("api/queue/{doctor_id}/call-next"))).await
    }

    #[instrument(skip(self))]
    async fn mark_served(&self, token_id: TokenId) -> Result<Token, QueueError> {
        read(self.post(&format!("api/queue/tokens/{token_id}/served"))).await
    }

    #[instrument(skip(self))]
    async fn mark_absent(&self, token_id: TokenId) -> Result<Token, QueueError> {
        read(self.post(&format!("api/queue/tokens/{token_id}/absent"))).await
    }
}

#[async_trait]
impl SignalSource for ApiClient {
    #[instrument(skip(self))]
    async fn connect(&self, doctor_id: DoctorId) -> Result<SignalStream, QueueError> {
        let response = self
            .http
            .get(self.url(&format!("api/queue/stream/{doctor_id}")))
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check(response).await?;
        debug!("Push channel connected");

        let bytes = Box::pin(response.bytes_stream());
        let state = (bytes, SseDecoder::default(), VecDeque::new());

        let signals = futures::stream::unfold(state, move |(mut bytes, mut decoder, mut ready)| async move {
            loop {
                if let Some(signal) = ready.pop_front() {
                    return Some((Ok(signal), (bytes, decoder, ready)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => {
                        for frame in decoder.feed(&chunk) {
                            if frame.is_queue_update() {
                                ready.push_back(QueueSignal { doctor_id });
                            } else {
                                debug!(event = ?frame.event, "Ignoring push event");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Push channel read failed");
                        return Some((Err(QueueError::from(e)), (bytes, decoder, ready)));
                    }
                    None => return None,
                }
            }
        });

        Ok(signals.boxed())
    }
}
