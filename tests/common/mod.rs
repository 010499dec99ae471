//! In-memory queue service shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use clinic_queue::api::{QueueService, QueueSignal, SignalSource, SignalStream};
use clinic_queue::models::{
    Doctor, DoctorId, NewDoctor, NewPatient, Patient, PatientId, Token, TokenId, WaitingToken,
};
use clinic_queue::notify::Notifier;
use clinic_queue::subscription::ReconnectPolicy;
use clinic_queue::{ClinicContext, QueueError};

/// Seconds of ETA per patient ahead in the queue.
pub const SLOT_SECONDS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Waiting,
    Pending,
    Completed,
    Absent,
}

struct Entry {
    token_id: TokenId,
    token_number: u32,
    doctor_id: DoctorId,
    patient_id: PatientId,
    stage: Stage,
    called_at: Option<Instant>,
    service_seconds: Option<u64>,
}

#[derive(Default)]
struct State {
    next_id: i64,
    doctors: Vec<Doctor>,
    patients: HashMap<PatientId, Patient>,
    entries: Vec<Entry>,
}

impl State {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn doctor(&self, doctor_id: DoctorId) -> Result<&Doctor, QueueError> {
        self.doctors
            .iter()
            .find(|d| d.id == doctor_id)
            .ok_or_else(|| rejection(404, "Doctor not found"))
    }

    fn token(&self, entry: &Entry) -> Token {
        Token {
            id: entry.token_id,
            token_number: entry.token_number,
            patient: self.patients.get(&entry.patient_id).cloned(),
            doctor: self.doctors.iter().find(|d| d.id == entry.doctor_id).cloned(),
            service_seconds: entry.service_seconds,
            missed_count: None,
        }
    }

    fn list(&self, doctor_id: DoctorId, stage: Stage) -> Vec<Token> {
        self.entries
            .iter()
            .filter(|e| e.doctor_id == doctor_id && e.stage == stage)
            .map(|e| self.token(e))
            .collect()
    }
}

fn rejection(status: u16, message: &str) -> QueueError {
    QueueError::ServerRejection {
        status,
        message: message.to_string(),
    }
}

/// Holds the next waiting-list pull after it has read its data.
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

type Subscriber = mpsc::UnboundedSender<Result<QueueSignal, QueueError>>;

/// A queue service good enough to drive the views end to end.
///
/// Every mutation pushes a signal to the affected doctor's subscribers.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    subscribers: Mutex<HashMap<DoctorId, Vec<Subscriber>>>,
    gate: Mutex<Option<Arc<Gate>>>,
    requests: AtomicUsize,
    pulls: AtomicUsize,
    pulls_failing: AtomicBool,
    fail_after_change: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_doctor(&self, name: &str, available: bool) -> Doctor {
        let mut state = self.state.lock();
        let doctor = Doctor {
            id: state.id(),
            name: name.to_string(),
            available,
        };
        state.doctors.push(doctor.clone());
        doctor
    }

    /// Requests served so far, of any kind.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Waiting-list pulls served so far.
    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn hold_next_pull(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Registers and enqueues a patient straight on the service.
    pub async fn walk_in(&self, doctor_id: DoctorId, name: &str) -> Token {
        let patient = self
            .create_patient(NewPatient {
                name: name.to_string(),
                age: None,
                contact: "555-0".to_string(),
            })
            .await
            .expect("patient registered");
        self.enqueue(doctor_id, patient.id).await.expect("patient enqueued")
    }

    /// Makes every pull after the next mutation fail with a 503.
    pub fn fail_pulls_after_next_change(&self) {
        self.fail_after_change.store(true, Ordering::SeqCst);
    }

    /// Ends every open push connection.
    pub fn drop_connections(&self) {
        self.subscribers.lock().clear();
    }

    pub fn connections(&self, doctor_id: DoctorId) -> usize {
        self.subscribers
            .lock()
            .get(&doctor_id)
            .map(|subs| subs.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }

    /// Announces a change without making one.
    pub fn signal(&self, doctor_id: DoctorId) {
        if let Some(subs) = self.subscribers.lock().get_mut(&doctor_id) {
            subs.retain(|tx| tx.unbounded_send(Ok(QueueSignal { doctor_id })).is_ok());
        }
    }

    fn hit(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn changed(&self, doctor_id: DoctorId) {
        if self.fail_after_change.swap(false, Ordering::SeqCst) {
            self.pulls_failing.store(true, Ordering::SeqCst);
        }
        self.signal(doctor_id);
    }

    fn check_pull(&self) -> Result<(), QueueError> {
        if self.pulls_failing.load(Ordering::SeqCst) {
            return Err(rejection(503, "Service unavailable"));
        }
        Ok(())
    }

    fn mutate_token(&self, token_id: TokenId, from: &[Stage], to: Stage) -> Result<Token, QueueError> {
        self.hit();
        let (token, doctor_id) = {
            let mut state = self.state.lock();
            let entry = state
                .entries
                .iter_mut()
                .find(|e| e.token_id == token_id)
                .ok_or_else(|| rejection(404, "Token not found"))?;
            if !from.contains(&entry.stage) {
                return Err(rejection(409, "Token cannot make that transition"));
            }
            entry.stage = to;
            if to == Stage::Completed {
                entry.service_seconds = entry.called_at.map(|at| at.elapsed().as_secs());
            }
            let doctor_id = entry.doctor_id;
            let entry = state.entries.iter().find(|e| e.token_id == token_id);
            (entry.map(|e| state.token(e)), doctor_id)
        };
        self.changed(doctor_id);
        token.ok_or_else(|| rejection(404, "Token not found"))
    }
}

#[async_trait]
impl QueueService for MemoryQueue {
    async fn list_doctors(&self) -> Result<Vec<Doctor>, QueueError> {
        self.hit();
        Ok(self.state.lock().doctors.clone())
    }

    async fn create_doctor(&self, doctor: NewDoctor) -> Result<Doctor, QueueError> {
        self.hit();
        Ok(self.add_doctor(&doctor.name, doctor.available))
    }

    async fn set_availability(&self, doctor_id: DoctorId, available: bool) -> Result<Doctor, QueueError> {
        self.hit();
        let mut state = self.state.lock();
        let doctor = state
            .doctors
            .iter_mut()
            .find(|d| d.id == doctor_id)
            .ok_or_else(|| rejection(404, "Doctor not found"))?;
        doctor.available = available;
        Ok(doctor.clone())
    }

    async fn create_patient(&self, patient: NewPatient) -> Result<Patient, QueueError> {
        self.hit();
        let mut state = self.state.lock();
        let patient = Patient {
            id: state.id(),
            name: patient.name,
            age: patient.age,
            contact: patient.contact,
        };
        state.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn enqueue(&self, doctor_id: DoctorId, patient_id: PatientId) -> Result<Token, QueueError> {
        self.hit();
        let token = {
            let mut state = self.state.lock();
            if !state.doctor(doctor_id)?.available {
                return Err(rejection(409, "Doctor is not available"));
            }
            if !state.patients.contains_key(&patient_id) {
                return Err(rejection(404, "Patient not found"));
            }
            let token_number = state
                .entries
                .iter()
                .filter(|e| e.doctor_id == doctor_id)
                .map(|e| e.token_number)
                .max()
                .unwrap_or(0)
                + 1;
            let entry = Entry {
                token_id: state.id(),
                token_number,
                doctor_id,
                patient_id,
                stage: Stage::Waiting,
                called_at: None,
                service_seconds: None,
            };
            let token = state.token(&entry);
            state.entries.push(entry);
            token
        };
        self.changed(doctor_id);
        Ok(token)
    }

    async fn waiting(&self, doctor_id: DoctorId) -> Result<Vec<WaitingToken>, QueueError> {
        self.hit();
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.check_pull()?;
        let waiting: Vec<WaitingToken> = {
            let state = self.state.lock();
            state
                .entries
                .iter()
                .filter(|e| e.doctor_id == doctor_id && e.stage == Stage::Waiting)
                .enumerate()
                .map(|(ahead, e)| WaitingToken {
                    token_id: e.token_id,
                    token_number: e.token_number,
                    patient_name: state
                        .patients
                        .get(&e.patient_id)
                        .map(|p| p.name.clone())
                        .unwrap_or_default(),
                    position: ahead as u32 + 1,
                    eta_seconds: ahead as u64 * SLOT_SECONDS,
                })
                .collect()
        };

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(waiting)
    }

    async fn pending(&self, doctor_id: DoctorId) -> Result<Vec<Token>, QueueError> {
        self.hit();
        self.check_pull()?;
        Ok(self.state.lock().list(doctor_id, Stage::Pending))
    }

    async fn completed(&self, doctor_id: DoctorId) -> Result<Vec<Token>, QueueError> {
        self.hit();
        self.check_pull()?;
        Ok(self.state.lock().list(doctor_id, Stage::Completed))
    }

    async fn call_next(&self, doctor_id: DoctorId) -> Result<Token, QueueError> {
        self.hit();
        let token = {
            let mut state = self.state.lock();
            state.doctor(doctor_id)?;
            let entry = state
                .entries
                .iter_mut()
                .find(|e| e.doctor_id == doctor_id && e.stage == Stage::Waiting)
                .ok_or_else(|| rejection(409, "No waiting patients"))?;
            entry.stage = Stage::Pending;
            entry.called_at = Some(Instant::now());
            let token_id = entry.token_id;
            let entry = state.entries.iter().find(|e| e.token_id == token_id);
            entry.map(|e| state.token(e))
        };
        self.changed(doctor_id);
        token.ok_or_else(|| rejection(404, "Token not found"))
    }

    async fn mark_served(&self, token_id: TokenId) -> Result<Token, QueueError> {
        self.mutate_token(token_id, &[Stage::Pending], Stage::Completed)
    }

    async fn mark_absent(&self, token_id: TokenId) -> Result<Token, QueueError> {
        self.mutate_token(token_id, &[Stage::Waiting, Stage::Pending], Stage::Absent)
    }
}

#[async_trait]
impl SignalSource for MemoryQueue {
    async fn connect(&self, doctor_id: DoctorId) -> Result<SignalStream, QueueError> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers.lock().entry(doctor_id).or_default().push(tx);
        Ok(rx.boxed())
    }
}

/// A desk wired to `queue`, reconnecting quickly.
pub fn desk(queue: &Arc<MemoryQueue>) -> ClinicContext {
    ClinicContext::new(
        queue.clone(),
        queue.clone(),
        Notifier::new(),
        ReconnectPolicy::fixed(Duration::from_millis(10)),
    )
}

/// Waits until the watched value satisfies `cond`.
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, cond: F)
where
    F: Fn(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let ready = {
                let value = rx.borrow_and_update();
                cond(&*value)
            };
            if ready {
                return;
            }
            if rx.changed().await.is_err() {
                panic!("watched value dropped");
            }
        }
    })
    .await
    .expect("condition not reached in time");
}
