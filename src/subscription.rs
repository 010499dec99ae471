//! # Live subscription to a doctor's push channel.
//!
//! A subscription keeps one push connection open for one doctor and calls
//! `on_change` for every "queue changed" signal. The signal is only a trigger;
//! the callback is expected to re-pull state.
//!
//! ```text
//! open(doctor, on_change) ──► task:
//! loop {
//!   ├─► connect (cancellable)
//!   │     ├─ Ok  ──► status Open
//!   │     │         ├─ reconnect? ─► on_change()   (resync, signals may have been missed)
//!   │     │         └─ for each signal ─► on_change()
//!   │     │            until stream ends or errors
//!   │     └─ Err ──► log
//!   ├─► delay = backoff.next()   (reset after every successful connect)
//!   └─► sleep(delay) (cancellable)
//! }
//! ```
//!
//! ## Rules
//! - Closing is synchronous: cancel + abort; no callback runs afterwards.
//! - Dropping the [`SubscriptionHandle`] closes it.
//! - Displayed state is never cleared on disconnect.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_retry::strategy::{jitter, FibonacciBackoff};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::SignalSource;
use crate::config::ClientConfig;
use crate::models::DoctorId;

/// Reconnect delays for a dropped push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Randomise each delay within its upper half.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.reconnect_initial_ms),
            max: Duration::from_millis(config.reconnect_max_ms),
            jitter: true,
        }
    }

    /// Fixed delays, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            jitter: false,
        }
    }

    fn delays(&self) -> impl Iterator<Item = Duration> + Send {
        let randomise = self.jitter;
        FibonacciBackoff::from_millis(self.initial.as_millis().max(1) as u64)
            .max_delay(self.max)
            .map(move |delay| {
                if randomise {
                    delay / 2 + jitter(delay / 2)
                } else {
                    delay
                }
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Closed,
}

/// Opens per-doctor subscriptions.
#[derive(Clone)]
pub struct SubscriptionManager {
    source: Arc<dyn SignalSource>,
    policy: ReconnectPolicy,
}

impl SubscriptionManager {
    pub fn new(source: Arc<dyn SignalSource>, policy: ReconnectPolicy) -> Self {
        Self { source, policy }
    }

    /// Starts listening for `doctor_id`. Must be called within a tokio runtime.
    pub fn open<F, Fut>(&self, doctor_id: DoctorId, on_change: F) -> SubscriptionHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let (status_tx, _) = watch::channel(SubscriptionStatus::Connecting);
        let status = Arc::new(status_tx);

        let task = tokio::spawn(run(
            doctor_id,
            self.source.clone(),
            self.policy,
            on_change,
            token.clone(),
            status.clone(),
        ));
        info!(doctor_id, "Subscription opened");

        SubscriptionHandle {
            doctor_id,
            token,
            status,
            task,
        }
    }

    pub fn close(&self, handle: SubscriptionHandle) {
        handle.close();
    }
}

/// Owner of one live subscription.
pub struct SubscriptionHandle {
    doctor_id: DoctorId,
    token: CancellationToken,
    status: Arc<watch::Sender<SubscriptionStatus>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn doctor_id(&self) -> DoctorId {
        self.doctor_id
    }

    pub fn status(&self) -> SubscriptionStatus {
        *self.status.borrow()
    }

    /// Follows the connection status, including the final `Closed`.
    pub fn status_changes(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.subscribe()
    }

    pub fn close(self) {}

    fn shutdown(&mut self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        self.task.abort();
        self.status.send_replace(SubscriptionStatus::Closed);
        info!(doctor_id = self.doctor_id, "Subscription closed");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("doctor_id", &self.doctor_id)
            .field("status", &self.status())
            .finish()
    }
}

async fn run<F, Fut>(
    doctor_id: DoctorId,
    source: Arc<dyn SignalSource>,
    policy: ReconnectPolicy,
    on_change: F,
    token: CancellationToken,
    status: Arc<watch::Sender<SubscriptionStatus>>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut delays = policy.delays();
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    'session: loop {
        status.send_replace(if attempt == 0 {
            SubscriptionStatus::Connecting
        } else {
            SubscriptionStatus::Reconnecting { attempt }
        });

        let connected = tokio::select! {
            _ = token.cancelled() => break,
            connected = source.connect(doctor_id) => connected,
        };

        match connected {
            Ok(mut signals) => {
                status.send_replace(SubscriptionStatus::Open);
                if connected_before {
                    info!(doctor_id, attempt, "Push channel reconnected, resynchronising");
                    if !notify_change(&on_change, &token).await {
                        break;
                    }
                } else {
                    info!(doctor_id, "Push channel open");
                }
                connected_before = true;
                attempt = 0;
                delays = policy.delays();

                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => break 'session,
                        next = signals.next() => next,
                    };
                    match next {
                        Some(Ok(_)) => {
                            debug!(doctor_id, "Queue change signalled");
                            if !notify_change(&on_change, &token).await {
                                break 'session;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(doctor_id, error = %e, "Push channel dropped");
                            break;
                        }
                        None => {
                            warn!(doctor_id, "Push channel closed by server");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(doctor_id, error = %e, label = e.as_label(), attempt, "Push channel connect failed");
            }
        }

        attempt = attempt.saturating_add(1);
        let delay = delays.next().unwrap_or(policy.max);
        debug!(doctor_id, attempt, ?delay, "Reconnect scheduled");
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    status.send_replace(SubscriptionStatus::Closed);
}

/// Runs one callback; false if the subscription was closed meanwhile.
async fn notify_change<F, Fut>(on_change: &F, token: &CancellationToken) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        _ = token.cancelled() => false,
        _ = on_change() => true,
    }
}
