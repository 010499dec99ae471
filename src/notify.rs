//! User-facing notifications.
//!
//! At most one notification is live. [`Notifier::show`] replaces the current
//! one and re-arms the expiry timer; [`Notifier::clear`] dismisses it and
//! disarms the timer. Only one timer is ever pending, and a timer can only
//! clear the notification it was armed for.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// How long a notification stays visible.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub severity: Severity,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

struct Slot {
    current: Option<Notification>,
    expiry: Option<JoinHandle<()>>,
}

struct Inner {
    ttl: Duration,
    slot: Mutex<Slot>,
    current_tx: watch::Sender<Option<Notification>>,
    feed_tx: broadcast::Sender<Notification>,
}

/// Owner of the single live notification. Clones share state.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::with_ttl(NOTIFICATION_TTL)
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let (current_tx, _) = watch::channel(None);
        let (feed_tx, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(Inner {
                ttl,
                slot: Mutex::new(Slot {
                    current: None,
                    expiry: None,
                }),
                current_tx,
                feed_tx,
            }),
        }
    }

    /// Shows `message`, replacing whatever is visible. Must be called within a tokio runtime.
    pub fn show(&self, message: impl Into<String>, severity: Severity) -> Notification {
        let ttl = self.inner.ttl;
        let notification = Notification {
            id: Uuid::new_v4(),
            severity,
            message: message.into(),
            expires_at: Utc::now() + chrono::Duration::milliseconds(ttl.as_millis() as i64),
        };
        debug!(severity = ?severity, message = %notification.message, "Notification shown");

        let mut slot = self.inner.slot.lock();
        if let Some(timer) = slot.expiry.take() {
            timer.abort();
        }
        slot.expiry = Some(spawn_expiry(Arc::downgrade(&self.inner), notification.id, ttl));
        slot.current = Some(notification.clone());
        self.inner.current_tx.send_replace(Some(notification.clone()));
        drop(slot);

        // No listeners is fine.
        let _ = self.inner.feed_tx.send(notification.clone());
        notification
    }

    pub fn success(&self, message: impl Into<String>) -> Notification {
        self.show(message, Severity::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> Notification {
        self.show(message, Severity::Error)
    }

    /// Dismisses the visible notification and cancels its expiry.
    pub fn clear(&self) {
        let mut slot = self.inner.slot.lock();
        if let Some(timer) = slot.expiry.take() {
            timer.abort();
        }
        if slot.current.take().is_some() {
            self.inner.current_tx.send_replace(None);
        }
    }

    pub fn current(&self) -> Option<Notification> {
        self.inner.slot.lock().current.clone()
    }

    /// Follows the visible notification.
    pub fn watch(&self) -> watch::Receiver<Option<Notification>> {
        self.inner.current_tx.subscribe()
    }

    /// Every notification shown from now on, in order.
    pub fn feed(&self) -> broadcast::Receiver<Notification> {
        self.inner.feed_tx.subscribe()
    }
}

fn spawn_expiry(inner: Weak<Inner>, id: Uuid, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let mut slot = inner.slot.lock();
        if slot.current.as_ref().map(|n| n.id) == Some(id) {
            slot.current = None;
            slot.expiry = None;
            inner.current_tx.send_replace(None);
        }
    })
}
