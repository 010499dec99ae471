//! View controllers. No rendering lives here, only what each screen reads
//! and the actions it can take.

pub mod dashboard;
pub mod reception;
pub mod roster;

pub use dashboard::DoctorDashboard;
pub use reception::ReceptionDesk;
pub use roster::DoctorRoster;

use std::future::Future;

use tracing::error;

use crate::error::QueueError;
use crate::notify::Notifier;

/// Runs one user action and emits exactly one notification for it.
pub(crate) async fn perform<T, Fut>(
    notifier: &Notifier,
    action: &'static str,
    success: &str,
    failure: impl FnOnce(&QueueError) -> String,
    fut: Fut,
) -> Result<T, QueueError>
where
    Fut: Future<Output = Result<T, QueueError>>,
{
    match fut.await {
        Ok(value) => {
            notifier.success(success);
            Ok(value)
        }
        Err(e) => {
            error!(action, error = %e, label = e.as_label(), "Action failed");
            notifier.error(failure(&e));
            Err(e)
        }
    }
}

/// `185` → `3m 5s`, `42` → `42s`.
pub fn format_eta(seconds: Option<u64>) -> String {
    match seconds {
        None => "-".to_string(),
        Some(secs) if secs >= 60 => format!("{}m {}s", secs / 60, secs % 60),
        Some(secs) => format!("{secs}s"),
    }
}
