//! Clinic queue client core library
//!
//! Keeps reception, doctor dashboard and roster views consistent with queue
//! state held by the clinic's queue service. Every change, whether made here,
//! by another desk, or announced over the push channel, is reconciled by
//! re-pulling the doctor's full state.

pub mod api;
pub mod app;
pub mod error;
pub mod intake;
pub mod models;
pub mod notify;
pub mod store;
pub mod subscription;
pub mod ui;

pub use app::ClinicContext;
pub use error::{IntakeError, QueueError, ValidationError};

/// Application configuration
pub mod config {
    use serde::Deserialize;
    use std::time::Duration;
    use url::Url;

    /// Used when no base URL is configured.
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

    #[derive(Debug, Clone, Deserialize)]
    pub struct ClientConfig {
        /// Root of the queue service, e.g. `http://localhost:8080`.
        pub base_url: Url,
        pub request_timeout_secs: u64,
        pub connect_timeout_secs: u64,
        /// First push-channel reconnect delay.
        pub reconnect_initial_ms: u64,
        /// Upper bound for push-channel reconnect delays.
        pub reconnect_max_ms: u64,
    }

    impl ClientConfig {
        /// Default timeouts against the given service root.
        pub fn with_base_url(base_url: Url) -> Self {
            Self {
                base_url,
                request_timeout_secs: 10,
                connect_timeout_secs: 5,
                reconnect_initial_ms: 500,
                reconnect_max_ms: 30_000,
            }
        }

        pub fn request_timeout(&self) -> Duration {
            Duration::from_secs(self.request_timeout_secs)
        }

        pub fn connect_timeout(&self) -> Duration {
            Duration::from_secs(self.connect_timeout_secs)
        }
    }

    /// Load configuration from defaults, optional files and the environment
    pub fn load_config() -> Result<ClientConfig, config::ConfigError> {
        let env = std::env::var("CLINIC_QUEUE_ENV").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            // Start with default settings
            .set_default("base_url", DEFAULT_BASE_URL)?
            .set_default("request_timeout_secs", 10)?
            .set_default("connect_timeout_secs", 5)?
            .set_default("reconnect_initial_ms", 500)?
            .set_default("reconnect_max_ms", 30_000)?
            .add_source(config::File::with_name("config/clinic-queue").required(false))
            // Override with environment-specific settings
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables, e.g. CLINIC_QUEUE_BASE_URL
            .add_source(config::Environment::with_prefix("CLINIC_QUEUE"))
            .build()?
            .try_deserialize()
    }

}
