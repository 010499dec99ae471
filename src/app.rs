//! Application state shared by every view.

use std::sync::Arc;

use crate::api::{ApiClient, QueueService, SignalSource};
use crate::config::ClientConfig;
use crate::error::QueueError;
use crate::intake::IntakeOrchestrator;
use crate::notify::Notifier;
use crate::store::QueueViewStore;
use crate::subscription::{ReconnectPolicy, SubscriptionManager};

/// Everything a view needs. Cheap to clone.
#[derive(Clone)]
pub struct ClinicContext {
    pub api: Arc<dyn QueueService>,
    pub notifier: Notifier,
    pub store: QueueViewStore,
    pub subscriptions: SubscriptionManager,
    pub intake: IntakeOrchestrator,
}

impl ClinicContext {
    /// Wires the HTTP client described by `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, QueueError> {
        let client = Arc::new(ApiClient::new(config)?);
        Ok(Self::new(
            client.clone(),
            client,
            Notifier::new(),
            ReconnectPolicy::from_config(config),
        ))
    }

    pub fn new(
        api: Arc<dyn QueueService>,
        signals: Arc<dyn SignalSource>,
        notifier: Notifier,
        reconnect: ReconnectPolicy,
    ) -> Self {
        let store = QueueViewStore::new(api.clone(), notifier.clone());
        let intake = IntakeOrchestrator::new(api.clone(), store.clone(), notifier.clone());
        Self {
            subscriptions: SubscriptionManager::new(signals, reconnect),
            api,
            notifier,
            store,
            intake,
        }
    }
}
