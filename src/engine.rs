//! Application-wide wiring of the quota components.
//!
//! One `SyncEngine` is built at startup and handed to whatever needs it.
//! Every component receives its collaborators here; nothing reaches for
//! module-level state.

use crate::config::SyncConfig;
use crate::counter_store::{CounterStore, FileBackend, StorageBackend};
use crate::favorites::{FavoriteItem, Favorites};
use crate::quota::presenter::MountedPresenter;
use crate::quota::reconciler::{ActionResponse, QuotaReconciler};
use crate::quota::types::{Identity, QuotaView};
use crate::remote::http::{HttpCollectionClient, HttpQuotaClient};
use crate::remote::{RemoteCollectionService, RemoteError, RemoteQuotaService};
use crate::services::{system_clock, SharedClock};
use crate::signal_bus::{Signal, SignalBus};
use crate::structured_logger::StructuredLogger;
use crate::sync_paths;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

/// Collaborators the engine is assembled from.
pub struct EngineServices {
    pub backend: Arc<dyn StorageBackend>,
    pub quota: Arc<dyn RemoteQuotaService>,
    pub collections: Arc<dyn RemoteCollectionService>,
    pub clock: SharedClock,
    pub journal: Option<Arc<StructuredLogger>>,
}

pub struct SyncEngine {
    config: SyncConfig,
    bus: SignalBus,
    store: Arc<CounterStore>,
    reconciler: Arc<QuotaReconciler>,
    collections: Arc<dyn RemoteCollectionService>,
    journal: Option<Arc<StructuredLogger>>,
}

impl SyncEngine {
    /// Builds the production engine: file-backed store under the origin's
    /// directory, HTTP clients, and the journal when enabled.
    pub fn from_config(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let backend = FileBackend::for_origin(&config.origin)
            .context("Failed to prepare counter store directory")?;
        let journal = if config.journal {
            let logs_dir = sync_paths::logs_dir(&config.origin)?;
            let session_id = uuid::Uuid::new_v4().to_string();
            Some(Arc::new(StructuredLogger::new(&session_id, &logs_dir)?))
        } else {
            None
        };

        let timeout = config.request_timeout();
        let services = EngineServices {
            backend: Arc::new(backend),
            quota: Arc::new(HttpQuotaClient::new(config.quota_endpoint.as_str(), timeout)),
            collections: Arc::new(HttpCollectionClient::new(
                config.collection_endpoint.as_str(),
                timeout,
            )),
            clock: system_clock(),
            journal,
        };
        Ok(Self::with_services(config, services))
    }

    pub fn with_services(config: SyncConfig, services: EngineServices) -> Self {
        let bus = SignalBus::new();
        let store = Arc::new(CounterStore::new(
            services.backend,
            config.max_count,
            services.clock.clone(),
        ));
        let reconciler = QuotaReconciler::new(
            store.clone(),
            services.quota,
            bus.clone(),
            services.clock,
            config.reconcile_interval(),
            services.journal.clone(),
        );
        Self {
            config,
            bus,
            store,
            reconciler,
            collections: services.collections,
            journal: services.journal,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<CounterStore> {
        &self.store
    }

    pub fn reconciler(&self) -> &Arc<QuotaReconciler> {
        &self.reconciler
    }

    pub fn journal(&self) -> Option<&Arc<StructuredLogger>> {
        self.journal.as_ref()
    }

    /// Mounts a presenter on this engine's reconciler and bus.
    pub fn mount_presenter(&self) -> MountedPresenter {
        MountedPresenter::mount(Arc::clone(&self.reconciler), &self.bus)
    }

    /// Favorites of one item type, reset with the rest of the engine on
    /// identity changes.
    pub fn favorites<T: FavoriteItem>(&self, item_type: &str) -> Favorites<T> {
        Favorites::new(
            item_type,
            Arc::clone(&self.collections),
            &self.bus,
            self.journal.clone(),
        )
    }

    /// Runs one quota-consuming `POST` against `action_url`.
    ///
    /// The counter is bumped first; a remaining count in the response is
    /// applied, and a 429 forces a reconcile before the rejection is
    /// returned.
    pub async fn perform_action(
        &self,
        action_url: &str,
        body: Value,
    ) -> Result<QuotaView, RemoteError> {
        let client = HttpQuotaClient::new(
            self.config.quota_endpoint.as_str(),
            self.config.request_timeout(),
        );
        self.reconciler
            .perform(move || async move {
                client
                    .perform_action(action_url, body)
                    .await
                    .map(|remaining| ActionResponse {
                        value: (),
                        remaining,
                    })
            })
            .await?;
        Ok(self.reconciler.cached_view())
    }

    /// Announces a sign-in or sign-out to every component.
    pub fn set_identity(&self, identity: Identity) {
        tracing::debug!("Identity changed: {:?}", identity);
        self.bus.publish(Signal::IdentityChanged(identity));
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
