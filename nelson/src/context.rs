//! Process-wide application context.
//!
//! One instance is built at startup and shared (behind an `Arc`) with every
//! command and HTTP handler.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::info;

use crate::assistant::{ResponseProvider, SimulatedAssistant};
use crate::cache::{CacheController, CacheStorage, HttpNetwork, Network, WorkerConfig};
use crate::config::Config;
use crate::connectivity::{Connectivity, ObservedNetwork};
use crate::install::InstallPrompt;
use crate::store::{ChatStore, FileStorage, MemoryStorage, Storage};

pub struct AppContext {
    /// Chat state. Never held across an await.
    pub store: RwLock<ChatStore>,
    pub install: InstallPrompt,
    pub assistant: Arc<dyn ResponseProvider>,
    pub cache: CacheController,
    /// Used directly for requests the cache passes through.
    pub network: Arc<dyn Network>,
    pub connectivity: Connectivity,
}

impl AppContext {
    /// Assemble a context from explicit parts.
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        network: Arc<dyn Network>,
        assistant: Arc<dyn ResponseProvider>,
    ) -> Self {
        let store = ChatStore::load(storage.clone());
        let connectivity = Connectivity::default();
        let network: Arc<dyn Network> =
            Arc::new(ObservedNetwork::new(network, connectivity.clone()));

        let mut worker = WorkerConfig::new(config.origin.clone());
        worker.version.clone_from(&config.cache_version);
        worker.skip_waiting = config.skip_waiting;
        let caches = Arc::new(if config.ephemeral {
            CacheStorage::new(config.max_cache_entry_bytes)
        } else {
            CacheStorage::persistent(config.cache_dir(), config.max_cache_entry_bytes)
        });
        let cache = CacheController::new(worker, caches, network.clone());

        Self {
            store: RwLock::new(store),
            install: InstallPrompt::new(storage),
            assistant,
            cache,
            network,
            connectivity,
        }
    }

    /// Build the production context: file storage (unless ephemeral), HTTP
    /// network and the simulated assistant.
    pub fn from_config(config: &Config) -> Result<Arc<Self>> {
        let storage: Arc<dyn Storage> = if config.ephemeral {
            Arc::new(MemoryStorage::new())
        } else {
            let storage = FileStorage::open(&config.data_dir).with_context(|| {
                format!("Failed to open data directory {}", config.data_dir.display())
            })?;
            info!(dir = %storage.dir().display(), "Using file storage");
            Arc::new(storage)
        };

        Ok(Arc::new(Self::new(
            config,
            storage,
            Arc::new(HttpNetwork::new()),
            Arc::new(SimulatedAssistant::new(config.assistant_delay)),
        )))
    }

    /// Wipe chats, preferences and install-prompt memory.
    pub async fn clear_all(&self) {
        self.store.write().await.clear_all();
        self.install.reset();
    }
}
