//! Offline cache controller.
//!
//! Mirrors a service worker's lifecycle: install seeds the shell into a
//! versioned bucket, activate drops every other bucket, and once active
//! each GET is answered cache-first with a network fallback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::Method;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::network::Network;
use super::response::{CachedResponse, FetchRequest};
use super::storage::CacheStorage;

/// Bucket name of the current release.
pub const CACHE_VERSION: &str = "nelson-gpt-v1";

/// App shell seeded into the cache on install.
pub const SHELL_RESOURCES: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/favicon.ico",
    "/favicon.png",
];

/// Lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Created, install not started.
    Parsed,
    Installing,
    /// Installed and waiting to activate.
    Installed,
    Activating,
    /// Intercepting fetches.
    Activated,
}

/// Messages the host application can post to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate now instead of waiting for old clients to go away.
    SkipWaiting,
}

impl ControlMessage {
    /// Decode a posted `{"type": ...}` message. Unknown messages are ignored.
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        match value.get("type")?.as_str()? {
            "SKIP_WAITING" => Some(Self::SkipWaiting),
            _ => None,
        }
    }
}

/// What to do with an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not handled; the caller sends it to the network untouched.
    Passthrough,
    Respond(CachedResponse),
}

/// Controller settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name of the bucket this release owns.
    pub version: String,
    /// Origin the shell resources are resolved against.
    pub origin: String,
    pub shell: Vec<String>,
    /// Skip the waiting phase after install.
    pub skip_waiting: bool,
}

impl WorkerConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            version: CACHE_VERSION.to_string(),
            origin: origin.into(),
            shell: SHELL_RESOURCES.iter().map(ToString::to_string).collect(),
            skip_waiting: true,
        }
    }

    /// Absolute URL of a path on the origin.
    pub fn resolve(&self, path: &str) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), path)
    }
}

pub struct CacheController {
    config: WorkerConfig,
    caches: Arc<CacheStorage>,
    network: Arc<dyn Network>,
    state: watch::Sender<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    /// Cache writes still running after their response went out.
    pending_writes: Mutex<JoinSet<()>>,
}

impl CacheController {
    pub fn new(config: WorkerConfig, caches: Arc<CacheStorage>, network: Arc<dyn Network>) -> Self {
        let skip_waiting = AtomicBool::new(config.skip_waiting);
        Self {
            config,
            caches,
            network,
            state: watch::Sender::new(WorkerState::Parsed),
            skip_waiting,
            clients_claimed: AtomicBool::new(false),
            pending_writes: Mutex::new(JoinSet::new()),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn clients_claimed(&self) -> bool {
        self.clients_claimed.load(Ordering::SeqCst)
    }

    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn caches(&self) -> &CacheStorage {
        &self.caches
    }

    fn transition(&self, next: WorkerState) {
        let prev = self.state.send_replace(next);
        info!(from = ?prev, to = ?next, "Cache worker state changed");
    }

    /// Seed the shell into the versioned bucket, then wait or activate.
    ///
    /// Each resource is fetched on its own; one failing does not stop the
    /// others or the install.
    pub async fn install(&self) {
        self.transition(WorkerState::Installing);

        let bucket = self.caches.open(&self.config.version).await;
        for path in &self.config.shell {
            let url = self.config.resolve(path);
            match self.network.fetch(&FetchRequest::get(&url)).await {
                Ok(resp) if resp.is_cacheable() => {
                    if let Err(e) = bucket.put(&url, resp).await {
                        warn!(%url, error = %e, "Failed to seed shell resource");
                    }
                }
                Ok(resp) => {
                    warn!(%url, status = resp.status, "Skipping shell resource");
                }
                Err(e) => {
                    warn!(%url, error = %e, "Failed to fetch shell resource");
                }
            }
        }
        let entries = bucket.entry_count().await;
        info!(bucket = bucket.name(), entries, "Shell cached");

        self.transition(WorkerState::Installed);
        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate().await;
        }
    }

    /// Promote a waiting controller immediately.
    pub async fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Installed {
            self.activate().await;
        }
    }

    /// Delete every bucket but the current one and take control of clients.
    pub async fn activate(&self) {
        self.transition(WorkerState::Activating);

        for name in self.caches.keys().await {
            if name != self.config.version {
                self.caches.delete(&name).await;
                info!(bucket = %name, "Deleted stale cache");
            }
        }
        self.clients_claimed.store(true, Ordering::SeqCst);

        self.transition(WorkerState::Activated);
    }

    pub async fn handle_message(&self, message: ControlMessage) {
        match message {
            ControlMessage::SkipWaiting => self.skip_waiting().await,
        }
    }

    /// Answer an intercepted request.
    ///
    /// Non-GET requests, and anything seen before activation, pass through.
    pub async fn handle_fetch(&self, request: FetchRequest) -> FetchOutcome {
        if request.method != Method::GET || self.state() != WorkerState::Activated {
            return FetchOutcome::Passthrough;
        }

        if let Some(hit) = self.caches.match_url(&request.url).await {
            debug!(url = %request.url, "Cache hit");
            return FetchOutcome::Respond(hit);
        }

        debug!(url = %request.url, "Cache miss");
        match self.network.fetch(&request).await {
            Ok(resp) => {
                if resp.is_cacheable() {
                    self.store_later(request.url, resp.clone()).await;
                }
                FetchOutcome::Respond(resp)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed, serving offline fallback");
                FetchOutcome::Respond(self.offline_fallback().await)
            }
        }
    }

    async fn offline_fallback(&self) -> CachedResponse {
        let root = self.config.resolve("/");
        self.caches
            .match_url(&root)
            .await
            .unwrap_or_else(CachedResponse::offline)
    }

    /// Write a copy into the bucket in the background.
    async fn store_later(&self, url: String, response: CachedResponse) {
        let caches = self.caches.clone();
        let version = self.config.version.clone();

        let mut writes = self.pending_writes.lock().await;
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            let bucket = caches.open(&version).await;
            if let Err(e) = bucket.put(&url, response).await {
                warn!(%url, error = %e, "Failed to cache response");
            }
        });
    }

    /// Wait for every background cache write to finish.
    pub async fn settle(&self) {
        loop {
            let mut writes = std::mem::take(&mut *self.pending_writes.lock().await);
            if writes.is_empty() {
                break;
            }
            while writes.join_next().await.is_some() {}
        }
    }
}
