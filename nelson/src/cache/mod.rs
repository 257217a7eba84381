//! Offline cache layer for the app shell and previously seen resources.

mod controller;
mod network;
mod response;
mod storage;

pub use controller::{
    CacheController, ControlMessage, FetchOutcome, WorkerConfig, WorkerState, CACHE_VERSION,
};
pub use network::{FetchError, HttpNetwork, Network};
pub use response::{CachedResponse, FetchRequest};
pub use storage::{CacheStorage, DEFAULT_MAX_ENTRY_BYTES};

pub(crate) use network::is_hop_by_hop;
