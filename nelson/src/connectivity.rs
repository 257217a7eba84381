//! Online/offline signal.
//!
//! The platform owns this flag; the rest of the crate only reads it or
//! reports what it observed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::cache::{CachedResponse, FetchError, FetchRequest, Network};

#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current state; only changes are logged.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
        if changed {
            info!(online, "Connectivity changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Network wrapper that reports each fetch's fate to a [`Connectivity`].
pub struct ObservedNetwork {
    inner: Arc<dyn Network>,
    connectivity: Connectivity,
}

impl ObservedNetwork {
    pub fn new(inner: Arc<dyn Network>, connectivity: Connectivity) -> Self {
        Self {
            inner,
            connectivity,
        }
    }
}

#[async_trait]
impl Network for ObservedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let result = self.inner.fetch(request).await;
        match &result {
            Ok(_) => self.connectivity.set_online(true),
            Err(FetchError::Unavailable(_)) => self.connectivity.set_online(false),
            // The origin answered; the exchange just went wrong.
            Err(FetchError::Request { .. }) => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DeadNetwork;

    #[async_trait]
    impl Network for DeadNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
            Err(FetchError::Unavailable(request.url.clone()))
        }
    }

    #[tokio::test]
    async fn failed_fetch_marks_offline() {
        let connectivity = Connectivity::default();
        let network = ObservedNetwork::new(Arc::new(DeadNetwork), connectivity.clone());

        let result = network.fetch(&FetchRequest::get("http://nelson.test/")).await;

        assert!(result.is_err());
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn notifies_only_on_change() {
        let connectivity = Connectivity::default();
        let mut rx = connectivity.subscribe();
        assert!(connectivity.is_online());

        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!connectivity.is_online());
    }
}
