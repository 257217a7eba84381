//! Request and response values that flow through the cache.

use axum::body::Bytes;
use axum::http::Method;

/// Plain-text body of the synthetic response served when both the cache
/// and the network come up empty.
pub const OFFLINE_BODY: &str = "Offline - Nelson-GPT is available in offline mode";

/// An outgoing request as seen by the cache controller.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Absolute URL; also the cache key.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }
}

/// A full response: status, headers and body as captured at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The 503 served when nothing else is available.
    pub fn offline() -> Self {
        Self::new(503, OFFLINE_BODY).with_header("content-type", "text/plain")
    }

    /// Only plain 200 responses are worth keeping.
    pub const fn is_cacheable(&self) -> bool {
        self.status == 200
    }
}
