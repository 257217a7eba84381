//! The network side of the cache: real HTTP fetches via reqwest.

use async_trait::async_trait;
use tracing::debug;

use super::response::{CachedResponse, FetchRequest};

/// Headers that describe one connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The origin could not be reached at all (refused, unresolvable, timed out).
    #[error("origin unreachable: {0}")]
    Unavailable(String),
}

/// Something that can perform a fetch.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError>;
}

/// Fetches over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpNetwork {
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new() -> Self {
        Self::default()
    }
}

fn fetch_error(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_connect() || source.is_timeout() {
        debug!(%url, error = %source, "Origin unreachable");
        FetchError::Unavailable(url.to_string())
    } else {
        FetchError::Request {
            url: url.to_string(),
            source,
        }
    }
}

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let map_err = |source| fetch_error(&request.url, source);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name, value);
            }
        }

        let resp = builder.send().await.map_err(map_err)?;

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await.map_err(map_err)?;

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}
