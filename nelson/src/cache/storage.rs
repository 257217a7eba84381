//! Named, versioned cache buckets keyed by request URL.
//!
//! Buckets live in memory and, when a root directory is given, on disk as
//! one directory per bucket:
//!
//! ```text
//! <root>/<bucket>/index.json   name, creation time, url -> entry metadata
//! <root>/<bucket>/<id>.body    response body
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::response::CachedResponse;

/// Default per-entry size ceiling.
pub const DEFAULT_MAX_ENTRY_BYTES: usize = 5 * 1024 * 1024;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("response for {url} is {size} bytes, over the {limit} byte entry limit")]
    QuotaExceeded {
        url: String,
        size: usize,
        limit: usize,
    },
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("bad cache index at {path}: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk form of a bucket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BucketIndex {
    name: String,
    created_at: i64,
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    status: u16,
    headers: Vec<(String, String)>,
    /// Body file name inside the bucket directory.
    body: String,
}

#[derive(Debug)]
struct Slot {
    response: CachedResponse,
    body_file: Option<String>,
}

/// One bucket of cached responses.
///
/// Concurrent writes to the same URL overwrite each other; the last
/// writer wins.
#[derive(Debug)]
pub struct CacheBucket {
    name: String,
    created_at: i64,
    /// Backing directory; `None` keeps the bucket in memory only.
    dir: Option<PathBuf>,
    entries: RwLock<HashMap<String, Slot>>,
    max_entry_bytes: usize,
}

impl CacheBucket {
    fn new(name: String, dir: Option<PathBuf>, max_entry_bytes: usize) -> Self {
        Self {
            name,
            created_at: Utc::now().timestamp_millis(),
            dir,
            entries: RwLock::new(HashMap::new()),
            max_entry_bytes,
        }
    }

    /// Read a bucket back from its directory. Entries whose body is missing
    /// are dropped.
    fn load(dir: PathBuf, max_entry_bytes: usize) -> Result<Self, CacheError> {
        let index_path = dir.join(INDEX_FILE);
        let raw = std::fs::read(&index_path).map_err(|source| CacheError::Io {
            path: index_path.clone(),
            source,
        })?;
        let index: BucketIndex = serde_json::from_slice(&raw).map_err(|source| {
            CacheError::Index {
                path: index_path,
                source,
            }
        })?;

        let mut entries = HashMap::with_capacity(index.entries.len());
        for (url, entry) in index.entries {
            if !is_plain_file_name(&entry.body) {
                warn!(%url, body = %entry.body, "Skipping cache entry with bad body path");
                continue;
            }
            let body_path = dir.join(&entry.body);
            match std::fs::read(&body_path) {
                Ok(body) => {
                    let response = CachedResponse {
                        status: entry.status,
                        headers: entry.headers,
                        body: body.into(),
                    };
                    entries.insert(
                        url,
                        Slot {
                            response,
                            body_file: Some(entry.body),
                        },
                    );
                }
                Err(e) => {
                    warn!(path = %body_path.display(), error = %e, "Dropping cache entry with unreadable body");
                }
            }
        }

        Ok(Self {
            name: index.name,
            created_at: index.created_at,
            dir: Some(dir),
            entries: RwLock::new(entries),
            max_entry_bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn get(&self, url: &str) -> Option<CachedResponse> {
        self.entries
            .read()
            .await
            .get(url)
            .map(|slot| slot.response.clone())
    }

    /// Store a response. On disk the body is written first and the index
    /// swapped in after, so a reader never sees an index entry without its
    /// body.
    pub async fn put(&self, url: &str, response: CachedResponse) -> Result<(), CacheError> {
        let size = response.body.len();
        if size > self.max_entry_bytes {
            return Err(CacheError::QuotaExceeded {
                url: url.to_string(),
                size,
                limit: self.max_entry_bytes,
            });
        }

        let mut entries = self.entries.write().await;
        let body_file = match &self.dir {
            Some(dir) => Some(write_body(dir, &response.body).await?),
            None => None,
        };
        let replaced = entries.insert(
            url.to_string(),
            Slot {
                response,
                body_file,
            },
        );

        if let Some(dir) = &self.dir {
            self.write_index(dir, &entries).await?;
            if let Some(old) = replaced.and_then(|slot| slot.body_file) {
                let old = dir.join(old);
                if let Err(e) = tokio::fs::remove_file(&old).await {
                    debug!(path = %old.display(), error = %e, "Stale cache body not removed");
                }
            }
        }
        Ok(())
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Cached URLs, sorted.
    #[cfg(test)]
    pub async fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries.read().await.keys().cloned().collect();
        urls.sort();
        urls
    }

    async fn write_index(&self, dir: &Path, entries: &HashMap<String, Slot>) -> Result<(), CacheError> {
        let index = BucketIndex {
            name: self.name.clone(),
            created_at: self.created_at,
            entries: entries
                .iter()
                .filter_map(|(url, slot)| {
                    slot.body_file.as_ref().map(|body| {
                        let entry = IndexEntry {
                            status: slot.response.status,
                            headers: slot.response.headers.clone(),
                            body: body.clone(),
                        };
                        (url.clone(), entry)
                    })
                })
                .collect(),
        };

        let path = dir.join(INDEX_FILE);
        let json = serde_json::to_vec(&index).map_err(|source| CacheError::Index {
            path: path.clone(),
            source,
        })?;
        let tmp = dir.join(format!("{INDEX_FILE}.{}.tmp", Uuid::now_v7()));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| CacheError::Io { path, source })
    }
}

async fn write_body(dir: &Path, body: &[u8]) -> Result<String, CacheError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| CacheError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    let file = format!("{}.body", Uuid::now_v7());
    let path = dir.join(&file);
    tokio::fs::write(&path, body)
        .await
        .map_err(|source| CacheError::Io { path, source })?;
    Ok(file)
}

fn is_plain_file_name(name: &str) -> bool {
    Path::new(name).file_name().is_some_and(|f| f == name)
}

/// Directory name for a bucket; anything outside `[A-Za-z0-9._-]` becomes `_`.
fn bucket_dir_name(name: &str) -> String {
    let dir: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if dir.is_empty() || dir.chars().all(|c| c == '.') {
        format!("_{dir}")
    } else {
        dir
    }
}

/// Every bucket the controller knows about, oldest first.
#[derive(Debug)]
pub struct CacheStorage {
    buckets: RwLock<Vec<Arc<CacheBucket>>>,
    max_entry_bytes: usize,
    /// Where bucket directories live; `None` for memory only.
    root: Option<PathBuf>,
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRY_BYTES)
    }
}

impl CacheStorage {
    /// Memory-only storage.
    pub fn new(max_entry_bytes: usize) -> Self {
        Self {
            buckets: RwLock::new(Vec::new()),
            max_entry_bytes,
            root: None,
        }
    }

    /// Storage backed by `root`, picking up the buckets a previous run left
    /// there. Unreadable buckets are logged and skipped.
    pub fn persistent(root: impl Into<PathBuf>, max_entry_bytes: usize) -> Self {
        let root = root.into();
        let mut buckets = Vec::new();

        match std::fs::read_dir(&root) {
            Ok(dirs) => {
                for entry in dirs.flatten() {
                    let path = entry.path();
                    if !path.is_dir() {
                        continue;
                    }
                    match CacheBucket::load(path.clone(), max_entry_bytes) {
                        Ok(bucket) => buckets.push(Arc::new(bucket)),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Skipping unreadable cache bucket");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %root.display(), error = %e, "Failed to read cache directory");
            }
        }
        buckets.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        debug!(root = %root.display(), buckets = buckets.len(), "Cache storage loaded");

        Self {
            buckets: RwLock::new(buckets),
            max_entry_bytes,
            root: Some(root),
        }
    }

    /// Open the named bucket, creating it if needed.
    pub async fn open(&self, name: &str) -> Arc<CacheBucket> {
        if let Some(bucket) = self.find(name).await {
            return bucket;
        }

        let mut buckets = self.buckets.write().await;
        // Another task may have created it between the two locks.
        if let Some(bucket) = buckets.iter().find(|b| b.name == name) {
            return bucket.clone();
        }
        let dir = self.root.as_ref().map(|root| root.join(bucket_dir_name(name)));
        let bucket = Arc::new(CacheBucket::new(
            name.to_string(),
            dir,
            self.max_entry_bytes,
        ));
        buckets.push(bucket.clone());
        bucket
    }

    pub async fn find(&self, name: &str) -> Option<Arc<CacheBucket>> {
        self.buckets
            .read()
            .await
            .iter()
            .find(|b| b.name == name)
            .cloned()
    }

    /// Bucket names, oldest first.
    pub async fn keys(&self) -> Vec<String> {
        self.buckets
            .read()
            .await
            .iter()
            .map(|b| b.name.clone())
            .collect()
    }

    /// Drop a bucket and its directory. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> bool {
        let removed = {
            let mut buckets = self.buckets.write().await;
            let position = buckets.iter().position(|b| b.name == name);
            position.map(|i| buckets.remove(i))
        };
        let Some(bucket) = removed else {
            return false;
        };

        if let Some(dir) = &bucket.dir {
            let result = tokio::fs::remove_dir_all(dir).await;
            match result {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to remove cache bucket directory");
                }
            }
        }
        true
    }

    /// Look `url` up across every bucket, oldest bucket first.
    pub async fn match_url(&self, url: &str) -> Option<CachedResponse> {
        let buckets: Vec<Arc<CacheBucket>> = self.buckets.read().await.clone();
        for bucket in buckets {
            if let Some(hit) = bucket.get(url).await {
                return Some(hit);
            }
        }
        None
    }
}
