//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::assistant::DEFAULT_REPLY_DELAY;
use crate::cache::{CACHE_VERSION, DEFAULT_MAX_ENTRY_BYTES};

/// Directory name under the platform data dir.
const DATA_DIR_NAME: &str = "nelson-gpt";

/// Subdirectory of the data dir holding cache buckets.
const CACHE_DIR_NAME: &str = "cache";

pub const DEFAULT_PORT: u16 = 58240;
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:5173";

#[derive(Debug, Clone)]
pub struct Config {
    /// Where the persisted records live.
    pub data_dir: PathBuf,
    /// Keep everything in memory; nothing survives the process.
    pub ephemeral: bool,
    /// Upstream origin serving the app shell.
    pub origin: String,
    pub port: u16,
    pub cache_version: String,
    pub skip_waiting: bool,
    pub max_cache_entry_bytes: usize,
    pub assistant_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ephemeral: false,
            origin: DEFAULT_ORIGIN.to_string(),
            port: DEFAULT_PORT,
            cache_version: CACHE_VERSION.to_string(),
            skip_waiting: true,
            max_cache_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            assistant_delay: DEFAULT_REPLY_DELAY,
        }
    }
}

impl Config {
    /// Defaults with in-memory storage.
    pub fn ephemeral() -> Self {
        Self {
            ephemeral: true,
            ..Self::default()
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(CACHE_DIR_NAME)
    }
}

/// `<data dir>/nelson-gpt`, falling back to the working directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.data_dir.ends_with(DATA_DIR_NAME));
        assert_eq!(config.cache_version, "nelson-gpt-v1");
        assert_eq!(config.assistant_delay, Duration::from_millis(800));
        assert!(config.skip_waiting);
        assert!(Config::ephemeral().ephemeral);
        assert_eq!(config.cache_dir(), config.data_dir.join("cache"));
    }
}
