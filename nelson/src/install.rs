//! Install-prompt bookkeeping.
//!
//! A dismissed prompt stays hidden for [`DISMISS_COOLDOWN_DAYS`] days.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::Storage;

/// Storage key holding the dismissal time in epoch milliseconds.
pub const DISMISSED_KEY: &str = "installPromptDismissed";

pub const DISMISS_COOLDOWN_DAYS: i64 = 7;

static IOS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"iPad|iPhone|iPod").unwrap());
static ANDROID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Android").unwrap());
static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Android|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini").unwrap()
});

/// The user's answer to the platform's install prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptOutcome {
    Accepted,
    Dismissed,
}

/// Platform family, for choosing install instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Desktop,
}

impl Platform {
    pub fn from_user_agent(user_agent: &str) -> Self {
        if IOS_RE.is_match(user_agent) {
            Self::Ios
        } else if ANDROID_RE.is_match(user_agent) {
            Self::Android
        } else {
            Self::Desktop
        }
    }
}

pub fn is_mobile(user_agent: &str) -> bool {
    MOBILE_RE.is_match(user_agent)
}

/// Remembers prompt dismissals across runs.
pub struct InstallPrompt {
    storage: Arc<dyn Storage>,
}

impl InstallPrompt {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// When the prompt was last dismissed, if ever.
    pub fn dismissed_at(&self) -> Option<DateTime<Utc>> {
        let raw = match self.storage.get(DISMISSED_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read install prompt state");
                return None;
            }
        };
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Whether the prompt may be shown at `now`.
    pub fn should_prompt(&self, now: DateTime<Utc>) -> bool {
        self.dismissed_at()
            .is_none_or(|at| now - at >= Duration::days(DISMISS_COOLDOWN_DAYS))
    }

    /// Record the user's choice. Only a dismissal is remembered.
    pub fn record_outcome(&self, outcome: PromptOutcome, now: DateTime<Utc>) {
        if outcome != PromptOutcome::Dismissed {
            return;
        }
        let millis = now.timestamp_millis().to_string();
        if let Err(e) = self.storage.set(DISMISSED_KEY, &millis) {
            warn!(error = %e, "Failed to remember install prompt dismissal");
        }
    }

    /// Forget any dismissal.
    pub fn reset(&self) {
        if let Err(e) = self.storage.remove(DISMISSED_KEY) {
            warn!(error = %e, "Failed to clear install prompt state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    #[test]
    fn dismissal_suppresses_for_seven_days() {
        let prompt = InstallPrompt::new(Arc::new(MemoryStorage::new()));
        let now = Utc::now();
        assert!(prompt.should_prompt(now));

        prompt.record_outcome(PromptOutcome::Dismissed, now);
        assert!(!prompt.should_prompt(now + Duration::days(6)));
        assert!(prompt.should_prompt(now + Duration::days(7)));
    }

    #[test]
    fn acceptance_is_not_remembered() {
        let prompt = InstallPrompt::new(Arc::new(MemoryStorage::new()));
        prompt.record_outcome(PromptOutcome::Accepted, Utc::now());
        assert_eq!(prompt.dismissed_at(), None);
    }

    #[test]
    fn reads_browser_written_value() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(DISMISSED_KEY, "1700000000000").unwrap();
        let prompt = InstallPrompt::new(storage);
        assert_eq!(
            prompt.dismissed_at().unwrap().timestamp_millis(),
            1_700_000_000_000
        );

        prompt.reset();
        assert_eq!(prompt.dismissed_at(), None);
    }

    #[test]
    fn detects_platform() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)";
        let pixel = "Mozilla/5.0 (Linux; Android 14; Pixel 8)";
        let mac = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0)";

        assert_eq!(Platform::from_user_agent(iphone), Platform::Ios);
        assert_eq!(Platform::from_user_agent(pixel), Platform::Android);
        assert_eq!(Platform::from_user_agent(mac), Platform::Desktop);
        assert!(is_mobile(iphone));
        assert!(is_mobile("opera mini/9"));
        assert!(!is_mobile(mac));
    }
}
