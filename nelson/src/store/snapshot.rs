//! The persisted subset of store state.

use serde::{Deserialize, Serialize};

use crate::models::{Chat, ChatMode, UiState};

/// Storage key the snapshot lives under.
pub const STORAGE_KEY: &str = "nelson-gpt-storage";

/// Number of most recent chats kept in the persisted record.
pub const MAX_PERSISTED_CHATS: usize = 5;

/// What survives a reload: the newest chats plus mode and theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub selected_mode: ChatMode,
    #[serde(default)]
    pub dark_mode: bool,
}

impl PersistedSnapshot {
    /// Capture the durable part of the store. `chats` is most-recent-first.
    pub fn capture(chats: &[Chat], ui: &UiState) -> Self {
        Self {
            chats: chats.iter().take(MAX_PERSISTED_CHATS).cloned().collect(),
            selected_mode: ui.selected_mode,
            dark_mode: ui.dark_mode,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_keeps_only_newest_chats() {
        let chats: Vec<Chat> = (0..7).map(|_| Chat::new(ChatMode::Academic)).collect();
        let ui = UiState {
            selected_mode: ChatMode::Clinical,
            dark_mode: true,
            ..UiState::default()
        };

        let snapshot = PersistedSnapshot::capture(&chats, &ui);
        assert_eq!(snapshot.chats.len(), MAX_PERSISTED_CHATS);
        assert_eq!(snapshot.chats[0].id, chats[0].id);
        assert_eq!(snapshot.chats[4].id, chats[4].id);
    }

    #[test]
    fn record_uses_browser_field_names() {
        let snapshot = PersistedSnapshot::capture(&[], &UiState::default());
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["selectedMode"], "academic");
        assert_eq!(json["darkMode"], false);
        assert!(json["chats"].as_array().unwrap().is_empty());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let snapshot = PersistedSnapshot::from_json(r#"{"darkMode":true}"#).unwrap();
        assert!(snapshot.chats.is_empty());
        assert_eq!(snapshot.selected_mode, ChatMode::Academic);
        assert!(snapshot.dark_mode);
    }
}
