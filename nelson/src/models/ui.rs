//! Navigation and preference state shared by every screen.

use serde::{Deserialize, Serialize};

use super::ChatMode;

/// Bottom-tab destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    #[default]
    Chat,
    History,
    Settings,
    Profile,
}

impl Screen {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::History => "history",
            Self::Settings => "settings",
            Self::Profile => "profile",
        }
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Application UI state.
///
/// `current_chat_id` is a lookup key into the chat list, not an owning
/// reference; it may name a chat that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub current_chat_id: Option<String>,
    pub show_welcome: bool,
    pub selected_mode: ChatMode,
    pub current_screen: Screen,
    pub dark_mode: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            current_chat_id: None,
            show_welcome: true,
            selected_mode: ChatMode::Academic,
            current_screen: Screen::Chat,
            dark_mode: false,
        }
    }
}
