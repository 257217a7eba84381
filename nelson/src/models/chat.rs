//! Chat model representing one conversation session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{new_id, Message};

/// Maximum length, in characters, of a title derived from a message.
pub const MAX_TITLE_CHARS: usize = 50;

/// Title given to a chat before its first message arrives.
pub const UNTITLED: &str = "Untitled";

/// Answering style of a chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Textbook-style explanations.
    #[default]
    Academic,
    /// Bedside, practice-oriented answers.
    Clinical,
}

impl ChatMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Academic => "academic",
            Self::Clinical => "clinical",
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chat session and its message history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Unique, time-ordered identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Messages in chronological order.
    pub messages: Vec<Message>,
    /// Answering style.
    pub mode: ChatMode,
    /// When the chat was created.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// When the chat was last changed.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Create an empty chat in the given mode.
    pub fn new(mode: ChatMode) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("chat"),
            title: UNTITLED.to_string(),
            messages: Vec::new(),
            mode,
            created_at: now,
            updated_at: now,
        }
    }

    /// Find a message by id.
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }
}

/// Derive a chat title from message content: the first line, cut to
/// [`MAX_TITLE_CHARS`] characters.
pub fn derive_title(content: &str) -> String {
    content
        .split('\n')
        .next()
        .unwrap_or_default()
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect()
}
