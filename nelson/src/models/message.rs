//! Message model representing a single turn in a chat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the user.
    User,
    /// Reply produced by the assistant.
    Assistant,
}

impl MessageRole {
    /// Convert role to its wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reference into the textbook backing an assistant answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Chapter label (e.g. "23").
    pub chapter: String,
    /// Page number within the textbook.
    pub page: u32,
    /// Excerpt explaining what the citation supports.
    pub text: String,
}

impl Citation {
    pub fn new(chapter: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            chapter: chapter.into(),
            page,
            text: text.into(),
        }
    }
}

/// A message in a chat.
///
/// Only `content` and `timestamp` ever change after creation (in-place edit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message.
    pub id: String,
    /// Role of the message sender.
    pub role: MessageRole,
    /// Text of the message.
    pub content: String,
    /// When the message was created or last edited.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Textbook citations attached to the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
}

impl Message {
    /// Create a new message with a fresh id, timestamped now.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: new_id("msg"),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            citations: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Attach citations to the message.
    #[must_use]
    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = Some(citations);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_wire_name_matches_serde() {
        for role in [MessageRole::User, MessageRole::Assistant] {
            assert_eq!(serde_json::to_value(role).unwrap(), role.as_str());
        }
        assert!(serde_json::from_value::<MessageRole>(serde_json::json!("system")).is_err());
    }

    #[test]
    fn serializes_timestamp_as_epoch_millis() {
        let msg = Message::user("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["timestamp"], msg.timestamp.timestamp_millis());
        assert_eq!(json["role"], "user");
        assert!(json.get("citations").is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = Message::user("a");
        let b = Message::user("b");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("msg-"));
    }
}
