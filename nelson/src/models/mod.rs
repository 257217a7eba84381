//! Data models for chats, messages and UI state.

mod chat;
mod message;
mod ui;

pub use chat::{derive_title, Chat, ChatMode};
pub use message::{Citation, Message, MessageRole};
pub use ui::{Screen, UiState};

use uuid::Uuid;

/// Generate a prefixed UUIDv7 (time-ordered, globally unique).
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::now_v7())
}
