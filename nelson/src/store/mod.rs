//! Chat session store.
//!
//! Single source of truth for chats, the active chat pointer and UI
//! navigation state. Mutations apply in memory, notify subscribers, and
//! then write a [`PersistedSnapshot`] through to [`Storage`] best-effort.
//!
//! Unknown chat or message ids are silent no-ops everywhere.

mod snapshot;
mod stats;
mod storage;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::models::{derive_title, Chat, ChatMode, Message, Screen, UiState};

pub use snapshot::{PersistedSnapshot, STORAGE_KEY};
pub use stats::UsageStats;
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};

/// Capacity of the change-notification channel.
const EVENT_CAPACITY: usize = 256;

/// Change notification published after every effective mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    ChatCreated { chat_id: String },
    ChatDeleted { chat_id: String },
    ChatRenamed { chat_id: String, title: String },
    CurrentChatChanged { chat_id: Option<String> },
    MessageAdded { chat_id: String, message_id: String },
    MessageUpdated { chat_id: String, message_id: String },
    UiChanged { ui: UiState },
    Cleared,
}

/// In-memory chat state with write-through persistence.
pub struct ChatStore {
    /// Most recent first.
    chats: Vec<Chat>,
    ui: UiState,
    storage: Arc<dyn Storage>,
    tx: broadcast::Sender<StoreEvent>,
}

impl ChatStore {
    /// Create an empty store backed by `storage`, ignoring anything stored.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self {
            chats: Vec::new(),
            ui: UiState::default(),
            storage,
            tx,
        }
    }

    /// Restore the store from its persisted snapshot, or start empty.
    ///
    /// A missing record means first run; an unreadable one is logged and
    /// replaced by defaults on the next write.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let mut store = Self::new(storage);

        let snapshot = match store.storage.get(STORAGE_KEY) {
            Ok(Some(json)) => match PersistedSnapshot::from_json(&json) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable chat snapshot");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read chat snapshot");
                None
            }
        };

        if let Some(snapshot) = snapshot {
            let mut seen = HashSet::new();
            store.chats = snapshot
                .chats
                .into_iter()
                .filter(|chat| seen.insert(chat.id.clone()))
                .collect();
            store.ui.selected_mode = snapshot.selected_mode;
            store.ui.dark_mode = snapshot.dark_mode;
            debug!(chats = store.chats.len(), "Restored chat snapshot");
        }

        store
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    // === Reads ===

    /// All chats, most recent first.
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn chat(&self, chat_id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == chat_id)
    }

    pub const fn ui(&self) -> &UiState {
        &self.ui
    }

    /// The chat named by the active pointer, or `None` if the pointer is
    /// unset or dangling.
    pub fn current_chat(&self) -> Option<&Chat> {
        self.ui
            .current_chat_id
            .as_deref()
            .and_then(|id| self.chat(id))
    }

    /// Usage summary shown on the profile screen.
    pub fn stats(&self) -> UsageStats {
        UsageStats::from_chats(&self.chats)
    }

    // === Chat management ===

    /// Create a chat, make it active, leave the welcome view. Returns its id.
    pub fn create_chat(&mut self, mode: ChatMode) -> String {
        let chat = Chat::new(mode);
        let chat_id = chat.id.clone();

        self.chats.insert(0, chat);
        self.ui.current_chat_id = Some(chat_id.clone());
        self.ui.show_welcome = false;

        self.commit(StoreEvent::ChatCreated {
            chat_id: chat_id.clone(),
        });
        chat_id
    }

    /// Remove a chat. Deleting the active chat returns to the welcome view.
    pub fn delete_chat(&mut self, chat_id: &str) {
        let before = self.chats.len();
        self.chats.retain(|c| c.id != chat_id);
        if self.chats.len() == before {
            return;
        }

        if self.ui.current_chat_id.as_deref() == Some(chat_id) {
            self.ui.current_chat_id = None;
            self.ui.show_welcome = true;
        }

        self.commit(StoreEvent::ChatDeleted {
            chat_id: chat_id.to_string(),
        });
    }

    pub fn rename_chat(&mut self, chat_id: &str, title: &str) {
        let Some(chat) = self.chat_mut(chat_id) else {
            return;
        };
        chat.title = title.to_string();
        chat.updated_at = Utc::now();

        self.commit(StoreEvent::ChatRenamed {
            chat_id: chat_id.to_string(),
            title: title.to_string(),
        });
    }

    /// Point the active chat at `chat_id` without checking that it exists.
    pub fn set_current_chat(&mut self, chat_id: &str) {
        self.ui.current_chat_id = Some(chat_id.to_string());
        self.ui.show_welcome = false;

        self.commit(StoreEvent::CurrentChatChanged {
            chat_id: Some(chat_id.to_string()),
        });
    }

    // === Message management ===

    /// Append a message. The first message of a chat also sets its title.
    pub fn add_message(&mut self, chat_id: &str, message: Message) {
        let Some(chat) = self.chat_mut(chat_id) else {
            return;
        };

        if chat.messages.is_empty() {
            chat.title = derive_title(&message.content);
        }
        let message_id = message.id.clone();
        chat.messages.push(message);
        chat.updated_at = Utc::now();

        self.commit(StoreEvent::MessageAdded {
            chat_id: chat_id.to_string(),
            message_id,
        });
    }

    /// Replace a message's content in place and refresh its timestamp.
    pub fn update_message(&mut self, chat_id: &str, message_id: &str, content: &str) {
        let Some(chat) = self.chat_mut(chat_id) else {
            return;
        };
        let Some(message) = chat.messages.iter_mut().find(|m| m.id == message_id) else {
            return;
        };

        let now = Utc::now();
        message.content = content.to_string();
        message.timestamp = now;
        chat.updated_at = now;

        self.commit(StoreEvent::MessageUpdated {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        });
    }

    // === UI state ===

    pub fn set_show_welcome(&mut self, show: bool) {
        self.ui.show_welcome = show;
        self.commit_ui();
    }

    pub fn set_selected_mode(&mut self, mode: ChatMode) {
        self.ui.selected_mode = mode;
        self.commit_ui();
    }

    pub fn set_current_screen(&mut self, screen: Screen) {
        self.ui.current_screen = screen;
        self.commit_ui();
    }

    pub fn set_dark_mode(&mut self, dark_mode: bool) {
        self.ui.dark_mode = dark_mode;
        self.commit_ui();
    }

    /// Forget every chat and preference, including the persisted record.
    pub fn clear_all(&mut self) {
        self.chats.clear();
        self.ui = UiState::default();

        let _ = self.tx.send(StoreEvent::Cleared);
        if let Err(e) = self.storage.remove(STORAGE_KEY) {
            warn!(error = %e, "Failed to remove chat snapshot");
        }
    }

    // === Internals ===

    fn chat_mut(&mut self, chat_id: &str) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == chat_id)
    }

    fn commit_ui(&mut self) {
        let ui = self.ui.clone();
        self.commit(StoreEvent::UiChanged { ui });
    }

    /// Publish a change, then write the snapshot through. The in-memory
    /// state is already updated when this runs; a failed write only loses
    /// durability.
    fn commit(&self, event: StoreEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
        self.persist();
    }

    fn persist(&self) {
        let snapshot = PersistedSnapshot::capture(&self.chats, &self.ui);
        let json = match snapshot.to_json() {
            Ok(json) => json,
            Err(source) => {
                let e = StorageError::Serialize {
                    key: STORAGE_KEY.to_string(),
                    source,
                };
                warn!(error = %e, "Failed to encode chat snapshot");
                return;
            }
        };
        if let Err(e) = self.storage.set(STORAGE_KEY, &json) {
            warn!(error = %e, "Failed to persist chat snapshot");
        }
    }
}
