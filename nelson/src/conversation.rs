//! The "user sends a message" flow.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::context::AppContext;
use crate::models::{ChatMode, Message};

/// Where a submitted message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitTarget {
    /// From the welcome view: start a chat in this mode.
    NewChat(ChatMode),
    /// An existing chat.
    Existing(String),
}

/// A submitted message and the reply that is still on its way.
#[derive(Debug)]
pub struct Submission {
    pub chat_id: String,
    pub message_id: String,
    /// Resolves to the reply's message id once it has been appended.
    pub reply: JoinHandle<String>,
}

/// Append a user message and schedule the assistant's reply.
///
/// Blank input, and input for a chat that does not exist, is ignored and
/// yields `None`. If the chat disappears before the reply lands, appending
/// the reply is a no-op.
pub async fn submit(
    ctx: &Arc<AppContext>,
    target: SubmitTarget,
    content: &str,
) -> Option<Submission> {
    if content.trim().is_empty() {
        return None;
    }

    let prompt = Message::user(content);
    let message_id = prompt.id.clone();

    let (chat_id, mode) = {
        let mut store = ctx.store.write().await;
        let (chat_id, mode) = match target {
            SubmitTarget::NewChat(mode) => {
                store.set_selected_mode(mode);
                (store.create_chat(mode), mode)
            }
            SubmitTarget::Existing(chat_id) => {
                let mode = store.chat(&chat_id)?.mode;
                (chat_id, mode)
            }
        };
        store.add_message(&chat_id, prompt.clone());
        (chat_id, mode)
    };
    debug!(%chat_id, %mode, "Message submitted");

    let reply = {
        let ctx = ctx.clone();
        let chat_id = chat_id.clone();
        tokio::spawn(async move {
            let reply = ctx.assistant.respond(&prompt, mode).await;
            let reply_id = reply.id.clone();
            ctx.store.write().await.add_message(&chat_id, reply);
            reply_id
        })
    };

    Some(Submission {
        chat_id,
        message_id,
        reply,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::SimulatedAssistant;
    use crate::cache::HttpNetwork;
    use crate::config::Config;
    use crate::models::MessageRole;
    use crate::store::MemoryStorage;
    use std::time::Duration;

    fn test_context() -> Arc<AppContext> {
        Arc::new(AppContext::new(
            &Config::ephemeral(),
            Arc::new(MemoryStorage::new()),
            Arc::new(HttpNetwork::new()),
            Arc::new(SimulatedAssistant::new(Duration::from_millis(5))),
        ))
    }

    #[tokio::test]
    async fn welcome_submission_creates_chat_and_gets_reply() {
        let ctx = test_context();

        let submission = submit(&ctx, SubmitTarget::NewChat(ChatMode::Clinical), "What is croup?")
            .await
            .unwrap();
        {
            let store = ctx.store.read().await;
            let chat = store.current_chat().unwrap();
            assert_eq!(chat.id, submission.chat_id);
            assert_eq!(chat.title, "What is croup?");
            assert_eq!(chat.mode, ChatMode::Clinical);
            assert_eq!(store.ui().selected_mode, ChatMode::Clinical);
            assert!(!store.ui().show_welcome);
        }

        let reply_id = submission.reply.await.unwrap();
        let store = ctx.store.read().await;
        let chat = store.chat(&submission.chat_id).unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[1].id, reply_id);
        assert_eq!(chat.messages[1].role, MessageRole::Assistant);
        assert!(chat.messages[1].content.starts_with("From a clinical perspective"));
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let ctx = test_context();
        assert!(submit(&ctx, SubmitTarget::NewChat(ChatMode::Academic), "   \n")
            .await
            .is_none());
        assert!(ctx.store.read().await.chats().is_empty());
    }

    #[tokio::test]
    async fn unknown_chat_is_ignored() {
        let ctx = test_context();
        let submission = submit(
            &ctx,
            SubmitTarget::Existing("chat-missing".to_string()),
            "Anyone there?",
        )
        .await;

        assert!(submission.is_none());
        let store = ctx.store.read().await;
        assert!(store.chats().is_empty());
        assert!(store.ui().show_welcome);
    }

    #[tokio::test]
    async fn reply_to_deleted_chat_is_dropped() {
        let ctx = test_context();
        let chat_id = ctx.store.write().await.create_chat(ChatMode::Academic);

        let submission = submit(&ctx, SubmitTarget::Existing(chat_id.clone()), "Hello")
            .await
            .unwrap();
        ctx.store.write().await.delete_chat(&chat_id);
        submission.reply.await.unwrap();

        assert!(ctx.store.read().await.chats().is_empty());
    }
}
