//! Assistant response providers.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{ChatMode, Citation, Message};

/// Delay before the simulated assistant answers.
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(800);

const ACADEMIC_REPLY: &str = "Based on the Nelson Textbook of Pediatrics, here is an \
evidence-based explanation regarding your question...";

const CLINICAL_REPLY: &str = "From a clinical perspective, I would recommend the following \
approach to address your concern...";

/// Produces the assistant's reply to the latest user message.
#[async_trait]
pub trait ResponseProvider: Send + Sync {
    async fn respond(&self, prompt: &Message, mode: ChatMode) -> Message;
}

/// Stand-in assistant: waits a fixed delay, then answers with canned text.
#[derive(Debug, Clone)]
pub struct SimulatedAssistant {
    delay: Duration,
}

impl Default for SimulatedAssistant {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY_DELAY)
    }
}

impl SimulatedAssistant {
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl ResponseProvider for SimulatedAssistant {
    async fn respond(&self, _prompt: &Message, mode: ChatMode) -> Message {
        tokio::time::sleep(self.delay).await;

        let content = match mode {
            ChatMode::Academic => ACADEMIC_REPLY,
            ChatMode::Clinical => CLINICAL_REPLY,
        };
        Message::assistant(content).with_citations(vec![Citation::new(
            "23",
            1150,
            "Evidence-based pediatric guidance",
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRole;

    #[tokio::test]
    async fn answers_after_delay_per_mode() {
        let delay = Duration::from_millis(20);
        let assistant = SimulatedAssistant::new(delay);
        let prompt = Message::user("What is croup?");

        let start = tokio::time::Instant::now();
        let reply = assistant.respond(&prompt, ChatMode::Clinical).await;
        assert!(start.elapsed() >= delay);

        assert_eq!(reply.role, MessageRole::Assistant);
        assert!(reply.content.starts_with("From a clinical perspective"));
        let citations = reply.citations.unwrap();
        assert_eq!(citations, vec![Citation::new("23", 1150, "Evidence-based pediatric guidance")]);

        let reply = assistant.respond(&prompt, ChatMode::Academic).await;
        assert!(reply.content.starts_with("Based on the Nelson Textbook"));
    }
}
