//! Usage summary over the chat history.

use serde::Serialize;

use crate::models::{Chat, ChatMode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_chats: usize,
    pub total_messages: usize,
    pub academic_chats: usize,
    pub clinical_chats: usize,
    /// Rounded share of academic chats, 0 when there are none.
    pub academic_percent: u8,
}

impl UsageStats {
    pub fn from_chats(chats: &[Chat]) -> Self {
        let total_chats = chats.len();
        let total_messages = chats.iter().map(|c| c.messages.len()).sum();
        let academic_chats = chats
            .iter()
            .filter(|c| c.mode == ChatMode::Academic)
            .count();
        let clinical_chats = total_chats - academic_chats;

        let academic_percent = if total_chats == 0 {
            0
        } else {
            // Round half up; the result is at most 100.
            u8::try_from((academic_chats * 200 + total_chats) / (total_chats * 2)).unwrap_or(100)
        };

        Self {
            total_chats,
            total_messages,
            academic_chats,
            clinical_chats,
            academic_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;

    #[test]
    fn empty_history() {
        assert_eq!(UsageStats::from_chats(&[]), UsageStats::default());
    }

    #[test]
    fn counts_modes_and_messages() {
        let mut academic = Chat::new(ChatMode::Academic);
        academic.messages.push(Message::user("a"));
        academic.messages.push(Message::assistant("b"));
        let clinical = Chat::new(ChatMode::Clinical);
        let another = Chat::new(ChatMode::Clinical);

        let stats = UsageStats::from_chats(&[academic, clinical, another]);
        assert_eq!(stats.total_chats, 3);
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.academic_chats, 1);
        assert_eq!(stats.clinical_chats, 2);
        assert_eq!(stats.academic_percent, 33);
    }

    #[test]
    fn rounds_half_up() {
        let chats = vec![
            Chat::new(ChatMode::Academic),
            Chat::new(ChatMode::Clinical),
            Chat::new(ChatMode::Clinical),
            Chat::new(ChatMode::Clinical),
            Chat::new(ChatMode::Clinical),
            Chat::new(ChatMode::Clinical),
            Chat::new(ChatMode::Clinical),
            Chat::new(ChatMode::Clinical),
        ];
        // 1/8 = 12.5%
        assert_eq!(UsageStats::from_chats(&chats).academic_percent, 13);
    }
}
