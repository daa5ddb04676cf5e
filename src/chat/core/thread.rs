//! Conversation threads and their sidebar summaries.

use serde::{Deserialize, Serialize};

use crate::chat::core::ids::{ConversationId, MessageId};
use crate::chat::core::message::Message;
use crate::chat::core::turn::Turn;

/// Characters of the first message shown as a thread title.
pub const TITLE_CHARS: usize = 20;

/// Ordered messages sharing one conversation id.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// Thread key.
    pub id: ConversationId,
    /// Alternating user/assistant messages.
    pub messages: Vec<Message>,
}

impl Thread {
    /// Create an empty thread.
    #[must_use]
    pub const fn new(id: ConversationId) -> Self {
        Self {
            id,
            messages: Vec::new(),
        }
    }

    /// Append both sides of a persisted turn.
    pub fn push_turn(&mut self, turn: &Turn) {
        self.messages.extend(Message::pair_from_turn(turn));
    }

    /// Mutable access to a message by id.
    pub fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    /// Sidebar summary.
    #[must_use]
    pub fn summary(&self, active: bool) -> ThreadSummary {
        let mut title: String = self
            .messages
            .first()
            .map(|message| message.text.chars().take(TITLE_CHARS).collect())
            .unwrap_or_default();
        title.push_str("...");

        ThreadSummary {
            id: self.id,
            title,
            message_count: self.messages.len(),
            active,
        }
    }
}

/// Compact description of a thread for navigation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    /// Thread key.
    pub id: ConversationId,
    /// Truncated first prompt.
    pub title: String,
    /// Number of messages.
    pub message_count: usize,
    /// Whether this is the active thread.
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::core::ids::{TurnId, UserIdentity};
    use crate::chat::core::message::{PersistStatus, Role};
    use chrono::Utc;

    fn turn(prompt: &str, reply: &str) -> Turn {
        Turn {
            id: TurnId::new(),
            user: UserIdentity::new("a@b.io").unwrap(),
            conversation_id: None,
            prompt: prompt.to_string(),
            reply: reply.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_push_turn_links_assistant_to_user() {
        let source = turn("Idea: eco packaging", "Use biodegradable materials");
        let mut thread = Thread::new(source.thread_key());
        thread.push_turn(&source);

        assert_eq!(thread.messages.len(), 2);
        let (user, assistant) = (&thread.messages[0], &thread.messages[1]);
        assert_eq!(user.role, Role::User);
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.in_reply_to, Some(user.id));
        assert_eq!(assistant.turn_id, Some(source.id));
        assert_eq!(assistant.status, PersistStatus::Confirmed);
    }

    #[test]
    fn test_summary_truncates_first_message() {
        let source = turn("A subscription box for houseplants", "Nice");
        let mut thread = Thread::new(source.thread_key());
        thread.push_turn(&source);

        let summary = thread.summary(true);
        assert_eq!(summary.title, "A subscription box f...");
        assert_eq!(summary.message_count, 2);
        assert!(summary.active);
    }
}
