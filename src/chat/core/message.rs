//! View-level chat messages derived from turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chat::core::ids::{MessageId, TurnId};
use crate::chat::core::turn::Turn;

/// Author of a displayed message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Prompt typed by the user.
    User,
    /// Reply from the inference API.
    Assistant,
}

impl Role {
    /// Stable string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether the remote store holds what the message displays.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStatus {
    /// Shown optimistically; the write has not completed yet.
    Pending,
    /// Matches the persisted turn.
    Confirmed,
    /// The write failed; the display diverges from the store until reload.
    Failed,
}

/// A single displayed chat line: one side of a turn.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Synthetic local identifier.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Displayed text.
    pub text: String,
    /// Display timestamp.
    pub timestamp: DateTime<Utc>,
    /// Originating turn, once persisted.
    pub turn_id: Option<TurnId>,
    /// For assistant messages, the user message this replies to.
    pub in_reply_to: Option<MessageId>,
    /// Persistence state.
    pub status: PersistStatus,
}

impl Message {
    /// Build an optimistic user message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            turn_id: None,
            in_reply_to: None,
            status: PersistStatus::Pending,
        }
    }

    /// Build an optimistic assistant message answering `in_reply_to`.
    #[must_use]
    pub fn assistant(in_reply_to: MessageId, text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
            turn_id: None,
            in_reply_to: Some(in_reply_to),
            status: PersistStatus::Pending,
        }
    }

    /// Split a persisted turn into its user and assistant messages.
    #[must_use]
    pub fn pair_from_turn(turn: &Turn) -> [Self; 2] {
        let user = Self {
            id: MessageId::new(),
            role: Role::User,
            text: turn.prompt.clone(),
            timestamp: turn.created_at,
            turn_id: Some(turn.id),
            in_reply_to: None,
            status: PersistStatus::Confirmed,
        };
        let assistant = Self {
            id: MessageId::new(),
            role: Role::Assistant,
            text: turn.reply.clone(),
            timestamp: turn.created_at,
            turn_id: Some(turn.id),
            in_reply_to: Some(user.id),
            status: PersistStatus::Confirmed,
        };
        [user, assistant]
    }

    /// Whether this is an assistant reply.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
