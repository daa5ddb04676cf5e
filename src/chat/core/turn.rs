//! Persisted prompt/reply pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::core::ids::{ConversationId, TurnId, UserIdentity};

/// One persisted exchange: a prompt and the reply it received.
///
/// Immutable once stored except for `reply`, which regeneration overwrites.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn identifier.
    pub id: TurnId,
    /// Owning user.
    pub user: UserIdentity,
    /// Conversation the turn belongs to, if one was recorded.
    pub conversation_id: Option<ConversationId>,
    /// Prompt text as typed by the user.
    pub prompt: String,
    /// Reply text (or the visible warning recorded when inference failed).
    pub reply: String,
    /// Creation timestamp used for ordering.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Key of the thread this turn belongs to.
    ///
    /// Falls back to the turn's own id when no conversation id was recorded.
    #[must_use]
    pub fn thread_key(&self) -> ConversationId {
        self.conversation_id
            .unwrap_or_else(|| ConversationId::from(self.id))
    }
}

/// A turn about to be persisted; the store assigns id and timestamp.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NewTurn {
    /// Conversation the turn belongs to.
    pub conversation_id: ConversationId,
    /// Owning user.
    pub user: UserIdentity,
    /// Prompt text.
    pub prompt: String,
    /// Reply text.
    pub reply: String,
}
