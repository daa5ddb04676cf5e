//! Session state owned by one reconciler.

use serde::Serialize;

use crate::chat::core::ids::{ConversationId, MessageId};
use crate::chat::core::message::{Message, PersistStatus};
use crate::chat::core::thread::{Thread, ThreadSummary};
use crate::chat::core::turn::Turn;

/// Active thread, its displayed messages, and the cached thread collection.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    active: Option<ConversationId>,
    messages: Vec<Message>,
    threads: Vec<Thread>,
}

/// Read-only copy of the session for presentation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Active conversation, if one has been started or selected.
    pub active: Option<ConversationId>,
    /// Messages of the active thread.
    pub messages: Vec<Message>,
    /// Sidebar summaries in collection order.
    pub threads: Vec<ThreadSummary>,
}

impl SessionState {
    /// Replace the cached collection and activate its most recent thread.
    pub fn replace_threads(&mut self, threads: Vec<Thread>) {
        self.threads = threads;
        match self.threads.last() {
            Some(last) => {
                self.active = Some(last.id);
                self.messages.clone_from(&last.messages);
            }
            None => {
                self.active = None;
                self.messages.clear();
            }
        }
    }

    /// Active conversation id.
    #[must_use]
    pub const fn active(&self) -> Option<ConversationId> {
        self.active
    }

    /// Active conversation id, minting a fresh one when none is active.
    pub fn active_or_mint(&mut self) -> ConversationId {
        *self.active.get_or_insert_with(ConversationId::new)
    }

    /// Point the session at `id` without touching the message list.
    pub const fn set_active(&mut self, id: ConversationId) {
        self.active = Some(id);
    }

    /// Clear the active thread and its messages.
    pub fn clear_active(&mut self) {
        self.active = None;
        self.messages.clear();
    }

    /// Activate a cached thread, replacing the message list wholesale.
    ///
    /// Returns `false` and changes nothing when the thread is unknown.
    pub fn switch_to(&mut self, id: ConversationId) -> bool {
        let Some(thread) = self.threads.iter().find(|thread| thread.id == id) else {
            return false;
        };
        self.messages.clone_from(&thread.messages);
        self.active = Some(id);
        true
    }

    /// Append a message to the active list.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Displayed message by id.
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Mark displayed messages as persisted by `turn` and add them to the cached thread.
    ///
    /// Returns the updated copies.
    pub fn confirm(&mut self, ids: [MessageId; 2], turn: &Turn) -> Vec<Message> {
        let mut confirmed = Vec::with_capacity(ids.len());
        for message in &mut self.messages {
            if ids.contains(&message.id) {
                message.turn_id = Some(turn.id);
                message.status = PersistStatus::Confirmed;
                confirmed.push(message.clone());
            }
        }

        let key = turn.thread_key();
        match self.threads.iter_mut().find(|thread| thread.id == key) {
            Some(thread) => thread.messages.extend(confirmed.iter().cloned()),
            None => {
                let mut thread = Thread::new(key);
                thread.messages.extend(confirmed.iter().cloned());
                self.threads.push(thread);
            }
        }
        confirmed
    }

    /// Set the status of displayed (and cached) messages.
    pub fn set_status(&mut self, ids: &[MessageId], status: PersistStatus) -> Vec<Message> {
        let mut changed = Vec::with_capacity(ids.len());
        for message in &mut self.messages {
            if ids.contains(&message.id) {
                message.status = status;
                changed.push(message.clone());
            }
        }
        for thread in &mut self.threads {
            for message in &mut thread.messages {
                if ids.contains(&message.id) {
                    message.status = status;
                }
            }
        }
        changed
    }

    /// Replace a message's text in the active list and the cached threads.
    pub fn set_text(&mut self, id: MessageId, text: &str) -> Option<Message> {
        for thread in &mut self.threads {
            if let Some(message) = thread.message_mut(id) {
                text.clone_into(&mut message.text);
            }
        }
        let message = self.messages.iter_mut().find(|message| message.id == id)?;
        text.clone_into(&mut message.text);
        Some(message.clone())
    }

    /// Copy of the session for presentation.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            active: self.active,
            messages: self.messages.clone(),
            threads: self.summaries(),
        }
    }

    /// Sidebar summaries in collection order.
    #[must_use]
    pub fn summaries(&self) -> Vec<ThreadSummary> {
        self.threads
            .iter()
            .map(|thread| thread.summary(Some(thread.id) == self.active))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::core::ids::UserIdentity;
    use crate::chat::reconciler::loader::group_turns;
    use crate::chat::testing::turn_at;

    fn loaded() -> SessionState {
        let user = UserIdentity::new("a@b.io").unwrap();
        let turns = vec![
            turn_at(&user, Some(ConversationId::new()), "older", 20),
            turn_at(&user, Some(ConversationId::new()), "newer", 10),
        ];
        let mut state = SessionState::default();
        state.replace_threads(group_turns(turns));
        state
    }

    #[test]
    fn test_replace_threads_activates_most_recent() {
        let state = loaded();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.messages[0].text, "newer");
        assert_eq!(snapshot.threads.len(), 2);
        assert!(!snapshot.threads[0].active);
        assert!(snapshot.threads[1].active);
    }

    #[test]
    fn test_switch_to_unknown_changes_nothing() {
        let mut state = loaded();
        let before = state.snapshot();
        assert!(!state.switch_to(ConversationId::new()));
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn test_switch_replaces_messages_wholesale() {
        let mut state = loaded();
        let first = state.summaries()[0].id;
        state.push_message(Message::user("unsent draft"));

        assert!(state.switch_to(first));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.active, Some(first));
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].text, "older");
    }

    #[test]
    fn test_active_or_mint_is_stable() {
        let mut state = SessionState::default();
        let minted = state.active_or_mint();
        assert_eq!(state.active_or_mint(), minted);
        state.clear_active();
        assert_ne!(state.active_or_mint(), minted);
    }
}
