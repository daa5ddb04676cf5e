//! Conversation reconciler orchestration.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{ConversationId, MessageId, UserIdentity};
use crate::chat::core::message::{Message, PersistStatus};
use crate::chat::core::thread::ThreadSummary;
use crate::chat::core::turn::{NewTurn, Turn};
use crate::chat::reconciler::loader::load_threads;
use crate::chat::reconciler::state::{SessionSnapshot, SessionState};
use crate::chat::store::TurnStore;
use crate::llm::InferenceClient;

/// Result of a send.
#[derive(Clone, Debug, Serialize)]
pub struct SendOutcome {
    /// The user message as it stands after persistence.
    pub user: Message,
    /// The assistant message (a warning notice when inference failed).
    pub assistant: Message,
    /// Conversation the turn was recorded under.
    pub conversation_id: ConversationId,
    /// Whether the inference call produced a reply.
    pub generated: bool,
    /// Whether the turn reached the store.
    pub persisted: bool,
}

/// Result of a regeneration.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegenerateOutcome {
    /// The reply text was replaced in place.
    Replaced {
        /// The updated assistant message.
        message: Message,
        /// Whether the store accepted the new reply.
        persisted: bool,
    },
    /// Inference failed; the previous reply is untouched.
    Failed {
        /// Visible failure notice.
        notice: String,
    },
}

/// Maps persisted turns into threads and applies optimistic mutations.
///
/// One reconciler serves one authenticated session. Mutating operations are
/// queued behind a FIFO writer lock so each completes its state changes and
/// remote calls before the next begins; reads never wait on that queue.
pub struct Reconciler {
    user: Option<UserIdentity>,
    store: Arc<dyn TurnStore>,
    inference: Arc<dyn InferenceClient>,
    state: RwLock<SessionState>,
    writer: Mutex<()>,
}

impl Reconciler {
    /// Create a reconciler with an empty session.
    #[must_use]
    pub fn new(
        user: Option<UserIdentity>,
        store: Arc<dyn TurnStore>,
        inference: Arc<dyn InferenceClient>,
    ) -> Self {
        Self {
            user,
            store,
            inference,
            state: RwLock::new(SessionState::default()),
            writer: Mutex::new(()),
        }
    }

    /// Identity whose turns this session shows.
    #[must_use]
    pub const fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Load every turn for the session's user and activate the most recent thread.
    ///
    /// Returns the number of threads loaded.
    ///
    /// # Errors
    /// Returns the store error on read failure; the collection is left empty.
    pub async fn load(&self) -> ChatResult<usize> {
        let _writer = self.writer.lock().await;
        match load_threads(self.store.as_ref(), self.user.as_ref()).await {
            Ok(threads) => {
                let count = threads.len();
                self.state.write().await.replace_threads(threads);
                Ok(count)
            }
            Err(err) => {
                self.state.write().await.replace_threads(Vec::new());
                Err(err)
            }
        }
    }

    /// Send a prompt in the active thread.
    ///
    /// Prompts that are blank after trimming are ignored and return `None`.
    /// Otherwise exactly one user and one assistant message are appended,
    /// whatever the inference and store outcomes.
    pub async fn send(&self, prompt: &str) -> Option<SendOutcome> {
        if prompt.trim().is_empty() {
            return None;
        }
        let _writer = self.writer.lock().await;

        let user_message = Message::user(prompt);
        let user_id = user_message.id;
        self.state.write().await.push_message(user_message);

        let (reply, generated) = match self.inference.generate(prompt).await {
            Ok(text) => (text, true),
            Err(err) => {
                warn!(provider = self.inference.provider(), error = %err, "inference failed; showing notice");
                (err.notice(), false)
            }
        };

        let assistant_message = Message::assistant(user_id, reply.clone());
        let assistant_id = assistant_message.id;
        let conversation_id = {
            let mut state = self.state.write().await;
            state.push_message(assistant_message);
            state.active_or_mint()
        };

        let ids = [user_id, assistant_id];
        let persisted = self.persist(conversation_id, prompt, reply).await;
        let (messages, conversation_id, persisted) = match persisted {
            Ok(turn) => {
                let mut state = self.state.write().await;
                let key = turn.thread_key();
                if state.active() == Some(conversation_id) {
                    state.set_active(key);
                }
                debug!(turn = %turn.id, conversation = %key, "turn persisted");
                (state.confirm(ids, &turn), key, true)
            }
            Err(err) => {
                error!(conversation = %conversation_id, error = %err, "turn insert failed; keeping optimistic messages");
                let messages = self.state.write().await.set_status(&ids, PersistStatus::Failed);
                (messages, conversation_id, false)
            }
        };

        let mut messages = messages.into_iter();
        let (Some(user), Some(assistant)) = (messages.next(), messages.next()) else {
            error!("sent messages vanished from the active thread");
            return None;
        };
        Some(SendOutcome {
            user,
            assistant,
            conversation_id,
            generated,
            persisted,
        })
    }

    async fn persist(
        &self,
        conversation_id: ConversationId,
        prompt: &str,
        reply: String,
    ) -> ChatResult<Turn> {
        let user = self.user.clone().ok_or_else(|| {
            ChatError::InvalidConfig("no authenticated user for this session".to_string())
        })?;
        self.store
            .insert_turn(NewTurn {
                conversation_id,
                user,
                prompt: prompt.to_string(),
                reply,
            })
            .await
    }

    /// Generate a fresh reply for an assistant message and replace its text in place.
    ///
    /// The prompt is the text of the user message the reply is linked to.
    /// The remote turn is updated by its id; unpersisted replies change locally only.
    ///
    /// # Errors
    /// Returns an error if the message is not displayed or is not a linked assistant reply.
    pub async fn regenerate(&self, message_id: MessageId) -> ChatResult<RegenerateOutcome> {
        let _writer = self.writer.lock().await;

        let (prompt, turn_id) = {
            let state = self.state.read().await;
            let message = state
                .message(message_id)
                .ok_or(ChatError::UnknownMessage(message_id))?;
            let prompt_id = message
                .in_reply_to
                .filter(|_| message.is_assistant())
                .ok_or(ChatError::NotRegenerable(message_id))?;
            let prompt = state
                .message(prompt_id)
                .ok_or(ChatError::NotRegenerable(message_id))?
                .text
                .clone();
            (prompt, message.turn_id)
        };

        let reply = match self.inference.generate(&prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(message = %message_id, error = %err, "regeneration failed; keeping previous reply");
                return Ok(RegenerateOutcome::Failed {
                    notice: err.notice(),
                });
            }
        };

        let message = self
            .state
            .write()
            .await
            .set_text(message_id, &reply)
            .ok_or(ChatError::UnknownMessage(message_id))?;

        let (Some(turn_id), Some(user)) = (turn_id, self.user.as_ref()) else {
            debug!(message = %message_id, "reply was never persisted; regenerated locally");
            return Ok(RegenerateOutcome::Replaced {
                message,
                persisted: false,
            });
        };

        let (status, persisted) = match self.store.update_reply(user, turn_id, reply).await {
            Ok(0) => {
                warn!(turn = %turn_id, "no stored turn matched the regenerated reply");
                (PersistStatus::Failed, false)
            }
            Ok(_) => (PersistStatus::Confirmed, true),
            Err(err) => {
                error!(turn = %turn_id, error = %err, "reply update failed");
                (PersistStatus::Failed, false)
            }
        };
        let message = self
            .state
            .write()
            .await
            .set_status(&[message_id], status)
            .pop()
            .unwrap_or(message);

        Ok(RegenerateOutcome::Replaced { message, persisted })
    }

    /// Start a fresh thread; the next send mints its conversation id.
    pub async fn new_thread(&self) {
        let _writer = self.writer.lock().await;
        self.state.write().await.clear_active();
        info!("new thread started");
    }

    /// Activate a cached thread. Unknown ids change nothing and return `false`.
    pub async fn switch_thread(&self, id: ConversationId) -> bool {
        let _writer = self.writer.lock().await;
        self.state.write().await.switch_to(id)
    }

    /// Copy of the session for presentation.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.read().await.snapshot()
    }

    /// Sidebar summaries in collection order.
    pub async fn thread_summaries(&self) -> Vec<ThreadSummary> {
        self.state.read().await.summaries()
    }

    /// Displayed message by id.
    pub async fn message(&self, id: MessageId) -> Option<Message> {
        self.state.read().await.message(id).cloned()
    }
}
