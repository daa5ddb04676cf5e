//! In-memory fakes for the store and inference seams.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{TurnId, UserIdentity};
use crate::chat::core::turn::{NewTurn, Turn};
use crate::chat::store::{StoreFuture, TurnStore};
use crate::llm::{GenerateFuture, InferenceClient, InferenceError};

/// Turn store holding rows in a vector.
#[derive(Default)]
pub struct MemoryTurnStore {
    pub turns: Mutex<Vec<Turn>>,
    pub fail_fetch: AtomicBool,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    pub calls: AtomicUsize,
}

impl MemoryTurnStore {
    pub fn with_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.lock().unwrap().clone()
    }

    fn failure(what: &str) -> ChatError {
        ChatError::StoreStatus {
            status: 503,
            message: format!("{what} unavailable"),
        }
    }
}

impl TurnStore for MemoryTurnStore {
    fn fetch_turns(&self, user: &UserIdentity) -> StoreFuture<'_, ChatResult<Vec<Turn>>> {
        let user = user.clone();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(Self::failure("fetch"));
            }
            let mut turns: Vec<Turn> = self
                .snapshot()
                .into_iter()
                .filter(|turn| turn.user == user)
                .collect();
            turns.sort_by_key(|turn| turn.created_at);
            Ok(turns)
        })
    }

    fn insert_turn(&self, turn: NewTurn) -> StoreFuture<'_, ChatResult<Turn>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(Self::failure("insert"));
            }
            let stored = Turn {
                id: TurnId::new(),
                user: turn.user,
                conversation_id: Some(turn.conversation_id),
                prompt: turn.prompt,
                reply: turn.reply,
                created_at: Utc::now(),
            };
            self.turns.lock().unwrap().push(stored.clone());
            Ok(stored)
        })
    }

    fn update_reply(
        &self,
        user: &UserIdentity,
        turn_id: TurnId,
        reply: String,
    ) -> StoreFuture<'_, ChatResult<u64>> {
        let user = user.clone();
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(Self::failure("update"));
            }
            let mut updated = 0;
            for turn in self.turns.lock().unwrap().iter_mut() {
                if turn.id == turn_id && turn.user == user {
                    turn.reply.clone_from(&reply);
                    updated += 1;
                }
            }
            Ok(updated)
        })
    }
}

/// Inference client replaying scripted results, then echoing prompts.
#[derive(Default)]
pub struct ScriptedInference {
    script: Mutex<VecDeque<Result<String, InferenceError>>>,
    pub prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedInference {
    pub fn new(script: Vec<Result<String, InferenceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|reply| Ok((*reply).to_string())).collect())
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl InferenceClient for ScriptedInference {
    fn generate(&self, prompt: &str) -> GenerateFuture<'_, Result<String, InferenceError>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            self.prompts.lock().unwrap().push(prompt.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(format!("reply to {prompt}")))
        })
    }

    fn provider(&self) -> &'static str {
        "scripted"
    }
}

/// Build a persisted turn `minutes_ago` minutes in the past.
pub fn turn_at(
    user: &UserIdentity,
    conversation_id: Option<crate::chat::core::ids::ConversationId>,
    prompt: &str,
    minutes_ago: i64,
) -> Turn {
    Turn {
        id: TurnId::new(),
        user: user.clone(),
        conversation_id,
        prompt: prompt.to_string(),
        reply: format!("reply to {prompt}"),
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}
