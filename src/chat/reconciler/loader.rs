//! Grouping of persisted turns into threads.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::{ConversationId, UserIdentity};
use crate::chat::core::thread::Thread;
use crate::chat::core::turn::Turn;
use crate::chat::store::TurnStore;

/// Group turns into threads keyed by [`Turn::thread_key`].
///
/// Threads appear in the order their key is first seen; turns inside a
/// thread are ordered by creation time, ties keeping input order.
#[must_use]
pub fn group_turns(mut turns: Vec<Turn>) -> Vec<Thread> {
    turns.sort_by_key(|turn| turn.created_at);

    let mut threads: Vec<Thread> = Vec::new();
    let mut index: HashMap<ConversationId, usize> = HashMap::new();
    for turn in &turns {
        let key = turn.thread_key();
        let slot = *index.entry(key).or_insert_with(|| {
            threads.push(Thread::new(key));
            threads.len() - 1
        });
        threads[slot].push_turn(turn);
    }
    threads
}

/// Fetch and group every turn owned by `user`.
///
/// An absent identity has nothing to load and yields no threads.
///
/// # Errors
/// Returns the store error when the read fails; nothing is retried.
pub async fn load_threads(
    store: &dyn TurnStore,
    user: Option<&UserIdentity>,
) -> ChatResult<Vec<Thread>> {
    let Some(user) = user else {
        debug!("no user identity; nothing to load");
        return Ok(Vec::new());
    };

    let turns = store.fetch_turns(user).await.map_err(|err| {
        error!(user = %user, error = %err, "history fetch failed");
        err
    })?;
    let turn_count = turns.len();
    let threads = group_turns(turns);
    debug!(user = %user, turns = turn_count, threads = threads.len(), "history loaded");
    Ok(threads)
}
