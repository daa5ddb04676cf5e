//! Chat subsystem.
//!
//! - `core`: configuration, errors, ids, turns, messages, and threads
//! - `store`: turn persistence (`SQLite` and Supabase backends)
//! - `reconciler`: maps persisted turns into navigable threads and applies
//!   optimistic sends and regenerations

pub mod core;
pub mod reconciler;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use self::core::{
    ChatConfig, ChatError, ChatResult, ConversationId, Message, MessageId, NewTurn,
    PersistStatus, Role, Thread, ThreadSummary, Turn, TurnId, UserIdentity,
};
pub use reconciler::{
    group_turns, load_threads, Reconciler, RegenerateOutcome, SendOutcome, SessionSnapshot,
};
pub use store::{AccessToken, SqliteTurnStore, StoreFuture, SupabaseTurnStore, TurnStore};
