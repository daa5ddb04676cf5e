//! Conversation reconciliation: loading, optimistic sends, regeneration, navigation.

pub mod core;
pub mod loader;
pub mod state;

pub use self::core::{Reconciler, RegenerateOutcome, SendOutcome};
pub use loader::{group_turns, load_threads};
pub use state::{SessionSnapshot, SessionState};
