//! Turn persistence.

pub mod sqlite_store;
pub mod supabase_store;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::chat::core::config::{ChatConfig, StoreBackend};
use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::{TurnId, UserIdentity};
use crate::chat::core::turn::{NewTurn, Turn};

pub use sqlite_store::SqliteTurnStore;
pub use supabase_store::{AccessToken, SupabaseTurnStore};

/// Boxed future type for turn store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Remote store of conversation turns.
pub trait TurnStore: Send + Sync {
    /// Load every turn owned by `user`, ordered by creation time ascending.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn fetch_turns(&self, user: &UserIdentity) -> StoreFuture<'_, ChatResult<Vec<Turn>>>;
    /// Persist a new turn and return it with its assigned id and timestamp.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn insert_turn(&self, turn: NewTurn) -> StoreFuture<'_, ChatResult<Turn>>;
    /// Overwrite the reply of the turn `turn_id` owned by `user`.
    ///
    /// Returns the number of turns updated (0 or 1).
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn update_reply(
        &self,
        user: &UserIdentity,
        turn_id: TurnId,
        reply: String,
    ) -> StoreFuture<'_, ChatResult<u64>>;
}

/// Open the store selected by `config` with the anon credentials.
///
/// Supabase sessions that need row-level security should use
/// [`SupabaseTurnStore::with_access_token`] instead.
///
/// # Errors
/// Returns an error if the backend cannot be initialized.
pub async fn open_store(config: &ChatConfig) -> ChatResult<Arc<dyn TurnStore>> {
    let store: Arc<dyn TurnStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteTurnStore::new(&config.store).await?),
        StoreBackend::Supabase => Arc::new(SupabaseTurnStore::new(
            &config.supabase,
            &config.store.table,
        )?),
    };
    Ok(store)
}
