//! `SQLite` turn store.

use chrono::{TimeZone, Utc};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::chat::core::config::StoreConfig;
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{ConversationId, TurnId, UserIdentity};
use crate::chat::core::turn::{NewTurn, Turn};
use crate::chat::store::{StoreFuture, TurnStore};

/// `SQLite` implementation of turn storage.
pub struct SqliteTurnStore {
    conn: Connection,
    table: String,
}

impl SqliteTurnStore {
    /// Open (or create) the database at `config.sqlite_path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StoreConfig) -> ChatResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config.table.clone()).await
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn in_memory(table: impl Into<String>) -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, table.into()).await
    }

    async fn with_connection(conn: Connection, table: String) -> ChatResult<Self> {
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    chat_id TEXT,
                    user_email TEXT NOT NULL,
                    user_message TEXT NOT NULL,
                    ai_reply TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_user_created
                    ON {table_name} (user_email, created_at);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

type TurnRow = (
    TurnId,
    Option<ConversationId>,
    UserIdentity,
    String,
    String,
    i64,
);

fn turn_from_row(row: TurnRow) -> ChatResult<Turn> {
    let (id, conversation_id, user, prompt, reply, created_at) = row;
    let created_at = Utc
        .timestamp_millis_opt(created_at)
        .single()
        .ok_or_else(|| ChatError::InvalidRecord(format!("invalid timestamp for turn {id}")))?;
    Ok(Turn {
        id,
        user,
        conversation_id,
        prompt,
        reply,
        created_at,
    })
}

impl TurnStore for SqliteTurnStore {
    fn fetch_turns(&self, user: &UserIdentity) -> StoreFuture<'_, ChatResult<Vec<Turn>>> {
        let user = user.clone();
        Box::pin(async move {
            let table = self.table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, chat_id, user_email, user_message, ai_reply, created_at
                         FROM {table}
                         WHERE user_email = ?1
                         ORDER BY created_at ASC, seq ASC"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![user], |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        })?
                        .collect::<Result<Vec<TurnRow>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let turns = rows
                .into_iter()
                .map(turn_from_row)
                .collect::<ChatResult<Vec<_>>>()?;
            debug!(count = turns.len(), "fetched turns from sqlite");
            Ok(turns)
        })
    }

    fn insert_turn(&self, turn: NewTurn) -> StoreFuture<'_, ChatResult<Turn>> {
        Box::pin(async move {
            let table = self.table.clone();
            let stored = Turn {
                id: TurnId::new(),
                user: turn.user,
                conversation_id: Some(turn.conversation_id),
                prompt: turn.prompt,
                reply: turn.reply,
                created_at: Utc::now(),
            };
            let row = stored.clone();

            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table}
                            (id, chat_id, user_email, user_message, ai_reply, created_at)
                            VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                        ),
                        rusqlite::params![
                            row.id,
                            row.conversation_id,
                            row.user,
                            row.prompt,
                            row.reply,
                            row.created_at.timestamp_millis()
                        ],
                    )?;
                    Ok(())
                })
                .await?;

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
            let table = self.table.clone();
            let updated = self
                .conn
                .call(move |conn| {
                    let updated = conn.execute(
                        &format!("UPDATE {table} SET ai_reply = ?1 WHERE id = ?2 AND user_email = ?3"),
                        rusqlite::params![reply, turn_id, user],
                    )?;
                    Ok(updated)
                })
                .await?;
            u64::try_from(updated)
                .map_err(|_| ChatError::InvalidRecord("invalid update count".to_string()))
        })
    }
}
