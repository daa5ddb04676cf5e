//! Supabase (`PostgREST`) turn store.
//!
//! Rows live in one table with columns `id`, `chat_id`, `user_email`,
//! `user_message`, `ai_reply`, and `created_at`; the table is expected to
//! default `id` to a fresh UUID and `created_at` to `now()`.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::chat::core::config::SupabaseConfig;
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{ConversationId, TurnId, UserIdentity};
use crate::chat::core::turn::{NewTurn, Turn};
use crate::chat::store::{StoreFuture, TurnStore};

#[derive(Serialize)]
struct InsertRow<'a> {
    chat_id: ConversationId,
    user_email: &'a UserIdentity,
    user_message: &'a str,
    ai_reply: &'a str,
}

#[derive(Serialize)]
struct ReplyPatch<'a> {
    ai_reply: &'a str,
}

#[derive(Deserialize)]
struct TurnRow {
    id: TurnId,
    chat_id: Option<ConversationId>,
    user_email: UserIdentity,
    user_message: String,
    ai_reply: String,
    created_at: DateTime<Utc>,
}

impl From<TurnRow> for Turn {
    fn from(row: TurnRow) -> Self {
        Self {
            id: row.id,
            user: row.user_email,
            conversation_id: row.chat_id,
            prompt: row.user_message,
            reply: row.ai_reply,
            created_at: row.created_at,
        }
    }
}

/// Replaceable bearer token shared between a session and its store.
///
/// Clones observe every later [`AccessToken::replace`].
#[derive(Clone)]
pub struct AccessToken(Arc<RwLock<String>>);

impl AccessToken {
    /// Wrap a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Arc::new(RwLock::new(token.into())))
    }

    /// Token sent on the next request.
    #[must_use]
    pub fn current(&self) -> String {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in a renewed token.
    pub fn replace(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token.into();
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// Turn store backed by a Supabase table through its REST interface.
#[derive(Clone)]
pub struct SupabaseTurnStore {
    client: Client,
    table_url: Url,
    anon_key: String,
    access_token: Option<AccessToken>,
}

impl SupabaseTurnStore {
    /// Build a store for `table` using the anon key.
    ///
    /// # Errors
    /// Returns an error if the project URL or key is missing or invalid.
    pub fn new(config: &SupabaseConfig, table: &str) -> ChatResult<Self> {
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| ChatError::InvalidConfig("supabase.url is required".to_string()))?;
        let anon_key = config
            .anon_key
            .clone()
            .ok_or_else(|| ChatError::InvalidConfig("supabase.anon_key is required".to_string()))?;
        let table_url = Url::parse(&format!("{}/", base.trim_end_matches('/')))?
            .join("rest/v1/")?
            .join(table)?;

        Ok(Self {
            client: Client::new(),
            table_url,
            anon_key,
            access_token: None,
        })
    }

    /// Authenticate requests as a signed-in user so row-level security applies.
    ///
    /// Passing a shared [`AccessToken`] lets a refreshed token reach this store.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<AccessToken>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token
            .as_ref()
            .map_or_else(|| self.anon_key.clone(), AccessToken::current);
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }
}

async fn check_status(response: Response) -> ChatResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ChatError::StoreStatus {
        status: status.as_u16(),
        message,
    })
}

impl TurnStore for SupabaseTurnStore {
    fn fetch_turns(&self, user: &UserIdentity) -> StoreFuture<'_, ChatResult<Vec<Turn>>> {
        let filter = format!("eq.{user}");
        Box::pin(async move {
            let request = self.client.get(self.table_url.clone()).query(&[
                ("select", "*"),
                ("user_email", filter.as_str()),
                ("order", "created_at.asc"),
            ]);
            let response = check_status(self.authorize(request).send().await?).await?;
            let rows: Vec<TurnRow> = response.json().await?;
            debug!(count = rows.len(), "fetched turns from supabase");
            Ok(rows.into_iter().map(Turn::from).collect())
        })
    }

    fn insert_turn(&self, turn: NewTurn) -> StoreFuture<'_, ChatResult<Turn>> {
        Box::pin(async move {
            let body = [InsertRow {
                chat_id: turn.conversation_id,
                user_email: &turn.user,
                user_message: &turn.prompt,
                ai_reply: &turn.reply,
            }];
            let request = self
                .client
                .post(self.table_url.clone())
                .header("Prefer", "return=representation")
                .json(&body);
            let response = check_status(self.authorize(request).send().await?).await?;
            let mut rows: Vec<TurnRow> = response.json().await?;
            let row = rows.pop().ok_or_else(|| {
                ChatError::InvalidRecord("insert returned no representation".to_string())
            })?;
            Ok(Turn::from(row))
        })
    }

    fn update_reply(
        &self,
        user: &UserIdentity,
        turn_id: TurnId,
        reply: String,
    ) -> StoreFuture<'_, ChatResult<u64>> {
        let user_filter = format!("eq.{user}");
        Box::pin(async move {
            let id_filter = format!("eq.{turn_id}");
            let request = self
                .client
                .patch(self.table_url.clone())
                .query(&[("id", id_filter.as_str()), ("user_email", user_filter.as_str())])
                .header("Prefer", "return=representation")
                .json(&ReplyPatch { ai_reply: &reply });
            let response = check_status(self.authorize(request).send().await?).await?;
            let rows: Vec<TurnRow> = response.json().await?;
            u64::try_from(rows.len())
                .map_err(|_| ChatError::InvalidRecord("invalid update count".to_string()))
        })
    }
}
