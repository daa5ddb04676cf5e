//! Application state shared across all request handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::auth::{self, AuthGate, AuthSession};
use crate::chat::core::config::{ChatConfig, StoreBackend};
use crate::chat::core::ids::UserIdentity;
use crate::chat::reconciler::Reconciler;
use crate::chat::store::{self, AccessToken, SupabaseTurnStore, TurnStore};
use crate::llm::{self, InferenceClient};

/// Where each session's turn store comes from.
#[derive(Clone)]
pub enum StoreProvider {
    /// Every session shares one store.
    Shared(Arc<dyn TurnStore>),
    /// Each session talks to Supabase with its own access token.
    Supabase(SupabaseTurnStore),
}

impl StoreProvider {
    fn for_session(&self, bearer: &AccessToken) -> Arc<dyn TurnStore> {
        match self {
            Self::Shared(store) => Arc::clone(store),
            Self::Supabase(store) => Arc::new(store.clone().with_access_token(bearer.clone())),
        }
    }
}

/// One signed-in user's session.
///
/// Clients keep presenting the token they got at login; renewed backend
/// tokens are swapped in behind it.
pub struct Session {
    /// Identity owning the session.
    pub user: UserIdentity,
    /// The user's conversation state.
    pub reconciler: Reconciler,
    credentials: Mutex<AuthSession>,
    bearer: AccessToken,
    last_seen_ms: AtomicI64,
}

impl Session {
    /// Current backend credentials.
    pub async fn credentials(&self) -> AuthSession {
        self.credentials.lock().await.clone()
    }

    fn touch(&self) {
        self.last_seen_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn idle_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.last_seen_ms.load(Ordering::Relaxed)
    }
}

/// Shared application state.
pub struct AppState {
    /// Loaded configuration.
    pub config: ChatConfig,
    /// Gate establishing user identity.
    pub auth: Arc<dyn AuthGate>,
    /// Client used for every reply.
    pub inference: Arc<dyn InferenceClient>,
    stores: StoreProvider,
    sessions: DashMap<String, Arc<Session>>,
}

impl AppState {
    /// Build the state described by `config`.
    ///
    /// # Errors
    /// Returns an error if the store, auth gate, or inference client cannot be created.
    pub async fn new(config: ChatConfig) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let auth = auth::build_gate(&config)
            .map_err(|e| format!("Failed to create auth gate: {e}"))?;
        let inference = llm::build_client(&config.inference)
            .map_err(|e| format!("Failed to create inference client: {e}"))?;
        let stores = match config.store.backend {
            StoreBackend::Supabase => StoreProvider::Supabase(SupabaseTurnStore::new(
                &config.supabase,
                &config.store.table,
            )?),
            StoreBackend::Sqlite => StoreProvider::Shared(store::open_store(&config).await?),
        };
        Ok(Self::from_parts(config, auth, inference, stores))
    }

    /// Assemble state from already-built collaborators.
    #[must_use]
    pub fn from_parts(
        config: ChatConfig,
        auth: Arc<dyn AuthGate>,
        inference: Arc<dyn InferenceClient>,
        stores: StoreProvider,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            auth,
            inference,
            stores,
            sessions: DashMap::new(),
        })
    }

    /// Register a signed-in session under its access token and load its history.
    ///
    /// Idle sessions are dropped first. A failed load is logged; the
    /// session starts with no threads.
    pub async fn open_session(&self, auth: AuthSession) -> Arc<Session> {
        self.evict_idle();

        let key = auth.access_token.clone();
        let bearer = AccessToken::new(auth.access_token.clone());
        let reconciler = Reconciler::new(
            Some(auth.user.clone()),
            self.stores.for_session(&bearer),
            Arc::clone(&self.inference),
        );
        match reconciler.load().await {
            Ok(threads) => info!(user = %auth.user, threads, "session opened"),
            Err(err) => warn!(user = %auth.user, error = %err, "session opened without history"),
        }
        let session = Arc::new(Session {
            user: auth.user.clone(),
            reconciler,
            credentials: Mutex::new(auth),
            bearer,
            last_seen_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        });
        self.sessions.insert(key, Arc::clone(&session));
        session
    }

    /// Session registered under `key`, with its backend token renewed if due.
    ///
    /// A session whose token can no longer be renewed is dropped and `None`
    /// is returned, so the client has to sign in again.
    pub async fn session(&self, key: &str) -> Option<Arc<Session>> {
        let session = self.sessions.get(key).map(|entry| Arc::clone(entry.value()))?;
        if !self.renew_if_due(&session).await {
            self.sessions.remove(key);
            return None;
        }
        session.touch();
        Some(session)
    }

    async fn renew_if_due(&self, session: &Session) -> bool {
        let mut credentials = session.credentials.lock().await;
        if !credentials.needs_refresh(Utc::now()) {
            return true;
        }
        let Some(refresh_token) = credentials.refresh_token.clone() else {
            warn!(user = %session.user, "session expired without a refresh token");
            return false;
        };
        match self.auth.refresh(&refresh_token).await {
            Ok(renewed) => {
                session.bearer.replace(renewed.access_token.clone());
                *credentials = renewed;
                info!(user = %session.user, "session token renewed");
                true
            }
            Err(err) => {
                warn!(user = %session.user, error = %err, "session renewal failed; dropping session");
                false
            }
        }
    }

    fn evict_idle(&self) {
        let limit_ms = i64::try_from(self.config.auth.session_idle_secs)
            .unwrap_or(i64::MAX / 1_000)
            .saturating_mul(1_000);
        let now_ms = Utc::now().timestamp_millis();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.idle_ms(now_ms) < limit_ms);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(evicted, "idle sessions dropped");
        }
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Forget the session registered under `key`.
    #[must_use]
    pub fn close_session(&self, key: &str) -> Option<Arc<Session>> {
        self.sessions.remove(key).map(|(_, session)| session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, AuthFuture, SignUpOutcome};
    use crate::chat::testing::{MemoryTurnStore, ScriptedInference};
    use chrono::Duration;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Gate that renews every refresh token into `renewed-<n>`.
    #[derive(Default)]
    struct RenewingGate {
        refreshes: AtomicUsize,
        refuse: bool,
    }

    impl AuthGate for RenewingGate {
        fn sign_up(&self, _: &str, _: &str) -> AuthFuture<'_, Result<SignUpOutcome, AuthError>> {
            Box::pin(async { Err(AuthError::Rejected("unused".to_string())) })
        }

        fn sign_in(&self, _: &str, _: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>> {
            Box::pin(async { Err(AuthError::Rejected("unused".to_string())) })
        }

        fn sign_out(&self, _: &str) -> AuthFuture<'_, Result<(), AuthError>> {
            Box::pin(async { Ok(()) })
        }

        fn refresh(&self, _: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>> {
            Box::pin(async move {
                if self.refuse {
                    return Err(AuthError::Rejected("Invalid Refresh Token".to_string()));
                }
                let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
                let mut session = AuthSession::unbounded(founder(), format!("renewed-{n}"));
                session.refresh_token = Some(format!("refresh-{n}"));
                session.expires_at = Some(Utc::now() + Duration::seconds(3600));
                Ok(session)
            })
        }

        fn backend(&self) -> &'static str {
            "renewing"
        }
    }

    fn founder() -> UserIdentity {
        UserIdentity::new("founder@example.com").unwrap()
    }

    fn expired_session(token: &str) -> AuthSession {
        let mut session = AuthSession::unbounded(founder(), token);
        session.refresh_token = Some("refresh-0".to_string());
        session.expires_at = Some(Utc::now() - Duration::seconds(10));
        session
    }

    fn state_with(gate: RenewingGate, stores: StoreProvider) -> Arc<AppState> {
        AppState::from_parts(
            ChatConfig::default(),
            Arc::new(gate),
            Arc::new(ScriptedInference::default()),
            stores,
        )
    }

    #[tokio::test]
    async fn test_expired_token_is_renewed_before_store_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/pitch_craft_turns"))
            .and(header("authorization", "Bearer login-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/pitch_craft_turns"))
            .and(header("authorization", "Bearer renewed-1"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
                "id": crate::chat::core::ids::TurnId::new(),
                "chat_id": null,
                "user_email": "founder@example.com",
                "user_message": "after expiry",
                "ai_reply": "reply to after expiry",
                "created_at": "2025-01-05T10:00:00+00:00"
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let config = crate::chat::core::config::SupabaseConfig {
            url: Some(server.uri()),
            anon_key: Some("anon".to_string()),
        };
        let store = SupabaseTurnStore::new(&config, "pitch_craft_turns").unwrap();
        let state = state_with(RenewingGate::default(), StoreProvider::Supabase(store));

        state.open_session(expired_session("login-token")).await;

        let session = state.session("login-token").await.unwrap();
        assert_eq!(session.credentials().await.access_token, "renewed-1");
        let outcome = session.reconciler.send("after expiry").await.unwrap();
        assert!(outcome.persisted);
    }

    #[tokio::test]
    async fn test_unrenewable_session_is_dropped() {
        let gate = RenewingGate {
            refuse: true,
            ..RenewingGate::default()
        };
        let state = state_with(gate, StoreProvider::Shared(Arc::new(MemoryTurnStore::default())));
        state.open_session(expired_session("stale")).await;

        assert!(state.session("stale").await.is_none());
        assert_eq!(state.session_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_session_is_not_renewed() {
        let state = state_with(
            RenewingGate::default(),
            StoreProvider::Shared(Arc::new(MemoryTurnStore::default())),
        );
        state
            .open_session(AuthSession::unbounded(founder(), "dev-token"))
            .await;

        let session = state.session("dev-token").await.unwrap();
        assert_eq!(session.credentials().await.access_token, "dev-token");
    }

    #[tokio::test]
    async fn test_login_drops_idle_sessions() {
        let state = state_with(
            RenewingGate::default(),
            StoreProvider::Shared(Arc::new(MemoryTurnStore::default())),
        );
        let abandoned = state
            .open_session(AuthSession::unbounded(founder(), "abandoned"))
            .await;
        let idle_ms = i64::try_from(state.config.auth.session_idle_secs).unwrap() * 1_000;
        abandoned
            .last_seen_ms
            .fetch_sub(idle_ms + 1, Ordering::Relaxed);

        state
            .open_session(AuthSession::unbounded(founder(), "fresh"))
            .await;
        assert_eq!(state.session_count(), 1);
        assert!(state.session("abandoned").await.is_none());
        assert!(state.session("fresh").await.is_some());
    }
}
