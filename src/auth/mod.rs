//! Authentication gates.
//!
//! A gate turns email/password credentials into an [`AuthSession`]: the
//! user's identity plus the bearer token that scopes every later request.
//! Credentials are checked locally by [`CredentialPolicy`] before any gate
//! talks to a backend.

pub mod open;
pub mod supabase;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::chat::core::config::{AuthBackend, ChatConfig};
use crate::chat::core::ids::UserIdentity;

pub use open::OpenAuthGate;
pub use supabase::SupabaseAuthGate;

/// Boxed future type for auth operations.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Establishes and ends user sessions.
pub trait AuthGate: Send + Sync {
    /// Register a new account.
    ///
    /// # Errors
    /// Returns an error if the credentials are malformed or the backend rejects them.
    fn sign_up(&self, email: &str, password: &str)
    -> AuthFuture<'_, Result<SignUpOutcome, AuthError>>;
    /// Sign in with email and password.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidCredentials`] when the pair does not match an account.
    fn sign_in(&self, email: &str, password: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>>;
    /// Revoke the session behind `access_token`.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be reached or refuses the token.
    fn sign_out(&self, access_token: &str) -> AuthFuture<'_, Result<(), AuthError>>;
    /// Exchange a refresh token for a renewed session.
    ///
    /// # Errors
    /// Returns an error if the refresh token is unknown, used, or revoked.
    fn refresh(&self, refresh_token: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>>;
    /// Backend name for logs.
    fn backend(&self) -> &'static str;
}

/// Renew access tokens this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// An authenticated session.
#[derive(Clone, Debug, Serialize)]
pub struct AuthSession {
    /// Identity owning the session's turns.
    pub user: UserIdentity,
    /// Bearer token presented on later requests.
    pub access_token: String,
    /// Token that renews `access_token`; never sent to clients.
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    /// When `access_token` stops being accepted; `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Session whose token never expires.
    #[must_use]
    pub fn unbounded(user: UserIdentity, access_token: impl Into<String>) -> Self {
        Self {
            user,
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Whether the access token is expired or about to be at `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(REFRESH_MARGIN_SECS) <= now)
    }
}

/// Result of a sign-up.
#[derive(Clone, Debug, Serialize)]
pub struct SignUpOutcome {
    /// The registered identity.
    pub user: UserIdentity,
    /// The address must be verified before signing in.
    pub confirmation_required: bool,
}

/// Authentication failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email and password do not match an account.
    #[error("Please check your email or password.")]
    InvalidCredentials,
    /// The email address is malformed.
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    /// The password is shorter than the configured minimum.
    #[error("password must be at least {min} characters")]
    WeakPassword {
        /// Minimum accepted length.
        min: usize,
    },
    /// The backend refused the request.
    #[error("{0}")]
    Rejected(String),
    /// Transport error.
    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The gate could not be built.
    #[error("invalid auth configuration: {0}")]
    InvalidConfig(String),
}

/// Local credential checks shared by every gate.
#[derive(Clone, Debug)]
pub struct CredentialPolicy {
    email: Regex,
    min_password_len: usize,
}

impl CredentialPolicy {
    /// Build a policy requiring passwords of at least `min_password_len` characters.
    ///
    /// # Errors
    /// Returns an error if the email pattern fails to compile.
    pub fn new(min_password_len: usize) -> Result<Self, AuthError> {
        let email = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$")
            .map_err(|err| AuthError::InvalidConfig(err.to_string()))?;
        Ok(Self {
            email,
            min_password_len,
        })
    }

    /// Validate a credential pair and return the identity it names.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidEmail`] or [`AuthError::WeakPassword`].
    pub fn check(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let email = email.trim();
        if !self.email.is_match(email) {
            return Err(AuthError::InvalidEmail(email.to_string()));
        }
        if password.chars().count() < self.min_password_len {
            return Err(AuthError::WeakPassword {
                min: self.min_password_len,
            });
        }
        UserIdentity::new(email).map_err(|err| AuthError::InvalidEmail(err.to_string()))
    }
}

/// Build the gate selected by `config.auth.backend`.
///
/// # Errors
/// Returns an error if the backend is missing credentials.
pub fn build_gate(config: &ChatConfig) -> Result<Arc<dyn AuthGate>, AuthError> {
    let policy = CredentialPolicy::new(config.auth.min_password_len)?;
    let gate: Arc<dyn AuthGate> = match config.auth.backend {
        AuthBackend::Supabase => Arc::new(SupabaseAuthGate::new(&config.supabase, policy)?),
        AuthBackend::Open => Arc::new(OpenAuthGate::new(policy)),
    };
    tracing::info!(backend = gate.backend(), "auth gate ready");
    Ok(gate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_accepts_well_formed_credentials() {
        let policy = CredentialPolicy::new(6).unwrap();
        let user = policy.check("  founder@example.com ", "secret1").unwrap();
        assert_eq!(user.as_str(), "founder@example.com");
    }

    #[test]
    fn test_policy_rejects_malformed_email() {
        let policy = CredentialPolicy::new(6).unwrap();
        for email in ["", "founder", "founder@", "@example.com", "a b@example.com", "a@example"] {
            assert!(
                matches!(policy.check(email, "secret1"), Err(AuthError::InvalidEmail(_))),
                "{email}"
            );
        }
    }

    #[test]
    fn test_policy_rejects_short_password() {
        let policy = CredentialPolicy::new(6).unwrap();
        assert!(matches!(
            policy.check("founder@example.com", "12345"),
            Err(AuthError::WeakPassword { min: 6 })
        ));
    }

    #[test]
    fn test_needs_refresh_inside_margin() {
        let user = UserIdentity::new("founder@example.com").unwrap();
        let now = Utc::now();
        let mut session = AuthSession::unbounded(user, "token");
        assert!(!session.needs_refresh(now));

        session.expires_at = Some(now + Duration::seconds(3600));
        assert!(!session.needs_refresh(now));
        session.expires_at = Some(now + Duration::seconds(30));
        assert!(session.needs_refresh(now));
        session.expires_at = Some(now - Duration::seconds(5));
        assert!(session.needs_refresh(now));
    }

    #[test]
    fn test_refresh_token_is_not_serialized() {
        let user = UserIdentity::new("founder@example.com").unwrap();
        let mut session = AuthSession::unbounded(user, "token");
        session.refresh_token = Some("secret-refresh".to_string());
        let json = serde_json::to_string(&session).unwrap();
        assert!(!json.contains("secret-refresh"));
    }

    #[test]
    fn test_open_backend_builds_without_credentials() {
        let gate = build_gate(&ChatConfig::default()).unwrap();
        assert_eq!(gate.backend(), "open");
    }

    #[test]
    fn test_supabase_backend_requires_project() {
        let mut config = ChatConfig::default();
        config.auth.backend = AuthBackend::Supabase;
        assert!(matches!(
            build_gate(&config),
            Err(AuthError::InvalidConfig(_))
        ));
    }
}
