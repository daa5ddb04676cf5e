//! Development gate that accepts any well-formed credentials.

use uuid::Uuid;

use crate::auth::{AuthError, AuthFuture, AuthGate, AuthSession, CredentialPolicy, SignUpOutcome};

/// Gate without a backend: every valid credential pair signs in.
pub struct OpenAuthGate {
    policy: CredentialPolicy,
}

impl OpenAuthGate {
    /// Create the gate.
    #[must_use]
    pub fn new(policy: CredentialPolicy) -> Self {
        tracing::warn!("open auth gate enabled; passwords are not verified");
        Self { policy }
    }
}

impl AuthGate for OpenAuthGate {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> AuthFuture<'_, Result<SignUpOutcome, AuthError>> {
        let checked = self.policy.check(email, password);
        Box::pin(async move {
            Ok(SignUpOutcome {
                user: checked?,
                confirmation_required: false,
            })
        })
    }

    fn sign_in(&self, email: &str, password: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>> {
        let checked = self.policy.check(email, password);
        Box::pin(async move {
            Ok(AuthSession::unbounded(
                checked?,
                Uuid::new_v4().simple().to_string(),
            ))
        })
    }

    fn sign_out(&self, _access_token: &str) -> AuthFuture<'_, Result<(), AuthError>> {
        Box::pin(async { Ok(()) })
    }

    fn refresh(&self, _refresh_token: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>> {
        Box::pin(async {
            Err(AuthError::Rejected(
                "open sessions do not expire and cannot be refreshed".to_string(),
            ))
        })
    }

    fn backend(&self) -> &'static str {
        "open"
    }
}
