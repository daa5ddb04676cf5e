//! Supabase Auth (`GoTrue`) gate.

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthError, AuthFuture, AuthGate, AuthSession, CredentialPolicy, SignUpOutcome};
use crate::chat::core::config::SupabaseConfig;
use crate::chat::core::ids::UserIdentity;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct UserBody {
    email: Option<String>,
}

#[derive(Deserialize)]
struct SessionBody {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: Option<UserBody>,
    email: Option<String>,
}

impl SessionBody {
    fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)))
    }

    fn into_session(self, fallback: UserIdentity) -> Result<AuthSession, AuthError> {
        let user = identity_of(&self, fallback);
        let expires_at = self.expiry(Utc::now());
        let access_token = self
            .access_token
            .ok_or_else(|| AuthError::Rejected("no access token in response".to_string()))?;
        Ok(AuthSession {
            user,
            access_token,
            refresh_token: self.refresh_token,
            expires_at,
        })
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// Gate backed by a Supabase project's auth endpoints.
pub struct SupabaseAuthGate {
    client: Client,
    auth_url: Url,
    anon_key: String,
    policy: CredentialPolicy,
}

impl SupabaseAuthGate {
    /// Build a gate for the configured project.
    ///
    /// # Errors
    /// Returns an error if the project URL or anon key is missing or invalid.
    pub fn new(config: &SupabaseConfig, policy: CredentialPolicy) -> Result<Self, AuthError> {
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| AuthError::InvalidConfig("supabase.url is required".to_string()))?;
        let anon_key = config
            .anon_key
            .clone()
            .ok_or_else(|| AuthError::InvalidConfig("supabase.anon_key is required".to_string()))?;
        let auth_url = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .and_then(|url| url.join("auth/v1/"))
            .map_err(|err| AuthError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            client: Client::new(),
            auth_url,
            anon_key,
            policy,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.auth_url
            .join(path)
            .map_err(|err| AuthError::InvalidConfig(err.to_string()))
    }

    fn token_endpoint(&self, grant_type: &str) -> Result<Url, AuthError> {
        let mut url = self.endpoint("token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        Ok(url)
    }

    async fn post_json<B: Serialize + Sync>(&self, url: Url, body: &B) -> Result<SessionBody, AuthError> {
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let message = body
        .into_message()
        .unwrap_or_else(|| format!("auth request failed with status {}", status.as_u16()));
    if message.contains("Invalid login credentials") || message.contains("Invalid email or password") {
        return Err(AuthError::InvalidCredentials);
    }
    Err(AuthError::Rejected(message))
}

fn identity_of(body: &SessionBody, fallback: UserIdentity) -> UserIdentity {
    body.user
        .as_ref()
        .and_then(|user| user.email.as_deref())
        .or(body.email.as_deref())
        .and_then(|email| UserIdentity::new(email).ok())
        .unwrap_or(fallback)
}

impl AuthGate for SupabaseAuthGate {
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> AuthFuture<'_, Result<SignUpOutcome, AuthError>> {
        let checked = self.policy.check(email, password);
        let password = password.to_string();
        Box::pin(async move {
            let user = checked?;
            let credentials = Credentials {
                email: user.as_str(),
                password: &password,
            };
            let body = self.post_json(self.endpoint("signup")?, &credentials).await?;
            let user = identity_of(&body, user);

            // Accounts must sign in explicitly after registering.
            let ended = match body.access_token.as_deref() {
                Some(token) => self.sign_out(token).await,
                None => Ok(()),
            };
            if let Err(err) = ended {
                warn!(user = %user, error = %err, "could not end sign-up session");
            }
            debug!(user = %user, "account registered");
            Ok(SignUpOutcome {
                user,
                confirmation_required: body.access_token.is_none(),
            })
        })
    }

    fn sign_in(&self, email: &str, password: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>> {
        let checked = self.policy.check(email, password);
        let password = password.to_string();
        Box::pin(async move {
            let user = checked.map_err(|_| AuthError::InvalidCredentials)?;
            let credentials = Credentials {
                email: user.as_str(),
                password: &password,
            };
            let body = self
                .post_json(self.token_endpoint("password")?, &credentials)
                .await?;
            let session = body.into_session(user)?;
            debug!(user = %session.user, expires_at = ?session.expires_at, "signed in");
            Ok(session)
        })
    }

    fn refresh(&self, refresh_token: &str) -> AuthFuture<'_, Result<AuthSession, AuthError>> {
        let refresh_token = refresh_token.to_string();
        Box::pin(async move {
            let grant = RefreshGrant {
                refresh_token: &refresh_token,
            };
            let body = self
                .post_json(self.token_endpoint("refresh_token")?, &grant)
                .await?;
            let fallback = body
                .user
                .as_ref()
                .and_then(|user| user.email.as_deref())
                .and_then(|email| UserIdentity::new(email).ok())
                .ok_or_else(|| AuthError::Rejected("refresh response names no user".to_string()))?;
            let session = body.into_session(fallback)?;
            debug!(user = %session.user, expires_at = ?session.expires_at, "session refreshed");
            Ok(session)
        })
    }

    fn sign_out(&self, access_token: &str) -> AuthFuture<'_, Result<(), AuthError>> {
        let access_token = access_token.to_string();
        Box::pin(async move {
            let response = self
                .client
                .post(self.endpoint("logout")?)
                .header("apikey", &self.anon_key)
                .bearer_auth(&access_token)
                .send()
                .await?;
            check_status(response).await?;
            Ok(())
        })
    }

    fn backend(&self) -> &'static str {
        "supabase"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gate_for(server: &MockServer) -> SupabaseAuthGate {
        let config = SupabaseConfig {
            url: Some(server.uri()),
            anon_key: Some("anon".to_string()),
        };
        SupabaseAuthGate::new(&config, CredentialPolicy::new(6).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_returns_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon"))
            .and(body_json(json!({ "email": "founder@example.com", "password": "secret1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "jwt-token",
                "token_type": "bearer",
                "refresh_token": "refresh-1",
                "expires_at": 1_900_000_000,
                "user": { "email": "founder@example.com" }
            })))
            .mount(&server)
            .await;

        let session = gate_for(&server)
            .sign_in("founder@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(session.access_token, "jwt-token");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(session.expires_at.unwrap().timestamp(), 1_900_000_000);
        assert_eq!(session.user.as_str(), "founder@example.com");
    }

    #[tokio::test]
    async fn test_refresh_exchanges_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(header("apikey", "anon"))
            .and(body_json(json!({ "refresh_token": "refresh-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "jwt-2",
                "refresh_token": "refresh-2",
                "expires_in": 3600,
                "user": { "email": "founder@example.com" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let before = Utc::now();
        let session = gate_for(&server).refresh("refresh-1").await.unwrap();
        assert_eq!(session.access_token, "jwt-2");
        assert_eq!(session.refresh_token.as_deref(), Some("refresh-2"));
        let expires_at = session.expires_at.unwrap();
        assert!(expires_at >= before + Duration::seconds(3600));
        assert!(!session.needs_refresh(Utc::now()));
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid Refresh Token: Already Used"
            })))
            .mount(&server)
            .await;

        let err = gate_for(&server).refresh("refresh-1").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_wrong_password_is_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let err = gate_for(&server)
            .sign_in("founder@example.com", "wrong-one")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_sign_up_with_pending_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "0b6f8f3e-8a4c-4d59-9f44-3c1f5f0a2b11",
                "email": "founder@example.com"
            })))
            .mount(&server)
            .await;

        let outcome = gate_for(&server)
            .sign_up("founder@example.com", "secret1")
            .await
            .unwrap();
        assert!(outcome.confirmation_required);
        assert_eq!(outcome.user.as_str(), "founder@example.com");
    }

    #[tokio::test]
    async fn test_sign_up_rejection_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "code": 422,
                "msg": "User already registered"
            })))
            .mount(&server)
            .await;

        let err = gate_for(&server)
            .sign_up("founder@example.com", "secret1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
    }

    #[tokio::test]
    async fn test_sign_out_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .and(header("authorization", "Bearer jwt-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        gate_for(&server).sign_out("jwt-token").await.unwrap();
    }
}
