//! HTTP route handlers for the `PitchCraft` API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::auth::{AuthError, SignUpOutcome};
use crate::chat::core::errors::ChatError;
use crate::chat::core::ids::{ConversationId, MessageId, UserIdentity};
use crate::chat::reconciler::{RegenerateOutcome, SendOutcome, SessionSnapshot};
use crate::export::{self, ExportError};

use super::state::{AppState, Session};

type ApiError = (StatusCode, String);

/// Create the API router with all routes.
#[must_use]
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/login", post(log_in))
        .route("/api/auth/logout", post(log_out))
        .route("/api/chat", get(chat_snapshot))
        .route("/api/chat/send", post(send_prompt))
        .route("/api/chat/regenerate", post(regenerate_reply))
        .route("/api/threads/new", post(new_thread))
        .route("/api/threads/{id}/switch", post(switch_thread))
        .route("/api/messages/{id}/export", get(export_message));

    let router = match &state.config.server.static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };
    router.with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pitchcraft",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Email/password pair for sign-up and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Bearer token for later requests.
    pub access_token: String,
    /// Signed-in identity.
    pub user: UserIdentity,
    /// The loaded session.
    pub chat: SessionSnapshot,
}

/// Prompt to send in the active thread.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Prompt text.
    pub prompt: String,
}

/// Assistant message to regenerate.
#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    /// Id of the assistant message.
    pub message_id: MessageId,
}

fn auth_error(err: &AuthError) -> ApiError {
    let status = match err {
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::InvalidEmail(_) | AuthError::WeakPassword { .. } | AuthError::Rejected(_) => {
            StatusCode::BAD_REQUEST
        }
        AuthError::Http(_) => StatusCode::BAD_GATEWAY,
        AuthError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn chat_error(err: &ChatError) -> ApiError {
    let status = match err {
        ChatError::UnknownMessage(_) => StatusCode::NOT_FOUND,
        ChatError::NotRegenerable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or((StatusCode::UNAUTHORIZED, "Missing bearer token".to_string()))
}

async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<Session>, ApiError> {
    let token = bearer_token(headers)?;
    state
        .session(token)
        .await
        .ok_or((StatusCode::UNAUTHORIZED, "Session expired; please log in".to_string()))
}

/// Register an account.
async fn sign_up(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<SignUpOutcome>), ApiError> {
    let outcome = state
        .auth
        .sign_up(&request.email, &request.password)
        .await
        .map_err(|e| auth_error(&e))?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Sign in and open a session with the user's history loaded.
async fn log_in(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let auth = state
        .auth
        .sign_in(&request.email, &request.password)
        .await
        .map_err(|e| auth_error(&e))?;
    let access_token = auth.access_token.clone();
    let session = state.open_session(auth).await;
    Ok(Json(LoginResponse {
        access_token,
        user: session.user.clone(),
        chat: session.reconciler.snapshot().await,
    }))
}

/// End the session. The local session is dropped even if the backend call fails.
async fn log_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let token = bearer_token(&headers)?;
    let closed = state.close_session(token);
    let backend_token = match &closed {
        Some(session) => session.credentials().await.access_token,
        None => token.to_string(),
    };
    if let Err(err) = state.auth.sign_out(&backend_token).await {
        tracing::warn!(error = %err, "backend sign-out failed");
    }
    match closed {
        Some(session) => {
            tracing::info!(user = %session.user, "session closed");
            Ok(StatusCode::NO_CONTENT)
        }
        None => Err((StatusCode::UNAUTHORIZED, "Unknown session".to_string())),
    }
}

/// Active thread and sidebar summaries.
async fn chat_snapshot(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = require_session(&state, &headers).await?;
    Ok(Json(session.reconciler.snapshot().await))
}

/// Send a prompt in the active thread.
async fn send_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SendRequest>,
) -> Result<Json<SendOutcome>, ApiError> {
    let session = require_session(&state, &headers).await?;
    session
        .reconciler
        .send(&request.prompt)
        .await
        .map(Json)
        .ok_or((StatusCode::BAD_REQUEST, "Prompt is empty".to_string()))
}

/// Regenerate an assistant reply in place.
async fn regenerate_reply(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<RegenerateOutcome>, ApiError> {
    let session = require_session(&state, &headers).await?;
    session
        .reconciler
        .regenerate(request.message_id)
        .await
        .map(Json)
        .map_err(|e| chat_error(&e))
}

/// Start a fresh thread.
async fn new_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = require_session(&state, &headers).await?;
    session.reconciler.new_thread().await;
    Ok(Json(session.reconciler.snapshot().await))
}

/// Activate a previously loaded thread.
async fn switch_thread(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<ConversationId>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = require_session(&state, &headers).await?;
    if !session.reconciler.switch_thread(id).await {
        return Err((StatusCode::NOT_FOUND, format!("Unknown thread {id}")));
    }
    Ok(Json(session.reconciler.snapshot().await))
}

/// Download a displayed message as a PDF.
async fn export_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<MessageId>,
) -> Result<impl IntoResponse, ApiError> {
    let session = require_session(&state, &headers).await?;
    let message = session
        .reconciler
        .message(id)
        .await
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown message {id}")))?;
    if !message.is_assistant() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Only assistant replies can be exported".to_string(),
        ));
    }

    let export_config = &state.config.export;
    let bytes = export::export_text_with(export_config, &message.text).map_err(|e| match e {
        ExportError::Empty => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, format!("Export error: {e}")),
    })?;
    let disposition = format!("attachment; filename=\"{}\"", export_config.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
