//! Error types for the chat subsystem.

use thiserror::Error;

use crate::chat::core::ids::{MessageId, UserIdentityError};
use crate::llm::InferenceError;

/// Chat subsystem error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A persisted turn could not be decoded.
    #[error("invalid turn record: {0}")]
    InvalidRecord(String),
    /// Invalid user identity.
    #[error("invalid user identity: {0}")]
    Identity(#[from] UserIdentityError),
    /// No message with this id is displayed in the active thread.
    #[error("unknown message: {0}")]
    UnknownMessage(MessageId),
    /// The message exists but is not an assistant reply linked to a prompt.
    #[error("message {0} is not a regenerable assistant reply")]
    NotRegenerable(MessageId),
    /// The remote store answered with a non-success status.
    #[error("store request failed with status {status}: {message}")]
    StoreStatus {
        /// HTTP status code.
        status: u16,
        /// Response body or error message.
        message: String,
    },
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// HTTP client error.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    /// Inference client construction error.
    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
