//! Inference clients.
//!
//! Every client answers a prompt with generated text or an [`InferenceError`].
//! Errors are never shown raw: [`InferenceError::notice`] renders the
//! visible warning text that takes the reply's place in the conversation.

pub mod gemini;
pub mod ollama;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::chat::core::config::{InferenceConfig, InferenceProvider};

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// Prefix marking replies that stand in for a failed generation.
pub const WARNING_MARKER: &str = "⚠️";

/// HTTP connect timeout shared by the clients.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Boxed future type for inference operations.
pub type GenerateFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstraction over text generation APIs.
pub trait InferenceClient: Send + Sync {
    /// Generate a reply for `prompt`. One attempt, no retry.
    ///
    /// # Errors
    /// Returns an error if the API cannot be reached or produces no text.
    fn generate(&self, prompt: &str) -> GenerateFuture<'_, Result<String, InferenceError>>;
    /// Provider name for logs.
    fn provider(&self) -> &'static str;
}

/// Inference failures.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The API answered with an error payload.
    #[error("{provider} api error: {message}")]
    Api {
        /// Provider name.
        provider: &'static str,
        /// Error message from the API.
        message: String,
    },
    /// The API answered without any generated text.
    #[error("no response from {provider}")]
    EmptyResponse {
        /// Provider name.
        provider: &'static str,
    },
    /// The API answered with a non-success status.
    #[error("{provider} http status {status}")]
    Status {
        /// Provider name.
        provider: &'static str,
        /// HTTP status code.
        status: u16,
    },
    /// The request could not be sent or its body could not be read.
    #[error("error contacting {provider}: {source}")]
    Transport {
        /// Provider name.
        provider: &'static str,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// The client could not be built.
    #[error("invalid inference configuration: {0}")]
    InvalidConfig(String),
}

impl InferenceError {
    /// Visible text shown in place of a reply.
    #[must_use]
    pub fn notice(&self) -> String {
        match self {
            Self::Api { provider, message } => {
                format!("{WARNING_MARKER} {} Error: {message}", display_name(provider))
            }
            Self::EmptyResponse { provider } => {
                format!("{WARNING_MARKER} No response from {}.", display_name(provider))
            }
            Self::Transport { provider, .. } => {
                format!("{WARNING_MARKER} Error contacting {} API.", display_name(provider))
            }
            Self::Status { .. } | Self::InvalidConfig(_) => {
                format!("{WARNING_MARKER} Error generating response. Try again.")
            }
        }
    }
}

fn display_name(provider: &str) -> &str {
    match provider {
        "gemini" => "Gemini",
        "ollama" => "Ollama",
        other => other,
    }
}

fn http_client(config: &InferenceConfig) -> Result<reqwest::Client, InferenceError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|err| InferenceError::InvalidConfig(err.to_string()))
}

/// Build the client selected by `config.provider`.
///
/// # Errors
/// Returns an error if the provider is missing credentials or the HTTP client cannot be built.
pub fn build_client(config: &InferenceConfig) -> Result<Arc<dyn InferenceClient>, InferenceError> {
    let client: Arc<dyn InferenceClient> = match config.provider {
        InferenceProvider::Gemini => Arc::new(GeminiClient::new(config)?),
        InferenceProvider::Ollama => Arc::new(OllamaClient::new(config)?),
    };
    tracing::info!(
        provider = client.provider(),
        model = %config.model,
        "inference client ready"
    );
    Ok(client)
}
