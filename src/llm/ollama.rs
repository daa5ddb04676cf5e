//! Ollama `/api/generate` client.
//!
//! Behaviour:
//! - One non-streaming `POST /api/generate` per prompt with runtime options.
//! - The model stays loaded for `keep_alive` between prompts.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chat::core::config::InferenceConfig;
use crate::llm::{GenerateFuture, InferenceClient, InferenceError, http_client};

const PROVIDER: &str = "ollama";

/// Target context length (tokens).
const CONTEXT_LENGTH: u32 = 8_192;

/// Conservative default batch for 8K context to reduce OOM risk.
const NUM_BATCH: u32 = 256;

/// Default thread count if `available_parallelism()` is unavailable.
const DEFAULT_NUM_THREAD: u32 = 8;

#[derive(Serialize)]
struct GenerateOptions {
    num_ctx: u32,
    num_predict: u32,
    num_batch: u32,
    num_thread: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    keep_alive: &'a str,
    options: GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

/// Async Ollama client.
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
    keep_alive: String,
    num_predict: u32,
}

impl OllamaClient {
    /// Create a client from config.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/api/generate", config.base_url()),
            model: config.model.clone(),
            keep_alive: config.keep_alive.clone(),
            num_predict: config.max_tokens,
        })
    }

    async fn post_generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            keep_alive: &self.keep_alive,
            options: GenerateOptions {
                num_ctx: CONTEXT_LENGTH,
                num_predict: self.num_predict,
                num_batch: NUM_BATCH,
                num_thread: detect_num_thread(),
            },
        };
        let transport = |source| InferenceError::Transport {
            provider: PROVIDER,
            source,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(InferenceError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }

        let body: GenerateResponse = response.json().await.map_err(transport)?;
        if let Some(message) = body.error {
            return Err(InferenceError::Api {
                provider: PROVIDER,
                message,
            });
        }
        body.response
            .filter(|text| !text.is_empty())
            .ok_or(InferenceError::EmptyResponse { provider: PROVIDER })
    }
}

impl InferenceClient for OllamaClient {
    fn generate(&self, prompt: &str) -> GenerateFuture<'_, Result<String, InferenceError>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            let result = self.post_generate(&prompt).await;
            match &result {
                Ok(text) => debug!(chars = text.len(), model = %self.model, "ollama reply received"),
                Err(err) => warn!(error = %err, model = %self.model, "ollama generation failed"),
            }
            result
        })
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }
}

fn detect_num_thread() -> u32 {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .map_or(DEFAULT_NUM_THREAD, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::core::config::InferenceProvider;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OllamaClient {
        let provider = InferenceProvider::Ollama;
        let config = InferenceConfig {
            provider,
            model: provider.default_model().to_string(),
            base_url: Some(server.uri()),
            ..InferenceConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_generate_posts_model_and_options() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "ministral-3:8b-instruct-2512-q8_0",
                "prompt": "Idea: eco packaging",
                "stream": false,
                "options": { "num_ctx": 8192, "num_predict": 512 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "Try reusable containers.", "done": true
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .generate("Idea: eco packaging")
            .await
            .unwrap();
        assert_eq!(reply, "Try reusable containers.");
    }

    #[tokio::test]
    async fn test_model_not_found_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "model not found"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("hi").await.unwrap_err();
        assert!(matches!(err, InferenceError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let config = InferenceConfig {
            provider: InferenceProvider::Ollama,
            base_url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 2,
            ..InferenceConfig::default()
        };
        let err = OllamaClient::new(&config)
            .unwrap()
            .generate("hi")
            .await
            .unwrap_err();
        assert!(err.notice().starts_with("⚠️ Error contacting Ollama"));
    }
}
