//! Google Gemini `generateContent` client.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chat::core::config::InferenceConfig;
use crate::llm::{GenerateFuture, InferenceClient, InferenceError, http_client};

const PROVIDER: &str = "gemini";

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Gemini client authenticated with an API key.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client from config.
    ///
    /// # Errors
    /// Returns an error if no API key is configured or the HTTP client cannot be built.
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| InferenceError::InvalidConfig("gemini api key is missing".to_string()))?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url(),
            config.model
        );
        Ok(Self {
            client: http_client(config)?,
            endpoint,
            api_key,
        })
    }

    async fn post_generate(&self, prompt: &str) -> Result<String, InferenceError> {
        let request = GenerateContentRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
        };
        let transport = |source| InferenceError::Transport {
            provider: PROVIDER,
            source,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        // Error payloads arrive with non-success statuses; decode before checking.
        let body: GenerateContentResponse = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(InferenceError::Status {
                    provider: PROVIDER,
                    status: status.as_u16(),
                });
            }
            Err(err) => return Err(transport(err)),
        };

        if let Some(candidate) = body.candidates.into_iter().next() {
            let text: String = candidate
                .content
                .map(|content| content.parts)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|part| part.text)
                .collect();
            if !text.is_empty() {
                return Ok(text);
            }
        }
        if let Some(error) = body.error {
            return Err(InferenceError::Api {
                provider: PROVIDER,
                message: error.message,
            });
        }
        if !status.is_success() {
            return Err(InferenceError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }
        Err(InferenceError::EmptyResponse { provider: PROVIDER })
    }
}

impl InferenceClient for GeminiClient {
    fn generate(&self, prompt: &str) -> GenerateFuture<'_, Result<String, InferenceError>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            let result = self.post_generate(&prompt).await;
            match &result {
                Ok(text) => debug!(chars = text.len(), "gemini reply received"),
                Err(err) => warn!(error = %err, "gemini generation failed"),
            }
            result
        })
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GeminiClient {
        let config = InferenceConfig {
            base_url: Some(server.uri()),
            api_key: Some("test-key".to_string()),
            ..InferenceConfig::default()
        };
        GeminiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Idea: eco packaging" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "Use biodegradable materials." }] } }]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .generate("Idea: eco packaging")
            .await
            .unwrap();
        assert_eq!(reply, "Use biodegradable materials.");
    }

    #[tokio::test]
    async fn test_api_error_payload_becomes_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "code": 429, "message": "Resource has been exhausted" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("hi").await.unwrap_err();
        assert_eq!(err.notice(), "⚠️ Gemini Error: Resource has been exhausted");
    }

    #[tokio::test]
    async fn test_empty_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("hi").await.unwrap_err();
        assert!(matches!(err, InferenceError::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_non_json_failure_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = client_for(&server).generate("hi").await.unwrap_err();
        assert!(matches!(err, InferenceError::Status { status: 502, .. }));
    }
}
