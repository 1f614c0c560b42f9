//! Google Generative Language API (Gemini and Gemma models).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use refresh_shared::Result;

use crate::backend::{
    GenerationBackend, GenerationError, GenerationRequest, error_message, http_client,
};

pub struct GeminiBackend {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiBackend {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: http_client()?,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationParams,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationError> {
        // Gemma models reject systemInstruction, so the system text leads the user turn.
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: format!("{}\n\n{}", request.system, request.user),
                }],
            }],
            generation_config: GenerationParams {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(GenerationError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(GenerationError::from_reqwest)?;
        debug!(model = %self.model, candidates = parsed.candidates.len(), "content generated");

        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "sys".into(),
            user: "rewrite this".into(),
            temperature: 0.5,
            max_output_tokens: Some(2000),
        }
    }

    #[tokio::test]
    async fn posts_generate_content_and_joins_parts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemma-3-27b-it:generateContent"))
            .and(header("x-goog-api-key", "gem-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "sys\n\nrewrite this" }] }],
                "generationConfig": { "temperature": 0.5, "maxOutputTokens": 2000 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "## Title" }, { "text": "\n\nBody" }] },
                    "finishReason": "STOP"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&server.uri(), "gem-key", "gemma-3-27b-it").unwrap();
        let text = backend.generate(&request()).await.unwrap();
        assert_eq!(text, "## Title\n\nBody");
    }

    #[tokio::test]
    async fn resource_exhausted_is_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&server.uri(), "k", "gemma-3-27b-it").unwrap();
        let err = backend.generate(&request()).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("Resource has been exhausted"));
    }

    #[tokio::test]
    async fn invalid_key_is_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "code": 400, "message": "API key not valid. Please pass a valid API key." }
            })))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&server.uri(), "bad", "gemma-3-27b-it").unwrap();
        let err = backend.generate(&request()).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.is_auth_failure());
        assert!(!err.is_rate_limited());
    }

    #[tokio::test]
    async fn no_candidates_is_empty_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let backend = GeminiBackend::new(&server.uri(), "k", "gemma-3-27b-it").unwrap();
        assert_eq!(backend.generate(&request()).await.unwrap(), "");
    }

    #[tokio::test]
    async fn unreachable_host_error_does_not_carry_key() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let backend = GeminiBackend::new(
            &format!("http://127.0.0.1:{port}"),
            "gem-secret-key",
            "gemma-3-27b-it",
        )
        .unwrap();
        let err = backend.generate(&request()).await.unwrap_err();

        assert!(matches!(err, GenerationError::Transport(_)));
        assert!(!err.to_string().contains("gem-secret-key"));
        assert!(!format!("{err:?}").contains("gem-secret-key"));
    }
}
