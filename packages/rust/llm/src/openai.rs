//! OpenAI-compatible chat completions (OpenAI, Groq).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use refresh_shared::Result;

use crate::backend::{
    GenerationBackend, GenerationError, GenerationRequest, error_message, http_client,
};

pub struct OpenAiCompatibleBackend {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiCompatibleBackend {
    pub fn new(name: &str, base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: http_client()?,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl GenerationBackend for OpenAiCompatibleBackend {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

        let parsed: ChatResponse = response.json().await.map_err(GenerationError::from_reqwest)?;
        debug!(backend = %self.name, choices = parsed.choices.len(), "chat completion received");

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> GenerationRequest {
        GenerationRequest {
            system: "sys".into(),
            user: "rewrite this".into(),
            temperature: 0.5,
            max_output_tokens: None,
        }
    }

    #[tokio::test]
    async fn sends_chat_request_and_reads_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("groq-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama-3.3-70b-versatile",
                "temperature": 0.5,
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "rewrite this" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "## Better\n\nText" } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = OpenAiCompatibleBackend::new(
            "groq",
            &format!("{}/", server.uri()),
            "groq-key",
            "llama-3.3-70b-versatile",
        )
        .unwrap();

        let text = backend.generate(&request()).await.unwrap();
        assert_eq!(text, "## Better\n\nText");
    }

    #[tokio::test]
    async fn too_many_requests_maps_to_rate_limited() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": "Rate limit reached for model", "type": "tokens" }
            })))
            .mount(&server)
            .await;

        let backend =
            OpenAiCompatibleBackend::new("openai", &server.uri(), "k", "gpt-4o-mini").unwrap();
        let err = backend.generate(&request()).await.unwrap_err();

        assert_eq!(err.status(), Some(429));
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[tokio::test]
    async fn empty_choices_yield_empty_text() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&server)
            .await;

        let backend =
            OpenAiCompatibleBackend::new("openai", &server.uri(), "k", "gpt-4o-mini").unwrap();
        assert_eq!(backend.generate(&request()).await.unwrap(), "");
    }
}
