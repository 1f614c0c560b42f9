//! The generation backend seam and its error type.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use refresh_shared::{BackendKind, GenerationConfig, RefreshError, Result};

use crate::gemini::GeminiBackend;
use crate::openai::OpenAiCompatibleBackend;

/// Timeout for a single generation call.
pub(crate) const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider error bodies are cut to this many characters before logging.
pub(crate) const MAX_ERROR_BODY_CHARS: usize = 500;

/// Fallback detection for providers that report throttling only in text.
static RATE_LIMIT_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b429\b|rate[ _-]?limit|quota|resource[ _-]?exhausted")
        .expect("valid rate limit pattern")
});

static AUTH_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)api key not valid|invalid api key|unauthori[sz]ed")
        .expect("valid auth pattern")
});

/// One system + user prompt with sampling parameters.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
}

/// Why a generation call produced no text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never got a response (DNS, timeout, reset).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The response body did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl GenerationError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Provider-side throttling or quota exhaustion.
    ///
    /// Uses the HTTP status when there is one. Errors without a status fall
    /// back to matching the message text.
    pub fn is_rate_limited(&self) -> bool {
        match self.status() {
            Some(status) => status == 429,
            None => RATE_LIMIT_TEXT.is_match(&self.to_string()),
        }
    }

    /// The provider rejected our credentials. Gemini reports a bad key as a
    /// plain 400, so the message is checked too.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403)) || AUTH_TEXT.is_match(&self.to_string())
    }

    /// The request URL is dropped first; some providers carry the key in the query.
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        let e = e.without_url();
        match e.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None if e.is_decode() => Self::Malformed(e.to_string()),
            None => Self::Transport(e.to_string()),
        }
    }
}

/// A text generation provider.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a completion for `request`. The text is returned untrimmed.
    async fn generate(&self, request: &GenerationRequest)
    -> std::result::Result<String, GenerationError>;

    /// Provider name for tracing.
    fn name(&self) -> &str;
}

/// Construct the backend selected by `config.backend`.
pub fn build_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    let backend: Arc<dyn GenerationBackend> = match config.backend {
        BackendKind::Gemini => Arc::new(GeminiBackend::new(
            &config.endpoint,
            &config.api_key,
            &config.model,
        )?),
        BackendKind::OpenAi | BackendKind::Groq => Arc::new(OpenAiCompatibleBackend::new(
            config.backend.as_str(),
            &config.endpoint,
            &config.api_key,
            &config.model,
        )?),
    };
    Ok(backend)
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(GENERATION_TIMEOUT)
        .build()
        .map_err(|e| RefreshError::Network(format!("failed to build HTTP client: {e}")))
}

/// Pull a readable message out of an error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string());
    refresh_shared::truncate_chars(&message, MAX_ERROR_BODY_CHARS).to_string()
}
