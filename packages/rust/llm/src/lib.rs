//! Article rewriting through a hosted language model.
//!
//! [`RewriteRequester`] turns an original article plus reference texts into a
//! single generation call. Providers implement [`GenerationBackend`]; the
//! shipped ones are [`GeminiBackend`] and [`OpenAiCompatibleBackend`], chosen
//! at startup by [`build_backend`].

mod backend;
mod gemini;
mod openai;
pub mod prompt;

use std::sync::Arc;

use tracing::{info, instrument, warn};

use refresh_shared::GenerationConfig;

pub use backend::{GenerationBackend, GenerationError, GenerationRequest, build_backend};
pub use gemini::GeminiBackend;
pub use openai::OpenAiCompatibleBackend;

/// Fewest references a rewrite is attempted with.
pub const MIN_REFERENCES: usize = 2;

/// What a rewrite attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    /// Trimmed, non-empty model output.
    Rewritten(String),
    /// Inputs did not qualify; the provider was not called.
    NotAttempted,
    /// The provider answered with blank text.
    Empty,
    /// The provider call failed.
    Failed(GenerationError),
}

impl RewriteOutcome {
    /// The rewritten text, or "" for every other outcome.
    pub fn text(&self) -> &str {
        match self {
            Self::Rewritten(text) => text,
            _ => "",
        }
    }

    /// The provider refused on policy grounds: throttling, quota or credentials.
    pub fn is_provider_refusal(&self) -> bool {
        matches!(self, Self::Failed(e) if e.is_rate_limited() || e.is_auth_failure())
    }
}

/// Issues one rewrite generation call per article.
#[derive(Clone)]
pub struct RewriteRequester {
    backend: Arc<dyn GenerationBackend>,
    temperature: f32,
    max_output_tokens: Option<u32>,
}

impl RewriteRequester {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        temperature: f32,
        max_output_tokens: Option<u32>,
    ) -> Self {
        Self {
            backend,
            temperature,
            max_output_tokens,
        }
    }

    pub fn from_config(backend: Arc<dyn GenerationBackend>, config: &GenerationConfig) -> Self {
        Self::new(backend, config.temperature, config.max_output_tokens)
    }

    /// Rewrite `original` using `references` as style guidance.
    ///
    /// Needs a non-blank original and at least [`MIN_REFERENCES`] references;
    /// otherwise nothing is sent. Makes at most one provider call and never
    /// retries.
    #[instrument(skip_all, fields(backend = self.backend.name(), references = references.len()))]
    pub async fn rewrite(&self, original: &str, references: &[String]) -> RewriteOutcome {
        if original.trim().is_empty() || references.len() < MIN_REFERENCES {
            warn!("rewrite skipped: missing original or too few references");
            return RewriteOutcome::NotAttempted;
        }

        let request = GenerationRequest {
            system: prompt::SYSTEM_PROMPT.to_string(),
            user: prompt::build_rewrite_prompt(original, references),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };

        match self.backend.generate(&request).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    warn!("provider returned empty text");
                    RewriteOutcome::Empty
                } else {
                    info!(chars = text.chars().count(), "article rewritten");
                    RewriteOutcome::Rewritten(text.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, rate_limited = e.is_rate_limited(), "rewrite failed");
                RewriteOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    /// Backend that replays a fixed reply and records what it was sent.
    struct ScriptedBackend {
        reply: std::result::Result<String, GenerationError>,
        calls: AtomicUsize,
        last: Mutex<Option<GenerationRequest>>,
    }

    impl ScriptedBackend {
        fn new(reply: std::result::Result<String, GenerationError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(
            &self,
            request: &GenerationRequest,
        ) -> std::result::Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            self.reply.clone()
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn refs(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("reference body {i}")).collect()
    }

    #[tokio::test]
    async fn one_reference_makes_no_call() {
        let backend = ScriptedBackend::new(Ok("unused".into()));
        let requester = RewriteRequester::new(backend.clone(), 0.7, Some(2000));

        let outcome = requester.rewrite("Original body", &refs(1)).await;
        assert_eq!(outcome, RewriteOutcome::NotAttempted);
        assert_eq!(outcome.text(), "");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_original_makes_no_call() {
        let backend = ScriptedBackend::new(Ok("unused".into()));
        let requester = RewriteRequester::new(backend.clone(), 0.7, None);

        assert_eq!(
            requester.rewrite("  \n ", &refs(2)).await,
            RewriteOutcome::NotAttempted
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn output_is_trimmed_and_request_carries_settings() {
        let backend = ScriptedBackend::new(Ok("\n  ## Rewritten\n\nBody  \n".into()));
        let requester = RewriteRequester::new(backend.clone(), 0.4, None);

        let outcome = requester.rewrite("Original body", &refs(2)).await;
        assert_eq!(outcome.text(), "## Rewritten\n\nBody");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let sent = backend.last.lock().unwrap().clone().unwrap();
        assert_eq!(sent.system, prompt::SYSTEM_PROMPT);
        assert!(sent.user.contains("Original body"));
        assert!(sent.user.contains("Reference 2:\nreference body 2"));
        assert_eq!(sent.temperature, 0.4);
        assert_eq!(sent.max_output_tokens, None);
    }

    #[tokio::test]
    async fn blank_reply_is_empty() {
        let backend = ScriptedBackend::new(Ok("   ".into()));
        let requester = RewriteRequester::new(backend, 0.7, None);
        assert_eq!(
            requester.rewrite("Original", &refs(2)).await,
            RewriteOutcome::Empty
        );
    }

    #[tokio::test]
    async fn failure_is_absorbed_and_classified() {
        let backend = ScriptedBackend::new(Err(GenerationError::Status {
            status: 429,
            message: "quota".into(),
        }));
        let requester = RewriteRequester::new(backend.clone(), 0.7, None);

        let outcome = requester.rewrite("Original", &refs(2)).await;
        assert!(outcome.is_provider_refusal());
        assert_eq!(outcome.text(), "");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_not_a_refusal() {
        let backend = ScriptedBackend::new(Err(GenerationError::Transport(
            "connection refused".into(),
        )));
        let requester = RewriteRequester::new(backend, 0.7, None);
        let outcome = requester.rewrite("Original", &refs(3)).await;
        assert!(matches!(outcome, RewriteOutcome::Failed(_)));
        assert!(!outcome.is_provider_refusal());
    }

    #[tokio::test]
    async fn rejected_key_is_a_refusal() {
        let backend = ScriptedBackend::new(Err(GenerationError::Status {
            status: 403,
            message: "forbidden".into(),
        }));
        let requester = RewriteRequester::new(backend, 0.7, None);
        let outcome = requester.rewrite("Original", &refs(2)).await;
        assert!(outcome.is_provider_refusal());
    }
}
