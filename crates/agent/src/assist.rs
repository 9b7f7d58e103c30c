//! One-shot prompt completions used by JSON repair and history summarization.
//!
//! The model may be a `"primary,fallback"` chain: the first attempt goes to
//! the primary model, every retry to the fallback.

use crate::retry::RetryPolicy;
use ferroagent_core::error::{Error, ProviderError};
use ferroagent_core::message::Message;
use ferroagent_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use tracing::debug;

const ASSIST_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// A primary model and an optional fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChain {
    pub primary: String,
    pub fallback: Option<String>,
}

impl ModelChain {
    /// Parse `"primary"` or `"primary,fallback"`.
    pub fn parse(chain: &str) -> Self {
        let mut parts = chain.split(',').map(str::trim).filter(|s| !s.is_empty());
        let primary = parts.next().unwrap_or_default().to_string();
        let fallback = parts.next().map(str::to_string);
        Self { primary, fallback }
    }

    /// Model for a 1-based attempt number.
    pub fn for_attempt(&self, attempt: u32) -> &str {
        match (&self.fallback, attempt) {
            (Some(fallback), n) if n > 1 => fallback,
            _ => &self.primary,
        }
    }
}

/// Sends a single prompt and returns the trimmed reply text.
#[derive(Clone)]
pub struct AssistClient {
    provider: Arc<dyn Provider>,
    models: ModelChain,
    temperature: f32,
    retry: RetryPolicy,
}

impl AssistClient {
    pub fn new(provider: Arc<dyn Provider>, model: &str, temperature: f32) -> Self {
        Self {
            provider,
            models: ModelChain::parse(model),
            temperature,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn models(&self) -> &ModelChain {
        &self.models
    }

    /// Complete `prompt`. An empty reply counts as a transient failure.
    pub async fn complete(&self, prompt: &str) -> Result<String, Error> {
        self.retry
            .run(|attempt| {
                let model = self.models.for_attempt(attempt).to_string();
                let request = ProviderRequest::new(
                    model.clone(),
                    vec![Message::system(ASSIST_SYSTEM_PROMPT), Message::user(prompt)],
                    vec![],
                    self.temperature,
                );
                async move {
                    debug!(model = %model, attempt, "Sending assist prompt");
                    let response = self.provider.complete(request).await?;
                    let text = response.message.text().trim().to_string();
                    if text.is_empty() {
                        return Err(ProviderError::EmptyResponse(format!("{model} returned no text")));
                    }
                    Ok(text)
                }
            })
            .await
    }
}

impl std::fmt::Debug for AssistClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistClient")
            .field("provider", &self.provider.name())
            .field("models", &self.models)
            .field("temperature", &self.temperature)
            .finish()
    }
}
