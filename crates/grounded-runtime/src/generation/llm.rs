//! Completer backed by an [`LlmProvider`].

use async_trait::async_trait;
use std::sync::Arc;

use grounded_core::{EvidenceSet, Query};

use super::{Completer, Completion, GenerationError, PriorAttempt};
use crate::prompts;
use crate::providers::{complete_with_backoff, CompletionConfig, LlmProvider};
use crate::resilience::CircuitBreaker;

/// Generates drafts with a chat model.
///
/// Rate limits are retried with backoff inside one call. Other failures are
/// recorded on the circuit breaker, which fails fast once it opens.
pub struct LlmCompleter {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    breaker: Arc<CircuitBreaker>,
}

impl LlmCompleter {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            provider,
            config,
            breaker: Arc::new(CircuitBreaker::default()),
        }
    }

    /// Share a breaker with other components calling the same provider.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }
}

#[async_trait]
impl Completer for LlmCompleter {
    async fn complete(
        &self,
        query: &Query,
        evidence: &EvidenceSet,
        prior: Option<PriorAttempt<'_>>,
    ) -> Result<Completion, GenerationError> {
        let provider_name = self.provider.name();
        if self.breaker.is_open(provider_name) {
            return Err(GenerationError::CircuitOpen(provider_name.to_string()));
        }

        let messages = prompts::generation_messages(
            query,
            evidence,
            prior.map(|p| (p.answer, p.verdict)),
        );

        match complete_with_backoff(self.provider.as_ref(), messages, &self.config).await {
            Ok(response) => {
                self.breaker.record_success(provider_name);

                let text = response.content.trim();
                let answer = if text.is_empty() {
                    tracing::warn!(provider = provider_name, "Empty completion, using decline text");
                    prompts::DECLINE_TEXT
                } else {
                    text
                };

                Ok(Completion {
                    answer: answer.into(),
                    usage: response.usage,
                    model: Some(response.model),
                })
            }
            Err(e) => {
                self.breaker.record_failure(provider_name);
                tracing::warn!(provider = provider_name, error = %e, "Completion failed");
                Err(e.into())
            }
        }
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
