//! Async validators.
//!
//! The loop only needs a verdict per draft. [`AnswerValidator`] produces one
//! deterministically from the evidence; [`LlmJudge`] asks a second model call
//! instead. Both keep the same contract: too little evidence is Indeterminate,
//! an explicit decline is Supported, and nothing here returns an error.

use async_trait::async_trait;
use std::sync::Arc;

use grounded_core::validator::{decompose_for, patterns};
use grounded_core::{AnswerValidator, DraftAnswer, EvidenceSet, Query, Verdict};

use crate::prompts;
use crate::providers::{complete_with_backoff, CompletionConfig, LlmProvider, TokenUsage};
use crate::resilience::CircuitBreaker;

/// A verdict and what it cost to reach.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub verdict: Verdict,
    pub usage: TokenUsage,

    /// Set when a model was called
    pub model: Option<String>,
}

impl From<Verdict> for Assessment {
    fn from(verdict: Verdict) -> Self {
        Self {
            verdict,
            usage: TokenUsage::default(),
            model: None,
        }
    }
}

/// Scores a draft against the evidence it was generated from.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn assess(&self, query: &Query, answer: &DraftAnswer, evidence: &EvidenceSet)
        -> Assessment;

    fn name(&self) -> &str;
}

#[async_trait]
impl Validator for AnswerValidator {
    async fn assess(
        &self,
        query: &Query,
        answer: &DraftAnswer,
        evidence: &EvidenceSet,
    ) -> Assessment {
        self.validate_for(query, answer, evidence).into()
    }

    fn name(&self) -> &str {
        "claims"
    }
}

/// Validator that asks a chat model for `VALID` or `INVALID: <reason>`.
pub struct LlmJudge {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    breaker: Arc<CircuitBreaker>,

    /// Supplies the evidence minimum and decline detection
    rules: AnswerValidator,
}

impl LlmJudge {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: CompletionConfig,
        rules: AnswerValidator,
    ) -> Self {
        Self {
            provider,
            config,
            breaker: Arc::new(CircuitBreaker::default()),
            rules,
        }
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }
}

/// Read the judge's reply. `None` if it follows neither form.
pub fn parse_judgement(reply: &str) -> Option<Verdict> {
    let reply = reply.trim();
    let upper = reply.to_uppercase();

    if upper.starts_with("INVALID") {
        let reason = reply
            .get("INVALID".len()..)
            .unwrap_or_default()
            .trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace())
            .trim();
        let reason = if reason.is_empty() {
            "Judge rejected the answer without a reason"
        } else {
            reason
        };
        return Some(Verdict::unsupported(reason, Vec::new(), 0.0));
    }

    if upper.starts_with("VALID") {
        return Some(Verdict::supported(1.0));
    }

    None
}

#[async_trait]
impl Validator for LlmJudge {
    async fn assess(
        &self,
        query: &Query,
        answer: &DraftAnswer,
        evidence: &EvidenceSet,
    ) -> Assessment {
        if self.rules.lacks_evidence(evidence) {
            return Verdict::indeterminate(format!(
                "{} evidence chunk(s) retrieved; at least {} required to validate",
                evidence.len(),
                self.rules.config().min_evidence.max(1)
            ))
            .into();
        }

        match decompose_for(answer.text(), &patterns::terms(query.text())) {
            Ok(parts) if parts.is_pure_decline() => return Verdict::declined().into(),
            Ok(_) => {}
            Err(reason) => {
                tracing::warn!(reason = %reason, "Malformed answer");
                return Verdict::malformed(reason.to_string()).into();
            }
        }

        let provider_name = self.provider.name();
        if self.breaker.is_open(provider_name) {
            tracing::warn!(provider = provider_name, "Judge circuit open, rejecting draft");
            return Verdict::unsupported("Judge unavailable: circuit open", Vec::new(), 0.0).into();
        }

        let messages = prompts::judge_messages(query, evidence, answer);
        match complete_with_backoff(self.provider.as_ref(), messages, &self.config).await {
            Ok(response) => {
                self.breaker.record_success(provider_name);
                let verdict = parse_judgement(&response.content).unwrap_or_else(|| {
                    tracing::warn!(reply = %response.content, "Unparsable judge reply");
                    Verdict::unsupported("Judge reply could not be parsed", Vec::new(), 0.0)
                });
                Assessment {
                    verdict,
                    usage: response.usage,
                    model: Some(response.model),
                }
            }
            Err(e) => {
                self.breaker.record_failure(provider_name);
                tracing::warn!(provider = provider_name, error = %e, "Judge call failed");
                Verdict::unsupported(format!("Judge unavailable: {}", e), Vec::new(), 0.0).into()
            }
        }
    }

    fn name(&self) -> &str {
        "llm_judge"
    }
}
