//! Completion backends.
//!
//! A [`Completer`] turns a question and its evidence into a draft answer. On
//! a retry it also receives the previous draft and the verdict that rejected
//! it, so the prompt can ask for a correction.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use grounded_core::{DraftAnswer, EvidenceSet, Query, Verdict};

use crate::providers::{ProviderError, TokenUsage};

mod llm;

pub use llm::LlmCompleter;

/// Errors from completion backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Completion backend unavailable: {0}")]
    Unavailable(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit open for provider '{0}'")]
    CircuitOpen(String),
}

impl From<ProviderError> for GenerationError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Timeout(after) => GenerationError::Timeout(after),
            other => GenerationError::Unavailable(other.to_string()),
        }
    }
}

/// The rejected draft a corrective retry responds to.
#[derive(Debug, Clone, Copy)]
pub struct PriorAttempt<'a> {
    pub answer: &'a DraftAnswer,
    pub verdict: &'a Verdict,
}

/// A generated draft and what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub answer: DraftAnswer,
    pub usage: TokenUsage,

    /// Model that produced the draft, when the backend reports one
    pub model: Option<String>,
}

impl Completion {
    /// A draft with no usage accounting.
    pub fn text(answer: impl Into<DraftAnswer>) -> Self {
        Self {
            answer: answer.into(),
            usage: TokenUsage::default(),
            model: None,
        }
    }
}

/// Produces draft answers from evidence.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        query: &Query,
        evidence: &EvidenceSet,
        prior: Option<PriorAttempt<'_>>,
    ) -> Result<Completion, GenerationError>;

    /// Backend name for logs.
    fn name(&self) -> &str;
}
