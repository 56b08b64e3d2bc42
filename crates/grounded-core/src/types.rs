//! Core types for grounded question answering.
//!
//! Everything here is plain data: a query goes in, a [`FinalResult`] comes
//! out, and the [`Verdict`]s in between explain how the loop got there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::evidence::EvidenceSet;

/// An immutable user question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query {
    text: String,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when the question has no visible characters.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Text produced by the completion backend for one query and evidence set.
///
/// Replaced, never appended, on each retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftAnswer {
    text: String,
}

impl DraftAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl From<&str> for DraftAnswer {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for DraftAnswer {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Classification of a draft answer's groundedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    /// Every claim is entailed by the evidence, or the answer declines.
    Supported,
    /// At least one claim is contradicted or has no support.
    Unsupported,
    /// Too little evidence to judge entailment at all.
    Indeterminate,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictKind::Supported => write!(f, "SUPPORTED"),
            VerdictKind::Unsupported => write!(f, "UNSUPPORTED"),
            VerdictKind::Indeterminate => write!(f, "INDETERMINATE"),
        }
    }
}

/// The validator's verdict for one draft answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,

    /// Why the verdict was reached (required for non-supported verdicts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    /// Confidence signal (0.0 - 1.0)
    pub confidence: f64,

    /// Claims that lacked support, fed back into the corrective prompt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_claims: Vec<String>,

    /// The answer explicitly declined for lack of evidence
    #[serde(default)]
    pub declined: bool,
}

impl Verdict {
    /// Every claim was entailed.
    pub fn supported(confidence: f64) -> Self {
        Self {
            kind: VerdictKind::Supported,
            explanation: None,
            confidence: clamp_unit(confidence),
            unsupported_claims: Vec::new(),
            declined: false,
        }
    }

    /// The answer declined to answer; accepted as grounded.
    pub fn declined() -> Self {
        Self {
            kind: VerdictKind::Supported,
            explanation: Some("Answer declines for lack of evidence".to_string()),
            confidence: 1.0,
            unsupported_claims: Vec::new(),
            declined: true,
        }
    }

    pub fn unsupported(
        explanation: impl Into<String>,
        unsupported_claims: Vec<String>,
        confidence: f64,
    ) -> Self {
        Self {
            kind: VerdictKind::Unsupported,
            explanation: Some(explanation.into()),
            confidence: clamp_unit(confidence),
            unsupported_claims,
            declined: false,
        }
    }

    /// The draft could not be decomposed into claims.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::unsupported(format!("Malformed answer: {}", reason.into()), Vec::new(), 0.0)
    }

    /// No (or too little) evidence to evaluate against.
    pub fn indeterminate(explanation: impl Into<String>) -> Self {
        Self {
            kind: VerdictKind::Indeterminate,
            explanation: Some(explanation.into()),
            confidence: 0.0,
            unsupported_claims: Vec::new(),
            declined: false,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.kind == VerdictKind::Supported
    }

    /// Indeterminate verdicts mean "no evidence available", not "wrong answer".
    pub fn is_no_evidence(&self) -> bool {
        self.kind == VerdictKind::Indeterminate
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Terminal status of one control-loop execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Succeeded,
    ExhaustedRetries,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Succeeded => write!(f, "SUCCEEDED"),
            Status::ExhaustedRetries => write!(f, "EXHAUSTED_RETRIES"),
            Status::Failed => write!(f, "FAILED"),
        }
    }
}

/// Why an execution ended in [`Status::Failed`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Caveat attached to a result that did not earn a Supported verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Caveat {
    /// Claims remained unsupported when retries ran out.
    Unverified,
    /// There was never enough evidence to validate against.
    InsufficientEvidence,
}

impl Caveat {
    /// User-facing note appended to the answer text.
    pub fn note(&self) -> &'static str {
        match self {
            Caveat::Unverified => {
                "Note: this response could not be verified against your documents \
                 and may not fully address your question. Please verify the information."
            }
            Caveat::InsufficientEvidence => {
                "Insufficient evidence: too little relevant evidence was found in your documents, \
                 so this response is not grounded in them."
            }
        }
    }
}

/// What the loop hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub status: Status,

    /// Answer text, including the caveat note when one applies
    pub answer: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveat: Option<Caveat>,

    /// The evidence set that grounded the final draft
    pub evidence: EvidenceSet,

    /// Retries consumed (never above the configured maximum)
    pub retries: u32,

    /// One verdict per validated draft, oldest first
    pub verdict_history: Vec<Verdict>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCause>,

    pub completed_at: DateTime<Utc>,
}

impl FinalResult {
    /// Confidently grounded: Supported with no caveat.
    pub fn is_grounded(&self) -> bool {
        self.status == Status::Succeeded
    }

    /// The last verdict, if any draft was validated.
    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.verdict_history.last()
    }

    /// De-duplicated source citations in evidence order.
    pub fn sources(&self) -> Vec<String> {
        self.evidence.citations()
    }

    /// Render the answer for display: answer text, then a sources list.
    pub fn render(&self) -> String {
        let sources = self.sources();
        if sources.is_empty() {
            return self.answer.clone();
        }

        let mut out = self.answer.clone();
        out.push_str("\n\nSources:");
        for source in sources {
            out.push_str("\n- ");
            out.push_str(&source);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceChunk;

    #[test]
    fn test_query_blank() {
        assert!(Query::new("   \n").is_blank());
        assert!(!Query::new("What is the capital?").is_blank());
    }

    #[test]
    fn test_verdict_constructors() {
        let v = Verdict::declined();
        assert!(v.is_supported());
        assert!(v.declined);

        let v = Verdict::indeterminate("no evidence");
        assert!(v.is_no_evidence());
        assert_eq!(v.confidence, 0.0);

        let v = Verdict::supported(1.7);
        assert_eq!(v.confidence, 1.0);

        let v = Verdict::malformed("empty answer");
        assert_eq!(v.kind, VerdictKind::Unsupported);
        assert!(v.explanation.unwrap().contains("Malformed"));
    }

    #[test]
    fn test_render_lists_sources() {
        let evidence = EvidenceSet::from_ranked(
            vec![
                EvidenceChunk::new("The capital is Rivermouth.", "atlas.pdf", 0.9).with_location("3"),
                EvidenceChunk::new("Rivermouth lies on the coast.", "atlas.pdf", 0.8).with_location("3"),
            ],
            4,
        );
        let result = FinalResult {
            status: Status::Succeeded,
            answer: "The capital is Rivermouth.".to_string(),
            caveat: None,
            evidence,
            retries: 0,
            verdict_history: vec![Verdict::supported(1.0)],
            failure: None,
            completed_at: Utc::now(),
        };

        let rendered = result.render();
        assert!(rendered.starts_with("The capital is Rivermouth."));
        assert_eq!(rendered.matches("atlas.pdf (page 3)").count(), 1);
    }

    #[test]
    fn test_failure_cause_serializes_tagged() {
        let cause = FailureCause::GenerationUnavailable("connection refused".to_string());
        let json = serde_json::to_value(&cause).unwrap();
        assert_eq!(json["kind"], "generation_unavailable");
        assert_eq!(json["cause"], "connection refused");
    }
}
