//! Answer validation: is a draft grounded in the retrieved evidence?
//!
//! # Verdict policy
//! 1. Evidence empty or below the minimum size → INDETERMINATE
//! 2. Answer cannot be decomposed into claims → UNSUPPORTED (malformed)
//! 3. Answer only declines for lack of evidence → SUPPORTED (a decline
//!    carrying content beyond the question's terms is checked as a claim)
//! 4. Every claim entailed by some chunk → SUPPORTED
//! 5. Otherwise → UNSUPPORTED, naming the claims that lack support
//!
//! The validator never fails. Whatever it is given, it returns a verdict.

mod claims;
mod entailment;
pub mod patterns;

pub use claims::{decompose, decompose_for, Claim, Decomposition, MalformedAnswer};
pub use entailment::{ClaimSupport, EntailmentScorer, LexicalEntailment};

use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceSet;
use crate::types::{DraftAnswer, Query, Verdict};

/// Fraction of a claim's content terms a chunk must contain.
pub const DEFAULT_SUPPORT_THRESHOLD: f64 = 0.75;

/// Smallest evidence set that can be validated against.
pub const DEFAULT_MIN_EVIDENCE: usize = 1;

/// Validator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Minimum evidence chunks for a determinate verdict
    pub min_evidence: usize,

    /// Entailment threshold for the lexical scorer (0.0 - 1.0]
    pub support_threshold: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_evidence: DEFAULT_MIN_EVIDENCE,
            support_threshold: DEFAULT_SUPPORT_THRESHOLD,
        }
    }
}

/// Scores draft answers against an evidence set.
pub struct AnswerValidator {
    config: ValidatorConfig,
    scorer: Box<dyn EntailmentScorer>,
}

impl AnswerValidator {
    /// Create a validator using lexical entailment.
    pub fn new(config: ValidatorConfig) -> Self {
        let scorer = Box::new(LexicalEntailment::new(config.support_threshold));
        Self { config, scorer }
    }

    /// Create a validator with a custom scoring function.
    pub fn with_scorer(config: ValidatorConfig, scorer: Box<dyn EntailmentScorer>) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Evidence too thin to judge entailment at all.
    pub fn lacks_evidence(&self, evidence: &EvidenceSet) -> bool {
        evidence.is_empty() || evidence.len() < self.config.min_evidence
    }

    /// Validate a draft answer against the evidence that produced it.
    ///
    /// Without the question, a decline that names its topic ("nothing about
    /// the capital") is checked like a claim. Prefer [`validate_for`].
    ///
    /// [`validate_for`]: AnswerValidator::validate_for
    pub fn validate(&self, answer: &DraftAnswer, evidence: &EvidenceSet) -> Verdict {
        self.check(answer, evidence, &patterns::Terms::default())
    }

    /// Validate a draft answer to `query`.
    pub fn validate_for(
        &self,
        query: &Query,
        answer: &DraftAnswer,
        evidence: &EvidenceSet,
    ) -> Verdict {
        self.check(answer, evidence, &patterns::terms(query.text()))
    }

    fn check(
        &self,
        answer: &DraftAnswer,
        evidence: &EvidenceSet,
        topic: &patterns::Terms,
    ) -> Verdict {
        if self.lacks_evidence(evidence) {
            return Verdict::indeterminate(format!(
                "{} evidence chunk(s) retrieved; at least {} required to validate",
                evidence.len(),
                self.config.min_evidence.max(1)
            ));
        }

        let decomposition = match decompose_for(answer.text(), topic) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed answer, treating as unsupported");
                return Verdict::malformed(e.to_string());
            }
        };

        if decomposition.is_pure_decline() {
            tracing::debug!("Answer declines for lack of evidence");
            return Verdict::declined();
        }

        let total = decomposition.claims.len();
        let mut unsupported = Vec::new();
        let mut contradicted = 0usize;
        let mut min_coverage: f64 = 1.0;

        for claim in &decomposition.claims {
            match self.scorer.assess(claim, evidence) {
                ClaimSupport::Entailed { coverage, .. } => {
                    min_coverage = min_coverage.min(coverage);
                }
                ClaimSupport::Contradicted { reason, .. } => {
                    tracing::debug!(claim = %claim.text, reason = %reason, "Claim contradicted");
                    contradicted += 1;
                    unsupported.push(claim.text.clone());
                }
                ClaimSupport::NoSupport { best_coverage } => {
                    tracing::debug!(claim = %claim.text, best_coverage, "Claim unsupported");
                    unsupported.push(claim.text.clone());
                }
            }
        }

        if unsupported.is_empty() {
            return Verdict::supported(min_coverage);
        }

        let quoted = unsupported
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join("; ");
        let explanation = if contradicted > 0 {
            format!(
                "{} of {} claim(s) unsupported, {} contradicted by the evidence: {}",
                unsupported.len(),
                total,
                contradicted,
                quoted
            )
        } else {
            format!(
                "{} of {} claim(s) have no support in the evidence: {}",
                unsupported.len(),
                total,
                quoted
            )
        };

        let confidence = (total - unsupported.len()) as f64 / total as f64;
        Verdict::unsupported(explanation, unsupported, confidence)
    }
}

impl Default for AnswerValidator {
    fn default() -> Self {
        Self::new(ValidatorConfig::default())
    }
}

impl std::fmt::Debug for AnswerValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerValidator")
            .field("config", &self.config)
            .field("scorer", &self.scorer.name())
            .finish()
    }
}
