//! Claim entailment scoring.
//!
//! The scoring function is pluggable: [`EntailmentScorer`] decides whether a
//! single claim is supported by an evidence set. [`LexicalEntailment`] is the
//! default, a deterministic content-term containment check. NLI models or
//! LLM-backed scorers can be substituted without touching the verdict policy.

use std::cmp::Ordering;

use crate::evidence::EvidenceSet;

use super::claims::Claim;
use super::patterns::{self, Terms};

/// How one claim relates to the evidence.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimSupport {
    /// The claim is entailed by the chunk at `chunk`
    Entailed { chunk: usize, coverage: f64 },

    /// A chunk covers the claim's subject but disagrees with it
    Contradicted { chunk: usize, reason: String },

    /// Nothing in the evidence supports the claim
    NoSupport { best_coverage: f64 },
}

impl ClaimSupport {
    pub fn is_entailed(&self) -> bool {
        matches!(self, ClaimSupport::Entailed { .. })
    }
}

/// Decides entailment of a single claim.
///
/// Implementations must be deterministic for the control loop's retry
/// accounting to be reproducible.
pub trait EntailmentScorer: Send + Sync {
    fn assess(&self, claim: &Claim, evidence: &EvidenceSet) -> ClaimSupport;

    /// Scorer name for logs.
    fn name(&self) -> &'static str;
}

/// Content-term containment with number and polarity checks.
///
/// A claim is entailed by a chunk when at least `threshold` of its content
/// terms occur in the chunk, every number and every capitalized name it
/// states occurs there too, and the best-matching sentence has the same
/// polarity. A name found nowhere in the evidence rules the claim out
/// whatever its coverage: swapping one name is the commonest fabrication.
#[derive(Debug, Clone)]
pub struct LexicalEntailment {
    threshold: f64,
}

impl LexicalEntailment {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(f64::EPSILON, 1.0),
        }
    }

    fn coverage(claim: &Terms, passage: &Terms) -> f64 {
        if claim.words.is_empty() {
            return 1.0;
        }
        let hits = claim
            .words
            .iter()
            .filter(|w| passage.words.contains(*w))
            .count();
        hits as f64 / claim.words.len() as f64
    }

    /// Polarity of the chunk sentence that best covers the claim.
    fn best_sentence_negated(claim: &Claim, chunk_text: &str) -> Option<bool> {
        patterns::segments(chunk_text)
            .iter()
            .map(|s| {
                (
                    Self::coverage(&claim.terms, &patterns::terms(s)),
                    patterns::is_negated(s),
                )
            })
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
            .map(|(_, negated)| negated)
    }
}

impl Default for LexicalEntailment {
    fn default() -> Self {
        Self::new(super::DEFAULT_SUPPORT_THRESHOLD)
    }
}

impl EntailmentScorer for LexicalEntailment {
    fn assess(&self, claim: &Claim, evidence: &EvidenceSet) -> ClaimSupport {
        let mut best_coverage: f64 = 0.0;
        let mut contradiction: Option<(usize, String)> = None;

        for (index, chunk) in evidence.iter().enumerate() {
            let text = patterns::strip_markup(&chunk.text);
            // Whole-chunk terms let a claim combine adjacent sentences
            let chunk_terms = patterns::terms(&text);
            let coverage = Self::coverage(&claim.terms, &chunk_terms);
            best_coverage = best_coverage.max(coverage);

            if coverage < self.threshold || !claim.terms.names.is_subset(&chunk_terms.words) {
                continue;
            }

            if !claim.terms.numbers.is_subset(&chunk_terms.numbers) {
                if !chunk_terms.numbers.is_empty() && contradiction.is_none() {
                    contradiction = Some((
                        index,
                        format!("figures differ from {}", chunk.citation()),
                    ));
                }
                continue;
            }

            let polarity_matches = Self::best_sentence_negated(claim, &text)
                .map(|negated| negated == claim.negated)
                .unwrap_or(true);

            if polarity_matches {
                return ClaimSupport::Entailed {
                    chunk: index,
                    coverage,
                };
            }

            if contradiction.is_none() {
                contradiction = Some((
                    index,
                    format!("negation conflicts with {}", chunk.citation()),
                ));
            }
        }

        match contradiction {
            Some((chunk, reason)) => ClaimSupport::Contradicted { chunk, reason },
            None => ClaimSupport::NoSupport { best_coverage },
        }
    }

    fn name(&self) -> &'static str {
        "lexical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceChunk;

    fn evidence(texts: &[&str]) -> EvidenceSet {
        EvidenceSet::from_ranked(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| EvidenceChunk::new(*t, "atlas.pdf", 1.0 - i as f64 * 0.1))
                .collect(),
            10,
        )
    }

    #[test]
    fn test_exact_statement_is_entailed() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("The capital is Rivermouth"),
            &evidence(&["The capital is Rivermouth."]),
        );
        assert!(support.is_entailed());
    }

    #[test]
    fn test_paraphrase_with_meta_words_is_entailed() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("According to the documents, Rivermouth is the capital"),
            &evidence(&["Population figures aside, the capital is Rivermouth."]),
        );
        assert!(support.is_entailed());
    }

    #[test]
    fn test_fabricated_name_has_no_support() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("The capital of the demo country is Stonebridge"),
            &evidence(&["The demo country has a population of 4.2 million people."]),
        );
        assert!(matches!(support, ClaimSupport::NoSupport { .. }));
    }

    #[test]
    fn test_swapped_name_has_no_support() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("The capital of the demo country is Stonebridge"),
            &evidence(&["The capital of the demo country is Rivermouth."]),
        );
        assert!(matches!(support, ClaimSupport::NoSupport { .. }));

        let support = scorer.assess(
            &Claim::parse("Stonebridge is the capital of the demo country"),
            &evidence(&["Rivermouth is the capital of the demo country."]),
        );
        assert!(matches!(support, ClaimSupport::NoSupport { .. }));
    }

    #[test]
    fn test_name_must_share_a_chunk_with_the_claim() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("The capital of the demo country is Stonebridge"),
            &evidence(&[
                "The capital of the demo country is Rivermouth.",
                "Stonebridge is a fishing village.",
            ]),
        );
        assert!(!support.is_entailed());
    }

    #[test]
    fn test_wrong_figure_is_contradicted() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("The population is 5 million"),
            &evidence(&["The population is 4.2 million."]),
        );
        assert!(matches!(support, ClaimSupport::Contradicted { .. }));
    }

    #[test]
    fn test_flipped_polarity_is_contradicted() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("Rivermouth is not the capital"),
            &evidence(&["The capital is Rivermouth."]),
        );
        assert!(matches!(support, ClaimSupport::Contradicted { .. }));
    }

    #[test]
    fn test_later_chunk_can_entail() {
        let scorer = LexicalEntailment::default();
        let support = scorer.assess(
            &Claim::parse("Rivermouth lies on the coast"),
            &evidence(&["Unrelated text about trade.", "Rivermouth lies on the coast."]),
        );
        assert_eq!(
            support,
            ClaimSupport::Entailed {
                chunk: 1,
                coverage: 1.0
            }
        );
    }
}
