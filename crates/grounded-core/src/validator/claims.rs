//! Decomposition of a draft answer into atomic claims.

use thiserror::Error;

use super::patterns::{self, Terms};

/// A single checkable statement taken from an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// The statement as it appeared in the answer
    pub text: String,

    /// Content terms the evidence must cover
    pub terms: Terms,

    /// Whether the statement is negated ("X is not Y")
    pub negated: bool,
}

impl Claim {
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            terms: patterns::terms(&text),
            negated: patterns::is_negated(&text),
            text,
        }
    }
}

/// The answer could not be decomposed into claims.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedAnswer {
    #[error("answer is empty")]
    Empty,

    #[error("answer contains no checkable statements")]
    NoStatements,
}

/// Claims and declines found in an answer.
#[derive(Debug, Clone, Default)]
pub struct Decomposition {
    pub claims: Vec<Claim>,

    /// Segments that decline to answer for lack of evidence
    pub declines: Vec<String>,
}

impl Decomposition {
    /// Declines only; nothing left to check.
    pub fn is_pure_decline(&self) -> bool {
        self.claims.is_empty() && !self.declines.is_empty()
    }
}

/// Split an answer into claims, setting aside declines and filler.
///
/// Without a question to compare against, any content left in a decline
/// besides its own phrasing is checked as a claim. See [`decompose_for`].
pub fn decompose(answer: &str) -> Result<Decomposition, MalformedAnswer> {
    decompose_for(answer, &Terms::default())
}

/// Split an answer to a question whose content terms are `topic`.
///
/// A segment counts as a decline only when, after removing the decline
/// phrasing, nothing but the question's own terms remains. "No evidence
/// names the capital" declines; "Stonebridge became the capital with no
/// evidence of unrest" is a claim.
pub fn decompose_for(answer: &str, topic: &Terms) -> Result<Decomposition, MalformedAnswer> {
    let cleaned = patterns::strip_markup(answer);
    if cleaned.trim().is_empty() {
        return Err(MalformedAnswer::Empty);
    }

    let mut decomposition = Decomposition::default();
    for segment in patterns::segments(&cleaned) {
        if patterns::is_decline(&segment) {
            let residue = patterns::decline_residue(&segment).without(topic);
            if residue.is_empty() {
                decomposition.declines.push(segment);
            } else {
                decomposition.claims.push(Claim {
                    negated: false,
                    terms: residue,
                    text: segment,
                });
            }
            continue;
        }

        let claim = Claim::parse(segment);
        // Filler such as "Sure!" carries no content terms
        if claim.terms.is_empty() {
            continue;
        }
        decomposition.claims.push(claim);
    }

    if decomposition.claims.is_empty() && decomposition.declines.is_empty() {
        return Err(MalformedAnswer::NoStatements);
    }

    Ok(decomposition)
}
