//! Finalizer: turns a terminal workflow state into a [`FinalResult`].
//!
//! Policy:
//! 1. Succeeded → the draft that earned the verdict, with exactly its evidence
//! 2. ExhaustedRetries → best available answer plus a caveat note
//!    (INSUFFICIENT_EVIDENCE if the last verdict was Indeterminate,
//!    UNVERIFIED otherwise)
//! 3. Failed → "unable to answer" with the cause; nothing partial is exposed
//!
//! An unsupported draft is never returned without its caveat.

use chrono::Utc;

use crate::evidence::EvidenceSet;
use crate::types::{Caveat, FailureCause, FinalResult, Status};
use crate::workflow::{LoopPolicy, Phase, WorkflowState};

/// Returned instead of an unverified draft when surfacing is disabled.
pub const FALLBACK_REFUSAL: &str =
    "I'm unable to answer this question from the available documents.";

/// Build the final result for a terminal state.
///
/// A non-terminal state is a driver bug; it is reported as a Failed result
/// rather than a panic.
pub fn finalize(state: WorkflowState, policy: &LoopPolicy) -> FinalResult {
    match state.phase() {
        Phase::Succeeded => succeeded(state),
        Phase::ExhaustedRetries => exhausted(state, policy),
        Phase::Failed => {
            let cause = state.failure.clone().unwrap_or_else(|| {
                FailureCause::InvalidTransition("failed without a cause".to_string())
            });
            failed(cause, state.retries)
        }
        phase => failed(
            FailureCause::InvalidTransition(format!("finalized in non-terminal phase '{}'", phase)),
            state.retries,
        ),
    }
}

fn succeeded(state: WorkflowState) -> FinalResult {
    let answer = state
        .answer
        .map(|a| a.into_text())
        .unwrap_or_default();

    tracing::info!(retries = state.retries, chunks = state.evidence.len(), "Answer grounded");

    FinalResult {
        status: Status::Succeeded,
        answer,
        caveat: None,
        evidence: state.evidence,
        retries: state.retries,
        verdict_history: state.verdict_history,
        failure: None,
        completed_at: Utc::now(),
    }
}

fn exhausted(state: WorkflowState, policy: &LoopPolicy) -> FinalResult {
    let caveat = match state.verdict_history.last() {
        Some(v) if v.is_no_evidence() => Caveat::InsufficientEvidence,
        _ => Caveat::Unverified,
    };

    let body = match state.answer {
        Some(draft) if policy.surface_unverified => draft.into_text(),
        _ => FALLBACK_REFUSAL.to_string(),
    };

    tracing::info!(
        retries = state.retries,
        caveat = ?caveat,
        surfaced = policy.surface_unverified,
        "Retries exhausted"
    );

    FinalResult {
        status: Status::ExhaustedRetries,
        answer: format!("{}\n\n{}", body.trim_end(), caveat.note()),
        caveat: Some(caveat),
        evidence: state.evidence,
        retries: state.retries,
        verdict_history: state.verdict_history,
        failure: None,
        completed_at: Utc::now(),
    }
}

/// A Failed result for `cause`. Carries no evidence, draft, or verdicts.
pub fn failed(cause: FailureCause, retries: u32) -> FinalResult {
    tracing::info!(cause = %cause, retries, "Query failed");

    FinalResult {
        status: Status::Failed,
        answer: format!("Unable to answer: {}", cause),
        caveat: None,
        evidence: EvidenceSet::empty(),
        retries,
        verdict_history: Vec::new(),
        failure: Some(cause),
        completed_at: Utc::now(),
    }
}
