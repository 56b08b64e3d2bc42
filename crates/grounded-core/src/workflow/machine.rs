//! The control-loop transition function.
//!
//! The loop is an explicit finite-state machine. The driver performs the
//! [`Effect`] it is handed, reports the outcome as an [`Event`], and calls
//! [`step`] again until it receives [`Effect::Finish`].
//!
//! ```text
//! Retrieving ──► Generating ──► Validating ──► Succeeded
//!                    ▲              │
//!                    │              ├──► ExhaustedRetries   (retries == max)
//!                    └── Retrying ◄─┘
//!                          │
//!                          └──► Retrieving (relaxed k, once, on "no evidence")
//! ```
//!
//! Backend faults move any non-terminal phase to Failed. They never count as
//! retries.

use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceSet;
use crate::types::{DraftAnswer, FailureCause, Status, Verdict};

use super::state::{Phase, WorkflowState};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_K: usize = 4;
pub const DEFAULT_RELAXED_K_FACTOR: usize = 2;

/// Bounds and switches for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopPolicy {
    /// Retry bound; the counter never exceeds it
    pub max_retries: u32,

    /// Retrieval fan-out
    pub k: usize,

    /// Fan-out for the single relaxed re-retrieval
    pub relaxed_k: usize,

    /// Surface the last draft (with a caveat) once retries run out
    pub surface_unverified: bool,

    /// Finalize as soon as relaxed retrieval also comes back empty
    pub finalize_on_empty_evidence: bool,
}

impl LoopPolicy {
    pub fn new(max_retries: u32, k: usize) -> Self {
        Self {
            max_retries,
            k,
            relaxed_k: k.saturating_mul(DEFAULT_RELAXED_K_FACTOR),
            surface_unverified: true,
            finalize_on_empty_evidence: false,
        }
    }

    pub fn with_relaxed_k(mut self, relaxed_k: usize) -> Self {
        self.relaxed_k = relaxed_k.max(self.k);
        self
    }

    pub fn with_surface_unverified(mut self, surface: bool) -> Self {
        self.surface_unverified = surface;
        self
    }

    pub fn with_finalize_on_empty_evidence(mut self, finalize: bool) -> Self {
        self.finalize_on_empty_evidence = finalize;
        self
    }
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_K)
    }
}

/// Outcome of the last effect, reported back by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Retrieved(EvidenceSet),
    RetrievalFailed(String),
    Generated(DraftAnswer),
    GenerationFailed(String),
    Validated(Verdict),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Retrieved(_) => "retrieved",
            Event::RetrievalFailed(_) => "retrieval_failed",
            Event::Generated(_) => "generated",
            Event::GenerationFailed(_) => "generation_failed",
            Event::Validated(_) => "validated",
        }
    }
}

/// What the driver must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Query the evidence store for at most `k` chunks
    Retrieve { k: usize, relaxed: bool },

    /// Call the completion backend; `corrective` passes the prior draft and verdict
    Generate { corrective: bool },

    /// Validate the current draft against the current evidence
    Validate,

    /// Stop and finalize
    Finish(Status),
}

/// The effect that starts an execution.
pub fn start(state: &WorkflowState, policy: &LoopPolicy) -> Effect {
    match state.phase.status() {
        Some(status) => Effect::Finish(status),
        None => Effect::Retrieve {
            k: policy.k,
            relaxed: false,
        },
    }
}

/// Advance the state machine by one event.
pub fn step(mut state: WorkflowState, event: Event, policy: &LoopPolicy) -> (WorkflowState, Effect) {
    if let Some(status) = state.phase.status() {
        return (state, Effect::Finish(status));
    }

    let from = state.phase;
    let event_name = event.name();

    let effect = match (from, event) {
        (Phase::Retrieving | Phase::Retrying, Event::Retrieved(evidence)) => {
            state.evidence = evidence;
            state.phase = Phase::Generating;
            Effect::Generate { corrective: false }
        }

        (Phase::Retrieving | Phase::Retrying, Event::RetrievalFailed(cause)) => {
            state.fail(FailureCause::RetrievalUnavailable(cause));
            Effect::Finish(Status::Failed)
        }

        (Phase::Generating | Phase::Retrying, Event::Generated(answer)) => {
            state.answer = Some(answer);
            state.verdict = None;
            state.phase = Phase::Validating;
            Effect::Validate
        }

        (Phase::Generating | Phase::Retrying, Event::GenerationFailed(cause)) => {
            state.fail(FailureCause::GenerationUnavailable(cause));
            Effect::Finish(Status::Failed)
        }

        (Phase::Validating, Event::Validated(verdict)) => on_verdict(&mut state, verdict, policy),

        (phase, _) => {
            state.fail(FailureCause::InvalidTransition(format!(
                "event '{}' in phase '{}'",
                event_name, phase
            )));
            Effect::Finish(Status::Failed)
        }
    };

    tracing::debug!(
        from = %from,
        to = %state.phase,
        event = event_name,
        retries = state.retries,
        "Workflow transition"
    );

    (state, effect)
}

fn on_verdict(state: &mut WorkflowState, verdict: Verdict, policy: &LoopPolicy) -> Effect {
    let supported = verdict.is_supported();
    let no_evidence = verdict.is_no_evidence();
    state.verdict_history.push(verdict.clone());
    state.verdict = Some(verdict);

    if supported {
        state.phase = Phase::Succeeded;
        return Effect::Finish(Status::Succeeded);
    }

    if state.retries >= policy.max_retries {
        state.phase = Phase::ExhaustedRetries;
        return Effect::Finish(Status::ExhaustedRetries);
    }

    if no_evidence && state.relaxed_retrieval_used && policy.finalize_on_empty_evidence {
        state.phase = Phase::ExhaustedRetries;
        return Effect::Finish(Status::ExhaustedRetries);
    }

    state.retries += 1;
    state.phase = Phase::Retrying;

    if no_evidence && !state.relaxed_retrieval_used {
        state.relaxed_retrieval_used = true;
        return Effect::Retrieve {
            k: policy.relaxed_k,
            relaxed: true,
        };
    }

    Effect::Generate { corrective: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::EvidenceChunk;
    use crate::types::{Query, VerdictKind};
    use proptest::prelude::*;

    fn evidence() -> EvidenceSet {
        EvidenceSet::from_ranked(
            vec![EvidenceChunk::new("The capital is Rivermouth.", "atlas.pdf", 0.9)],
            4,
        )
    }

    fn unsupported() -> Verdict {
        Verdict::unsupported("no support", vec!["claim".to_string()], 0.0)
    }

    /// Drive the machine with a fixed evidence set and a verdict per draft.
    fn drive(verdicts: &[Verdict], policy: &LoopPolicy) -> (WorkflowState, Vec<Effect>) {
        let mut state = WorkflowState::new(Query::new("What is the capital?"));
        let mut effects = vec![start(&state, policy)];
        let mut verdicts = verdicts.iter().cycle();

        loop {
            let event = match effects.last().copied().unwrap() {
                Effect::Retrieve { .. } => Event::Retrieved(evidence()),
                Effect::Generate { .. } => Event::Generated(DraftAnswer::new("draft")),
                Effect::Validate => Event::Validated(verdicts.next().unwrap().clone()),
                Effect::Finish(_) => return (state, effects),
            };
            let (next, effect) = step(state, event, policy);
            state = next;
            effects.push(effect);
        }
    }

    #[test]
    fn test_supported_first_try() {
        let (state, effects) = drive(&[Verdict::supported(1.0)], &LoopPolicy::default());
        assert_eq!(state.phase(), Phase::Succeeded);
        assert_eq!(state.retries(), 0);
        assert_eq!(
            effects,
            vec![
                Effect::Retrieve { k: 4, relaxed: false },
                Effect::Generate { corrective: false },
                Effect::Validate,
                Effect::Finish(Status::Succeeded),
            ]
        );
    }

    #[test]
    fn test_unsupported_then_supported_retries_once() {
        let verdicts = [unsupported(), Verdict::declined()];
        let (state, effects) = drive(&verdicts[..], &LoopPolicy::default());
        assert_eq!(state.phase(), Phase::Succeeded);
        assert_eq!(state.retries(), 1);
        assert_eq!(state.verdict_history().len(), 2);
        assert!(effects.contains(&Effect::Generate { corrective: true }));
        // Evidence is held fixed across a corrective retry
        assert_eq!(
            effects.iter().filter(|e| matches!(e, Effect::Retrieve { .. })).count(),
            1
        );
    }

    #[test]
    fn test_exhausts_at_max_retries() {
        let policy = LoopPolicy::new(3, 4);
        let (state, effects) = drive(&[unsupported()], &policy);
        assert_eq!(state.phase(), Phase::ExhaustedRetries);
        assert_eq!(state.retries(), 3);
        assert_eq!(state.verdict_history().len(), 4);
        assert_eq!(effects.last(), Some(&Effect::Finish(Status::ExhaustedRetries)));
    }

    #[test]
    fn test_zero_max_retries_finalizes_immediately() {
        let (state, _) = drive(&[unsupported()], &LoopPolicy::new(0, 4));
        assert_eq!(state.phase(), Phase::ExhaustedRetries);
        assert_eq!(state.retries(), 0);
        assert_eq!(state.verdict_history().len(), 1);
    }

    #[test]
    fn test_no_evidence_relaxes_retrieval_once() {
        let policy = LoopPolicy::new(3, 4);
        let (state, effects) = drive(&[Verdict::indeterminate("empty")], &policy);

        let retrievals: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::Retrieve { .. }))
            .collect();
        assert_eq!(
            retrievals,
            vec![
                &Effect::Retrieve { k: 4, relaxed: false },
                &Effect::Retrieve { k: 8, relaxed: true },
            ]
        );
        assert!(state.relaxed_retrieval_used());
        assert_eq!(state.phase(), Phase::ExhaustedRetries);
        assert!(state
            .verdict_history()
            .iter()
            .all(|v| v.kind == VerdictKind::Indeterminate));
    }

    #[test]
    fn test_finalize_on_empty_evidence_stops_after_relaxed_retrieval() {
        let policy = LoopPolicy::new(3, 4).with_finalize_on_empty_evidence(true);
        let (state, _) = drive(&[Verdict::indeterminate("empty")], &policy);
        assert_eq!(state.phase(), Phase::ExhaustedRetries);
        assert_eq!(state.retries(), 1);
        assert_eq!(state.verdict_history().len(), 2);
    }

    #[test]
    fn test_generation_failure_fails_without_retry() {
        let policy = LoopPolicy::default();
        let state = WorkflowState::new(Query::new("q"));
        let (state, _) = step(state, Event::Retrieved(evidence()), &policy);
        let (state, effect) = step(state, Event::GenerationFailed("refused".into()), &policy);

        assert_eq!(effect, Effect::Finish(Status::Failed));
        assert_eq!(state.retries(), 0);
        assert_eq!(
            state.failure(),
            Some(&FailureCause::GenerationUnavailable("refused".into()))
        );
    }

    #[test]
    fn test_retrieval_failure_fails() {
        let state = WorkflowState::new(Query::new("q"));
        let (state, effect) = step(state, Event::RetrievalFailed("down".into()), &LoopPolicy::default());
        assert_eq!(effect, Effect::Finish(Status::Failed));
        assert!(matches!(state.failure(), Some(FailureCause::RetrievalUnavailable(_))));
    }

    #[test]
    fn test_out_of_order_event_is_invalid_transition() {
        let state = WorkflowState::new(Query::new("q"));
        let (state, effect) = step(
            state,
            Event::Validated(Verdict::supported(1.0)),
            &LoopPolicy::default(),
        );
        assert_eq!(effect, Effect::Finish(Status::Failed));
        assert!(matches!(state.failure(), Some(FailureCause::InvalidTransition(_))));
    }

    #[test]
    fn test_terminal_state_absorbs_events() {
        let (state, _) = drive(&[Verdict::supported(1.0)], &LoopPolicy::default());
        let (state, effect) = step(state, Event::Retrieved(evidence()), &LoopPolicy::default());
        assert_eq!(effect, Effect::Finish(Status::Succeeded));
        assert_eq!(state.phase(), Phase::Succeeded);
    }

    fn verdict_strategy() -> impl Strategy<Value = Verdict> {
        prop_oneof![
            Just(Verdict::supported(1.0)),
            Just(Verdict::declined()),
            Just(unsupported()),
            Just(Verdict::indeterminate("empty")),
        ]
    }

    proptest! {
        #[test]
        fn prop_retries_bounded_and_terminates(
            verdicts in prop::collection::vec(verdict_strategy(), 1..8),
            max_retries in 0u32..6,
            finalize in any::<bool>(),
        ) {
            let policy = LoopPolicy::new(max_retries, 3).with_finalize_on_empty_evidence(finalize);
            let (state, effects) = drive(&verdicts, &policy);

            prop_assert!(state.is_terminal());
            prop_assert!(state.retries() <= max_retries);
            prop_assert!(state.verdict_history().len() as u32 <= max_retries + 1);
            let relaxed = effects
                .iter()
                .filter(|e| matches!(e, Effect::Retrieve { relaxed: true, .. }))
                .count();
            prop_assert!(relaxed <= 1);
            if state.phase() == Phase::Succeeded {
                prop_assert!(state.verdict().unwrap().is_supported());
            }
        }

        #[test]
        fn prop_identical_inputs_identical_outcome(
            verdicts in prop::collection::vec(verdict_strategy(), 1..8),
            max_retries in 0u32..6,
        ) {
            let policy = LoopPolicy::new(max_retries, 3);
            let (a, _) = drive(&verdicts, &policy);
            let (b, _) = drive(&verdicts, &policy);
            prop_assert_eq!(a.phase(), b.phase());
            prop_assert_eq!(a.retries(), b.retries());
        }
    }
}
