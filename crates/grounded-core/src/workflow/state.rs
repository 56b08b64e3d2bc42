//! The mutable record threaded through one control-loop execution.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evidence::EvidenceSet;
use crate::types::{DraftAnswer, FailureCause, Query, Status, Verdict};

/// Where the control loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Retrieving,
    Generating,
    Validating,
    /// A verdict was rejected; waiting on a corrective generation or a relaxed retrieval
    Retrying,
    Succeeded,
    ExhaustedRetries,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        self.status().is_some()
    }

    /// Terminal status, if this phase is terminal.
    pub fn status(&self) -> Option<Status> {
        match self {
            Phase::Succeeded => Some(Status::Succeeded),
            Phase::ExhaustedRetries => Some(Status::ExhaustedRetries),
            Phase::Failed => Some(Status::Failed),
            _ => None,
        }
    }
}

impl From<Status> for Phase {
    fn from(status: Status) -> Self {
        match status {
            Status::Succeeded => Phase::Succeeded,
            Status::ExhaustedRetries => Phase::ExhaustedRetries,
            Status::Failed => Phase::Failed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Retrieving => "retrieving",
            Phase::Generating => "generating",
            Phase::Validating => "validating",
            Phase::Retrying => "retrying",
            Phase::Succeeded => "succeeded",
            Phase::ExhaustedRetries => "exhausted_retries",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Workflow state for a single query.
///
/// Owned by exactly one execution. Only [`step`](super::step) moves it
/// between phases; callers read it through the accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowState {
    pub(crate) query: Query,
    pub(crate) evidence: EvidenceSet,
    pub(crate) answer: Option<DraftAnswer>,
    pub(crate) verdict: Option<Verdict>,
    pub(crate) verdict_history: Vec<Verdict>,
    pub(crate) retries: u32,
    pub(crate) phase: Phase,
    pub(crate) relaxed_retrieval_used: bool,
    pub(crate) failure: Option<FailureCause>,
}

impl WorkflowState {
    /// Fresh state for a query: phase Retrieving, zero retries.
    pub fn new(query: Query) -> Self {
        Self {
            query,
            evidence: EvidenceSet::empty(),
            answer: None,
            verdict: None,
            verdict_history: Vec::new(),
            retries: 0,
            phase: Phase::Retrieving,
            relaxed_retrieval_used: false,
            failure: None,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Evidence the current draft was (or will be) generated from.
    pub fn evidence(&self) -> &EvidenceSet {
        &self.evidence
    }

    pub fn answer(&self) -> Option<&DraftAnswer> {
        self.answer.as_ref()
    }

    /// Verdict on the current draft.
    pub fn verdict(&self) -> Option<&Verdict> {
        self.verdict.as_ref()
    }

    pub fn verdict_history(&self) -> &[Verdict] {
        &self.verdict_history
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn relaxed_retrieval_used(&self) -> bool {
        self.relaxed_retrieval_used
    }

    pub fn failure(&self) -> Option<&FailureCause> {
        self.failure.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub(crate) fn fail(&mut self, cause: FailureCause) {
        self.failure = Some(cause);
        self.phase = Phase::Failed;
    }
}
