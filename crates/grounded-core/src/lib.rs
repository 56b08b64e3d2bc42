//! # grounded-core
//!
//! Deterministic core of evidence-grounded question answering.
//!
//! This crate decides, for each draft answer a language model produces:
//! - Is every claim entailed by the retrieved evidence?
//! - Should the loop retry, relax retrieval, or stop?
//! - What does the caller get back when it stops?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same draft and evidence always produce the same verdict
//! 2. **No I/O**: Retrieval and generation are driven from outside via [`workflow::step`]
//! 3. **Bounded**: The retry counter never exceeds [`LoopPolicy::max_retries`]
//! 4. **Honest**: An unsupported draft is never returned without a caveat
//!
//! ## Example
//!
//! ```rust
//! use grounded_core::{AnswerValidator, EvidenceChunk, EvidenceSet, VerdictKind};
//!
//! let evidence = EvidenceSet::from_ranked(
//!     vec![EvidenceChunk::new("The capital is Rivermouth.", "atlas.pdf", 0.9)],
//!     4,
//! );
//! let verdict = AnswerValidator::default().validate(&"The capital is Rivermouth.".into(), &evidence);
//! assert_eq!(verdict.kind, VerdictKind::Supported);
//! ```

pub mod evidence;
pub mod finalizer;
pub mod types;
pub mod validator;
pub mod workflow;

// Re-export main types at crate root
pub use evidence::{EvidenceChunk, EvidenceChunkBuilder, EvidenceSet};
pub use finalizer::{finalize, FALLBACK_REFUSAL};
pub use types::{
    Caveat, DraftAnswer, FailureCause, FinalResult, Query, Status, Verdict, VerdictKind,
};
pub use validator::{
    AnswerValidator, ClaimSupport, EntailmentScorer, LexicalEntailment, MalformedAnswer,
    ValidatorConfig,
};
pub use workflow::{Effect, Event, LoopPolicy, Phase, WorkflowState};
