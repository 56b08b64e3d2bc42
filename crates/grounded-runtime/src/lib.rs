//! # grounded-runtime
//!
//! Async answer loop for grounded question answering.
//!
//! `grounded-core` decides what happens next; this crate does it. It provides:
//! - [`EvidenceStore`] and [`Completer`] capability traits, with in-memory,
//!   cached and LLM-backed implementations
//! - [`AnswerOrchestrator`], which drives the core state machine with
//!   cancellation and per-call timeouts
//! - LLM providers (Ollama, Anthropic) behind feature flags
//! - Configuration, circuit breaking and usage accounting
//! - Deterministic [`stubs`] for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grounded_runtime::{AnswerOptions, AnswerOrchestrator, InMemoryEvidenceStore};
//!
//! let store = InMemoryEvidenceStore::from_jsonl_file("chunks.jsonl")?;
//! let orchestrator = AnswerOrchestrator::builder()
//!     .store(Arc::new(store))
//!     .provider(Arc::new(grounded_runtime::providers::OllamaProvider::default()))
//!     .build()?;
//!
//! let report = orchestrator
//!     .answer("What is the capital?", AnswerOptions::default())
//!     .await?;
//! println!("{}", report.result.render());
//! ```

use thiserror::Error;

pub mod config;
pub mod generation;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod retrieval;
pub mod stubs;
pub mod validation;

pub use config::{ConfigError, RuntimeConfig, ValidationMode};
pub use generation::{Completer, Completion, GenerationError, LlmCompleter, PriorAttempt};
pub use orchestrator::{AnswerOptions, AnswerOrchestrator, AnswerOrchestratorBuilder, AnswerReport};
pub use resilience::LlmUsage;
pub use retrieval::{
    CachedEvidenceStore, EvidenceStore, InMemoryEvidenceStore, RetrievalError, StoreStats,
};
pub use validation::{Assessment, LlmJudge, Validator};

/// Errors from the runtime.
///
/// Backend faults are not errors here: they end an execution as a Failed
/// result. These are caller and setup mistakes.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
