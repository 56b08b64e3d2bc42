//! Resilience and accounting for backend calls.
//!
//! - Circuit breaker per provider, so a dead backend fails fast
//! - Per-execution token and cost accounting

mod circuit_breaker;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use usage::LlmUsage;
