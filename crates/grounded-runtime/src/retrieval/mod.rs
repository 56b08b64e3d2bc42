//! Evidence stores.
//!
//! A store returns at most `k` chunks ranked by relevance. Zero chunks is a
//! valid answer; an error means the store itself could not be reached.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use grounded_core::{EvidenceSet, Query};

mod cache;
mod memory;

pub use cache::CachedEvidenceStore;
pub use memory::{ChunkLoadError, InMemoryEvidenceStore, StoreStats, DEFAULT_MIN_RELEVANCE};

/// Errors from evidence stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("Evidence store unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval timed out after {0:?}")]
    Timeout(Duration),
}

/// Source of evidence for the answer loop.
///
/// # Contract
/// - At most `k` chunks, relevance-descending
/// - An empty set is not an error
/// - Safe to call concurrently from independent executions
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn retrieve(&self, query: &Query, k: usize) -> Result<EvidenceSet, RetrievalError>;

    /// Store name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: EvidenceStore + ?Sized> EvidenceStore for Arc<T> {
    async fn retrieve(&self, query: &Query, k: usize) -> Result<EvidenceSet, RetrievalError> {
        (**self).retrieve(query, k).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
