//! Retrieval cache.
//!
//! Repeated questions (and the same question across executions) skip the
//! store. Only successful retrievals are cached; errors always reach the loop.

use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use grounded_core::{EvidenceSet, Query};

use super::{EvidenceStore, RetrievalError};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    k: usize,
}

/// Wraps a store with a moka cache keyed by `(query text, k)`.
pub struct CachedEvidenceStore<S> {
    inner: S,
    cache: Cache<CacheKey, EvidenceSet>,
}

impl<S: EvidenceStore> CachedEvidenceStore<S> {
    pub fn new(inner: S, max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { inner, cache }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<S: EvidenceStore> EvidenceStore for CachedEvidenceStore<S> {
    async fn retrieve(&self, query: &Query, k: usize) -> Result<EvidenceSet, RetrievalError> {
        let key = CacheKey {
            query: query.text().trim().to_string(),
            k,
        };

        if let Some(hit) = self.cache.get(&key).await {
            tracing::debug!(store = self.inner.name(), k, "Retrieval cache hit");
            return Ok(hit);
        }

        let evidence = self.inner.retrieve(query, k).await?;
        self.cache.insert(key, evidence.clone()).await;
        Ok(evidence)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
