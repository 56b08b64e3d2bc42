//! In-memory evidence store with term-overlap ranking.
//!
//! Chunks are loaded up front (from code or a JSONL file) and scored at query
//! time by the fraction of query terms they contain. Good enough for tests,
//! demos and small document sets.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use grounded_core::validator::patterns::{self, Terms};
use grounded_core::{EvidenceChunk, EvidenceSet, Query};

use super::{EvidenceStore, RetrievalError};

/// Chunks scoring below this are never returned.
pub const DEFAULT_MIN_RELEVANCE: f64 = 0.1;

/// Errors loading chunks from disk.
#[derive(Error, Debug)]
pub enum ChunkLoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid chunk on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One line of a chunks file.
///
/// ```json
/// {"text": "The capital is Rivermouth.", "source": "atlas.pdf", "page": 3}
/// ```
#[derive(Debug, Clone, Deserialize)]
struct ChunkRecord {
    text: String,
    #[serde(default = "unknown_source")]
    source: String,
    #[serde(default)]
    page: Option<PageRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PageRef {
    Number(u64),
    Label(String),
}

fn unknown_source() -> String {
    "unknown".to_string()
}

struct IndexedChunk {
    chunk: EvidenceChunk,
    terms: Terms,
}

/// Summary of what the store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub chunks: usize,
    pub sources: usize,
}

pub struct InMemoryEvidenceStore {
    chunks: RwLock<Vec<IndexedChunk>>,
    min_relevance: f64,
}

impl InMemoryEvidenceStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            min_relevance: DEFAULT_MIN_RELEVANCE,
        }
    }

    pub fn with_min_relevance(mut self, min_relevance: f64) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn from_chunks(chunks: impl IntoIterator<Item = EvidenceChunk>) -> Self {
        let store = Self::new();
        store.add_chunks(chunks);
        store
    }

    /// Load a JSONL file: one `{"text", "source", "page"}` object per line.
    ///
    /// Blank lines are skipped.
    pub fn from_jsonl_file(path: impl AsRef<Path>) -> Result<Self, ChunkLoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ChunkLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let store = Self::new();
        store.add_jsonl(&text)?;
        Ok(store)
    }

    /// Add chunks from JSONL text. Nothing is added if any line is invalid.
    pub fn add_jsonl(&self, text: &str) -> Result<usize, ChunkLoadError> {
        let mut parsed = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: ChunkRecord =
                serde_json::from_str(line).map_err(|source| ChunkLoadError::Parse {
                    line: index + 1,
                    source,
                })?;
            let mut chunk = EvidenceChunk::new(record.text, record.source, 0.0);
            chunk.location = record.page.map(|page| match page {
                PageRef::Number(n) => n.to_string(),
                PageRef::Label(label) => label,
            });
            parsed.push(chunk);
        }
        let count = parsed.len();
        self.add_chunks(parsed);
        Ok(count)
    }

    pub fn add_chunk(&self, chunk: EvidenceChunk) {
        self.add_chunks(std::iter::once(chunk));
    }

    pub fn add_chunks(&self, chunks: impl IntoIterator<Item = EvidenceChunk>) {
        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .map(|chunk| IndexedChunk {
                terms: patterns::terms(&chunk.text),
                chunk,
            })
            .collect();
        self.chunks.write().extend(indexed);
    }

    pub fn clear(&self) {
        self.chunks.write().clear();
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let chunks = self.chunks.read();
        let sources: BTreeSet<&str> = chunks.iter().map(|c| c.chunk.source_id.as_str()).collect();
        StoreStats {
            chunks: chunks.len(),
            sources: sources.len(),
        }
    }

    /// Rank every chunk against the query terms.
    fn search(&self, query: &Terms, k: usize) -> EvidenceSet {
        let wanted = query.words.len() + query.numbers.len();
        if wanted == 0 || k == 0 {
            return EvidenceSet::empty();
        }

        let chunks = self.chunks.read();
        let scored = chunks
            .iter()
            .filter_map(|indexed| {
                let hits = query.words.intersection(&indexed.terms.words).count()
                    + query.numbers.intersection(&indexed.terms.numbers).count();
                let score = hits as f64 / wanted as f64;
                (hits > 0 && score >= self.min_relevance).then(|| {
                    let mut chunk = indexed.chunk.clone();
                    chunk.score = score;
                    chunk
                })
            })
            .collect();

        EvidenceSet::from_ranked(scored, k)
    }
}

impl Default for InMemoryEvidenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEvidenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEvidenceStore")
            .field("chunks", &self.len())
            .field("min_relevance", &self.min_relevance)
            .finish()
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn retrieve(&self, query: &Query, k: usize) -> Result<EvidenceSet, RetrievalError> {
        let terms = patterns::terms(query.text());
        let evidence = self.search(&terms, k);
        tracing::debug!(
            store = self.name(),
            k,
            returned = evidence.len(),
            "Retrieved evidence"
        );
        Ok(evidence)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
