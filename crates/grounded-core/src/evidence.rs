//! Retrieved evidence and its provenance.
//!
//! An [`EvidenceSet`] is always ranked by relevance, highest first. Chunks are
//! never mutated once retrieved; a set is replaced wholesale when retrieval
//! runs again.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A retrieved passage with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    /// Passage text
    pub text: String,

    /// Source document identifier (e.g. file name)
    pub source_id: String,

    /// Location hint within the source (e.g. page number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Relevance score assigned by the store (higher is better)
    pub score: f64,
}

impl EvidenceChunk {
    pub fn new(text: impl Into<String>, source_id: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            source_id: source_id.into(),
            location: None,
            score,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Citation string: `"<source> (page <location>)"`.
    pub fn citation(&self) -> String {
        format!(
            "{} (page {})",
            self.source_id,
            self.location.as_deref().unwrap_or("?")
        )
    }
}

/// Builder for creating chunks with a fluent API.
pub struct EvidenceChunkBuilder {
    text: String,
    source_id: String,
    location: Option<String>,
    score: f64,
}

impl EvidenceChunkBuilder {
    /// Start building a chunk from its text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_id: "unknown".to_string(),
            location: None,
            score: 0.0,
        }
    }

    pub fn source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.location = Some(page.to_string());
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn build(self) -> EvidenceChunk {
        EvidenceChunk {
            text: self.text,
            source_id: self.source_id,
            location: self.location,
            score: self.score,
        }
    }
}

/// Ordered evidence, relevance-descending. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceSet {
    chunks: Vec<EvidenceChunk>,
}

impl EvidenceSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rank chunks by score (descending, stable) and keep at most `k`.
    ///
    /// NaN scores rank last.
    pub fn from_ranked(mut chunks: Vec<EvidenceChunk>, k: usize) -> Self {
        chunks.sort_by(|a, b| compare_scores(b.score, a.score));
        chunks.truncate(k);
        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[EvidenceChunk] {
        &self.chunks
    }

    pub fn iter(&self) -> impl Iterator<Item = &EvidenceChunk> {
        self.chunks.iter()
    }

    pub fn into_vec(self) -> Vec<EvidenceChunk> {
        self.chunks
    }

    /// De-duplicated citations in ranking order.
    pub fn citations(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for chunk in &self.chunks {
            let citation = chunk.citation();
            if !seen.contains(&citation) {
                seen.push(citation);
            }
        }
        seen
    }
}

impl<'a> IntoIterator for &'a EvidenceSet {
    type Item = &'a EvidenceChunk;
    type IntoIter = std::slice::Iter<'a, EvidenceChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}
