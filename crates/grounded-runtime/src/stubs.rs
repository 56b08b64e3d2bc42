//! Deterministic backends for tests.
//!
//! Every stub records how it was called so tests can assert on the loop's
//! behaviour (how often it retrieved, with what `k`, whether a retry carried
//! the prior draft) without a model or an index.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use grounded_core::{DraftAnswer, EvidenceSet, Query};

use crate::generation::{Completer, Completion, GenerationError, PriorAttempt};
use crate::retrieval::{EvidenceStore, RetrievalError};

/// Always returns the same evidence, truncated to `k`.
#[derive(Debug)]
pub struct StaticEvidenceStore {
    evidence: EvidenceSet,
    requests: Mutex<Vec<usize>>,
}

impl StaticEvidenceStore {
    pub fn new(evidence: EvidenceSet) -> Self {
        Self {
            evidence,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(EvidenceSet::empty())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// The `k` of every call, in order.
    pub fn requested_k(&self) -> Vec<usize> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl EvidenceStore for StaticEvidenceStore {
    async fn retrieve(&self, _query: &Query, k: usize) -> Result<EvidenceSet, RetrievalError> {
        self.requests.lock().push(k);
        Ok(EvidenceSet::from_ranked(self.evidence.clone().into_vec(), k))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Replays a fixed sequence of responses; the last one repeats.
#[derive(Debug)]
pub struct SequenceEvidenceStore {
    responses: Mutex<VecDeque<Result<EvidenceSet, RetrievalError>>>,
    requests: Mutex<Vec<usize>>,
}

impl SequenceEvidenceStore {
    pub fn new(responses: Vec<Result<EvidenceSet, RetrievalError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requested_k(&self) -> Vec<usize> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl EvidenceStore for SequenceEvidenceStore {
    async fn retrieve(&self, _query: &Query, k: usize) -> Result<EvidenceSet, RetrievalError> {
        self.requests.lock().push(k);
        let mut responses = self.responses.lock();
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        match next {
            Some(Ok(evidence)) => Ok(EvidenceSet::from_ranked(evidence.into_vec(), k)),
            Some(Err(e)) => Err(e),
            None => Ok(EvidenceSet::empty()),
        }
    }

    fn name(&self) -> &str {
        "sequence"
    }
}

/// Fails every call as if the index were offline.
#[derive(Debug, Default)]
pub struct UnreachableEvidenceStore {
    calls: Mutex<usize>,
}

impl UnreachableEvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl EvidenceStore for UnreachableEvidenceStore {
    async fn retrieve(&self, _query: &Query, _k: usize) -> Result<EvidenceSet, RetrievalError> {
        *self.calls.lock() += 1;
        Err(RetrievalError::Unavailable("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

/// One recorded completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCall {
    /// Evidence passed with the request
    pub evidence: EvidenceSet,

    /// Prior draft text, set on corrective retries
    pub prior_answer: Option<String>,
}

impl CompletionCall {
    pub fn is_corrective(&self) -> bool {
        self.prior_answer.is_some()
    }
}

/// Replays scripted drafts (or errors) in order; the last one repeats.
#[derive(Debug)]
pub struct ScriptedCompleter {
    script: Mutex<VecDeque<Result<DraftAnswer, GenerationError>>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<CompletionCall>>,
}

impl ScriptedCompleter {
    pub fn new(script: Vec<Result<DraftAnswer, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script of successful drafts.
    pub fn answers<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DraftAnswer>,
    {
        Self::new(answers.into_iter().map(|a| Ok(a.into())).collect())
    }

    /// Sleep before answering, to exercise cancellation and timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(
        &self,
        _query: &Query,
        evidence: &EvidenceSet,
        prior: Option<PriorAttempt<'_>>,
    ) -> Result<Completion, GenerationError> {
        self.calls.lock().push(CompletionCall {
            evidence: evidence.clone(),
            prior_answer: prior.map(|p| p.answer.text().to_string()),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = {
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match next {
            Some(Ok(answer)) => Ok(Completion::text(answer)),
            Some(Err(e)) => Err(e),
            None => Err(GenerationError::Unavailable("script is empty".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Fails every call as if the model server were down.
#[derive(Debug, Default)]
pub struct UnreachableCompleter {
    calls: Mutex<usize>,
}

impl UnreachableCompleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl Completer for UnreachableCompleter {
    async fn complete(
        &self,
        _query: &Query,
        _evidence: &EvidenceSet,
        _prior: Option<PriorAttempt<'_>>,
    ) -> Result<Completion, GenerationError> {
        *self.calls.lock() += 1;
        Err(GenerationError::Unavailable("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grounded_core::EvidenceChunk;

    #[tokio::test]
    async fn test_static_store_truncates_to_k() {
        let store = StaticEvidenceStore::new(EvidenceSet::from_ranked(
            vec![
                EvidenceChunk::new("a fact", "a.pdf", 0.9),
                EvidenceChunk::new("b fact", "b.pdf", 0.5),
            ],
            4,
        ));
        let evidence = store.retrieve(&"fact".into(), 1).await.unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(store.requested_k(), vec![1]);
    }

    #[tokio::test]
    async fn test_scripted_completer_repeats_last() {
        let completer = ScriptedCompleter::answers(["first", "second"]);
        let query: Query = "q".into();
        let evidence = EvidenceSet::empty();

        let mut texts = Vec::new();
        for _ in 0..3 {
            let c = completer.complete(&query, &evidence, None).await.unwrap();
            texts.push(c.answer.into_text());
        }
        assert_eq!(texts, vec!["first", "second", "second"]);
        assert_eq!(completer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_sequence_store_replays_errors() {
        let store = SequenceEvidenceStore::new(vec![
            Err(RetrievalError::Unavailable("down".into())),
            Ok(EvidenceSet::empty()),
        ]);
        let query: Query = "q".into();
        assert!(store.retrieve(&query, 4).await.is_err());
        assert!(store.retrieve(&query, 4).await.unwrap().is_empty());
        assert!(store.retrieve(&query, 8).await.unwrap().is_empty());
        assert_eq!(store.requested_k(), vec![4, 4, 8]);
    }
}
