//! Answer orchestrator.
//!
//! Drives the core state machine against real backends:
//! - Performs each [`Effect`] (retrieve, generate, validate) and reports the
//!   outcome back to [`workflow::step`] as an [`Event`]
//! - Checks cancellation before every effect and races each call against it
//! - Applies per-call timeouts; a timeout is a backend fault, not a retry
//! - Accounts LLM usage for the execution
//!
//! Each call to [`AnswerOrchestrator::answer`] owns its own [`WorkflowState`],
//! so one orchestrator can serve many questions concurrently.

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use grounded_core::workflow::{self, Effect, Event, LoopPolicy, WorkflowState};
use grounded_core::{finalize, AnswerValidator, FinalResult, Query};

use crate::config::{RuntimeConfig, ValidationMode};
use crate::generation::{Completer, GenerationError, LlmCompleter, PriorAttempt};
use crate::providers::LlmProvider;
use crate::resilience::{CircuitBreaker, LlmUsage};
use crate::retrieval::{CachedEvidenceStore, EvidenceStore, RetrievalError};
use crate::validation::{LlmJudge, Validator};
use crate::RuntimeError;

/// Per-request overrides of the configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnswerOptions {
    pub max_retries: Option<u32>,
    pub k: Option<usize>,
}

impl AnswerOptions {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// Result from one answer execution.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReport {
    /// The final result
    pub result: FinalResult,

    /// LLM usage metrics for this execution only
    pub llm_usage: LlmUsage,
}

/// Runs the bounded retrieve, generate, validate loop.
pub struct AnswerOrchestrator {
    store: Arc<dyn EvidenceStore>,
    completer: Arc<dyn Completer>,
    validator: Arc<dyn Validator>,
    config: RuntimeConfig,
}

impl AnswerOrchestrator {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        completer: Arc<dyn Completer>,
        validator: Arc<dyn Validator>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            completer,
            validator,
            config,
        }
    }

    pub fn builder() -> AnswerOrchestratorBuilder {
        AnswerOrchestratorBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Answer one question.
    ///
    /// Backend faults come back as a Failed [`FinalResult`]; `Err` is reserved
    /// for invalid requests.
    pub async fn answer(
        &self,
        query: impl Into<Query>,
        options: AnswerOptions,
    ) -> Result<AnswerReport, RuntimeError> {
        self.answer_with_cancel(query, options, &CancellationToken::new())
            .await
    }

    /// Answer one question, stopping early if `cancel` fires.
    ///
    /// Cancellation is checked before retrieving, before each generation and
    /// before validating. A cancelled execution returns
    /// [`RuntimeError::Cancelled`] and its state is dropped.
    pub async fn answer_with_cancel(
        &self,
        query: impl Into<Query>,
        options: AnswerOptions,
        cancel: &CancellationToken,
    ) -> Result<AnswerReport, RuntimeError> {
        let query = query.into();
        if query.is_blank() {
            return Err(RuntimeError::InvalidRequest("query is empty".to_string()));
        }

        let k = options.k.unwrap_or(self.config.retrieval.k);
        if k == 0 {
            return Err(RuntimeError::InvalidRequest(
                "k must be greater than 0".to_string(),
            ));
        }
        let max_retries = options
            .max_retries
            .unwrap_or(self.config.control.max_retries);
        let policy = self.config.loop_policy(max_retries, k);

        let mut usage = LlmUsage::default();
        let mut state = WorkflowState::new(query);
        let mut effect = workflow::start(&state, &policy);

        loop {
            let event = match effect {
                Effect::Finish(_) => break,
                Effect::Retrieve { k, relaxed } => {
                    ensure_live(cancel)?;
                    self.retrieve(&state, k, relaxed, cancel).await?
                }
                Effect::Generate { corrective } => {
                    ensure_live(cancel)?;
                    self.generate(&state, corrective, cancel, &mut usage).await?
                }
                Effect::Validate => {
                    ensure_live(cancel)?;
                    self.validate(&state, cancel, &mut usage).await?
                }
            };
            (state, effect) = workflow::step(state, event, &policy);
        }

        let result = finish(state, &policy);
        Ok(AnswerReport {
            result,
            llm_usage: usage,
        })
    }

    async fn retrieve(
        &self,
        state: &WorkflowState,
        k: usize,
        relaxed: bool,
        cancel: &CancellationToken,
    ) -> Result<Event, RuntimeError> {
        let timeout = self.config.retrieval.timeout;
        let call = tokio::time::timeout(timeout, self.store.retrieve(state.query(), k));

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            outcome = call => outcome,
        };

        let event = match outcome {
            Ok(Ok(evidence)) => {
                tracing::debug!(
                    store = self.store.name(),
                    k,
                    relaxed,
                    chunks = evidence.len(),
                    "Evidence retrieved"
                );
                Event::Retrieved(evidence)
            }
            Ok(Err(e)) => {
                tracing::warn!(store = self.store.name(), error = %e, "Retrieval failed");
                Event::RetrievalFailed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(store = self.store.name(), timeout = ?timeout, "Retrieval timed out");
                Event::RetrievalFailed(RetrievalError::Timeout(timeout).to_string())
            }
        };
        Ok(event)
    }

    async fn generate(
        &self,
        state: &WorkflowState,
        corrective: bool,
        cancel: &CancellationToken,
        usage: &mut LlmUsage,
    ) -> Result<Event, RuntimeError> {
        let prior = match (corrective, state.answer(), state.verdict()) {
            (true, Some(answer), Some(verdict)) => Some(PriorAttempt { answer, verdict }),
            _ => None,
        };

        let timeout = self.config.generation.timeout;
        let call = tokio::time::timeout(
            timeout,
            self.completer
                .complete(state.query(), state.evidence(), prior),
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            outcome = call => outcome,
        };

        let event = match outcome {
            Ok(Ok(completion)) => {
                if let Some(model) = &completion.model {
                    usage.add(&completion.usage, model);
                }
                Event::Generated(completion.answer)
            }
            Ok(Err(e)) => {
                tracing::warn!(completer = self.completer.name(), error = %e, "Generation failed");
                Event::GenerationFailed(e.to_string())
            }
            Err(_) => {
                tracing::warn!(completer = self.completer.name(), timeout = ?timeout, "Generation timed out");
                Event::GenerationFailed(GenerationError::Timeout(timeout).to_string())
            }
        };
        Ok(event)
    }

    async fn validate(
        &self,
        state: &WorkflowState,
        cancel: &CancellationToken,
        usage: &mut LlmUsage,
    ) -> Result<Event, RuntimeError> {
        let Some(answer) = state.answer() else {
            // Unreachable through step(); the machine reports it as an invalid transition
            return Ok(Event::GenerationFailed("no draft to validate".to_string()));
        };

        let assessment = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            assessment = self.validator.assess(state.query(), answer, state.evidence()) => assessment,
        };

        if let Some(model) = &assessment.model {
            usage.add(&assessment.usage, model);
        }

        tracing::debug!(
            validator = self.validator.name(),
            verdict = %assessment.verdict.kind,
            confidence = assessment.verdict.confidence,
            "Draft validated"
        );
        Ok(Event::Validated(assessment.verdict))
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), RuntimeError> {
    if cancel.is_cancelled() {
        tracing::debug!("Answer cancelled");
        return Err(RuntimeError::Cancelled);
    }
    Ok(())
}

fn finish(state: WorkflowState, policy: &LoopPolicy) -> FinalResult {
    let result = finalize(state, policy);
    match &result.failure {
        Some(cause) => tracing::warn!(
            status = %result.status,
            retries = result.retries,
            cause = %cause,
            "Answer failed"
        ),
        None => tracing::info!(
            status = %result.status,
            retries = result.retries,
            chunks = result.evidence.len(),
            caveat = ?result.caveat,
            "Answer finished"
        ),
    }
    result
}

/// Builder for [`AnswerOrchestrator`].
///
/// Explicit components win; otherwise a provider is wrapped into an
/// [`LlmCompleter`] (and an [`LlmJudge`] when `validation.mode` asks for one),
/// all sharing one circuit breaker.
pub struct AnswerOrchestratorBuilder {
    store: Option<Arc<dyn EvidenceStore>>,
    completer: Option<Arc<dyn Completer>>,
    validator: Option<Arc<dyn Validator>>,
    provider: Option<Arc<dyn LlmProvider>>,
    config: RuntimeConfig,
}

impl AnswerOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            completer: None,
            validator: None,
            provider: None,
            config: RuntimeConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn EvidenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn completer(mut self, completer: Arc<dyn Completer>) -> Self {
        self.completer = Some(completer);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Set the LLM provider used for generation (and judging, if enabled).
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<AnswerOrchestrator, RuntimeError> {
        self.config.validate()?;
        let config = self.config;

        let store = self
            .store
            .ok_or_else(|| RuntimeError::NotConfigured("No evidence store set".to_string()))?;
        let store: Arc<dyn EvidenceStore> = if config.cache.enabled {
            Arc::new(CachedEvidenceStore::new(
                store,
                config.cache.max_entries,
                config.cache.ttl,
            ))
        } else {
            store
        };

        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));

        let completer: Arc<dyn Completer> = match (self.completer, &self.provider) {
            (Some(completer), _) => completer,
            (None, Some(provider)) => Arc::new(
                LlmCompleter::new(provider.clone(), config.completion_config())
                    .with_breaker(breaker.clone()),
            ),
            (None, None) => {
                return Err(RuntimeError::NotConfigured(
                    "No completer or provider set".to_string(),
                ))
            }
        };

        let validator: Arc<dyn Validator> = match (self.validator, config.validation.mode) {
            (Some(validator), _) => validator,
            (None, ValidationMode::Claims) => {
                Arc::new(AnswerValidator::new(config.validator_config()))
            }
            (None, ValidationMode::LlmJudge) => {
                let provider = self.provider.ok_or_else(|| {
                    RuntimeError::NotConfigured(
                        "validation.mode llm_judge requires a provider".to_string(),
                    )
                })?;
                Arc::new(
                    LlmJudge::new(
                        provider,
                        config.completion_config(),
                        AnswerValidator::new(config.validator_config()),
                    )
                    .with_breaker(breaker),
                )
            }
        };

        tracing::debug!(
            store = store.name(),
            completer = completer.name(),
            validator = validator.name(),
            "Orchestrator built"
        );

        Ok(AnswerOrchestrator::new(store, completer, validator, config))
    }
}

impl Default for AnswerOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, ProviderError, TokenUsage,
    };
    use crate::stubs::{
        ScriptedCompleter, SequenceEvidenceStore, StaticEvidenceStore, UnreachableCompleter,
        UnreachableEvidenceStore,
    };
    use async_trait::async_trait;
    use proptest::prelude::*;
    use grounded_core::{Caveat, EvidenceChunk, EvidenceSet, FailureCause, Status, VerdictKind};
    use std::time::Duration;

    const DECLINE: &str = "The provided documents do not contain information about the capital.";

    fn capital_evidence() -> EvidenceSet {
        EvidenceSet::from_ranked(
            vec![EvidenceChunk::new("The capital is Rivermouth.", "atlas.pdf", 0.92)
                .with_location("3")],
            4,
        )
    }

    fn population_evidence() -> EvidenceSet {
        EvidenceSet::from_ranked(
            vec![EvidenceChunk::new(
                "Veridia has a population of 2.4 million people.",
                "census.pdf",
                0.71,
            )],
            4,
        )
    }

    fn orchestrator(
        store: Arc<dyn EvidenceStore>,
        completer: Arc<dyn Completer>,
        config: RuntimeConfig,
    ) -> AnswerOrchestrator {
        AnswerOrchestrator::builder()
            .store(store)
            .completer(completer)
            .config(config)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_supported_first_try() {
        let store = Arc::new(StaticEvidenceStore::new(capital_evidence()));
        let completer = Arc::new(ScriptedCompleter::answers(["The capital is Rivermouth."]));
        let orch = orchestrator(store.clone(), completer.clone(), RuntimeConfig::default());

        let report = orch
            .answer("What is the capital of the demo country?", AnswerOptions::default())
            .await
            .unwrap();
        let result = report.result;

        assert_eq!(result.status, Status::Succeeded);
        assert_eq!(result.retries, 0);
        assert_eq!(result.answer, "The capital is Rivermouth.");
        assert_eq!(result.evidence, capital_evidence());
        assert_eq!(result.verdict_history.len(), 1);
        assert!(result.caveat.is_none());
        assert_eq!(store.calls(), 1);
        assert_eq!(report.llm_usage.llm_calls, 0);
    }

    #[tokio::test]
    async fn test_fabrication_then_decline() {
        let store = Arc::new(StaticEvidenceStore::new(population_evidence()));
        let completer = Arc::new(ScriptedCompleter::answers([
            "The capital of Veridia is Lakeside.",
            DECLINE,
        ]));
        let orch = orchestrator(store.clone(), completer.clone(), RuntimeConfig::default());

        let result = orch
            .answer("What is the capital of Veridia?", AnswerOptions::default())
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::Succeeded);
        assert_eq!(result.retries, 1);
        assert_eq!(result.verdict_history[0].kind, VerdictKind::Unsupported);
        assert!(result.verdict_history[1].declined);

        // Evidence held fixed; retry carried the rejected draft
        let calls = completer.calls();
        assert_eq!(store.calls(), 1);
        assert!(!calls[0].is_corrective());
        assert_eq!(
            calls[1].prior_answer.as_deref(),
            Some("The capital of Veridia is Lakeside.")
        );
        assert_eq!(calls[1].evidence, population_evidence());
    }

    #[tokio::test]
    async fn test_empty_evidence_exhausts_with_caveat() {
        let store = Arc::new(StaticEvidenceStore::empty());
        let completer = Arc::new(ScriptedCompleter::answers(["The capital is Rivermouth."]));
        let orch = orchestrator(store.clone(), completer, RuntimeConfig::default());

        let result = orch
            .answer("What is the capital?", AnswerOptions::default())
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::ExhaustedRetries);
        assert_eq!(result.retries, 3);
        assert_eq!(result.caveat, Some(Caveat::InsufficientEvidence));
        assert!(result.answer.contains(Caveat::InsufficientEvidence.note()));
        assert!(result
            .verdict_history
            .iter()
            .all(|v| v.kind == VerdictKind::Indeterminate));
        // One normal retrieval, one relaxed
        assert_eq!(store.requested_k(), vec![4, 8]);
    }

    #[tokio::test]
    async fn test_empty_evidence_finalizes_early_when_configured() {
        let mut config = RuntimeConfig::default();
        config.control.finalize_on_empty_evidence = true;
        let store = Arc::new(StaticEvidenceStore::empty());
        let completer = Arc::new(ScriptedCompleter::answers(["The capital is Rivermouth."]));
        let orch = orchestrator(store.clone(), completer, config);

        let result = orch
            .answer("What is the capital?", AnswerOptions::default())
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::ExhaustedRetries);
        assert_eq!(result.retries, 1);
        assert_eq!(result.verdict_history.len(), 2);
        assert_eq!(result.caveat, Some(Caveat::InsufficientEvidence));
    }

    #[tokio::test]
    async fn test_generation_unreachable_fails_without_retries() {
        let store = Arc::new(StaticEvidenceStore::new(capital_evidence()));
        let completer = Arc::new(UnreachableCompleter::new());
        let orch = orchestrator(store, completer.clone(), RuntimeConfig::default());

        let result = orch
            .answer("What is the capital?", AnswerOptions::default())
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.retries, 0);
        assert!(matches!(
            result.failure,
            Some(FailureCause::GenerationUnavailable(_))
        ));
        assert!(result.evidence.is_empty());
        assert!(result.verdict_history.is_empty());
        assert_eq!(completer.calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieval_unreachable_fails_before_generation() {
        let store = Arc::new(UnreachableEvidenceStore::new());
        let completer = Arc::new(ScriptedCompleter::answers(["unused"]));
        let orch = orchestrator(store.clone(), completer.clone(), RuntimeConfig::default());

        let result = orch
            .answer("What is the capital?", AnswerOptions::default())
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::Failed);
        assert!(matches!(
            result.failure,
            Some(FailureCause::RetrievalUnavailable(_))
        ));
        assert_eq!(store.calls(), 1);
        assert_eq!(completer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_until_exhausted_is_caveated() {
        let store = Arc::new(StaticEvidenceStore::new(population_evidence()));
        let completer = Arc::new(ScriptedCompleter::answers(["The capital of Veridia is Lakeside."]));
        let orch = orchestrator(store, completer.clone(), RuntimeConfig::default());

        let result = orch
            .answer(
                "What is the capital of Veridia?",
                AnswerOptions::default().with_max_retries(2),
            )
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::ExhaustedRetries);
        assert_eq!(result.retries, 2);
        assert_eq!(result.caveat, Some(Caveat::Unverified));
        assert!(result.answer.starts_with("The capital of Veridia is Lakeside."));
        assert!(result.answer.contains(Caveat::Unverified.note()));
        assert_eq!(completer.call_count(), 3);
    }

    #[tokio::test]
    async fn test_supported_result_uses_relaxed_evidence() {
        let store = Arc::new(SequenceEvidenceStore::new(vec![
            Ok(EvidenceSet::empty()),
            Ok(capital_evidence()),
        ]));
        let completer = Arc::new(ScriptedCompleter::answers(["The capital is Rivermouth."]));
        let orch = orchestrator(store.clone(), completer, RuntimeConfig::default());

        let result = orch
            .answer("What is the capital?", AnswerOptions::default())
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::Succeeded);
        assert_eq!(result.retries, 1);
        assert_eq!(result.evidence, capital_evidence());
        assert_eq!(store.requested_k(), vec![4, 8]);
    }

    #[tokio::test]
    async fn test_identical_inputs_identical_outcomes() {
        let run = || async {
            let store = Arc::new(StaticEvidenceStore::new(population_evidence()));
            let completer = Arc::new(ScriptedCompleter::answers([
                "The capital of Veridia is Lakeside.",
                "Veridia has a population of 2.4 million people.",
            ]));
            orchestrator(store, completer, RuntimeConfig::default())
                .answer("What is the capital of Veridia?", AnswerOptions::default())
                .await
                .unwrap()
                .result
        };

        let first = run().await;
        let second = run().await;
        assert_eq!(first.status, second.status);
        assert_eq!(first.retries, second.retries);
        assert_eq!(first.verdict_history, second.verdict_history);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let orch = orchestrator(
            Arc::new(StaticEvidenceStore::empty()),
            Arc::new(ScriptedCompleter::answers(["unused"])),
            RuntimeConfig::default(),
        );

        assert!(matches!(
            orch.answer("   ", AnswerOptions::default()).await,
            Err(RuntimeError::InvalidRequest(_))
        ));
        assert!(matches!(
            orch.answer("What is the capital?", AnswerOptions::default().with_k(0))
                .await,
            Err(RuntimeError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let store = Arc::new(StaticEvidenceStore::new(capital_evidence()));
        let orch = orchestrator(
            store.clone(),
            Arc::new(ScriptedCompleter::answers(["The capital is Rivermouth."])),
            RuntimeConfig::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orch
            .answer_with_cancel("What is the capital?", AnswerOptions::default(), &cancel)
            .await;

        assert!(matches!(outcome, Err(RuntimeError::Cancelled)));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_generation() {
        let orch = orchestrator(
            Arc::new(StaticEvidenceStore::new(capital_evidence())),
            Arc::new(
                ScriptedCompleter::answers(["The capital is Rivermouth."])
                    .with_delay(Duration::from_secs(30)),
            ),
            RuntimeConfig::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = orch
            .answer_with_cancel("What is the capital?", AnswerOptions::default(), &cancel)
            .await;
        assert!(matches!(outcome, Err(RuntimeError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_is_a_fault() {
        let mut config = RuntimeConfig::default();
        config.generation.timeout = Duration::from_secs(1);
        let completer = Arc::new(
            ScriptedCompleter::answers(["The capital is Rivermouth."])
                .with_delay(Duration::from_secs(120)),
        );
        let orch = orchestrator(
            Arc::new(StaticEvidenceStore::new(capital_evidence())),
            completer.clone(),
            config,
        );

        let result = orch
            .answer("What is the capital?", AnswerOptions::default())
            .await
            .unwrap()
            .result;

        assert_eq!(result.status, Status::Failed);
        assert!(matches!(
            result.failure,
            Some(FailureCause::GenerationUnavailable(ref msg)) if msg.contains("timed out")
        ));
        assert_eq!(completer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_independent() {
        let orch = Arc::new(orchestrator(
            Arc::new(StaticEvidenceStore::new(capital_evidence())),
            Arc::new(ScriptedCompleter::answers(["The capital is Rivermouth."])),
            RuntimeConfig::default(),
        ));

        let runs = (0..8).map(|i| {
            let orch = orch.clone();
            async move {
                orch.answer(format!("What is the capital? ({})", i), AnswerOptions::default())
                    .await
            }
        });
        let reports = futures::future::join_all(runs).await;

        for report in reports {
            let result = report.unwrap().result;
            assert_eq!(result.status, Status::Succeeded);
            assert_eq!(result.retries, 0);
        }
    }

    #[tokio::test]
    async fn test_cache_serves_repeated_questions() {
        let mut config = RuntimeConfig::default();
        config.cache.enabled = true;
        let store = Arc::new(StaticEvidenceStore::new(capital_evidence()));
        let orch = orchestrator(
            store.clone(),
            Arc::new(ScriptedCompleter::answers(["The capital is Rivermouth."])),
            config,
        );

        for _ in 0..2 {
            orch.answer("What is the capital?", AnswerOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(store.calls(), 1);
    }

    struct MockProvider {
        reply: &'static str,
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: self.reply.to_string(),
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 10,
                    ..Default::default()
                },
                model: "mock".to_string(),
                stop_reason: Some("stop".to_string()),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_provider_usage_is_reported() {
        let orch = AnswerOrchestrator::builder()
            .store(Arc::new(StaticEvidenceStore::new(capital_evidence())))
            .provider(Arc::new(MockProvider {
                reply: "The capital is Rivermouth.",
            }))
            .build()
            .unwrap();

        let report = orch
            .answer("What is the capital?", AnswerOptions::default())
            .await
            .unwrap();

        assert_eq!(report.result.status, Status::Succeeded);
        assert_eq!(report.llm_usage.llm_calls, 1);
        assert_eq!(report.llm_usage.total_tokens, 110);
    }

    #[test]
    fn test_builder_requires_components() {
        let missing_store = AnswerOrchestrator::builder()
            .completer(Arc::new(ScriptedCompleter::answers(["x"])))
            .build();
        assert!(matches!(missing_store, Err(RuntimeError::NotConfigured(_))));

        let missing_completer = AnswerOrchestrator::builder()
            .store(Arc::new(StaticEvidenceStore::empty()))
            .build();
        assert!(matches!(missing_completer, Err(RuntimeError::NotConfigured(_))));

        let mut config = RuntimeConfig::default();
        config.validation.mode = ValidationMode::LlmJudge;
        let judge_without_provider = AnswerOrchestrator::builder()
            .store(Arc::new(StaticEvidenceStore::empty()))
            .completer(Arc::new(ScriptedCompleter::answers(["x"])))
            .config(config)
            .build();
        assert!(matches!(
            judge_without_provider,
            Err(RuntimeError::NotConfigured(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_any_drafts_stay_within_retry_bound(
            drafts in proptest::collection::vec("[a-zA-Z0-9 ,.]{0,60}", 1..5),
            max_retries in 0u32..5,
            empty in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let evidence = if empty { EvidenceSet::empty() } else { capital_evidence() };

            let result = runtime
                .block_on(async {
                    orchestrator(
                        Arc::new(StaticEvidenceStore::new(evidence.clone())),
                        Arc::new(ScriptedCompleter::answers(drafts.clone())),
                        RuntimeConfig::default(),
                    )
                    .answer(
                        "What is the capital?",
                        AnswerOptions::default().with_max_retries(max_retries),
                    )
                    .await
                })
                .unwrap()
                .result;

            prop_assert!(result.retries <= max_retries);
            prop_assert_ne!(result.status, Status::Failed);
            if result.status == Status::Succeeded {
                prop_assert!(!empty);
                prop_assert_eq!(result.evidence, evidence);
            } else {
                prop_assert!(result.caveat.is_some());
            }
        }
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = RuntimeConfig::default();
        config.retrieval.k = 0;
        let result = AnswerOrchestrator::builder()
            .store(Arc::new(StaticEvidenceStore::empty()))
            .completer(Arc::new(ScriptedCompleter::answers(["x"])))
            .config(config)
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }
}
