//! Runtime configuration.
//!
//! Read once at startup, in this order (later wins):
//! 1. Defaults
//! 2. Optional YAML file
//! 3. Environment variables (`RETRIEVAL_K`, `MAX_RETRIES`, `CHAT_MODEL`, ...)
//! 4. CLI flags, applied by the caller
//!
//! ```yaml
//! retrieval:
//!   k: 4
//!   relaxed_k_factor: 2
//!   timeout: 10s
//! loop:
//!   max_retries: 3
//!   surface_unverified: true
//! validation:
//!   mode: claims
//!   min_evidence: 1
//! generation:
//!   model: llama3.1
//!   timeout: 1m
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use grounded_core::{LoopPolicy, ValidatorConfig};

use crate::providers::CompletionConfig;
use crate::resilience::CircuitBreakerConfig;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for human-readable durations ("30s", "2m").
pub(crate) mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Evidence retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks requested per retrieval
    pub k: usize,

    /// Multiplier applied to `k` for the single relaxed re-retrieval
    pub relaxed_k_factor: usize,

    /// Per-call timeout; expiry counts as retrieval unavailable
    #[serde(with = "human_duration")]
    pub timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: grounded_core::workflow::DEFAULT_K,
            relaxed_k_factor: grounded_core::workflow::DEFAULT_RELAXED_K_FACTOR,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Control loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub max_retries: u32,

    /// Return the last draft (caveated) after exhaustion instead of a refusal
    pub surface_unverified: bool,

    /// Stop retrying once relaxed retrieval also comes back empty
    pub finalize_on_empty_evidence: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_retries: grounded_core::workflow::DEFAULT_MAX_RETRIES,
            surface_unverified: true,
            finalize_on_empty_evidence: false,
        }
    }
}

/// Which validator scores drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Deterministic claim decomposition and lexical entailment
    #[default]
    Claims,
    /// A second LLM call answering VALID / INVALID
    LlmJudge,
}

/// Validation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub mode: ValidationMode,
    pub min_evidence: usize,
    pub support_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let core = ValidatorConfig::default();
        Self {
            mode: ValidationMode::default(),
            min_evidence: core.min_evidence,
            support_threshold: core.support_threshold,
        }
    }
}

/// Completion backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Per-call timeout; expiry counts as generation unavailable
    #[serde(with = "human_duration")]
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let completion = CompletionConfig::default();
        Self {
            model: completion.model,
            max_tokens: completion.max_tokens,
            temperature: completion.temperature,
            timeout: completion.timeout,
        }
    }
}

/// Retrieval cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,

    #[serde(with = "human_duration")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 1_000,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub retrieval: RetrievalConfig,

    #[serde(rename = "loop")]
    pub control: LoopConfig,

    pub validation: ValidationConfig,
    pub generation: GenerationConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Defaults or file, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(k) = parse_var(&lookup, "RETRIEVAL_K")? {
            self.retrieval.k = k;
        }
        if let Some(retries) = parse_var(&lookup, "MAX_RETRIES")? {
            self.control.max_retries = retries;
        }
        if let Some(surface) = parse_var(&lookup, "SURFACE_UNVERIFIED")? {
            self.control.surface_unverified = surface;
        }
        if let Some(min) = parse_var(&lookup, "MIN_EVIDENCE")? {
            self.validation.min_evidence = min;
        }
        if let Some(model) = lookup("CHAT_MODEL").filter(|m| !m.trim().is_empty()) {
            self.generation.model = model;
        }
        if let Some(temperature) = parse_var(&lookup, "TEMPERATURE")? {
            self.generation.temperature = temperature;
        }
        if let Some(max_tokens) = parse_var(&lookup, "MAX_TOKENS")? {
            self.generation.max_tokens = max_tokens;
        }
        Ok(())
    }

    /// Reject settings the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.k == 0 {
            return Err(ConfigError::Invalid("retrieval.k must be greater than 0".into()));
        }
        if self.retrieval.relaxed_k_factor < 2 {
            return Err(ConfigError::Invalid(
                "retrieval.relaxed_k_factor must be at least 2".into(),
            ));
        }
        let threshold = self.validation.support_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "validation.support_threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "generation.temperature must be in [0, 2], got {}",
                self.generation.temperature
            )));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_entries must be greater than 0 when the cache is enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Loop policy for a given retry bound and fan-out.
    pub fn loop_policy(&self, max_retries: u32, k: usize) -> LoopPolicy {
        LoopPolicy::new(max_retries, k)
            .with_relaxed_k(k.saturating_mul(self.retrieval.relaxed_k_factor))
            .with_surface_unverified(self.control.surface_unverified)
            .with_finalize_on_empty_evidence(self.control.finalize_on_empty_evidence)
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            min_evidence: self.validation.min_evidence,
            support_threshold: self.validation.support_threshold,
        }
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.generation.model.clone(),
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
            timeout: self.generation.timeout,
        }
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}
