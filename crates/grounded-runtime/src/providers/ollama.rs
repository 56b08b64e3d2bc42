//! Ollama provider for locally hosted models.
//!
//! Talks to the `/api/chat` endpoint with streaming disabled. No credentials
//! are needed; the host defaults to `http://localhost:11434` and can be
//! overridden with `OLLAMA_HOST` or the `base_url` config key.

use super::{
    factory::ProviderFactory, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// `base_url` from config, else `OLLAMA_HOST`, else localhost.
    pub fn from_config(config: &JsonValue) -> Self {
        let base_url = config["base_url"]
            .as_str()
            .map(str::to_string)
            .or_else(|| std::env::var(OLLAMA_HOST_ENV).ok())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Self::new(normalize_host(&base_url))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

/// `OLLAMA_HOST` is often given without a scheme ("127.0.0.1:11434").
fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    message: ChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            stream: false,
            options: ChatOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response
                .json::<OllamaError>()
                .await
                .map(|body| body.error)
                .unwrap_or_else(|e| e.to_string());

            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        Ok(CompletionResponse {
            content: body.message.content,
            usage: TokenUsage {
                prompt_tokens: body.prompt_eval_count,
                completion_tokens: body.eval_count,
                ..Default::default()
            },
            model: body.model,
            stop_reason: body.done_reason,
        })
    }

    async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Factory for Ollama providers.
///
/// ```json
/// { "base_url": "http://localhost:11434" }   // optional
/// ```
pub struct OllamaProviderFactory;

impl ProviderFactory for OllamaProviderFactory {
    fn provider_type(&self) -> &'static str {
        "ollama"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.validate_config(config)?;
        Ok(Arc::new(OllamaProvider::from_config(config)))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError> {
        if !config["base_url"].is_null() && config["base_url"].as_str().is_none() {
            return Err(ProviderError::NotConfigured(
                "base_url must be a string".to_string(),
            ));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Local models served by Ollama"
    }
}
