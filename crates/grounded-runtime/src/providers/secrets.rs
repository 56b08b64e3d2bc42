//! API keys for hosted completion backends.
//!
//! A key read from the provider config or the environment goes straight into
//! an [`ApiCredential`]. Formatting one prints its origin, never its value;
//! the request builder calls [`ApiCredential::expose`] to set the header.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `api_key` in the provider's JSON config
    Config,
    /// Process environment, which also holds values the CLI read from `.env`
    Environment,
    /// Passed to a provider constructor
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self {
            CredentialSource::Config => "config",
            CredentialSource::Environment => "environment",
            CredentialSource::Programmatic => "programmatic",
        };
        f.write_str(origin)
    }
}

/// A provider API key plus where it came from.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        let value = std::env::var(env_var).map_err(|_| {
            ProviderError::NotConfigured(format!("{} missing: export {}", name, env_var))
        })?;
        Ok(Self::new(value, CredentialSource::Environment, name))
    }

    /// `config[config_key]` if present, otherwise `env_var`.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        let configured = config
            .get(config_key)
            .and_then(JsonValue::as_str)
            .map(|v| Self::new(v, CredentialSource::Config, name));

        configured
            .or_else(|| {
                std::env::var(env_var)
                    .ok()
                    .map(|v| Self::new(v, CredentialSource::Environment, name))
            })
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{} missing: add '{}' to the provider config or export {}",
                    name, config_key, env_var
                ))
            })
    }

    /// True when [`from_config_or_env`](Self::from_config_or_env) would succeed.
    pub fn is_available(config: &JsonValue, config_key: &str, env_var: &str) -> bool {
        config.get(config_key).and_then(JsonValue::as_str).is_some()
            || std::env::var(env_var).is_ok()
    }

    /// The key itself, for the request header.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, [REDACTED])", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatting_hides_the_key() {
        let key = "sk-grounded-0123456789";
        let cred = ApiCredential::new(key, CredentialSource::Config, "Chat key");

        assert!(!format!("{:?}", cred).contains(key));
        let shown = cred.to_string();
        assert!(!shown.contains(key));
        assert_eq!(shown, "Chat key (config, [REDACTED])");
        assert_eq!(cred.expose(), key);
    }

    #[test]
    fn test_from_config_or_env_prefers_config() {
        let config = serde_json::json!({ "api_key": "config-key" });

        std::env::set_var("GROUNDED_TEST_KEY_PRIORITY", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &config,
            "api_key",
            "GROUNDED_TEST_KEY_PRIORITY",
            "Test key",
        )
        .unwrap();
        std::env::remove_var("GROUNDED_TEST_KEY_PRIORITY");

        assert_eq!(cred.expose(), "config-key");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_from_config_or_env_falls_back_to_env() {
        std::env::set_var("GROUNDED_TEST_KEY_FALLBACK", "env-key");
        let cred = ApiCredential::from_config_or_env(
            &serde_json::json!({}),
            "api_key",
            "GROUNDED_TEST_KEY_FALLBACK",
            "Test key",
        )
        .unwrap();
        std::env::remove_var("GROUNDED_TEST_KEY_FALLBACK");

        assert_eq!(cred.expose(), "env-key");
        assert_eq!(cred.source(), CredentialSource::Environment);
    }

    #[test]
    fn test_missing_credential_names_both_sources() {
        let err = ApiCredential::from_config_or_env(
            &serde_json::json!({}),
            "api_key",
            "GROUNDED_NONEXISTENT_VAR",
            "Test key",
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("'api_key'"));
        assert!(msg.contains("export GROUNDED_NONEXISTENT_VAR"));
        assert!(!ApiCredential::is_available(
            &serde_json::json!({}),
            "api_key",
            "GROUNDED_NONEXISTENT_VAR"
        ));
    }
}
