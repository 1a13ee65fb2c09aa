//! Pipeline configuration.
//!
//! This module provides configuration options for a generation run:
//! content oracle connection, item counts, timeouts, rate-limit backoff,
//! validation mode and output location.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::agents::subject::PLAN_TEMPERATURE;
use crate::agents::validator::SEMANTIC_TEMPERATURE;
use crate::agents::{AgentConfig, RetryPolicy, ValidatorConfig};
use crate::exam::CHOICE_COUNT;
use crate::llm::{ContentOracle, LiteLlmClient, SharedOracle, DEFAULT_API_BASE, DEFAULT_MODEL};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The content oracle client could not be built.
    #[error("Failed to build content oracle client: {0}")]
    Client(String),
}

/// Configuration for one pipeline run.
#[derive(Clone)]
pub struct PipelineConfig {
    // Content oracle settings
    /// Base URL of the OpenAI-compatible endpoint.
    pub api_base: String,
    /// API key; without one every oracle call fails and canned items are used.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Timeout applied to each oracle call.
    pub oracle_timeout: Duration,
    /// Delay before the first rate-limit retry; doubles per retry.
    pub backoff_base: Duration,

    // Run settings
    /// Items requested per subject (1 to 5).
    pub items_per_subject: usize,
    /// Wall-clock bound on one run.
    pub run_timeout: Duration,
    /// Whether the validator runs its oracle-assisted phase.
    pub semantic_validation: bool,

    // Storage settings
    /// Directory that receives one subdirectory per subject.
    pub output_dir: PathBuf,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("api_base", &self.api_base)
            .field("has_api_key", &self.api_key.is_some())
            .field("model", &self.model)
            .field("oracle_timeout", &self.oracle_timeout)
            .field("backoff_base", &self.backoff_base)
            .field("items_per_subject", &self.items_per_subject)
            .field("run_timeout", &self.run_timeout)
            .field("semantic_validation", &self.semantic_validation)
            .field("output_dir", &self.output_dir)
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            oracle_timeout: Duration::from_secs(20),
            backoff_base: Duration::from_secs(1),

            items_per_subject: 1,
            run_timeout: Duration::from_secs(30),
            semantic_validation: true,

            output_dir: PathBuf::from("questions"),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `LITELLM_API_BASE`: API base URL (default: OpenRouter)
    /// - `LITELLM_API_KEY` or `OPENROUTER_API_KEY`: API key
    /// - `LITELLM_DEFAULT_MODEL`: Model identifier
    /// - `EXAMFORGE_ORACLE_TIMEOUT_SECS`: Per-call timeout (default: 20)
    /// - `EXAMFORGE_BACKOFF_MS`: Rate-limit backoff base (default: 1000)
    /// - `EXAMFORGE_ITEMS_PER_SUBJECT`: Items per subject (default: 1)
    /// - `EXAMFORGE_RUN_TIMEOUT_SECS`: Run timeout (default: 30)
    /// - `EXAMFORGE_SEMANTIC_VALIDATION`: Enable the semantic phase (default: true)
    /// - `EXAMFORGE_OUTPUT_DIR`: Output directory (default: questions)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PipelineConfig::from_env`], reading from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Content oracle settings
        if let Some(val) = lookup("LITELLM_API_BASE") {
            config.api_base = val;
        }

        config.api_key = lookup("LITELLM_API_KEY")
            .or_else(|| lookup("OPENROUTER_API_KEY"))
            .filter(|k| !k.trim().is_empty());

        if let Some(val) = lookup("LITELLM_DEFAULT_MODEL") {
            config.model = val;
        }

        if let Some(val) = lookup("EXAMFORGE_ORACLE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "EXAMFORGE_ORACLE_TIMEOUT_SECS")?;
            config.oracle_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("EXAMFORGE_BACKOFF_MS") {
            let millis: u64 = parse_env_value(&val, "EXAMFORGE_BACKOFF_MS")?;
            config.backoff_base = Duration::from_millis(millis);
        }

        // Run settings
        if let Some(val) = lookup("EXAMFORGE_ITEMS_PER_SUBJECT") {
            config.items_per_subject = parse_env_value(&val, "EXAMFORGE_ITEMS_PER_SUBJECT")?;
        }

        if let Some(val) = lookup("EXAMFORGE_RUN_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "EXAMFORGE_RUN_TIMEOUT_SECS")?;
            config.run_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("EXAMFORGE_SEMANTIC_VALIDATION") {
            config.semantic_validation = parse_env_bool(&val, "EXAMFORGE_SEMANTIC_VALIDATION")?;
        }

        // Storage settings
        if let Some(val) = lookup("EXAMFORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_base cannot be empty".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        if !(1..=CHOICE_COUNT).contains(&self.items_per_subject) {
            return Err(ConfigError::ValidationFailed(format!(
                "items_per_subject must be between 1 and {}",
                CHOICE_COUNT
            )));
        }

        if self.run_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "run_timeout must be greater than 0".to_string(),
            ));
        }

        if self.oracle_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "oracle_timeout must be greater than 0".to_string(),
            ));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "output_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Builder method to set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Builder method to set the per-call oracle timeout.
    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Builder method to set the rate-limit backoff base.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Builder method to set items per subject.
    pub fn with_items_per_subject(mut self, count: usize) -> Self {
        self.items_per_subject = count;
        self
    }

    /// Builder method to set the run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Builder method to enable or disable semantic validation.
    pub fn with_semantic_validation(mut self, enabled: bool) -> Self {
        self.semantic_validation = enabled;
        self
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    /// Agent settings derived from this configuration.
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::new()
            .with_items_per_run(self.items_per_subject)
            .with_plan_retry(
                RetryPolicy::single(PLAN_TEMPERATURE).with_backoff_base(self.backoff_base),
            )
            .with_generation_retry(RetryPolicy::generation().with_backoff_base(self.backoff_base))
    }

    /// Validator settings derived from this configuration.
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig::new()
            .with_semantic(self.semantic_validation)
            .with_retry(
                RetryPolicy::single(SEMANTIC_TEMPERATURE).with_backoff_base(self.backoff_base),
            )
    }

    /// Build the shared content oracle over a [`LiteLlmClient`].
    pub fn build_oracle(&self) -> Result<SharedOracle, ConfigError> {
        let client = LiteLlmClient::new(&self.api_base, self.api_key.clone(), &self.model)
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        let oracle = ContentOracle::new(Arc::new(client), self.model.clone())
            .with_call_timeout(self.oracle_timeout);
        Ok(Arc::new(oracle))
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert!(config.api_key.is_none());
        assert_eq!(config.items_per_subject, 1);
        assert_eq!(config.run_timeout, Duration::from_secs(30));
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert!(config.semantic_validation);
        assert_eq!(config.output_dir, PathBuf::from("questions"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("LITELLM_API_BASE", "http://localhost:4000"),
            ("OPENROUTER_API_KEY", "sk-or"),
            ("LITELLM_DEFAULT_MODEL", "gpt-4o-mini"),
            ("EXAMFORGE_ITEMS_PER_SUBJECT", "3"),
            ("EXAMFORGE_RUN_TIMEOUT_SECS", "90"),
            ("EXAMFORGE_BACKOFF_MS", "250"),
            ("EXAMFORGE_SEMANTIC_VALIDATION", "off"),
            ("EXAMFORGE_OUTPUT_DIR", "/tmp/items"),
        ]))
        .unwrap();

        assert_eq!(config.api_base, "http://localhost:4000");
        assert_eq!(config.api_key.as_deref(), Some("sk-or"));
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.items_per_subject, 3);
        assert_eq!(config.run_timeout, Duration::from_secs(90));
        assert_eq!(config.backoff_base, Duration::from_millis(250));
        assert!(!config.semantic_validation);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/items"));
    }

    #[test]
    fn test_litellm_key_takes_precedence() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("LITELLM_API_KEY", "sk-lite"),
            ("OPENROUTER_API_KEY", "sk-or"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-lite"));

        let config = PipelineConfig::from_lookup(lookup(&[("LITELLM_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_from_lookup_invalid_values() {
        let err = PipelineConfig::from_lookup(lookup(&[("EXAMFORGE_RUN_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("EXAMFORGE_RUN_TIMEOUT_SECS"));

        let err = PipelineConfig::from_lookup(lookup(&[("EXAMFORGE_ITEMS_PER_SUBJECT", "9")]))
            .unwrap_err();
        assert!(err.to_string().contains("items_per_subject"));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            (PipelineConfig::default().with_api_base(" "), "api_base"),
            (PipelineConfig::default().with_model(""), "model"),
            (PipelineConfig::default().with_items_per_subject(0), "items_per_subject"),
            (PipelineConfig::default().with_run_timeout(Duration::ZERO), "run_timeout"),
            (PipelineConfig::default().with_oracle_timeout(Duration::ZERO), "oracle_timeout"),
            (PipelineConfig::default().with_output_dir(""), "output_dir"),
        ];
        for (config, field) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{} not in {}", field, err);
        }
    }

    #[test]
    fn test_derived_settings() {
        let config = PipelineConfig::default()
            .with_items_per_subject(2)
            .with_semantic_validation(false)
            .with_backoff_base(Duration::from_millis(5));

        let agent = config.agent_config();
        assert_eq!(agent.items_per_run, 2);
        assert_eq!(
            agent.generation_retry.backoff_delay(0),
            Duration::from_millis(5)
        );
        assert_eq!(agent.generation_retry.max_calls(), 3);

        let validator = config.validator_config();
        assert!(!validator.semantic);
        assert_eq!(validator.retry.max_calls(), 2);
    }

    #[test]
    fn test_build_oracle_uses_model() {
        let oracle = PipelineConfig::default()
            .with_model("test-model")
            .build_oracle()
            .unwrap();
        assert_eq!(oracle.model(), "test-model");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = PipelineConfig::default().with_api_key("sk-secret");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("has_api_key: true"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }
}
