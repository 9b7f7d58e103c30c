//! Configuration loading, validation, and management for FerroAgent.
//!
//! Loads configuration from `~/.ferroagent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ferroagent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the completion endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for the conversation loop
    #[serde(default = "default_model")]
    pub model: String,

    /// System instructions placed at the head of every conversation
    #[serde(default)]
    pub instructions: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per completion (provider default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Iteration ceiling for a single run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Log reasoning and tool observations
    #[serde(default = "default_true")]
    pub verbose: bool,

    /// Dump full completion responses
    #[serde(default)]
    pub debug: bool,

    /// How a run decides it is finished
    #[serde(default)]
    pub termination: TerminationPolicy,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub json_repair: JsonRepairConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "qwen/qwen3-coder:free".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_iterations() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("instructions", &self.instructions)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_iterations", &self.max_iterations)
            .field("verbose", &self.verbose)
            .field("debug", &self.debug)
            .field("termination", &self.termination)
            .field("history", &self.history)
            .field("json_repair", &self.json_repair)
            .field("retry", &self.retry)
            .finish()
    }
}

/// How a run terminates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationPolicy {
    /// Only `final_answer`, a stop signal, or the iteration ceiling end a run;
    /// free-text replies are discarded and the loop continues.
    #[default]
    Strict,
    /// A free-text reply completes the run.
    Lenient,
}

/// How an oversized history is reduced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Drop older turns outright
    #[default]
    Truncate,
    /// Replace older turns with a model-written summary
    Summarize,
}

/// History compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Compress once the log grows past this many messages
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Non-system messages kept verbatim after compression
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    #[serde(default)]
    pub strategy: CompressionStrategy,

    /// Model used for summarization (falls back to the json_repair model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,
}

fn default_max_length() -> usize {
    50
}
fn default_keep_recent() -> usize {
    4
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            keep_recent: default_keep_recent(),
            strategy: CompressionStrategy::default(),
            summary_model: None,
        }
    }
}

/// AI-assisted JSON repair settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRepairConfig {
    /// Ask a model to fix JSON the local heuristics could not
    #[serde(default = "default_true")]
    pub ai_enabled: bool,

    /// Model (or "primary,fallback" chain) used for repair prompts
    #[serde(default = "default_repair_model")]
    pub model: String,

    #[serde(default = "default_repair_temperature")]
    pub temperature: f32,
}

fn default_repair_model() -> String {
    "qwen/qwen3-4b:free".into()
}
fn default_repair_temperature() -> f32 {
    0.2
}

impl Default for JsonRepairConfig {
    fn default() -> Self {
        Self {
            ai_enabled: true,
            model: default_repair_model(),
            temperature: default_repair_temperature(),
        }
    }
}

/// Bounded retry of completion requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ferroagent/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `FERROAGENT_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("FERROAGENT_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(model) = lookup("FERROAGENT_MODEL") {
            self.model = model;
        }

        if let Some(base_url) = lookup("FERROAGENT_BASE_URL") {
            self.base_url = base_url;
        }

        if let Some(max) = lookup("FERROAGENT_MAX_HISTORY") {
            match max.trim().parse() {
                Ok(n) => self.history.max_length = n,
                Err(_) => tracing::warn!(value = %max, "Ignoring non-numeric FERROAGENT_MAX_HISTORY"),
            }
        }

        if let Some(model) = lookup("FERROAGENT_SMALL_MODEL") {
            self.history.summary_model = Some(model);
        }

        if let Some(model) = lookup("FERROAGENT_REPAIR_MODEL") {
            self.json_repair.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ferroagent")
    }

    /// Path of the default config file.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.json_repair.temperature) {
            return Err(ConfigError::ValidationError(
                "json_repair.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }

        if self.history.max_length == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_length must be at least 1".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Model used for history summarization.
    pub fn summary_model(&self) -> &str {
        self.history
            .summary_model
            .as_deref()
            .unwrap_or(&self.json_repair.model)
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            instructions: String::new(),
            temperature: default_temperature(),
            max_tokens: None,
            max_iterations: default_max_iterations(),
            verbose: true,
            debug: false,
            termination: TerminationPolicy::default(),
            history: HistoryConfig::default(),
            json_repair: JsonRepairConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, "qwen/qwen3-coder:free");
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.history.max_length, 50);
        assert_eq!(config.history.keep_recent, 4);
        assert_eq!(config.termination, TerminationPolicy::Strict);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.retry.max_attempts, config.retry.max_attempts);
        assert_eq!(parsed.history.strategy, CompressionStrategy::Truncate);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_limits_rejected() {
        let config = AppConfig {
            max_iterations: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.history.max_length = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn load_from_file_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "gpt-4o-mini"
termination = "lenient"
max_iterations = 4

[history]
max_length = 20
strategy = "summarize"

[retry]
delay_ms = 10
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.termination, TerminationPolicy::Lenient);
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.history.max_length, 20);
        assert_eq!(config.history.keep_recent, 4);
        assert_eq!(config.history.strategy, CompressionStrategy::Summarize);
        assert_eq!(config.retry.delay_ms, 10);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [unclosed").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_overrides_apply_in_priority_order() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENROUTER_API_KEY", "or-key"),
            ("OPENAI_API_KEY", "oa-key"),
            ("FERROAGENT_MODEL", "env-model"),
            ("FERROAGENT_MAX_HISTORY", "12"),
            ("FERROAGENT_SMALL_MODEL", "tiny"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("or-key"));
        assert_eq!(config.model, "env-model");
        assert_eq!(config.history.max_length, 12);
        assert_eq!(config.summary_model(), "tiny");
    }

    #[test]
    fn configured_api_key_is_not_overridden() {
        let mut config = AppConfig {
            api_key: Some("file-key".into()),
            ..AppConfig::default()
        };
        config.apply_env_overrides(|k| (k == "FERROAGENT_API_KEY").then(|| "env-key".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("qwen/qwen3-coder:free"));
        assert!(toml_str.contains("[history]"));
        assert!(toml_str.contains("[retry]"));
    }
}
