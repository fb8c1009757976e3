//! Configuration management for the benchmark
//!
//! Loads provider, runner, evaluation and output settings from TOML files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::analysis::AlignmentSettings;
use crate::dataset::Range;
use crate::providers::parse_model_spec;
use crate::runner::TrialSettings;
use crate::usage::Pricing;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub default_model: String,
    /// Requests per minute
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    /// Tokens per minute
    #[serde(default = "default_tpm")]
    pub tpm: u32,
    /// Minimum spacing between two requests
    #[serde(default)]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Override of the API base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Pricing of models without their own entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    /// Model definitions
    #[serde(default)]
    pub models: IndexMap<String, ModelConfig>,
}

/// Model-specific configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

/// Retry budgets of the trial runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_attempts")]
    pub max_turn_attempts: u32,
    /// First backoff wait; doubled after each further failed call
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Evaluation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_target_scale")]
    pub target_scale: Range,
    #[serde(default = "default_min_matched_pairs")]
    pub min_matched_pairs: usize,
    /// Decimals kept in comparison tables
    #[serde(default = "default_score_precision")]
    pub score_precision: u32,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_rpm() -> u32 { 60 }
fn default_tpm() -> u32 { 100_000 }
fn default_max_output_tokens() -> u32 { 4096 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_base_ms() -> u64 { 1000 }
fn default_timeout_ms() -> u64 { 120_000 }
fn default_target_scale() -> Range { Range::new(1.0, 5.0) }
fn default_min_matched_pairs() -> usize { 10 }
fn default_score_precision() -> u32 { 2 }
fn default_output_dir() -> String { "results/runs".to_string() }

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_turn_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RunnerConfig {
    pub fn trial_settings(&self) -> TrialSettings {
        TrialSettings {
            max_attempts: self.max_attempts,
            max_turn_attempts: self.max_turn_attempts,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            timeout: (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms)),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            target_scale: default_target_scale(),
            min_matched_pairs: default_min_matched_pairs(),
            score_precision: default_score_precision(),
        }
    }
}

impl EvaluationConfig {
    pub fn alignment_settings(&self) -> AlignmentSettings {
        AlignmentSettings {
            target: self.target_scale,
            min_matched_pairs: self.min_matched_pairs,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/models.toml",
            "../config/models.toml",
            "wordsim-bench/config/models.toml",
        ];

        for path in &config_paths {
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(ConfigError::Io(_)) => {}
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Display name of a `provider:model-id` value, when the model is configured
    pub fn display_name(&self, spec: &str) -> Option<&str> {
        let (provider, model) = parse_model_spec(spec);
        let pc = self.get_provider(provider)?;
        pc.get_model(model.unwrap_or(&pc.default_model))
            .map(|m| m.display_name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Get a specific provider config
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let scale = self.evaluation.target_scale;
        if !(scale.min < scale.max) {
            return Err(ConfigError::Invalid(format!(
                "evaluation.target_scale must have min < max, got {}..{}",
                scale.min, scale.max
            )));
        }
        if self.runner.max_attempts == 0 || self.runner.max_turn_attempts == 0 {
            return Err(ConfigError::Invalid(
                "runner.max_attempts and runner.max_turn_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = IndexMap::new();

        let mut anthropic_models = IndexMap::new();
        anthropic_models.insert("sonnet-4-5".to_string(), ModelConfig {
            id: "claude-sonnet-4-5-20250929".to_string(),
            display_name: "Claude Sonnet 4.5".to_string(),
            max_output_tokens: Some(8192),
            pricing: Some(Pricing::new(3.0, 15.0, "USD")),
        });
        anthropic_models.insert("haiku-4-5".to_string(), ModelConfig {
            id: "claude-haiku-4-5-20251001".to_string(),
            display_name: "Claude Haiku 4.5".to_string(),
            max_output_tokens: Some(8192),
            pricing: Some(Pricing::new(1.0, 5.0, "USD")),
        });

        providers.insert("anthropic".to_string(), ProviderConfig {
            name: "anthropic".to_string(),
            enabled: true,
            default_model: "claude-sonnet-4-5-20250929".to_string(),
            rpm: 1_000,
            tpm: 450_000,
            rate_limit_delay_ms: 0,
            max_output_tokens: default_max_output_tokens(),
            base_url: None,
            pricing: None,
            models: anthropic_models,
        });

        let mut openai_models = IndexMap::new();
        openai_models.insert("gpt-4o".to_string(), ModelConfig {
            id: "gpt-4o".to_string(),
            display_name: "GPT-4o".to_string(),
            max_output_tokens: Some(4096),
            pricing: Some(Pricing::new(2.5, 10.0, "USD")),
        });
        openai_models.insert("gpt-4o-mini".to_string(), ModelConfig {
            id: "gpt-4o-mini".to_string(),
            display_name: "GPT-4o mini".to_string(),
            max_output_tokens: Some(4096),
            pricing: Some(Pricing::new(0.15, 0.6, "USD")),
        });

        providers.insert("openai".to_string(), ProviderConfig {
            name: "openai".to_string(),
            enabled: true,
            default_model: "gpt-4o".to_string(),
            rpm: 500,
            tpm: 200_000,
            rate_limit_delay_ms: 0,
            max_output_tokens: default_max_output_tokens(),
            base_url: None,
            pricing: None,
            models: openai_models,
        });

        Self {
            providers,
            runner: RunnerConfig::default(),
            evaluation: EvaluationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Get model config by ID
    pub fn get_model(&self, model_id: &str) -> Option<&ModelConfig> {
        self.models.values().find(|m| m.id == model_id)
    }

    /// Pricing of `model_id`, falling back to the provider-wide pricing
    pub fn pricing_for(&self, model_id: &str) -> Option<&Pricing> {
        self.get_model(model_id)
            .and_then(|m| m.pricing.as_ref())
            .or(self.pricing.as_ref())
    }

    /// Output token limit of `model_id`
    pub fn max_output_tokens_for(&self, model_id: &str) -> u32 {
        self.get_model(model_id)
            .and_then(|m| m.max_output_tokens)
            .unwrap_or(self.max_output_tokens)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.providers.contains_key("anthropic"));
        assert!(config.providers.contains_key("openai"));
        assert_eq!(config.runner.max_attempts, 3);
        assert_eq!(config.evaluation.min_matched_pairs, 10);
    }

    #[test]
    fn test_parse_toml_config() {
        let toml = r#"
[providers.test]
name = "test"
enabled = true
default_model = "test-model"
rpm = 100
tpm = 50000
rate_limit_delay_ms = 250

[providers.test.pricing]
input_per_million = 1.0
output_per_million = 2.0

[providers.test.models.default]
id = "test-model"
display_name = "Test Model"
max_output_tokens = 1024

[runner]
max_attempts = 2

[evaluation]
target_scale = { min = 0, max = 10 }
"#;
        let config = Config::from_toml(toml).unwrap();
        let provider = config.get_provider("test").unwrap();
        assert_eq!(provider.default_model, "test-model");
        assert_eq!(provider.rate_limit_delay_ms, 250);
        assert_eq!(provider.max_output_tokens_for("test-model"), 1024);
        assert_eq!(provider.max_output_tokens_for("other"), 4096);
        assert_eq!(provider.pricing_for("test-model").unwrap().currency, "USD");

        assert_eq!(config.display_name("test:test-model"), Some("Test Model"));
        assert_eq!(config.display_name("test"), Some("Test Model"));
        assert_eq!(config.display_name("test:other"), None);
        assert_eq!(config.display_name("missing:test-model"), None);

        assert_eq!(config.runner.max_attempts, 2);
        assert_eq!(config.runner.max_turn_attempts, 3);
        assert_eq!(config.evaluation.target_scale, Range::new(0.0, 10.0));
        assert_eq!(config.output.output_dir, "results/runs");
    }

    #[test]
    fn test_invalid_scale_rejected() {
        let toml = "[evaluation]\ntarget_scale = { min = 5, max = 1 }\n";
        assert!(matches!(Config::from_toml(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_trial_settings() {
        let settings = RunnerConfig::default().trial_settings();
        assert_eq!(settings.backoff_base, Duration::from_secs(1));
        assert_eq!(settings.timeout, Some(Duration::from_secs(120)));

        let no_timeout = RunnerConfig { timeout_ms: 0, ..RunnerConfig::default() };
        assert_eq!(no_timeout.trial_settings().timeout, None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("models.toml");

        let config = Config::default();
        config.save_toml(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
    }
}
