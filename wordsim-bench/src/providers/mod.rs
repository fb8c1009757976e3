//! LLM Provider implementations

pub mod anthropic;
pub mod openai;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use openai::OpenAIClient;
pub use traits::{ModelCapability, ModelResponse, ProviderError, ProviderResult, ResponseTool};

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::{Config, ProviderConfig};
use crate::runner::rate_limiter::RateLimiter;

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fence(text: &str) -> String {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").ok());

    match fence.as_ref().and_then(|re| re.captures(text)) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()).trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Split a `provider:model-id` value. A bare provider name selects its
/// default model.
pub fn parse_model_spec(spec: &str) -> (&str, Option<&str>) {
    match spec.split_once(':') {
        Some((provider, model)) if !model.is_empty() => (provider, Some(model)),
        Some((provider, _)) => (provider, None),
        None => (spec, None),
    }
}

/// Resolves `provider:model-id` values to model capabilities.
///
/// Clients are created once per value; clients of the same provider share
/// one rate limiter.
pub struct ModelRegistry {
    providers: HashMap<String, ProviderConfig>,
    limiters: HashMap<String, Arc<RateLimiter>>,
    models: HashMap<String, Arc<dyn ModelCapability>>,
}

impl ModelRegistry {
    pub fn new(config: &Config) -> Self {
        Self {
            providers: config
                .providers
                .iter()
                .map(|(name, pc)| (name.to_lowercase(), pc.clone()))
                .collect(),
            limiters: HashMap::new(),
            models: HashMap::new(),
        }
    }

    /// Use `model` whenever `spec` is requested
    pub fn register(&mut self, spec: impl Into<String>, model: Arc<dyn ModelCapability>) {
        self.models.insert(spec.into(), model);
    }

    /// Get or create the capability for `spec`
    pub fn resolve(&mut self, spec: &str) -> ProviderResult<Arc<dyn ModelCapability>> {
        if let Some(model) = self.models.get(spec) {
            return Ok(model.clone());
        }

        let (provider, model) = parse_model_spec(spec);
        let provider = canonical_provider(provider)
            .ok_or_else(|| ProviderError::Config(format!("Unknown provider: {}", provider)))?;

        let pc = self.providers.get(provider).cloned().ok_or_else(|| {
            ProviderError::Config(format!("Provider {} is not configured", provider))
        })?;
        if !pc.enabled {
            return Err(ProviderError::Config(format!("Provider {} is disabled", provider)));
        }

        let model_id = model.unwrap_or(&pc.default_model).to_string();
        let limiter = self.limiter(provider, &pc);

        let capability: Arc<dyn ModelCapability> = match provider {
            anthropic::PROVIDER => {
                let mut client = AnthropicClient::from_env()?
                    .with_model(&model_id)
                    .with_max_tokens(pc.max_output_tokens_for(&model_id))
                    .with_pricing(pc.pricing_for(&model_id).cloned())
                    .with_rate_limiter(limiter);
                if let Some(url) = &pc.base_url {
                    client = client.with_base_url(url);
                }
                Arc::new(client)
            }
            _ => {
                let mut client = OpenAIClient::from_env()?
                    .with_model(&model_id)
                    .with_max_tokens(pc.max_output_tokens_for(&model_id))
                    .with_pricing(pc.pricing_for(&model_id).cloned())
                    .with_rate_limiter(limiter);
                if let Some(url) = &pc.base_url {
                    client = client.with_base_url(url);
                }
                Arc::new(client)
            }
        };

        tracing::debug!("Created client {} for {}", capability.id(), spec);
        self.models.insert(spec.to_string(), capability.clone());
        Ok(capability)
    }

    fn limiter(&mut self, provider: &str, pc: &ProviderConfig) -> Arc<RateLimiter> {
        self.limiters
            .entry(provider.to_string())
            .or_insert_with(|| {
                Arc::new(
                    RateLimiter::new(pc.rpm, pc.tpm)
                        .with_min_interval(Duration::from_millis(pc.rate_limit_delay_ms)),
                )
            })
            .clone()
    }
}

fn canonical_provider(name: &str) -> Option<&'static str> {
    match name.to_lowercase().as_str() {
        "anthropic" | "claude" => Some(anthropic::PROVIDER),
        "openai" | "gpt" => Some(openai::PROVIDER),
        _ => None,
    }
}
