//! Anthropic (Claude) Messages API client answering through a forced tool

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::strip_code_fence;
use super::traits::{ModelCapability, ModelResponse, ProviderError, ProviderResult, ResponseTool};
use crate::runner::rate_limiter::RateLimiter;
use crate::usage::{Pricing, Usage};

pub const PROVIDER: &str = "anthropic";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic API client bound to one model
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    model: String,
    id: String,
    max_tokens: u32,
    pricing: Option<Pricing>,
}

impl AnthropicClient {
    /// Create a new Anthropic client for the default model
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            http_client: Client::new(),
            rate_limiter: Arc::new(RateLimiter::new(60, 100_000)),
            model: DEFAULT_MODEL.to_string(),
            id: format!("{}:{}", PROVIDER, DEFAULT_MODEL),
            max_tokens: DEFAULT_MAX_TOKENS,
            pricing: None,
        }
    }

    /// Create from environment variable
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ProviderError::Config("ANTHROPIC_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Share a rate limiter with other clients of the same account
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.id = format!("{}:{}", PROVIDER, self.model);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Price reported usage with `pricing`
    pub fn with_pricing(mut self, pricing: Option<Pricing>) -> Self {
        self.pricing = pricing;
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
    tools: Vec<AnthropicTool<'a>>,
    tool_choice: ToolChoice<'a>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    choice_type: &'static str,
    name: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    /// Text content (for "text" blocks)
    text: Option<String>,
    /// Tool arguments (for "tool_use" blocks)
    input: Option<Value>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Tool arguments as JSON text, or the plain text answer when no tool was used
fn extract_data_text(content: &[ContentBlock]) -> ProviderResult<String> {
    if let Some(input) = content
        .iter()
        .find(|b| b.content_type == "tool_use")
        .and_then(|b| b.input.as_ref())
    {
        return serde_json::to_string(input).map_err(|e| ProviderError::Parse(e.to_string()));
    }

    let text = content
        .iter()
        .filter(|b| b.content_type == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    Ok(strip_code_fence(&text))
}

#[async_trait]
impl ModelCapability for AnthropicClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn rate_limit_delay(&self) -> Option<Duration> {
        self.rate_limiter.delay().await
    }

    async fn make_request(&self, prompt: &str, tool: &ResponseTool) -> ProviderResult<ModelResponse> {
        self.rate_limiter.record_request().await;

        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            tools: vec![AnthropicTool {
                name: &tool.name,
                description: &tool.description,
                input_schema: &tool.schema,
            }],
            tool_choice: ToolChoice {
                choice_type: "tool",
                name: &tool.name,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60)
                * 1000;
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<AnthropicError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
            };
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let tokens = api_response.usage.input_tokens + api_response.usage.output_tokens;
        self.rate_limiter
            .record_tokens(u32::try_from(tokens).unwrap_or(u32::MAX))
            .await;

        let usage = Usage::from_tokens(
            self.id.clone(),
            api_response.usage.input_tokens,
            api_response.usage.output_tokens,
            self.pricing.as_ref(),
        );

        tracing::debug!(
            "{} answered with {} input / {} output tokens",
            self.id,
            usage.input_tokens,
            usage.output_tokens
        );

        Ok(ModelResponse::new(extract_data_text(&api_response.content)?, Some(usage)))
    }
}
