//! OpenAI Chat Completions client answering through a forced function tool

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

pub const PROVIDER: &str = "openai";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// OpenAI API client bound to one model
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    model: String,
    id: String,
    max_tokens: u32,
    pricing: Option<Pricing>,
}

impl OpenAIClient {
    /// Create a new OpenAI client for the default model
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            http_client: Client::new(),
            rate_limiter: Arc::new(RateLimiter::new(500, 200_000)),
            model: DEFAULT_MODEL.to_string(),
            id: format!("{}:{}", PROVIDER, DEFAULT_MODEL),
            max_tokens: DEFAULT_MAX_TOKENS,
            pricing: None,
        }
    }

    /// Create from environment variable
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Config("OPENAI_API_KEY not set".to_string()))?;
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

    /// Reasoning and GPT-5.x models take `max_completion_tokens`
    fn uses_completion_tokens(&self) -> bool {
        self.model.starts_with("o1") || self.model.starts_with("o3") || self.model.starts_with("gpt-5")
    }

    fn request_body<'a>(&'a self, prompt: &'a str, tool: &'a ResponseTool) -> OpenAIRequest<'a> {
        let (max_tokens, max_completion_tokens) = if self.uses_completion_tokens() {
            (None, Some(self.max_tokens))
        } else {
            (Some(self.max_tokens), None)
        };

        OpenAIRequest {
            model: &self.model,
            messages: vec![RequestMessage {
                role: "user",
                content: prompt,
            }],
            tools: vec![FunctionTool {
                tool_type: "function",
                function: FunctionDefinition {
                    name: &tool.name,
                    description: &tool.description,
                    parameters: &tool.schema,
                },
            }],
            tool_choice: FunctionChoice {
                choice_type: "function",
                function: FunctionName { name: &tool.name },
            },
            max_tokens,
            max_completion_tokens,
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
    tools: Vec<FunctionTool<'a>>,
    tool_choice: FunctionChoice<'a>,
    /// For standard models
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    /// For reasoning models (o1, o3) and GPT-5.x
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: FunctionDefinition<'a>,
}

#[derive(Serialize)]
struct FunctionDefinition<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize)]
struct FunctionChoice<'a> {
    #[serde(rename = "type")]
    choice_type: &'static str,
    function: FunctionName<'a>,
}

#[derive(Serialize)]
struct FunctionName<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    usage: OpenAIUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    arguments: String,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Function arguments of the first tool call, else the message content
fn extract_data_text(message: &ResponseMessage) -> String {
    match message.tool_calls.first() {
        Some(call) => call.function.arguments.clone(),
        None => strip_code_fence(message.content.as_deref().unwrap_or_default()),
    }
}

#[async_trait]
impl ModelCapability for OpenAIClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn rate_limit_delay(&self) -> Option<Duration> {
        self.rate_limiter.delay().await
    }

    async fn make_request(&self, prompt: &str, tool: &ResponseTool) -> ProviderResult<ModelResponse> {
        self.rate_limiter.record_request().await;

        let body = self.request_body(prompt, tool);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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

            // OpenAI returns 429 both for rate limits and for an exhausted quota;
            // only the former is worth retrying.
            let body = response.text().await.unwrap_or_default();
            if let Ok(error) = serde_json::from_str::<OpenAIError>(&body) {
                let error_type = error.error.error_type.as_deref().unwrap_or("");
                if error_type == "insufficient_quota" || error.error.message.contains("exceeded your current quota") {
                    return Err(ProviderError::Config(format!(
                        "OpenAI quota exceeded: {}",
                        error.error.message
                    )));
                }
                tracing::debug!("Rate limited (type={}): {}", error_type, error.error.message);
            }

            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OpenAIError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
            };

            if status == 401 || status == 403 {
                return Err(ProviderError::Config(format!(
                    "OpenAI auth error ({}): {}",
                    status.as_u16(),
                    message
                )));
            }

            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let tokens = api_response.usage.prompt_tokens + api_response.usage.completion_tokens;
        self.rate_limiter
            .record_tokens(u32::try_from(tokens).unwrap_or(u32::MAX))
            .await;

        let choice = api_response
            .choices
            .first()
            .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

        let usage = Usage::from_tokens(
            self.id.clone(),
            api_response.usage.prompt_tokens,
            api_response.usage.completion_tokens,
            self.pricing.as_ref(),
        );

        Ok(ModelResponse::new(extract_data_text(&choice.message), Some(usage)))
    }
}
