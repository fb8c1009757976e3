//! Model capability trait and request/response types

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::usage::Usage;

/// Tool the model must answer through: a name, a description and the JSON
/// schema of its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTool {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

/// Response from a model call
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub usage: Option<Usage>,
    data_text: String,
}

impl ModelResponse {
    pub fn new(data_text: impl Into<String>, usage: Option<Usage>) -> Self {
        Self {
            usage,
            data_text: data_text.into(),
        }
    }

    /// Raw text of the structured answer, expected to be JSON
    pub fn data_text(&self) -> &str {
        &self.data_text
    }
}

/// Error types for provider operations
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A model that can be asked to answer through a tool
#[async_trait]
pub trait ModelCapability: Send + Sync {
    /// Model identity used for usage accounting, e.g. `anthropic:claude-sonnet-4-5`
    fn id(&self) -> &str;

    /// Delay to wait before the next call, if the model is rate limited
    async fn rate_limit_delay(&self) -> Option<Duration> {
        None
    }

    /// Send one prompt and return the tool answer
    async fn make_request(&self, prompt: &str, tool: &ResponseTool) -> ProviderResult<ModelResponse>;
}
