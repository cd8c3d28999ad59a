//! LLM provider clients.
//!
//! This crate handles HTTP communication with the model API. The pipeline
//! only ever makes one kind of call: a non-streaming chat request that
//! forces the model to invoke a single tool, returning the tool's input as
//! structured data. The [`LlmClient`] trait is the seam tests stub.

mod claude;
mod retry;

pub use claude::ClaudeClient;
pub use retry::RetryConfig;

use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection timeout for API requests.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Total request timeout. Tool-call responses are bounded; nothing streams.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Shared HTTP client for all provider requests.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("build shared HTTP client")
    })
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A tool the model may (or must) call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool input.
    pub input_schema: serde_json::Value,
}

/// Tool selection constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    /// Force a call to the named tool.
    Tool(String),
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub tool_choice: ToolChoice,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// The tool invocation extracted from the model's reply.
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub tool_name: String,
    pub input: serde_json::Value,
    pub usage: Usage,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model reply contained no tool call")]
    MissingToolCall,
    #[error("unreadable provider response: {0}")]
    InvalidResponse(String),
}

/// The one call the extraction phase makes. Implementations retry transient
/// provider failures internally; errors that escape are per-page fatal and
/// handled by the caller.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_with_tools(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<ToolResponse, LlmError>;
}
