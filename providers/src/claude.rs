//! Claude Messages API client with forced tool use.

use serde_json::{Value, json};

use crate::retry::{RetryConfig, is_retryable_status};
use crate::{
    ChatMessage, ChatOptions, LlmClient, LlmError, Role, ToolChoice, ToolDefinition, ToolResponse,
    Usage, http_client,
};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Maximum bytes read from an error body before truncating.
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Non-streaming Messages API client.
pub struct ClaudeClient {
    api_key: String,
    api_url: String,
    retry: RetryConfig,
    client: &'static reqwest::Client,
}

impl ClaudeClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            retry: RetryConfig::default(),
            client: http_client(),
        }
    }

    /// Point the client at a different endpoint (tests use a mock server).
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn build_body(
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role { Role::User => "user", Role::Assistant => "assistant" },
                    "content": m.content,
                })
            })
            .collect();

        let api_tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        let tool_choice = match &options.tool_choice {
            ToolChoice::Auto => json!({ "type": "auto" }),
            ToolChoice::Tool(name) => json!({ "type": "tool", "name": name }),
        };

        json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "system": system,
            "messages": api_messages,
            "tools": api_tools,
            "tool_choice": tool_choice,
        })
    }

    fn parse_response(body: &Value) -> Result<ToolResponse, LlmError> {
        let usage = body
            .get("usage")
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
            .unwrap_or_default();

        let blocks = body
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| LlmError::InvalidResponse("missing content array".to_string()))?;

        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                let tool_name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        LlmError::InvalidResponse("tool_use block missing name".to_string())
                    })?
                    .to_string();
                let input = block.get("input").cloned().unwrap_or(Value::Null);
                return Ok(ToolResponse {
                    tool_name,
                    input,
                    usage,
                });
            }
        }
        Err(LlmError::MissingToolCall)
    }

    async fn send_once(&self, body: &Value) -> Result<Result<Value, (u16, String)>, LlmError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            let parsed: Value = response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
            return Ok(Ok(parsed));
        }

        let mut error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        if error_body.len() > MAX_ERROR_BODY_BYTES {
            error_body.truncate(MAX_ERROR_BODY_BYTES);
            error_body.push_str("...(truncated)");
        }
        Ok(Err((status, error_body)))
    }
}

#[async_trait::async_trait]
impl LlmClient for ClaudeClient {
    async fn chat_with_tools(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        options: &ChatOptions,
    ) -> Result<ToolResponse, LlmError> {
        let body = Self::build_body(system, messages, tools, options);

        let mut attempt = 0u32;
        loop {
            match self.send_once(&body).await {
                Ok(Ok(parsed)) => return Self::parse_response(&parsed),
                Ok(Err((status, error_body))) => {
                    if is_retryable_status(status) && attempt < self.retry.max_retries {
                        attempt += 1;
                        let delay = self.retry.delay_for(attempt);
                        tracing::debug!(status, attempt, ?delay, "retrying provider call");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(LlmError::Api {
                        status,
                        body: error_body,
                    });
                }
                Err(transport) => {
                    if attempt < self.retry.max_retries {
                        attempt += 1;
                        let delay = self.retry.delay_for(attempt);
                        tracing::debug!(error = %transport, attempt, ?delay, "retrying provider call");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(transport);
                }
            }
        }
    }
}
