//! The per-page LLM extraction call.

use chrono::{DateTime, Utc};
use intake_config::LlmConfig;
use intake_crawl::ExtractedContent;
use intake_providers::{
    ChatMessage, ChatOptions, LlmClient, LlmError, ToolChoice, ToolDefinition, Usage,
};
use intake_types::FieldDefinition;
use serde_json::json;

use crate::parser::{PageFieldExtraction, parse_tool_input};
use crate::prompt::{SYSTEM_PROMPT, build_user_message};

/// Name of the single tool the model is forced to call.
pub const EXTRACT_TOOL_NAME: &str = "extract_fields";

/// Everything one page contributed to synthesis.
#[derive(Debug, Clone)]
pub struct PageExtractions {
    pub url: String,
    pub page_title: Option<String>,
    pub retrieved_at: DateTime<Utc>,
    pub extractions: Vec<PageFieldExtraction>,
    pub usage: Usage,
}

impl PageExtractions {
    fn empty(content: &ExtractedContent) -> Self {
        Self {
            url: content.url.clone(),
            page_title: content.title.clone(),
            retrieved_at: content.fetched_at,
            extractions: Vec::new(),
            usage: Usage::default(),
        }
    }
}

/// Build the `extract_fields` tool schema. The `key` property is constrained
/// to the schema's field keys so the model cannot address unknown fields.
#[must_use]
pub fn extract_fields_tool(fields: &[FieldDefinition]) -> ToolDefinition {
    let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
    ToolDefinition {
        name: EXTRACT_TOOL_NAME.to_string(),
        description: "Report every schema field this page gives direct textual evidence for."
            .to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "extractions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "key": { "type": "string", "enum": keys },
                            "value": {
                                "description": "The extracted value, typed per the field definition."
                            },
                            "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                            "snippet": {
                                "type": "string",
                                "description": "Verbatim supporting text copied from the page."
                            },
                            "reason": { "type": "string" }
                        },
                        "required": ["key", "value", "confidence", "snippet"]
                    }
                }
            },
            "required": ["extractions"]
        }),
    }
}

/// Run one extraction call for one page.
///
/// Pages under the word-count floor contribute nothing without calling the
/// model. Provider errors propagate; the orchestrator treats them as
/// per-page failures, not run failures.
pub async fn extract_page(
    llm: &dyn LlmClient,
    fields: &[FieldDefinition],
    content: &ExtractedContent,
    config: &LlmConfig,
) -> Result<PageExtractions, LlmError> {
    if content.word_count < config.min_word_count {
        tracing::debug!(
            url = %content.url,
            word_count = content.word_count,
            "page below word-count floor, skipping extraction"
        );
        return Ok(PageExtractions::empty(content));
    }

    let tool = extract_fields_tool(fields);
    let message = ChatMessage::user(build_user_message(fields, content, config.max_body_chars));
    let options = ChatOptions {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        tool_choice: ToolChoice::Tool(EXTRACT_TOOL_NAME.to_string()),
    };

    let response = llm
        .chat_with_tools(SYSTEM_PROMPT, &[message], &[tool], &options)
        .await?;
    if response.tool_name != EXTRACT_TOOL_NAME {
        return Err(LlmError::InvalidResponse(format!(
            "model called unexpected tool {:?}",
            response.tool_name
        )));
    }

    let extractions = parse_tool_input(fields, &response.input);
    Ok(PageExtractions {
        url: content.url.clone(),
        page_title: content.title.clone(),
        retrieved_at: content.fetched_at,
        extractions,
        usage: response.usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_types::FieldType;
    use std::sync::Mutex;

    struct StubLlm {
        reply: serde_json::Value,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl LlmClient for StubLlm {
        async fn chat_with_tools(
            &self,
            _system: &str,
            messages: &[ChatMessage],
            tools: &[ToolDefinition],
            options: &ChatOptions,
        ) -> Result<intake_providers::ToolResponse, LlmError> {
            assert_eq!(tools.len(), 1);
            assert_eq!(
                options.tool_choice,
                ToolChoice::Tool(EXTRACT_TOOL_NAME.to_string())
            );
            self.calls
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            Ok(intake_providers::ToolResponse {
                tool_name: EXTRACT_TOOL_NAME.to_string(),
                input: self.reply.clone(),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            })
        }
    }

    fn fields() -> Vec<FieldDefinition> {
        vec![FieldDefinition {
            key: "company_name".to_string(),
            label: "Company name".to_string(),
            field_type: FieldType::String,
            required: true,
            instructions: String::new(),
            enum_options: None,
            validation: None,
            confidence_threshold: None,
            source_hints: None,
        }]
    }

    fn content(words: usize) -> ExtractedContent {
        let body = vec!["word"; words].join(" ");
        ExtractedContent {
            url: "https://example.com/".to_string(),
            title: Some("Home".to_string()),
            meta_description: None,
            headings: Vec::new(),
            word_count: words,
            body_text: body,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn short_pages_skip_the_model() {
        let llm = StubLlm {
            reply: json!({}),
            calls: Mutex::new(Vec::new()),
        };
        let config = LlmConfig::default();
        let result = extract_page(&llm, &fields(), &content(3), &config)
            .await
            .unwrap();
        assert!(result.extractions.is_empty());
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn extracts_and_parses_tool_output() {
        let llm = StubLlm {
            reply: json!({ "extractions": [
                { "key": "company_name", "value": "Acme Corp", "confidence": 0.9,
                  "snippet": "Acme Corp builds things" }
            ]}),
            calls: Mutex::new(Vec::new()),
        };
        let config = LlmConfig::default();
        let result = extract_page(&llm, &fields(), &content(50), &config)
            .await
            .unwrap();
        assert_eq!(result.extractions.len(), 1);
        assert_eq!(result.extractions[0].key, "company_name");
        assert_eq!(result.usage.input_tokens, 10);

        let sent = llm.calls.lock().unwrap();
        assert!(sent[0].contains("company_name (string)"));
        assert!(sent[0].contains("Page URL: https://example.com/"));
    }

    #[test]
    fn tool_schema_constrains_keys() {
        let tool = extract_fields_tool(&fields());
        let keys = tool.input_schema["properties"]["extractions"]["items"]["properties"]["key"]
            ["enum"]
            .as_array()
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0], "company_name");
    }
}
