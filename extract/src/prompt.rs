//! Prompt assembly for the per-page extraction call.

use intake_crawl::ExtractedContent;
use intake_types::FieldDefinition;

/// Marker appended when body text is cut at the character budget.
pub const TRUNCATION_MARKER: &str = " [...truncated]";

/// Fixed system prompt. The six rules are the extraction contract; the
/// parser downstream assumes snippets are present and verbatim.
pub const SYSTEM_PROMPT: &str = "\
You are a precise data extraction assistant. You will be given a table of \
schema fields and the text content of one web page. Follow these rules:
1. Extract only the fields listed in the schema; never invent fields.
2. For every extracted value, provide a verbatim snippet copied exactly from \
the page text that supports it.
3. Assign each extraction a confidence between 0 and 1.
4. Skip any field the page gives no direct textual evidence for.
5. For enum fields, match one of the listed options case-insensitively, or \
skip the field.
6. Never fabricate or guess values. An omitted field is always better than \
an invented one.";

/// One line per field: `key (type): label; Instructions; Options; Regex`.
#[must_use]
pub fn field_table(fields: &[FieldDefinition]) -> String {
    let mut table = String::new();
    for field in fields {
        table.push_str(&format!(
            "- {} ({}): {}",
            field.key,
            field.field_type.as_str(),
            field.label
        ));
        if !field.instructions.trim().is_empty() {
            table.push_str(&format!("; Instructions: {}", field.instructions.trim()));
        }
        if let Some(options) = &field.enum_options {
            table.push_str(&format!("; Options: {}", options.join(", ")));
        }
        if let Some(regex) = field.validation.as_ref().and_then(|v| v.regex.as_ref()) {
            table.push_str(&format!("; Regex: {regex}"));
        }
        table.push('\n');
    }
    table
}

/// The user message: field table, then the page context.
#[must_use]
pub fn build_user_message(
    fields: &[FieldDefinition],
    content: &ExtractedContent,
    max_body_chars: usize,
) -> String {
    let mut message = String::new();
    message.push_str("Fields to extract:\n");
    message.push_str(&field_table(fields));
    message.push_str("\nPage URL: ");
    message.push_str(&content.url);
    if let Some(title) = &content.title {
        message.push_str("\nPage title: ");
        message.push_str(title);
    }
    if let Some(description) = &content.meta_description {
        message.push_str("\nMeta description: ");
        message.push_str(description);
    }
    if !content.headings.is_empty() {
        message.push_str("\nHeadings: ");
        message.push_str(&content.headings.join(" | "));
    }
    message.push_str("\n\nPage text:\n");
    message.push_str(&truncate_at_word_boundary(
        &content.body_text,
        max_body_chars,
    ));
    message
}

/// Cut text at `max_chars`, backing up to the previous word boundary, and
/// mark the cut.
#[must_use]
pub fn truncate_at_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}{}", trimmed.trim_end(), TRUNCATION_MARKER)
}
