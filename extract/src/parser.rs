//! Tool-output parsing and type coercion.
//!
//! The model's tool input is untrusted JSON. This boundary turns it into
//! typed [`PageFieldExtraction`]s and drops anything that cannot be coerced;
//! no dynamic value shapes survive past this module.

use std::collections::HashMap;

use intake_types::{FieldDefinition, FieldType, FieldValue};
use serde_json::Value;

/// One coerced extraction from one page.
#[derive(Debug, Clone)]
pub struct PageFieldExtraction {
    pub key: String,
    pub value: FieldValue,
    pub confidence: f64,
    pub snippet: String,
    pub reason: Option<String>,
}

/// Parse the `extract_fields` tool input.
///
/// Entries are dropped when the key is not in the schema, the snippet is
/// empty, or the value cannot be coerced to the field's type. Confidence is
/// clamped into [0, 1]; non-finite becomes 0.
#[must_use]
pub fn parse_tool_input(fields: &[FieldDefinition], input: &Value) -> Vec<PageFieldExtraction> {
    let by_key: HashMap<&str, &FieldDefinition> =
        fields.iter().map(|f| (f.key.as_str(), f)).collect();

    let Some(entries) = input.get("extractions").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut extractions = Vec::new();
    for entry in entries {
        let Some(key) = entry.get("key").and_then(Value::as_str) else {
            continue;
        };
        let Some(field) = by_key.get(key) else {
            tracing::debug!(key, "dropping extraction for unknown field");
            continue;
        };
        let snippet = entry
            .get("snippet")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if snippet.is_empty() {
            tracing::debug!(key, "dropping extraction with empty snippet");
            continue;
        }
        let Some(value) = coerce_value(field, entry.get("value").unwrap_or(&Value::Null)) else {
            tracing::debug!(key, "dropping extraction with uncoercible value");
            continue;
        };
        let confidence = clamp_confidence(entry.get("confidence"));
        let reason = entry
            .get("reason")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        extractions.push(PageFieldExtraction {
            key: key.to_string(),
            value,
            confidence,
            snippet,
            reason,
        });
    }
    extractions
}

fn clamp_confidence(raw: Option<&Value>) -> f64 {
    let confidence = raw.and_then(Value::as_f64).unwrap_or(0.0);
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Coerce a JSON value into the field's type, or drop it.
fn coerce_value(field: &FieldDefinition, raw: &Value) -> Option<FieldValue> {
    match field.field_type {
        FieldType::String => coerce_string(raw).map(FieldValue::Text),
        FieldType::Number => match raw {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).map(FieldValue::Number),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(FieldValue::Number),
            _ => None,
        },
        FieldType::Boolean => match raw {
            Value::Bool(b) => Some(FieldValue::Flag(*b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" => Some(FieldValue::Flag(true)),
                "false" | "no" => Some(FieldValue::Flag(false)),
                _ => None,
            },
            _ => None,
        },
        FieldType::Enum => {
            let candidate = coerce_string(raw)?;
            let options = field.enum_options.as_deref()?;
            options
                .iter()
                .find(|option| option.trim().eq_ignore_ascii_case(candidate.trim()))
                .map(|option| FieldValue::Text(option.clone()))
        }
        FieldType::StringList => match raw {
            Value::Array(items) => {
                let list: Vec<String> = items
                    .iter()
                    .filter_map(coerce_string)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Some(FieldValue::List(list))
            }
            Value::String(s) => Some(FieldValue::List(
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect(),
            )),
            _ => None,
        },
    }
}

fn coerce_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(key: &str, field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            key: key.to_string(),
            label: key.to_string(),
            field_type,
            required: false,
            instructions: String::new(),
            enum_options: match field_type {
                FieldType::Enum => Some(vec!["SaaS".to_string(), "Agency".to_string()]),
                _ => None,
            },
            validation: None,
            confidence_threshold: None,
            source_hints: None,
        }
    }

    fn entry(key: &str, value: Value, confidence: Value) -> Value {
        json!({ "key": key, "value": value, "confidence": confidence, "snippet": "from the page" })
    }

    #[test]
    fn drops_unknown_keys_and_empty_snippets() {
        let fields = vec![field("name", FieldType::String)];
        let input = json!({ "extractions": [
            entry("name", json!("Acme"), json!(0.9)),
            entry("not_in_schema", json!("x"), json!(0.9)),
            { "key": "name", "value": "Acme", "confidence": 0.9, "snippet": "   " },
        ]});
        let parsed = parse_tool_input(&fields, &input);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].key, "name");
    }

    #[test]
    fn clamps_confidence() {
        let fields = vec![field("name", FieldType::String)];
        let input = json!({ "extractions": [
            entry("name", json!("a"), json!(1.7)),
            entry("name", json!("b"), json!(-0.2)),
            entry("name", json!("c"), json!("not a number")),
        ]});
        let parsed = parse_tool_input(&fields, &input);
        assert_eq!(parsed[0].confidence, 1.0);
        assert_eq!(parsed[1].confidence, 0.0);
        assert_eq!(parsed[2].confidence, 0.0);
    }

    #[test]
    fn coerces_numbers_and_drops_non_numeric() {
        let fields = vec![field("employees", FieldType::Number)];
        let input = json!({ "extractions": [
            entry("employees", json!(42), json!(0.9)),
            entry("employees", json!("17.5"), json!(0.9)),
            entry("employees", json!("many"), json!(0.9)),
        ]});
        let parsed = parse_tool_input(&fields, &input);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].value, FieldValue::Number(42.0));
        assert_eq!(parsed[1].value, FieldValue::Number(17.5));
    }

    #[test]
    fn coerces_booleans_from_yes_no() {
        let fields = vec![field("hiring", FieldType::Boolean)];
        let input = json!({ "extractions": [
            entry("hiring", json!("Yes"), json!(0.8)),
            entry("hiring", json!("NO"), json!(0.8)),
            entry("hiring", json!(true), json!(0.8)),
            entry("hiring", json!("maybe"), json!(0.8)),
        ]});
        let parsed = parse_tool_input(&fields, &input);
        let flags: Vec<&FieldValue> = parsed.iter().map(|p| &p.value).collect();
        assert_eq!(
            flags,
            [
                &FieldValue::Flag(true),
                &FieldValue::Flag(false),
                &FieldValue::Flag(true)
            ]
        );
    }

    #[test]
    fn enum_matches_case_insensitively_and_canonicalizes() {
        let fields = vec![field("industry", FieldType::Enum)];
        let input = json!({ "extractions": [
            entry("industry", json!("saas"), json!(0.8)),
            entry("industry", json!(" AGENCY "), json!(0.8)),
            entry("industry", json!("fintech"), json!(0.8)),
        ]});
        let parsed = parse_tool_input(&fields, &input);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].value, FieldValue::Text("SaaS".to_string()));
        assert_eq!(parsed[1].value, FieldValue::Text("Agency".to_string()));
    }

    #[test]
    fn string_lists_split_on_commas() {
        let fields = vec![field("services", FieldType::StringList)];
        let input = json!({ "extractions": [
            entry("services", json!("design, build , ship"), json!(0.8)),
            entry("services", json!(["a", " b ", ""]), json!(0.8)),
        ]});
        let parsed = parse_tool_input(&fields, &input);
        assert_eq!(
            parsed[0].value,
            FieldValue::List(vec!["design".into(), "build".into(), "ship".into()])
        );
        assert_eq!(
            parsed[1].value,
            FieldValue::List(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn missing_extractions_array_yields_nothing() {
        let fields = vec![field("name", FieldType::String)];
        assert!(parse_tool_input(&fields, &json!({})).is_empty());
        assert!(parse_tool_input(&fields, &json!({ "extractions": "nope" })).is_empty());
    }
}
