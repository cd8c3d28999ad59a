//! Tenant-scoped extraction schemas and their immutable versions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{SchemaId, TenantId};

/// Maximum length of a field key.
pub const MAX_FIELD_KEY_LEN: usize = 100;

/// Default confidence threshold applied when a field does not set one.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;

/// A named collection of extraction schema versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub id: SchemaId,
    pub tenant_id: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One immutable version of a schema. Versions are append-only; the highest
/// version number is "latest".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub schema_id: SchemaId,
    pub version: u32,
    pub fields: Vec<FieldDefinition>,
    pub created_at: DateTime<Utc>,
}

/// The value type a field extracts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "enum")]
    Enum,
    #[serde(rename = "string[]")]
    StringList,
}

impl FieldType {
    /// Wire name as it appears in schema definitions and prompts.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Enum => "enum",
            FieldType::StringList => "string[]",
        }
    }
}

/// Optional per-field constraints evaluated after synthesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

/// A single field a schema version asks the pipeline to extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    /// Unique within a version. `[a-z0-9_]+`, at most 100 characters.
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Free-text guidance passed verbatim to the LLM.
    #[serde(default)]
    pub instructions: String,
    /// Required when `field_type` is `Enum`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<FieldValidation>,
    /// Confidence below this marks the value `needs_review`. Defaults to 0.75.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    /// URL substrings that mark a page as a preferred source for this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hints: Option<Vec<String>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldDefinitionError {
    #[error("field key must match [a-z0-9_]+ and be at most {MAX_FIELD_KEY_LEN} chars: {key:?}")]
    InvalidKey { key: String },
    #[error("enum field {key:?} must declare at least one option")]
    MissingEnumOptions { key: String },
    #[error("field {key:?} confidence threshold must be within [0, 1]")]
    ThresholdOutOfRange { key: String },
    #[error("duplicate field key {key:?}")]
    DuplicateKey { key: String },
}

impl FieldDefinition {
    /// Effective threshold for this field.
    #[must_use]
    pub fn threshold(&self, default: f64) -> f64 {
        self.confidence_threshold.unwrap_or(default)
    }

    /// Check the structural invariants of a single definition.
    pub fn validate(&self) -> Result<(), FieldDefinitionError> {
        if !is_valid_field_key(&self.key) {
            return Err(FieldDefinitionError::InvalidKey {
                key: self.key.clone(),
            });
        }
        if self.field_type == FieldType::Enum
            && self.enum_options.as_ref().is_none_or(Vec::is_empty)
        {
            return Err(FieldDefinitionError::MissingEnumOptions {
                key: self.key.clone(),
            });
        }
        if let Some(threshold) = self.confidence_threshold
            && !(0.0..=1.0).contains(&threshold)
        {
            return Err(FieldDefinitionError::ThresholdOutOfRange {
                key: self.key.clone(),
            });
        }
        Ok(())
    }
}

/// Validate a full field list: per-field invariants plus key uniqueness.
pub fn validate_fields(fields: &[FieldDefinition]) -> Result<(), FieldDefinitionError> {
    let mut seen = std::collections::HashSet::new();
    for field in fields {
        field.validate()?;
        if !seen.insert(field.key.as_str()) {
            return Err(FieldDefinitionError::DuplicateKey {
                key: field.key.clone(),
            });
        }
    }
    Ok(())
}

fn is_valid_field_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_FIELD_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(key: &str, field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            key: key.to_string(),
            label: key.to_string(),
            field_type,
            required: false,
            instructions: String::new(),
            enum_options: None,
            validation: None,
            confidence_threshold: None,
            source_hints: None,
        }
    }

    #[test]
    fn accepts_snake_case_keys() {
        assert!(field("company_name", FieldType::String).validate().is_ok());
        assert!(field("phone2", FieldType::String).validate().is_ok());
    }

    #[test]
    fn rejects_bad_keys() {
        for key in ["", "Company", "with-dash", "with space", &"x".repeat(101)] {
            assert!(
                field(key, FieldType::String).validate().is_err(),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn enum_requires_options() {
        let mut f = field("industry", FieldType::Enum);
        assert_eq!(
            f.validate(),
            Err(FieldDefinitionError::MissingEnumOptions {
                key: "industry".into()
            })
        );
        f.enum_options = Some(vec!["SaaS".into()]);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn threshold_must_be_unit_interval() {
        let mut f = field("name", FieldType::String);
        f.confidence_threshold = Some(1.2);
        assert!(f.validate().is_err());
        f.confidence_threshold = Some(0.6);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn duplicate_keys_rejected() {
        let fields = vec![
            field("name", FieldType::String),
            field("name", FieldType::String),
        ];
        assert_eq!(
            validate_fields(&fields),
            Err(FieldDefinitionError::DuplicateKey { key: "name".into() })
        );
    }

    #[test]
    fn field_type_round_trips_wire_names() {
        let json = serde_json::to_string(&FieldType::StringList).unwrap();
        assert_eq!(json, "\"string[]\"");
        let back: FieldType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FieldType::StringList);
    }
}
