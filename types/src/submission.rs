//! Submissions and the extracted record they carry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{SchemaId, SubmissionId, TenantId};
use crate::schema::FieldType;

// ============================================================================
// Field values
// ============================================================================

/// A schema-typed extracted value.
///
/// Tool output is coerced into this variant at the extraction boundary;
/// nothing downstream handles untyped JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
    List(Vec<String>),
}

impl FieldValue {
    /// Whether this value inhabits the given schema type. Enum fields carry
    /// text values.
    #[must_use]
    pub fn matches_type(&self, field_type: FieldType) -> bool {
        matches!(
            (self, field_type),
            (FieldValue::Text(_), FieldType::String | FieldType::Enum)
                | (FieldValue::Number(_), FieldType::Number)
                | (FieldValue::Flag(_), FieldType::Boolean)
                | (FieldValue::List(_), FieldType::StringList)
        )
    }

    /// Canonical comparison form: lowercased and trimmed; lists are
    /// element-normalized, sorted, and comma-joined.
    #[must_use]
    pub fn normalized(&self) -> String {
        match self {
            FieldValue::Text(s) => s.trim().to_lowercase(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Flag(b) => b.to_string(),
            FieldValue::List(items) => {
                let mut normalized: Vec<String> =
                    items.iter().map(|s| s.trim().to_lowercase()).collect();
                normalized.sort();
                normalized.join(",")
            }
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Flag(b) => write!(f, "{b}"),
            FieldValue::List(items) => f.write_str(&items.join(", ")),
        }
    }
}

/// Review state of one extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    /// Confident and constraint-clean; accepted without review.
    Auto,
    NeedsReview,
    /// No page produced evidence for this field.
    Unknown,
}

/// Verbatim page evidence backing an extracted value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub source_url: String,
    pub snippet_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    pub retrieved_at: DateTime<Utc>,
    pub confidence: f64,
}

/// The synthesized answer for one schema field.
///
/// Invariant: `status == Unknown` iff `value` is `None`, `confidence` is 0,
/// and `citations` is empty. Use [`ExtractedFieldValue::unknown`] for that
/// case rather than assembling it by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFieldValue {
    pub key: String,
    pub value: Option<FieldValue>,
    pub confidence: f64,
    pub citations: Vec<Citation>,
    pub status: FieldStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExtractedFieldValue {
    /// The empty-bucket result: no evidence anywhere on the site.
    #[must_use]
    pub fn unknown(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            confidence: 0.0,
            citations: Vec::new(),
            status: FieldStatus::Unknown,
            reason: None,
        }
    }
}

// ============================================================================
// Submission lifecycle
// ============================================================================

/// Submission lifecycle. `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Draft,
    Confirmed,
    Failed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid submission transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
}

impl SubmissionStatus {
    /// Allowed moves: `pending -> draft -> confirmed`, with `pending` and
    /// `draft` both able to fail.
    #[must_use]
    pub fn can_transition(self, to: SubmissionStatus) -> bool {
        matches!(
            (self, to),
            (SubmissionStatus::Pending, SubmissionStatus::Draft)
                | (SubmissionStatus::Pending, SubmissionStatus::Failed)
                | (SubmissionStatus::Draft, SubmissionStatus::Confirmed)
                | (SubmissionStatus::Draft, SubmissionStatus::Failed)
        )
    }

    pub fn transition(self, to: SubmissionStatus) -> Result<SubmissionStatus, InvalidTransition> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

/// Who confirmed a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmedBy {
    Customer,
    Internal,
}

/// One website-to-record pass requested by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: SubmissionId,
    pub tenant_id: TenantId,
    pub schema_id: SchemaId,
    pub schema_version: u32,
    pub website_url: String,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub extracted_fields: Vec<ExtractedFieldValue>,
    #[serde(default)]
    pub artifacts: Vec<CrawlArtifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<ConfirmedBy>,
}

impl Submission {
    /// Create a new submission in `Pending`.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        schema_id: SchemaId,
        schema_version: u32,
        website_url: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SubmissionId::generate(),
            tenant_id,
            schema_id,
            schema_version,
            website_url: website_url.into(),
            status: SubmissionStatus::Pending,
            extracted_fields: Vec::new(),
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            confirmed_by: None,
        }
    }

    /// Move to a new status, stamping `updated_at`.
    pub fn set_status(&mut self, to: SubmissionStatus) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(to)?;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// Crawl artifacts
// ============================================================================

/// Coarse page classification derived from the URL path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    Home,
    About,
    Contact,
    Pricing,
    Team,
    Careers,
    Other,
}

impl PageType {
    /// Path heuristics; anything unrecognized is `Other`.
    #[must_use]
    pub fn classify(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return PageType::Home;
        }
        let segment = path.rsplit('/').next().unwrap_or("").to_lowercase();
        if segment.starts_with("about") {
            PageType::About
        } else if segment.starts_with("contact") {
            PageType::Contact
        } else if segment.starts_with("pricing") {
            PageType::Pricing
        } else if segment.starts_with("team") {
            PageType::Team
        } else if segment.starts_with("career") {
            PageType::Careers
        } else {
            PageType::Other
        }
    }
}

/// A stored snapshot of one fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlArtifact {
    pub submission_id: SubmissionId,
    pub url: String,
    pub status_code: u16,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
    pub raw_html_key: String,
    pub extracted_content_key: String,
    pub page_type: PageType,
}
