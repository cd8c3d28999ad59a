//! Deterministic merge of per-page extractions into one record.
//!
//! Pure code: no IO, no model. For each schema field the candidates from
//! every page are grouped by normalized value; the strongest group wins,
//! agreement raises confidence, disagreement flags the field for review,
//! and silence produces the explicit `unknown` shape.

use intake_config::SynthesisConfig;
use intake_types::{Citation, ExtractedFieldValue, FieldDefinition, FieldStatus, FieldValue};

use crate::extractor::PageExtractions;

/// One page's vote for one field.
#[derive(Debug, Clone)]
struct Candidate {
    value: FieldValue,
    confidence: f64,
    citation: Citation,
}

#[derive(Debug)]
struct Group {
    normalized: String,
    candidates: Vec<Candidate>,
    total_confidence: f64,
}

/// Synthesize one [`ExtractedFieldValue`] per schema field, in field order.
/// Fields with no candidates anywhere come back as `unknown`.
#[must_use]
pub fn synthesize(
    fields: &[FieldDefinition],
    pages: &[PageExtractions],
    config: &SynthesisConfig,
) -> Vec<ExtractedFieldValue> {
    fields
        .iter()
        .map(|field| synthesize_field(field, pages, config))
        .collect()
}

fn synthesize_field(
    field: &FieldDefinition,
    pages: &[PageExtractions],
    config: &SynthesisConfig,
) -> ExtractedFieldValue {
    let candidates = bucket_candidates(field, pages, config);
    if candidates.is_empty() {
        return ExtractedFieldValue::unknown(&field.key);
    }

    let groups = group_by_normalized(candidates);
    let conflict_reason = if groups.len() > 1 {
        Some(conflict_reason(&groups))
    } else {
        None
    };

    // Strongest group: total confidence, then candidate count; earliest
    // encountered wins remaining ties.
    let mut chosen = &groups[0];
    for group in &groups[1..] {
        let ordering = group
            .total_confidence
            .total_cmp(&chosen.total_confidence)
            .then(group.candidates.len().cmp(&chosen.candidates.len()));
        if ordering == std::cmp::Ordering::Greater {
            chosen = group;
        }
    }

    let max_confidence = chosen
        .candidates
        .iter()
        .map(|c| c.confidence)
        .fold(0.0_f64, f64::max);
    let corroboration = config.corroboration_boost * (chosen.candidates.len() as f64 - 1.0);
    let confidence = (max_confidence + corroboration).min(1.0);

    let value = chosen.candidates[0].value.clone();
    let citations: Vec<Citation> = chosen.candidates.iter().map(|c| c.citation.clone()).collect();

    let (status, reason) = if let Some(reason) = conflict_reason {
        (FieldStatus::NeedsReview, Some(reason))
    } else {
        let threshold = field.threshold(config.default_confidence_threshold);
        if confidence >= threshold {
            (FieldStatus::Auto, None)
        } else {
            (
                FieldStatus::NeedsReview,
                Some(format!(
                    "Confidence {confidence:.2} below threshold {threshold:.2}"
                )),
            )
        }
    };

    ExtractedFieldValue {
        key: field.key.clone(),
        value: Some(value),
        confidence,
        citations,
        status,
        reason,
    }
}

/// Collect every extraction for this field, applying the source-hint boost.
fn bucket_candidates(
    field: &FieldDefinition,
    pages: &[PageExtractions],
    config: &SynthesisConfig,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for page in pages {
        let url_lower = page.url.to_lowercase();
        let hint_match = field
            .source_hints
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|hint| !hint.is_empty() && url_lower.contains(&hint.to_lowercase()));

        for extraction in page.extractions.iter().filter(|e| e.key == field.key) {
            let confidence = if hint_match {
                (extraction.confidence + config.source_hint_boost).min(1.0)
            } else {
                extraction.confidence
            };
            candidates.push(Candidate {
                value: extraction.value.clone(),
                confidence,
                citation: Citation {
                    source_url: page.url.clone(),
                    snippet_text: extraction.snippet.clone(),
                    page_title: page.page_title.clone(),
                    retrieved_at: page.retrieved_at,
                    confidence: extraction.confidence,
                },
            });
        }
    }
    candidates
}

/// Group candidates by normalized value, preserving encounter order.
fn group_by_normalized(candidates: Vec<Candidate>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    for candidate in candidates {
        let normalized = candidate.value.normalized();
        match groups.iter_mut().find(|g| g.normalized == normalized) {
            Some(group) => {
                group.total_confidence += candidate.confidence;
                group.candidates.push(candidate);
            }
            None => groups.push(Group {
                normalized,
                total_confidence: candidate.confidence,
                candidates: vec![candidate],
            }),
        }
    }
    groups
}

/// `Conflicting values found: "v1" vs "v2" [vs ...]`, one entry per group in
/// encounter order, using each group's first candidate value.
fn conflict_reason(groups: &[Group]) -> String {
    let values: Vec<String> = groups
        .iter()
        .map(|g| format!("\"{}\"", g.candidates[0].value))
        .collect();
    format!("Conflicting values found: {}", values.join(" vs "))
}
