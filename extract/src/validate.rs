//! Per-field constraint validation.
//!
//! Runs last in the extraction phase. Issues demote a field to
//! `needs_review` (never to `unknown`) and are appended to any existing
//! reason. The regex path is guarded: patterns that look susceptible to
//! catastrophic backtracking, or that fail to compile within the size
//! limit, skip the check entirely rather than risk the run.

use intake_types::{ExtractedFieldValue, FieldDefinition, FieldStatus};
use regex::RegexBuilder;

/// Compiled-pattern size cap; oversized patterns skip the regex check.
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Validate every field value against its definition, attaching issues.
pub fn validate_record(fields: &[FieldDefinition], values: &mut [ExtractedFieldValue]) {
    for value in values.iter_mut() {
        if let Some(field) = fields.iter().find(|f| f.key == value.key) {
            validate_field(field, value);
        }
    }
}

/// Validate one field value in place.
pub fn validate_field(field: &FieldDefinition, extracted: &mut ExtractedFieldValue) {
    if extracted.status == FieldStatus::Unknown {
        return;
    }
    let Some(value) = extracted.value.as_ref() else {
        return;
    };

    let mut issues: Vec<String> = Vec::new();

    if value.matches_type(field.field_type) {
        if let Some(text) = value.as_text() {
            check_regex(field, text, &mut issues);
            check_length(field, text, &mut issues);
            check_enum(field, text, &mut issues);
        }
    } else {
        issues.push(format!(
            "Expected type {}, got a different type",
            field.field_type.as_str()
        ));
    }

    if issues.is_empty() {
        return;
    }
    extracted.status = FieldStatus::NeedsReview;
    let joined = issues.join("; ");
    extracted.reason = Some(match extracted.reason.take() {
        Some(existing) => format!("{existing}; {joined}"),
        None => joined,
    });
}

fn check_regex(field: &FieldDefinition, text: &str, issues: &mut Vec<String>) {
    let Some(pattern) = field
        .validation
        .as_ref()
        .and_then(|v| v.regex.as_deref())
        .filter(|p| !p.is_empty())
    else {
        return;
    };

    let Some(regex) = compile_guarded(pattern) else {
        tracing::warn!(
            key = %field.key,
            pattern,
            "regex rejected by safety guard, skipping pattern check"
        );
        return;
    };
    if !regex.is_match(text) {
        issues.push(format!("Value does not match pattern {pattern}"));
    }
}

fn check_length(field: &FieldDefinition, text: &str, issues: &mut Vec<String>) {
    let Some(validation) = field.validation.as_ref() else {
        return;
    };
    let len = text.chars().count();
    if let Some(min) = validation.min_len
        && len < min
    {
        issues.push(format!("Value is shorter than {min} characters"));
    }
    if let Some(max) = validation.max_len
        && len > max
    {
        issues.push(format!("Value is longer than {max} characters"));
    }
}

fn check_enum(field: &FieldDefinition, text: &str, issues: &mut Vec<String>) {
    let Some(options) = field.enum_options.as_deref() else {
        return;
    };
    if options.is_empty() {
        return;
    }
    if !options
        .iter()
        .any(|option| option.trim().eq_ignore_ascii_case(text.trim()))
    {
        issues.push(format!("Value is not one of: {}", options.join(", ")));
    }
}

/// Compile a user-supplied pattern behind the ReDoS guard.
///
/// The engine itself runs in linear time, so the guard is about refusing
/// patterns that signal an untrusted or broken schema (nested quantifiers
/// like `(x+)+`) and bounding compiled size, not about racing a timeout.
#[must_use]
pub fn compile_guarded(pattern: &str) -> Option<regex::Regex> {
    if has_nested_quantifier(pattern) {
        return None;
    }
    RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .ok()
}

/// Detect a quantified group that itself contains an unescaped quantifier,
/// the `(x+)+` / `(x*)*` family of catastrophic shapes.
fn has_nested_quantifier(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    let mut stack: Vec<bool> = Vec::new(); // per-group: saw a quantifier inside
    let mut escaped = false;
    let mut in_class = false;

    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'[' if !in_class => in_class = true,
            b']' if in_class => in_class = false,
            _ if in_class => {}
            b'(' => stack.push(false),
            b')' => {
                let inner_quantified = stack.pop().unwrap_or(false);
                let followed_by_quantifier = bytes
                    .get(i + 1)
                    .is_some_and(|&next| matches!(next, b'+' | b'*' | b'{'));
                if inner_quantified && followed_by_quantifier {
                    return true;
                }
                // A quantified group counts as a quantifier for its parent.
                if inner_quantified || followed_by_quantifier {
                    if let Some(parent) = stack.last_mut() {
                        *parent = true;
                    }
                }
            }
            b'+' | b'*' | b'{' => {
                if let Some(current) = stack.last_mut() {
                    *current = true;
                }
            }
            _ => {}
        }
    }
    false
}
