//! Value canonicalization keyed by field-key heuristics.
//!
//! Runs after synthesis and before validation. Only text values are touched;
//! numbers, flags, lists, and absent values pass through unchanged.

use std::collections::HashMap;
use std::sync::OnceLock;

use intake_types::FieldValue;
use regex::Regex;

/// Normalize a synthesized value according to its field key.
#[must_use]
pub fn normalize_value(key: &str, value: FieldValue) -> FieldValue {
    let FieldValue::Text(text) = value else {
        return value;
    };
    let normalized = if phone_key_re().is_match(key) {
        normalize_phone(&text)
    } else if address_key_re().is_match(key) {
        normalize_address(&text)
    } else if company_key_re().is_match(key) {
        normalize_company_name(&text)
    } else {
        text
    };
    FieldValue::Text(normalized)
}

fn phone_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("(?i)phone|tel|fax").expect("static regex"))
}

fn address_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("(?i)address|location").expect("static regex"))
}

fn company_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("(?i)company.?name").expect("static regex"))
}

// ============================================================================
// Phone
// ============================================================================

/// US phone formatting: 10 digits -> `+1 (NNN) NNN-NNNN`; 11 digits with a
/// leading 1 -> same on digits 2-11; anything else is returned trimmed.
#[must_use]
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let ten = match digits.len() {
        10 => Some(&digits[..]),
        11 if digits.starts_with('1') => Some(&digits[1..]),
        _ => None,
    };
    match ten {
        Some(d) => format!("+1 ({}) {}-{}", &d[0..3], &d[3..6], &d[6..10]),
        None => raw.trim().to_string(),
    }
}

// ============================================================================
// Address
// ============================================================================

/// Collapse whitespace, abbreviate US state names and street suffixes.
#[must_use]
pub fn normalize_address(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_states = state_re().replace_all(&collapsed, |caps: &regex::Captures<'_>| {
        let matched = caps.get(0).map_or("", |m| m.as_str());
        state_codes()
            .get(matched.to_lowercase().as_str())
            .map_or_else(|| matched.to_string(), |code| (*code).to_string())
    });
    street_re()
        .replace_all(&with_states, |caps: &regex::Captures<'_>| {
            let matched = caps.get(0).map_or("", |m| m.as_str());
            street_abbrevs()
                .get(matched.to_lowercase().as_str())
                .map_or_else(|| matched.to_string(), |abbrev| (*abbrev).to_string())
        })
        .into_owned()
}

/// Full state names, longest-first so "West Virginia" never half-matches.
const STATES: &[(&str, &str)] = &[
    ("district of columbia", "DC"),
    ("massachusetts", "MA"),
    ("new hampshire", "NH"),
    ("north carolina", "NC"),
    ("south carolina", "SC"),
    ("north dakota", "ND"),
    ("pennsylvania", "PA"),
    ("rhode island", "RI"),
    ("south dakota", "SD"),
    ("west virginia", "WV"),
    ("connecticut", "CT"),
    ("mississippi", "MS"),
    ("california", "CA"),
    ("new jersey", "NJ"),
    ("new mexico", "NM"),
    ("washington", "WA"),
    ("louisiana", "LA"),
    ("minnesota", "MN"),
    ("tennessee", "TN"),
    ("wisconsin", "WI"),
    ("arkansas", "AR"),
    ("colorado", "CO"),
    ("delaware", "DE"),
    ("illinois", "IL"),
    ("kentucky", "KY"),
    ("maryland", "MD"),
    ("michigan", "MI"),
    ("missouri", "MO"),
    ("nebraska", "NE"),
    ("new york", "NY"),
    ("oklahoma", "OK"),
    ("virginia", "VA"),
    ("alabama", "AL"),
    ("arizona", "AZ"),
    ("florida", "FL"),
    ("georgia", "GA"),
    ("indiana", "IN"),
    ("montana", "MT"),
    ("vermont", "VT"),
    ("wyoming", "WY"),
    ("alaska", "AK"),
    ("hawaii", "HI"),
    ("kansas", "KS"),
    ("nevada", "NV"),
    ("oregon", "OR"),
    ("idaho", "ID"),
    ("maine", "ME"),
    ("texas", "TX"),
    ("iowa", "IA"),
    ("ohio", "OH"),
    ("utah", "UT"),
];

const STREET_SUFFIXES: &[(&str, &str)] = &[
    ("boulevard", "Blvd"),
    ("parkway", "Pkwy"),
    ("highway", "Hwy"),
    ("terrace", "Ter"),
    ("street", "St"),
    ("avenue", "Ave"),
    ("circle", "Cir"),
    ("square", "Sq"),
    ("drive", "Dr"),
    ("court", "Ct"),
    ("place", "Pl"),
    ("trail", "Trl"),
    ("lane", "Ln"),
    ("road", "Rd"),
    ("way", "Way"),
];

fn state_codes() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| STATES.iter().copied().collect())
}

fn street_abbrevs() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| STREET_SUFFIXES.iter().copied().collect())
}

fn state_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names: Vec<String> = STATES
            .iter()
            .map(|(name, _)| regex::escape(name).replace("\\ ", " "))
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", names.join("|"))).expect("static regex")
    })
}

fn street_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names: Vec<&str> = STREET_SUFFIXES.iter().map(|(name, _)| *name).collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", names.join("|"))).expect("static regex")
    })
}

// ============================================================================
// Company name
// ============================================================================

const BUSINESS_SUFFIXES: &[&str] = &[
    "Inc.", "Inc", "LLC", "Ltd.", "Ltd", "Corp.", "Corp", "Co.", "Co", "LP", "LLP", "PLC",
    "GmbH", "S.A.", "AG", "N.V.", "Pty", "Pty.", "P.C.",
];

/// Title-case a company name, preserving a trailing business suffix.
#[must_use]
pub fn normalize_company_name(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let (body, suffix) = split_business_suffix(trimmed);
    let titled = title_case(body);
    match suffix {
        Some(suffix) => format!("{titled} {suffix}"),
        None => titled,
    }
}

/// Split off a recognized trailing suffix, returning its canonical form.
fn split_business_suffix(name: &str) -> (&str, Option<&'static str>) {
    let Some(last_space) = name.rfind(char::is_whitespace) else {
        return (name, None);
    };
    let last_word = name[last_space..].trim();
    for suffix in BUSINESS_SUFFIXES {
        if last_word.eq_ignore_ascii_case(suffix) {
            return (name[..last_space].trim_end(), Some(suffix));
        }
    }
    (name, None)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
