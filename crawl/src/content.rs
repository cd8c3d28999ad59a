//! Noise-stripped text extraction from fetched HTML.

use chrono::{DateTime, Utc};
use scraper::{Html, Node, Selector};
use serde::{Deserialize, Serialize};

use crate::fetch::FetchedPage;

/// Elements whose entire subtree is dropped before reading body text.
const STRIP_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "svg", "nav", "header", "footer", "iframe",
];

/// The text view of one page, as handed to the LLM extractor and stored as a
/// JSON artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedContent {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
    pub headings: Vec<String>,
    pub body_text: String,
    pub word_count: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Parse a static selector once, on first use.
macro_rules! static_selector {
    ($css:expr) => {{
        static SELECTOR: std::sync::OnceLock<Selector> = std::sync::OnceLock::new();
        SELECTOR.get_or_init(|| Selector::parse($css).expect("static selector must parse"))
    }};
}

/// Pure transform from fetched HTML to text content.
#[must_use]
pub fn extract_content(page: &FetchedPage) -> ExtractedContent {
    let document = Html::parse_document(&page.html);

    let title = document
        .select(static_selector!("title"))
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let meta_description = document
        .select(static_selector!("meta[name=\"description\"]"))
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|d| !d.is_empty());

    let headings: Vec<String> = document
        .select(static_selector!("h1, h2, h3, h4, h5, h6"))
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|h| !h.is_empty())
        .collect();

    let mut raw_text = String::new();
    if let Some(body) = document.select(static_selector!("body")).next() {
        collect_text(*body, &mut raw_text);
    }
    let body_text = collapse_whitespace(&raw_text);
    let word_count = body_text.split_whitespace().count();

    ExtractedContent {
        url: page.url.to_string(),
        title,
        meta_description,
        headings,
        body_text,
        word_count,
        fetched_at: page.fetched_at,
    }
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(element) => {
                if !STRIP_ELEMENTS.contains(&element.name()) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
