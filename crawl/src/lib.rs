//! Safe, bounded crawling of a single submitted site.
//!
//! The crawl phase is a straight line: validate the URL (the SSRF gate),
//! fetch robots.txt, discover pages, fetch them under a concurrency bound
//! and politeness delay, then reduce each page to text content. Everything
//! past URL validation degrades instead of failing: bad pages become skip
//! records, missing robots.txt becomes the permissive policy, malformed
//! sitemaps become empty lists.

mod content;
mod discover;
mod fetch;
mod robots;
mod safety;

pub use content::{ExtractedContent, extract_content};
pub use discover::{DiscoveredPage, PageSource, discover_pages};
pub use fetch::{FetchOutcome, FetchedPage, SkipReason, SkippedUrl, fetch_pages};
pub use robots::{RobotsPolicy, fetch_robots};
pub use safety::{
    SafeUrl, UrlValidationError, ensure_public, ensure_public_https, is_private_or_reserved,
    normalize, origin_of, sha256_hex,
};
