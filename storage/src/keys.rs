//! Deterministic artifact keys.
//!
//! Keys never collide across runs because the run id is the namespace
//! prefix; within a run they are content-addressed by the page URL hash.

use intake_types::RunId;

/// `<runId>/raw/<sha256>.html.gz`
#[must_use]
pub fn raw_html_key(run_id: &RunId, url_sha256: &str) -> String {
    format!("{run_id}/raw/{url_sha256}.html.gz")
}

/// `<runId>/text/<sha256>.json`
#[must_use]
pub fn extracted_content_key(run_id: &RunId, url_sha256: &str) -> String {
    format!("{run_id}/text/{url_sha256}.json")
}
