//! The crawl phase of one run: validate, robots, discover, fetch, extract
//! content, store artifacts.

use intake_config::ExtractionConfig;
use intake_crawl::{
    DiscoveredPage, ExtractedContent, FetchedPage, SkippedUrl, UrlValidationError,
};
use intake_storage::{
    ArtifactStore, CONTENT_TYPE_HTML_GZIP, CONTENT_TYPE_JSON, StorageError,
    extracted_content_key, gzip_bytes, raw_html_key,
};
use intake_types::RunId;
use thiserror::Error;
use tokio::time::Instant;

/// Errors that abort a run. Everything else shrinks the result set.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The submitted URL failed validation or the SSRF gate.
    #[error(transparent)]
    Validation(#[from] UrlValidationError),
    /// Artifact storage failed; continuing would lose data.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Storage keys written for one fetched page.
#[derive(Debug, Clone)]
pub struct ArtifactKeys {
    pub url: String,
    pub raw_html_key: String,
    pub extracted_content_key: String,
}

/// Result of the crawl phase. `skipped_urls` is exactly
/// `discovered - fetched`, so callers can tell a degraded run from a crash.
#[derive(Debug)]
pub struct CrawlOutcome {
    pub origin: String,
    pub discovered_pages: Vec<DiscoveredPage>,
    pub fetched_pages: Vec<FetchedPage>,
    pub extracted_content: Vec<ExtractedContent>,
    pub artifact_keys: Vec<ArtifactKeys>,
    pub skipped_urls: Vec<SkippedUrl>,
}

/// Run the crawl phase for one submission.
///
/// Storage for a page happens before that page appears in the returned
/// outcome, so every URL in `artifact_keys` is readable by the time the
/// caller sees it.
pub async fn run_crawl(
    raw_url: &str,
    run_id: &RunId,
    store: &dyn ArtifactStore,
    config: &ExtractionConfig,
    deadline: Option<Instant>,
) -> Result<CrawlOutcome, PipelineError> {
    let safe = intake_crawl::ensure_public(raw_url).await?;
    let origin = safe.origin();
    tracing::info!(run = %run_id, origin = %origin, "crawl started");

    let client = reqwest::Client::new();
    let robots = intake_crawl::fetch_robots(&client, &origin, &config.crawl).await;
    let discovered =
        intake_crawl::discover_pages(&client, safe.url(), &robots, &config.crawl).await;
    tracing::debug!(run = %run_id, pages = discovered.len(), "discovery complete");

    let fetch_outcome =
        intake_crawl::fetch_pages(&client, &discovered, &robots, &config.crawl, deadline).await;

    let mut extracted_content = Vec::with_capacity(fetch_outcome.pages.len());
    let mut artifact_keys = Vec::with_capacity(fetch_outcome.pages.len());
    for page in &fetch_outcome.pages {
        let content = intake_crawl::extract_content(page);
        let url_hash = intake_crawl::sha256_hex(page.url.as_str());

        let raw_key = raw_html_key(run_id, &url_hash);
        let gzipped = gzip_bytes(page.html.as_bytes())?;
        store.put(&raw_key, gzipped, CONTENT_TYPE_HTML_GZIP).await?;

        let text_key = extracted_content_key(run_id, &url_hash);
        let json = serde_json::to_vec(&content)
            .map_err(|e| StorageError::Codec(e.to_string()))?;
        store.put(&text_key, json, CONTENT_TYPE_JSON).await?;

        artifact_keys.push(ArtifactKeys {
            url: page.url.to_string(),
            raw_html_key: raw_key,
            extracted_content_key: text_key,
        });
        extracted_content.push(content);
    }

    tracing::info!(
        run = %run_id,
        fetched = fetch_outcome.pages.len(),
        skipped = fetch_outcome.skipped.len(),
        "crawl finished"
    );
    Ok(CrawlOutcome {
        origin,
        discovered_pages: discovered,
        fetched_pages: fetch_outcome.pages,
        extracted_content,
        artifact_keys,
        skipped_urls: fetch_outcome.skipped,
    })
}
