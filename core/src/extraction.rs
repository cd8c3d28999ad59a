//! The extraction phase: batched per-page LLM calls, then the pure tail of
//! synthesis, normalization, and validation.

use futures_util::future::join_all;
use intake_config::ExtractionConfig;
use intake_crawl::ExtractedContent;
use intake_extract::{PageExtractions, normalize_value, synthesize, validate_record};
use intake_providers::LlmClient;
use intake_types::{ExtractedFieldValue, FieldDefinition};
use tokio::time::Instant;

/// Run extraction over crawled content and produce one value per field.
///
/// LLM calls run in sequential batches of `extraction_concurrency`; the
/// pure tail starts only after every batch has settled. A page whose call
/// errors contributes nothing — the run continues without it. When the
/// deadline fires between batches, remaining pages are dropped and the
/// pure tail runs over what already came back.
pub async fn run_extraction(
    llm: &dyn LlmClient,
    fields: &[FieldDefinition],
    contents: &[ExtractedContent],
    config: &ExtractionConfig,
    deadline: Option<Instant>,
) -> Vec<ExtractedFieldValue> {
    let batch_size = config.llm.extraction_concurrency.max(1);
    let mut pages: Vec<PageExtractions> = Vec::with_capacity(contents.len());

    for batch in contents.chunks(batch_size) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::warn!(
                remaining = contents.len() - pages.len(),
                "deadline reached, synthesizing from completed pages"
            );
            break;
        }
        let results = join_all(
            batch
                .iter()
                .map(|content| intake_extract::extract_page(llm, fields, content, &config.llm)),
        )
        .await;
        for (content, result) in batch.iter().zip(results) {
            match result {
                Ok(extractions) => pages.push(extractions),
                Err(e) => {
                    tracing::warn!(url = %content.url, error = %e, "page extraction failed, continuing without it");
                }
            }
        }
    }

    let mut values = synthesize(fields, &pages, &config.synthesis);
    for value in &mut values {
        if let Some(current) = value.value.take() {
            value.value = Some(normalize_value(&value.key, current));
        }
    }
    validate_record(fields, &mut values);
    values
}
