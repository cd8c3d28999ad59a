//! Webhook payload assembly.

use intake_types::{Submission, WebhookEvent};
use serde_json::json;

/// Build the payload body for an event. Compact JSON; the exact bytes are
/// stored on the delivery record so every retry sends an identical body.
#[must_use]
pub fn build_payload(event: WebhookEvent, submission: &Submission) -> String {
    let crawled_pages: Vec<&str> = submission
        .artifacts
        .iter()
        .map(|a| a.url.as_str())
        .collect();
    let snapshot_keys: Vec<&str> = submission
        .artifacts
        .iter()
        .map(|a| a.raw_html_key.as_str())
        .collect();

    let payload = json!({
        "event": event.as_str(),
        "submissionId": submission.id,
        "tenantId": submission.tenant_id,
        "submission": {
            "id": submission.id,
            "schemaId": submission.schema_id,
            "schemaVersion": submission.schema_version,
            "websiteUrl": submission.website_url,
            "status": submission.status,
            "fields": submission.extracted_fields,
            "confirmedAt": submission.confirmed_at,
            "confirmedBy": submission.confirmed_by,
        },
        "artifacts": {
            "crawledPages": crawled_pages,
            "htmlSnapshotKeys": snapshot_keys,
        },
    });
    payload.to_string()
}
