//! Submission lifecycle: create, run, confirm, edit, retry.

use std::sync::Arc;

use chrono::Utc;
use intake_audit::{AuditEvent, AuditEventName, AuditSink};
use intake_config::ExtractionConfig;
use intake_providers::LlmClient;
use intake_storage::ArtifactStore;
use intake_types::{
    ActorId, ConfirmedBy, CrawlArtifact, DeliveryId, FieldDefinition, FieldStatus, FieldValue,
    InvalidTransition, PageType, RunId, SchemaId, Submission, SubmissionStatus, TenantId,
    WebhookEvent,
};
use intake_webhook::Dispatcher;
use thiserror::Error;
use tokio::time::Instant;

use crate::extraction::run_extraction;
use crate::run::{CrawlOutcome, PipelineError, run_crawl};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error("audit append failed: {0}")]
    Audit(#[from] intake_audit::AuditError),
    #[error("delivery store failed: {0}")]
    Delivery(#[from] intake_webhook::StoreError),
    #[error("no such extracted field {0:?}")]
    UnknownField(String),
    #[error("submission is {0:?}, expected {1:?}")]
    WrongStatus(SubmissionStatus, SubmissionStatus),
}

/// Summary of one pipeline pass.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub origin: String,
    pub fetched: usize,
    pub skipped: Vec<intake_crawl::SkippedUrl>,
}

/// Drives submissions through `pending -> draft -> confirmed`.
pub struct SubmissionService {
    store: Arc<dyn ArtifactStore>,
    llm: Arc<dyn LlmClient>,
    audit: Arc<dyn AuditSink>,
    dispatcher: Arc<Dispatcher>,
    config: ExtractionConfig,
}

impl SubmissionService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        llm: Arc<dyn LlmClient>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<Dispatcher>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            llm,
            audit,
            dispatcher,
            config,
        }
    }

    /// Create a pending submission.
    pub async fn create(
        &self,
        tenant_id: TenantId,
        schema_id: SchemaId,
        schema_version: u32,
        website_url: impl Into<String>,
        actor: Option<ActorId>,
    ) -> Result<Submission, SubmissionError> {
        let submission = Submission::new(tenant_id.clone(), schema_id, schema_version, website_url);
        let mut event = AuditEvent::new(
            tenant_id,
            AuditEventName::SubmissionCreated,
            "submission",
            submission.id.as_str(),
        )
        .with_detail("websiteUrl", submission.website_url.clone());
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;
        Ok(submission)
    }

    /// Run the full pipeline for a pending submission.
    ///
    /// On success the submission lands in `draft` carrying extracted fields
    /// and artifact references. It lands in `failed` when the URL fails
    /// validation, storage fails, or not a single page could be fetched.
    pub async fn run(
        &self,
        submission: &mut Submission,
        fields: &[FieldDefinition],
        deadline: Option<Instant>,
    ) -> Result<RunReport, SubmissionError> {
        let run_id = RunId::generate();
        let outcome = match run_crawl(
            &submission.website_url,
            &run_id,
            self.store.as_ref(),
            &self.config,
            deadline,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                submission.set_status(SubmissionStatus::Failed)?;
                tracing::warn!(submission = %submission.id, error = %e, "run failed");
                return Err(e.into());
            }
        };

        if outcome.fetched_pages.is_empty() {
            submission.set_status(SubmissionStatus::Failed)?;
            tracing::warn!(submission = %submission.id, "run fetched zero pages");
            return Ok(RunReport {
                run_id,
                origin: outcome.origin,
                fetched: 0,
                skipped: outcome.skipped_urls,
            });
        }

        submission.extracted_fields = run_extraction(
            self.llm.as_ref(),
            fields,
            &outcome.extracted_content,
            &self.config,
            deadline,
        )
        .await;
        submission.artifacts = build_artifacts(submission, &outcome);
        submission.set_status(SubmissionStatus::Draft)?;

        Ok(RunReport {
            run_id,
            origin: outcome.origin,
            fetched: outcome.fetched_pages.len(),
            skipped: outcome.skipped_urls,
        })
    }

    /// Confirm a draft submission and fan out `submission.confirmed`
    /// deliveries to the tenant's subscribers.
    pub async fn confirm(
        &self,
        submission: &mut Submission,
        confirmed_by: ConfirmedBy,
        actor: Option<ActorId>,
    ) -> Result<Vec<DeliveryId>, SubmissionError> {
        submission.set_status(SubmissionStatus::Confirmed)?;
        submission.confirmed_at = Some(Utc::now());
        submission.confirmed_by = Some(confirmed_by);

        let mut event = AuditEvent::new(
            submission.tenant_id.clone(),
            AuditEventName::SubmissionConfirmed,
            "submission",
            submission.id.as_str(),
        );
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;

        let ids = self
            .dispatcher
            .enqueue_event(WebhookEvent::SubmissionConfirmed, submission)
            .await?;
        Ok(ids)
    }

    /// Overwrite one extracted field with a reviewed value. The edit clears
    /// any review reason; a human looked at it.
    pub async fn edit_field(
        &self,
        submission: &mut Submission,
        key: &str,
        value: Option<FieldValue>,
        actor: Option<ActorId>,
    ) -> Result<(), SubmissionError> {
        let field = submission
            .extracted_fields
            .iter_mut()
            .find(|f| f.key == key)
            .ok_or_else(|| SubmissionError::UnknownField(key.to_string()))?;
        field.value = value;
        field.reason = None;
        field.status = if field.value.is_some() {
            FieldStatus::Auto
        } else {
            FieldStatus::NeedsReview
        };
        submission.updated_at = Utc::now();

        let mut event = AuditEvent::new(
            submission.tenant_id.clone(),
            AuditEventName::SubmissionFieldEdited,
            "submission",
            submission.id.as_str(),
        )
        .with_detail("fieldKey", key.to_string());
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;
        Ok(())
    }

    /// Re-run the pipeline for a failed submission.
    pub async fn retry(
        &self,
        submission: &mut Submission,
        fields: &[FieldDefinition],
        actor: Option<ActorId>,
    ) -> Result<RunReport, SubmissionError> {
        if submission.status != SubmissionStatus::Failed {
            return Err(SubmissionError::WrongStatus(
                submission.status,
                SubmissionStatus::Failed,
            ));
        }
        // Reset to a fresh pending pass; the state machine has no
        // failed -> pending edge because retry is the only path back.
        submission.status = SubmissionStatus::Pending;
        submission.extracted_fields.clear();
        submission.artifacts.clear();
        submission.updated_at = Utc::now();

        let mut event = AuditEvent::new(
            submission.tenant_id.clone(),
            AuditEventName::SubmissionRetried,
            "submission",
            submission.id.as_str(),
        );
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;

        self.run(submission, fields, None).await
    }
}

/// Build artifact records from the crawl outcome, classifying pages by path.
fn build_artifacts(submission: &Submission, outcome: &CrawlOutcome) -> Vec<CrawlArtifact> {
    outcome
        .artifact_keys
        .iter()
        .zip(&outcome.fetched_pages)
        .map(|(keys, page)| CrawlArtifact {
            submission_id: submission.id.clone(),
            url: keys.url.clone(),
            status_code: page.status_code,
            content_type: page.content_type.clone(),
            fetched_at: page.fetched_at,
            raw_html_key: keys.raw_html_key.clone(),
            extracted_content_key: keys.extracted_content_key.clone(),
            page_type: PageType::classify(page.url.path()),
        })
        .collect()
}
