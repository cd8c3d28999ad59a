//! Pipeline orchestration.
//!
//! One run takes a submitted URL through crawl (validate, robots, discover,
//! fetch, extract content, store artifacts) and extraction (batched LLM
//! calls, synthesis, normalization, validation), producing a draft record.
//! Confirmation fans the record out to webhook subscribers. Services here
//! also cover the surrounding lifecycle: schema CRUD, webhook registration,
//! field edits, retries.

mod extraction;
mod run;
mod schema;
mod submission;
mod webhooks;

pub use extraction::run_extraction;
pub use run::{ArtifactKeys, CrawlOutcome, PipelineError, run_crawl};
pub use schema::{MemorySchemaStore, SchemaError, SchemaService, SchemaStore};
pub use submission::{RunReport, SubmissionError, SubmissionService};
pub use webhooks::{
    DeliveryAuditObserver, RegistrationError, WebhookRegistration, WebhookService,
};
