//! Core domain types for Intake.
//!
//! This crate contains pure domain types with no IO and no async. Everything
//! here can be used from any layer of the pipeline.

mod ids;
mod schema;
mod submission;
mod webhook;

pub use ids::{ActorId, DeliveryId, RunId, SchemaId, SubmissionId, TenantId, WebhookId};
pub use schema::{
    DEFAULT_CONFIDENCE_THRESHOLD, FieldDefinition, FieldDefinitionError, FieldType,
    FieldValidation, MAX_FIELD_KEY_LEN, Schema, SchemaVersion, validate_fields,
};
pub use submission::{
    Citation, ConfirmedBy, CrawlArtifact, ExtractedFieldValue, FieldStatus, FieldValue,
    InvalidTransition, PageType, Submission, SubmissionStatus,
};
pub use webhook::{
    DeliveryStatus, MAX_DELIVERY_ATTEMPTS, UnknownEvent, Webhook, WebhookDelivery, WebhookEvent,
};
