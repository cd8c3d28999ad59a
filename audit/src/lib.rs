//! Append-only audit trail.
//!
//! Every domain step writes one event; compliance tooling consumes them
//! downstream. Event names form a closed set — adding one is a contract
//! change with external consumers, not a local edit.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use intake_types::{ActorId, TenantId};

/// The closed set of audit event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventName {
    #[serde(rename = "schema.created")]
    SchemaCreated,
    #[serde(rename = "schema.version_created")]
    SchemaVersionCreated,
    #[serde(rename = "schema.deleted")]
    SchemaDeleted,
    #[serde(rename = "submission.created")]
    SubmissionCreated,
    #[serde(rename = "submission.confirmed")]
    SubmissionConfirmed,
    #[serde(rename = "submission.field_edited")]
    SubmissionFieldEdited,
    #[serde(rename = "submission.retried")]
    SubmissionRetried,
    #[serde(rename = "webhook.registered")]
    WebhookRegistered,
    #[serde(rename = "webhook.delivery_succeeded")]
    WebhookDeliverySucceeded,
    #[serde(rename = "webhook.delivery_failed")]
    WebhookDeliveryFailed,
    #[serde(rename = "publishable_key.created")]
    PublishableKeyCreated,
    #[serde(rename = "publishable_key.revoked")]
    PublishableKeyRevoked,
}

impl AuditEventName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventName::SchemaCreated => "schema.created",
            AuditEventName::SchemaVersionCreated => "schema.version_created",
            AuditEventName::SchemaDeleted => "schema.deleted",
            AuditEventName::SubmissionCreated => "submission.created",
            AuditEventName::SubmissionConfirmed => "submission.confirmed",
            AuditEventName::SubmissionFieldEdited => "submission.field_edited",
            AuditEventName::SubmissionRetried => "submission.retried",
            AuditEventName::WebhookRegistered => "webhook.registered",
            AuditEventName::WebhookDeliverySucceeded => "webhook.delivery_succeeded",
            AuditEventName::WebhookDeliveryFailed => "webhook.delivery_failed",
            AuditEventName::PublishableKeyCreated => "publishable_key.created",
            AuditEventName::PublishableKeyRevoked => "publishable_key.revoked",
        }
    }
}

/// One appended audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<ActorId>,
    pub event: AuditEventName,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub ts: DateTime<Utc>,
}

impl AuditEvent {
    /// A minimal event; callers extend `details` as needed.
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        event: AuditEventName,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            event,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            details: HashMap::new(),
            ip: None,
            user_agent: None,
            ts: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink failure: {0}")]
    Sink(String),
}

/// Append-only event sink. There is deliberately no update or delete.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// In-memory sink for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    pub async fn names(&self) -> Vec<AuditEventName> {
        self.events.read().await.iter().map(|e| e.event).collect()
    }
}

#[async_trait::async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::debug!(
            event = event.event.as_str(),
            tenant = %event.tenant_id,
            resource = %event.resource_id,
            "audit event"
        );
        self.events.write().await.push(event);
        Ok(())
    }
}
