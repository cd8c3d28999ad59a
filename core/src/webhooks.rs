//! Webhook registration and the audit bridge for delivery outcomes.

use std::sync::Arc;

use chrono::Utc;
use intake_audit::{AuditEvent, AuditEventName, AuditSink};
use intake_crawl::UrlValidationError;
use intake_types::{ActorId, TenantId, Webhook, WebhookDelivery, WebhookEvent, WebhookId};
use intake_webhook::{DeliveryObserver, WebhookStore};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The endpoint failed URL validation or the SSRF gate.
    #[error(transparent)]
    InvalidEndpoint(#[from] UrlValidationError),
    #[error("a webhook must subscribe to at least one event")]
    NoEvents,
    #[error("webhook store failure: {0}")]
    Store(#[from] intake_webhook::StoreError),
    #[error("audit append failed: {0}")]
    Audit(#[from] intake_audit::AuditError),
}

/// Result of registering a webhook. The secret is disclosed here, once, and
/// never surfaced again by any read path.
#[derive(Debug)]
pub struct WebhookRegistration {
    pub webhook_id: WebhookId,
    pub signing_secret: String,
}

/// Registers subscribers after screening their endpoints.
pub struct WebhookService {
    store: Arc<dyn WebhookStore>,
    audit: Arc<dyn AuditSink>,
}

impl WebhookService {
    #[must_use]
    pub fn new(store: Arc<dyn WebhookStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Register a webhook. The endpoint must be HTTPS and resolve to a
    /// public address; the SSRF predicate here is the same one the crawler
    /// applies to submitted URLs. DNS is checked at registration only —
    /// deliveries do not re-resolve per send.
    pub async fn register(
        &self,
        tenant_id: TenantId,
        endpoint_url: &str,
        events: Vec<WebhookEvent>,
        actor: Option<ActorId>,
    ) -> Result<WebhookRegistration, RegistrationError> {
        if events.is_empty() {
            return Err(RegistrationError::NoEvents);
        }
        let safe = intake_crawl::ensure_public_https(endpoint_url).await?;

        let secret = Webhook::generate_secret();
        let webhook = Webhook {
            id: WebhookId::generate(),
            tenant_id: tenant_id.clone(),
            endpoint_url: safe.href().to_string(),
            events,
            signing_secret: secret.clone(),
            is_active: true,
            created_at: Utc::now(),
        };
        let webhook_id = webhook.id.clone();
        self.store.insert(webhook).await?;

        let mut event = AuditEvent::new(
            tenant_id,
            AuditEventName::WebhookRegistered,
            "webhook",
            webhook_id.as_str(),
        )
        .with_detail("endpointUrl", safe.href().to_string());
        if let Some(actor) = actor {
            event = event.with_actor(actor);
        }
        self.audit.append(event).await?;

        Ok(WebhookRegistration {
            webhook_id,
            signing_secret: secret,
        })
    }

    pub async fn deactivate(&self, id: &WebhookId) -> Result<bool, RegistrationError> {
        Ok(self.store.set_active(id, false).await?)
    }
}

/// Writes delivery outcomes to the audit trail, resolving the tenant
/// through the delivery's webhook.
pub struct DeliveryAuditObserver {
    webhooks: Arc<dyn WebhookStore>,
    audit: Arc<dyn AuditSink>,
}

impl DeliveryAuditObserver {
    #[must_use]
    pub fn new(webhooks: Arc<dyn WebhookStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { webhooks, audit }
    }
}

#[async_trait::async_trait]
impl DeliveryObserver for DeliveryAuditObserver {
    async fn delivery_completed(&self, delivery: &WebhookDelivery) {
        let tenant_id = match self.webhooks.get(&delivery.webhook_id).await {
            Ok(Some(webhook)) => webhook.tenant_id,
            _ => {
                tracing::warn!(delivery = %delivery.id, "delivery outcome for unknown webhook");
                return;
            }
        };
        let name = match delivery.status {
            intake_types::DeliveryStatus::Success => AuditEventName::WebhookDeliverySucceeded,
            _ => AuditEventName::WebhookDeliveryFailed,
        };
        let mut event = AuditEvent::new(
            tenant_id,
            name,
            "webhook_delivery",
            delivery.id.as_str(),
        )
        .with_detail("submissionId", delivery.submission_id.as_str())
        .with_detail("webhookId", delivery.webhook_id.as_str())
        .with_detail("attempts", delivery.attempts);
        if let Some(error) = &delivery.last_error {
            event = event.with_detail("error", error.clone());
        }
        if let Err(e) = self.audit.append(event).await {
            tracing::warn!(error = %e, "failed to audit delivery outcome");
        }
    }
}
