//! Webhook subscriptions and delivery records.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{DeliveryId, SubmissionId, TenantId, WebhookId};

/// Delivery attempts cap; a record that fails this many times is terminal.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Events a webhook can subscribe to. Closed set; additions are a wire
/// compatibility decision, not a code convenience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "submission.confirmed")]
    SubmissionConfirmed,
}

impl WebhookEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookEvent::SubmissionConfirmed => "submission.confirmed",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown webhook event {0:?}")]
pub struct UnknownEvent(pub String);

impl std::str::FromStr for WebhookEvent {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submission.confirmed" => Ok(WebhookEvent::SubmissionConfirmed),
            other => Err(UnknownEvent(other.to_string())),
        }
    }
}

/// A registered HTTP subscriber.
///
/// The signing secret is disclosed once at registration and never read back
/// through any API surface; it lives here only because the dispatcher needs
/// it to sign payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: WebhookId,
    pub tenant_id: TenantId,
    pub endpoint_url: String,
    pub events: Vec<WebhookEvent>,
    pub signing_secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// 32 random bytes, hex-encoded (64 chars).
    #[must_use]
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    #[must_use]
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.events.contains(&event)
    }
}

/// Delivery record state. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
}

/// One payload owed to one webhook. Owned by the dispatcher independently of
/// the run that created it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub webhook_id: WebhookId,
    pub submission_id: SubmissionId,
    pub event: WebhookEvent,
    /// Serialized payload body, stored so retries send identical bytes.
    pub payload: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    /// Insert-time shape: pending with zero attempts.
    #[must_use]
    pub fn new(
        webhook_id: WebhookId,
        submission_id: SubmissionId,
        event: WebhookEvent,
        payload: String,
    ) -> Self {
        Self {
            id: DeliveryId::generate(),
            webhook_id,
            submission_id,
            event,
            payload,
            status: DeliveryStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            last_error: None,
            next_retry_at: None,
            completed_at: None,
        }
    }

    /// Whether the record is eligible for processing at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending
            && (self.attempts == 0 || self.next_retry_at.is_none_or(|at| at <= now))
    }
}
