//! Webhook and delivery persistence contracts.
//!
//! Delivery rows are the only cross-run shared mutable state in the system;
//! every transition goes through a conditional update guarded by
//! `(id, expected status)` so two workers can never advance the same record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use intake_types::{
    DeliveryId, DeliveryStatus, SubmissionId, TenantId, Webhook, WebhookDelivery, WebhookEvent,
    WebhookId,
};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Registered webhook lookup.
#[async_trait::async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert(&self, webhook: Webhook) -> Result<(), StoreError>;

    async fn get(&self, id: &WebhookId) -> Result<Option<Webhook>, StoreError>;

    /// Active webhooks of one tenant subscribed to `event`.
    async fn list_subscribed(
        &self,
        tenant_id: &TenantId,
        event: WebhookEvent,
    ) -> Result<Vec<Webhook>, StoreError>;

    async fn set_active(&self, id: &WebhookId, active: bool) -> Result<bool, StoreError>;
}

/// Field updates applied by a delivery transition.
#[derive(Debug, Clone)]
pub struct DeliveryUpdate {
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Delivery record persistence.
#[async_trait::async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), StoreError>;

    async fn get(&self, id: &DeliveryId) -> Result<Option<WebhookDelivery>, StoreError>;

    /// Pending records eligible for processing at `now`, oldest first,
    /// at most `limit`.
    async fn due(&self, now: DateTime<Utc>, limit: usize)
    -> Result<Vec<WebhookDelivery>, StoreError>;

    /// Apply `update` iff the record's current status equals `expected`.
    /// Returns false when another worker advanced the record first.
    async fn transition(
        &self,
        id: &DeliveryId,
        expected: DeliveryStatus,
        update: DeliveryUpdate,
    ) -> Result<bool, StoreError>;

    /// All deliveries for one submission, oldest first.
    async fn list_for_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<WebhookDelivery>, StoreError>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// Process-local webhook store.
#[derive(Debug, Default)]
pub struct MemoryWebhookStore {
    webhooks: RwLock<HashMap<WebhookId, Webhook>>,
}

impl MemoryWebhookStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn insert(&self, webhook: Webhook) -> Result<(), StoreError> {
        self.webhooks
            .write()
            .await
            .insert(webhook.id.clone(), webhook);
        Ok(())
    }

    async fn get(&self, id: &WebhookId) -> Result<Option<Webhook>, StoreError> {
        Ok(self.webhooks.read().await.get(id).cloned())
    }

    async fn list_subscribed(
        &self,
        tenant_id: &TenantId,
        event: WebhookEvent,
    ) -> Result<Vec<Webhook>, StoreError> {
        let mut matched: Vec<Webhook> = self
            .webhooks
            .read()
            .await
            .values()
            .filter(|w| w.tenant_id == *tenant_id && w.is_active && w.subscribes_to(event))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn set_active(&self, id: &WebhookId, active: bool) -> Result<bool, StoreError> {
        let mut webhooks = self.webhooks.write().await;
        match webhooks.get_mut(id) {
            Some(webhook) => {
                webhook.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Process-local delivery store.
#[derive(Debug, Default)]
pub struct MemoryDeliveryStore {
    deliveries: RwLock<HashMap<DeliveryId, WebhookDelivery>>,
}

impl MemoryDeliveryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn insert(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        self.deliveries
            .write()
            .await
            .insert(delivery.id.clone(), delivery);
        Ok(())
    }

    async fn get(&self, id: &DeliveryId) -> Result<Option<WebhookDelivery>, StoreError> {
        Ok(self.deliveries.read().await.get(id).cloned())
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let mut due: Vec<WebhookDelivery> = self
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| d.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn transition(
        &self,
        id: &DeliveryId,
        expected: DeliveryStatus,
        update: DeliveryUpdate,
    ) -> Result<bool, StoreError> {
        let mut deliveries = self.deliveries.write().await;
        let Some(delivery) = deliveries.get_mut(id) else {
            return Ok(false);
        };
        if delivery.status != expected {
            return Ok(false);
        }
        delivery.status = update.status;
        delivery.attempts = update.attempts;
        delivery.last_attempt_at = update.last_attempt_at;
        delivery.last_error = update.last_error;
        delivery.next_retry_at = update.next_retry_at;
        delivery.completed_at = update.completed_at;
        Ok(true)
    }

    async fn list_for_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        let mut matched: Vec<WebhookDelivery> = self
            .deliveries
            .read()
            .await
            .values()
            .filter(|d| d.submission_id == *submission_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_types::SubmissionId;

    fn delivery() -> WebhookDelivery {
        WebhookDelivery::new(
            WebhookId::new("w1"),
            SubmissionId::new("s1"),
            WebhookEvent::SubmissionConfirmed,
            "{}".to_string(),
        )
    }

    #[tokio::test]
    async fn conditional_transition_guards_status() {
        let store = MemoryDeliveryStore::new();
        let d = delivery();
        let id = d.id.clone();
        store.insert(d).await.unwrap();

        let update = DeliveryUpdate {
            status: DeliveryStatus::Success,
            attempts: 1,
            last_attempt_at: Some(Utc::now()),
            last_error: None,
            next_retry_at: None,
            completed_at: Some(Utc::now()),
        };
        assert!(
            store
                .transition(&id, DeliveryStatus::Pending, update.clone())
                .await
                .unwrap()
        );
        // Second worker expecting Pending loses.
        assert!(
            !store
                .transition(&id, DeliveryStatus::Pending, update)
                .await
                .unwrap()
        );
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, DeliveryStatus::Success);
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn due_respects_retry_time_and_limit() {
        let store = MemoryDeliveryStore::new();
        let now = Utc::now();

        let fresh = delivery();
        let fresh_id = fresh.id.clone();
        store.insert(fresh).await.unwrap();

        let mut waiting = delivery();
        waiting.attempts = 1;
        waiting.next_retry_at = Some(now + chrono::Duration::minutes(10));
        store.insert(waiting).await.unwrap();

        let mut ready = delivery();
        ready.attempts = 2;
        ready.next_retry_at = Some(now - chrono::Duration::seconds(1));
        let ready_id = ready.id.clone();
        store.insert(ready).await.unwrap();

        let due = store.due(now, 10).await.unwrap();
        let due_ids: Vec<&DeliveryId> = due.iter().map(|d| &d.id).collect();
        assert_eq!(due.len(), 2);
        assert!(due_ids.contains(&&fresh_id));
        assert!(due_ids.contains(&&ready_id));

        assert_eq!(store.due(now, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_subscribed_filters_tenant_activity_and_event() {
        let store = MemoryWebhookStore::new();
        let tenant = TenantId::new("t1");
        let make = |id: &str, tenant: &str, active: bool| Webhook {
            id: WebhookId::new(id),
            tenant_id: TenantId::new(tenant),
            endpoint_url: "https://hooks.example/in".to_string(),
            events: vec![WebhookEvent::SubmissionConfirmed],
            signing_secret: Webhook::generate_secret(),
            is_active: active,
            created_at: Utc::now(),
        };
        store.insert(make("a", "t1", true)).await.unwrap();
        store.insert(make("b", "t1", false)).await.unwrap();
        store.insert(make("c", "t2", true)).await.unwrap();

        let subscribed = store
            .list_subscribed(&tenant, WebhookEvent::SubmissionConfirmed)
            .await
            .unwrap();
        assert_eq!(subscribed.len(), 1);
        assert_eq!(subscribed[0].id, WebhookId::new("a"));
    }
}
