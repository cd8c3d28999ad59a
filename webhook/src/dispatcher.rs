//! The delivery state machine and its worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use intake_config::WebhookConfig;
use intake_types::{
    DeliveryId, DeliveryStatus, Submission, SubmissionId, Webhook, WebhookDelivery, WebhookEvent,
};

use crate::payload::build_payload;
use crate::signature::{SIGNATURE_HEADER, sign};
use crate::store::{DeliveryStore, DeliveryUpdate, StoreError, WebhookStore};

/// Error string recorded when a delivery's webhook was deactivated.
const INACTIVE_ERROR: &str = "Webhook is inactive";

/// Notified when a delivery reaches a terminal state. The audit trail hangs
/// off this seam.
#[async_trait::async_trait]
pub trait DeliveryObserver: Send + Sync {
    async fn delivery_completed(&self, delivery: &WebhookDelivery);
}

/// Signs, posts, and retries webhook deliveries.
pub struct Dispatcher {
    webhooks: Arc<dyn WebhookStore>,
    deliveries: Arc<dyn DeliveryStore>,
    client: reqwest::Client,
    config: WebhookConfig,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        webhooks: Arc<dyn WebhookStore>,
        deliveries: Arc<dyn DeliveryStore>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            webhooks,
            deliveries,
            client: reqwest::Client::new(),
            config,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Insert one pending delivery per subscribed webhook for this event.
    /// Returns the created delivery ids.
    pub async fn enqueue_event(
        &self,
        event: WebhookEvent,
        submission: &Submission,
    ) -> Result<Vec<DeliveryId>, StoreError> {
        let subscribed = self
            .webhooks
            .list_subscribed(&submission.tenant_id, event)
            .await?;
        let payload = build_payload(event, submission);

        let mut ids = Vec::with_capacity(subscribed.len());
        for webhook in subscribed {
            let delivery = WebhookDelivery::new(
                webhook.id.clone(),
                submission.id.clone(),
                event,
                payload.clone(),
            );
            ids.push(delivery.id.clone());
            self.deliveries.insert(delivery).await?;
            tracing::debug!(webhook = %webhook.id, submission = %submission.id, "delivery enqueued");
        }
        Ok(ids)
    }

    /// Process one batch of due deliveries. Returns how many were picked up.
    pub async fn process_due(&self, batch_size: usize) -> Result<usize, StoreError> {
        let due = self.deliveries.due(Utc::now(), batch_size).await?;
        let count = due.len();
        for delivery in due {
            self.process_one(delivery).await?;
        }
        Ok(count)
    }

    /// Poll-process loop. Runs until `shutdown` flips to true.
    pub async fn run_worker(
        &self,
        poll_interval: Duration,
        batch_size: usize,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            if let Err(e) = self.process_due(batch_size).await {
                tracing::warn!(error = %e, "delivery batch failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn process_one(&self, delivery: WebhookDelivery) -> Result<(), StoreError> {
        let webhook = self.webhooks.get(&delivery.webhook_id).await?;
        let Some(webhook) = webhook.filter(|w| w.is_active) else {
            // Deactivated (or vanished) webhook: terminal failure without an
            // attempt.
            let applied = self
                .deliveries
                .transition(
                    &delivery.id,
                    DeliveryStatus::Pending,
                    DeliveryUpdate {
                        status: DeliveryStatus::Failed,
                        attempts: delivery.attempts,
                        last_attempt_at: delivery.last_attempt_at,
                        last_error: Some(INACTIVE_ERROR.to_string()),
                        next_retry_at: None,
                        completed_at: Some(Utc::now()),
                    },
                )
                .await?;
            if applied {
                tracing::info!(delivery = %delivery.id, "delivery failed: webhook inactive");
                self.notify_completed(&delivery.id).await?;
            }
            return Ok(());
        };

        let attempt_at = Utc::now();
        let outcome = self.post(&webhook, &delivery.payload).await;
        let attempts = delivery.attempts + 1;

        let update = match outcome {
            Ok(()) => DeliveryUpdate {
                status: DeliveryStatus::Success,
                attempts,
                last_attempt_at: Some(attempt_at),
                last_error: None,
                next_retry_at: None,
                completed_at: Some(Utc::now()),
            },
            Err(error) => {
                if attempts >= self.config.max_attempts {
                    DeliveryUpdate {
                        status: DeliveryStatus::Failed,
                        attempts,
                        last_attempt_at: Some(attempt_at),
                        last_error: Some(error),
                        next_retry_at: None,
                        completed_at: Some(Utc::now()),
                    }
                } else {
                    DeliveryUpdate {
                        status: DeliveryStatus::Pending,
                        attempts,
                        last_attempt_at: Some(attempt_at),
                        last_error: Some(error),
                        next_retry_at: Some(
                            attempt_at
                                + chrono::Duration::from_std(self.backoff_delay(attempts))
                                    .unwrap_or_else(|_| chrono::Duration::hours(1)),
                        ),
                        completed_at: None,
                    }
                }
            }
        };

        let terminal = update.status != DeliveryStatus::Pending;
        let applied = self
            .deliveries
            .transition(&delivery.id, DeliveryStatus::Pending, update)
            .await?;
        if !applied {
            tracing::debug!(delivery = %delivery.id, "delivery advanced by another worker, skipping");
        } else if terminal {
            tracing::info!(delivery = %delivery.id, attempts, "delivery reached terminal state");
            self.notify_completed(&delivery.id).await?;
        }
        Ok(())
    }

    async fn notify_completed(&self, id: &DeliveryId) -> Result<(), StoreError> {
        let Some(observer) = self.observer.as_ref() else {
            return Ok(());
        };
        if let Some(delivery) = self.deliveries.get(id).await? {
            observer.delivery_completed(&delivery).await;
        }
        Ok(())
    }

    /// `min(base * 2^(attempts-1), max)`.
    #[must_use]
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        let base = Duration::from_millis(self.config.base_delay_ms);
        let max = Duration::from_millis(self.config.max_delay_ms);
        base.saturating_mul(1_u32 << attempts.saturating_sub(1).min(31))
            .min(max)
    }

    async fn post(&self, webhook: &Webhook, payload: &str) -> Result<(), String> {
        let signature = sign(&webhook.signing_secret, Utc::now().timestamp(), payload);
        let response = self
            .client
            .post(&webhook.endpoint_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .timeout(self.config.timeout())
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| format!("request error: {e}"))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status.as_u16()))
        }
    }

    /// Look up a delivery (reporting surface for callers and tests).
    pub async fn delivery(
        &self,
        id: &DeliveryId,
    ) -> Result<Option<WebhookDelivery>, StoreError> {
        self.deliveries.get(id).await
    }

    /// Deliveries owed for one submission, oldest first.
    pub async fn deliveries_for_submission(
        &self,
        submission_id: &SubmissionId,
    ) -> Result<Vec<WebhookDelivery>, StoreError> {
        self.deliveries.list_for_submission(submission_id).await
    }
}
