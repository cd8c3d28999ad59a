//! Delivery state-machine integration tests against a mock receiver.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use intake_config::WebhookConfig;
use intake_types::{
    DeliveryStatus, SchemaId, Submission, SubmissionStatus, TenantId, Webhook, WebhookEvent,
    WebhookId,
};
use intake_webhook::{
    Dispatcher, MemoryDeliveryStore, MemoryWebhookStore, SIGNATURE_HEADER, WebhookStore, verify,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quick_config() -> WebhookConfig {
    WebhookConfig {
        base_delay_ms: 1,
        max_delay_ms: 4,
        timeout_ms: 2_000,
        ..WebhookConfig::default()
    }
}

fn confirmed_submission() -> Submission {
    let mut submission = Submission::new(
        TenantId::new("tenant-1"),
        SchemaId::new("schema-1"),
        1,
        "https://example.com",
    );
    submission.set_status(SubmissionStatus::Draft).unwrap();
    submission.set_status(SubmissionStatus::Confirmed).unwrap();
    submission.confirmed_at = Some(Utc::now());
    submission
}

fn webhook_for(endpoint: String, secret: &str) -> Webhook {
    Webhook {
        id: WebhookId::new("hook-1"),
        tenant_id: TenantId::new("tenant-1"),
        endpoint_url: endpoint,
        events: vec![WebhookEvent::SubmissionConfirmed],
        signing_secret: secret.to_string(),
        is_active: true,
        created_at: Utc::now(),
    }
}

async fn setup(
    endpoint_status: u16,
    secret: &str,
    server: &MockServer,
) -> (Dispatcher, Arc<MemoryWebhookStore>) {
    let webhooks = Arc::new(MemoryWebhookStore::new());
    let deliveries = Arc::new(MemoryDeliveryStore::new());
    webhooks
        .insert(webhook_for(format!("{}/hook", server.uri()), secret))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(endpoint_status))
        .mount(server)
        .await;

    (
        Dispatcher::new(webhooks.clone(), deliveries, quick_config()),
        webhooks,
    )
}

async fn drain_until_terminal(dispatcher: &Dispatcher) {
    // Backoff is a handful of milliseconds in quick_config; a few rounds
    // with short sleeps drain every pending delivery.
    for _ in 0..40 {
        dispatcher.process_due(16).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn successful_delivery_is_signed_and_terminal() {
    let server = MockServer::start().await;
    let secret = Webhook::generate_secret();
    let (dispatcher, _) = setup(200, &secret, &server).await;

    let submission = confirmed_submission();
    let ids = dispatcher
        .enqueue_event(WebhookEvent::SubmissionConfirmed, &submission)
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    dispatcher.process_due(16).await.unwrap();

    let delivery = dispatcher.delivery(&ids[0]).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Success);
    assert_eq!(delivery.attempts, 1);
    assert!(delivery.completed_at.is_some());
    assert!(delivery.last_error.is_none());

    // The receiver saw a well-formed, verifiable signature.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let signature = requests[0]
        .headers
        .get(SIGNATURE_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let pattern = regex::Regex::new(r"^t=\d+,v1=[0-9a-f]{64}$").unwrap();
    assert!(pattern.is_match(&signature), "header was {signature:?}");

    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(verify(&secret, &signature, &body, 300, Utc::now().timestamp()).is_ok());
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["event"], "submission.confirmed");
    assert_eq!(parsed["submissionId"], submission.id.as_str());
}

#[tokio::test]
async fn five_failures_exhaust_attempts() {
    let server = MockServer::start().await;
    let secret = Webhook::generate_secret();
    let (dispatcher, _) = setup(500, &secret, &server).await;

    let submission = confirmed_submission();
    let ids = dispatcher
        .enqueue_event(WebhookEvent::SubmissionConfirmed, &submission)
        .await
        .unwrap();

    drain_until_terminal(&dispatcher).await;

    let delivery = dispatcher.delivery(&ids[0]).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.attempts, 5);
    assert!(delivery.completed_at.is_some());
    assert!(delivery.last_error.as_deref().unwrap().starts_with("HTTP 500"));

    // Exactly five POSTs went out; the terminal record is never retried.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 5);
}

#[tokio::test]
async fn deactivated_webhook_fails_without_attempt() {
    let server = MockServer::start().await;
    let secret = Webhook::generate_secret();
    let (dispatcher, webhooks) = setup(200, &secret, &server).await;

    let submission = confirmed_submission();
    let ids = dispatcher
        .enqueue_event(WebhookEvent::SubmissionConfirmed, &submission)
        .await
        .unwrap();

    webhooks
        .set_active(&WebhookId::new("hook-1"), false)
        .await
        .unwrap();
    dispatcher.process_due(16).await.unwrap();

    let delivery = dispatcher.delivery(&ids[0]).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Failed);
    assert_eq!(delivery.attempts, 0);
    assert_eq!(delivery.last_error.as_deref(), Some("Webhook is inactive"));
    assert!(delivery.completed_at.is_some());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn retry_attempts_increase_monotonically() {
    let server = MockServer::start().await;
    let secret = Webhook::generate_secret();
    let (dispatcher, _) = setup(503, &secret, &server).await;

    let submission = confirmed_submission();
    let ids = dispatcher
        .enqueue_event(WebhookEvent::SubmissionConfirmed, &submission)
        .await
        .unwrap();

    let mut last_attempts = 0;
    for _ in 0..20 {
        dispatcher.process_due(16).await.unwrap();
        let delivery = dispatcher.delivery(&ids[0]).await.unwrap().unwrap();
        assert!(delivery.attempts >= last_attempts);
        last_attempts = delivery.attempts;
        if delivery.status == DeliveryStatus::Failed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(last_attempts, 5);
}

#[tokio::test]
async fn worker_loop_drains_deliveries_until_shutdown() {
    let server = MockServer::start().await;
    let secret = Webhook::generate_secret();
    let (dispatcher, _) = setup(200, &secret, &server).await;
    let dispatcher = Arc::new(dispatcher);

    let submission = confirmed_submission();
    let ids = dispatcher
        .enqueue_event(WebhookEvent::SubmissionConfirmed, &submission)
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .run_worker(Duration::from_millis(5), 16, shutdown_rx)
                .await;
        })
    };

    // Give the worker a few poll cycles, then stop it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    worker.await.unwrap();

    let delivery = dispatcher.delivery(&ids[0]).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Success);
}

#[tokio::test]
async fn tenant_without_subscribers_enqueues_nothing() {
    let server = MockServer::start().await;
    let secret = Webhook::generate_secret();
    let (dispatcher, _) = setup(200, &secret, &server).await;

    let mut submission = confirmed_submission();
    submission.tenant_id = TenantId::new("someone-else");
    let ids = dispatcher
        .enqueue_event(WebhookEvent::SubmissionConfirmed, &submission)
        .await
        .unwrap();
    assert!(ids.is_empty());
}
