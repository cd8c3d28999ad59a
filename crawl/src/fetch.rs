//! Concurrent page fetching under a semaphore and a politeness delay.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use intake_config::CrawlConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use url::Url;

use crate::discover::DiscoveredPage;
use crate::robots::RobotsPolicy;

/// A page that came back 2xx with an HTML content type.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub html: String,
    pub status_code: u16,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
}

/// Why a discovered page did not make it into the result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SkipReason {
    RobotsDisallowed,
    HttpStatus(u16),
    ContentType(String),
    Timeout,
    Transport(String),
    DeadlineExceeded,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::RobotsDisallowed => f.write_str("disallowed by robots.txt"),
            SkipReason::HttpStatus(status) => write!(f, "HTTP {status}"),
            SkipReason::ContentType(ct) => write!(f, "unsupported content type {ct:?}"),
            SkipReason::Timeout => f.write_str("request timed out"),
            SkipReason::Transport(detail) => write!(f, "transport error: {detail}"),
            SkipReason::DeadlineExceeded => f.write_str("run deadline exceeded"),
        }
    }
}

/// A discovered URL that was not fetched, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: SkipReason,
}

/// Fetch results in discovery order, plus everything that was skipped.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub pages: Vec<FetchedPage>,
    pub skipped: Vec<SkippedUrl>,
}

/// Fetch every discovered page.
///
/// At most `config.concurrency` requests are in flight at once; after each
/// request completes, the worker slot sleeps `max(configured delay, robots
/// crawl-delay)` before taking its next page. Fetch failures are recorded as
/// skips, never propagated — a run survives any number of bad pages.
pub async fn fetch_pages(
    client: &reqwest::Client,
    pages: &[DiscoveredPage],
    robots: &RobotsPolicy,
    config: &CrawlConfig,
    deadline: Option<Instant>,
) -> FetchOutcome {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let politeness = config
        .request_delay()
        .max(robots.crawl_delay().unwrap_or(Duration::ZERO));

    let futures = pages.iter().map(|page| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            if !robots.is_allowed(&page.url) {
                return (page.url.clone(), Err(SkipReason::RobotsDisallowed));
            }
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (page.url.clone(), Err(SkipReason::Transport("worker pool closed".into())));
            };
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return (page.url.clone(), Err(SkipReason::DeadlineExceeded));
            }

            let result = fetch_one(client, &page.url, config, deadline).await;

            // Politeness gap between completions on this worker slot, skipped
            // once the deadline has fired.
            if !politeness.is_zero() && deadline.is_none_or(|d| Instant::now() < d) {
                tokio::time::sleep(politeness).await;
            }

            (page.url.clone(), result)
        }
    });

    let mut outcome = FetchOutcome::default();
    for (url, result) in join_all(futures).await {
        match result {
            Ok(page) => outcome.pages.push(page),
            Err(reason) => {
                tracing::debug!(url = %url, reason = %reason, "page skipped");
                outcome.skipped.push(SkippedUrl {
                    url: url.to_string(),
                    reason,
                });
            }
        }
    }
    outcome
}

async fn fetch_one(
    client: &reqwest::Client,
    url: &Url,
    config: &CrawlConfig,
    deadline: Option<Instant>,
) -> Result<FetchedPage, SkipReason> {
    let request = client
        .get(url.clone())
        .header(reqwest::header::USER_AGENT, &config.user_agent)
        .timeout(config.request_timeout())
        .send();

    let response = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, request)
            .await
            .map_err(|_| SkipReason::DeadlineExceeded)?,
        None => request.await,
    }
    .map_err(classify_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(SkipReason::HttpStatus(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    if !content_type.to_ascii_lowercase().starts_with("text/html") {
        return Err(SkipReason::ContentType(content_type));
    }

    let final_url = response.url().clone();
    let html = response.text().await.map_err(classify_error)?;

    Ok(FetchedPage {
        url: final_url,
        html,
        status_code: status.as_u16(),
        content_type,
        fetched_at: Utc::now(),
    })
}

fn classify_error(error: reqwest::Error) -> SkipReason {
    if error.is_timeout() {
        SkipReason::Timeout
    } else {
        SkipReason::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discover::PageSource;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page(url: &str, priority: usize) -> DiscoveredPage {
        DiscoveredPage {
            url: Url::parse(url).unwrap(),
            source: PageSource::Sitemap,
            priority,
        }
    }

    fn quick_config() -> CrawlConfig {
        CrawlConfig {
            request_delay_ms: 0,
            request_timeout_ms: 2_000,
            ..CrawlConfig::default()
        }
    }

    async fn mount_html(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html; charset=utf-8")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn keeps_only_html_2xx_responses() {
        let server = MockServer::start().await;
        mount_html(&server, "/", "<html><body>home</body></html>").await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "application/json")
                    .set_body_string("{}"),
            )
            .mount(&server)
            .await;

        let pages = vec![
            page(&format!("{}/", server.uri()), 0),
            page(&format!("{}/missing", server.uri()), 1),
            page(&format!("{}/data.json", server.uri()), 2),
        ];
        let client = reqwest::Client::new();
        let outcome = fetch_pages(
            &client,
            &pages,
            &RobotsPolicy::permissive(),
            &quick_config(),
            None,
        )
        .await;

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.pages[0].status_code, 200);
        assert!(outcome.pages[0].content_type.starts_with("text/html"));
        assert_eq!(outcome.skipped.len(), 2);
        assert!(
            outcome
                .skipped
                .iter()
                .any(|s| s.reason == SkipReason::HttpStatus(404))
        );
        assert!(
            outcome
                .skipped
                .iter()
                .any(|s| matches!(s.reason, SkipReason::ContentType(_)))
        );
    }

    #[tokio::test]
    async fn robots_disallowed_pages_are_never_requested() {
        let server = MockServer::start().await;
        mount_html(&server, "/", "<html><body>home</body></html>").await;

        let robots = RobotsPolicy::parse("User-agent: *\nDisallow: /admin", "OnboardingBot/1.0");
        let pages = vec![
            page(&format!("{}/", server.uri()), 0),
            page(&format!("{}/admin", server.uri()), 1),
        ];
        let client = reqwest::Client::new();
        let outcome = fetch_pages(&client, &pages, &robots, &quick_config(), None).await;

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason, SkipReason::RobotsDisallowed);
        // The disallowed path had no mock; a request would have produced a
        // 404 skip instead of a robots skip.
    }

    #[tokio::test]
    async fn politeness_delay_spaces_sequential_fetches() {
        let server = MockServer::start().await;
        mount_html(&server, "/a", "<html><body>a</body></html>").await;
        mount_html(&server, "/b", "<html><body>b</body></html>").await;
        mount_html(&server, "/c", "<html><body>c</body></html>").await;

        let config = CrawlConfig {
            concurrency: 1,
            request_delay_ms: 60,
            ..CrawlConfig::default()
        };
        let pages = vec![
            page(&format!("{}/a", server.uri()), 0),
            page(&format!("{}/b", server.uri()), 1),
            page(&format!("{}/c", server.uri()), 2),
        ];
        let client = reqwest::Client::new();
        let started = std::time::Instant::now();
        let outcome = fetch_pages(&client, &pages, &RobotsPolicy::permissive(), &config, None).await;

        assert_eq!(outcome.pages.len(), 3);
        // Three sequential fetches each followed by a 60ms politeness sleep.
        assert!(started.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn expired_deadline_short_circuits_pending_pages() {
        let server = MockServer::start().await;
        mount_html(&server, "/", "<html><body>x</body></html>").await;

        let pages = vec![page(&format!("{}/", server.uri()), 0)];
        let client = reqwest::Client::new();
        let outcome = fetch_pages(
            &client,
            &pages,
            &RobotsPolicy::permissive(),
            &quick_config(),
            Some(Instant::now() - Duration::from_secs(1)),
        )
        .await;

        assert!(outcome.pages.is_empty());
        assert_eq!(outcome.skipped[0].reason, SkipReason::DeadlineExceeded);
    }

    #[tokio::test]
    async fn results_preserve_discovery_order() {
        let server = MockServer::start().await;
        for route in ["/first", "/second", "/third"] {
            mount_html(&server, route, "<html><body>page</body></html>").await;
        }
        let pages = vec![
            page(&format!("{}/first", server.uri()), 0),
            page(&format!("{}/second", server.uri()), 1),
            page(&format!("{}/third", server.uri()), 2),
        ];
        let client = reqwest::Client::new();
        let outcome = fetch_pages(
            &client,
            &pages,
            &RobotsPolicy::permissive(),
            &quick_config(),
            None,
        )
        .await;

        let paths: Vec<&str> = outcome.pages.iter().map(|p| p.url.path()).collect();
        assert_eq!(paths, ["/first", "/second", "/third"]);
    }
}
