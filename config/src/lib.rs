//! Pipeline configuration.
//!
//! One explicit record with every knob enumerated; callers construct it from
//! defaults, from process env, or field by field in tests. No option bags
//! leak into core logic.

use std::time::Duration;

use serde::Deserialize;

/// Crawl-phase settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// User-Agent sent on every request, and the robots.txt group token.
    pub user_agent: String,
    /// Cap on discovered pages per run.
    pub max_pages: usize,
    /// In-flight fetch bound.
    pub concurrency: usize,
    /// Politeness floor between fetches on one worker.
    pub request_delay_ms: u64,
    /// Per-request abort timeout.
    pub request_timeout_ms: u64,
    /// Fallback paths probed when no sitemap yields a URL. Order is priority.
    pub heuristic_paths: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: "OnboardingBot/1.0".to_string(),
            max_pages: 20,
            concurrency: 3,
            request_delay_ms: 500,
            request_timeout_ms: 10_000,
            heuristic_paths: DEFAULT_HEURISTIC_PATHS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl CrawlConfig {
    #[must_use]
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Paths probed when a site exposes no usable sitemap.
pub const DEFAULT_HEURISTIC_PATHS: &[&str] = &[
    "/",
    "/about",
    "/about-us",
    "/pricing",
    "/contact",
    "/contact-us",
    "/services",
    "/products",
    "/team",
    "/careers",
    "/faq",
    "/blog",
];

/// LLM extraction settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    /// Per-page calls run in sequential batches of this size.
    pub extraction_concurrency: usize,
    /// Body text handed to the model is cut here, on a word boundary.
    pub max_body_chars: usize,
    /// Pages below this word count contribute no extractions.
    pub min_word_count: usize,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".to_string(),
            extraction_concurrency: 5,
            max_body_chars: 12_000,
            min_word_count: 10,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

/// Synthesis scoring settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Added to a candidate's confidence when its page URL matches a field
    /// source hint; clamped to 1.
    pub source_hint_boost: f64,
    /// Added once per corroborating candidate beyond the first.
    pub corroboration_boost: f64,
    /// Threshold for fields that do not set their own.
    pub default_confidence_threshold: f64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            source_hint_boost: 0.15,
            corroboration_boost: 0.1,
            default_confidence_threshold: 0.75,
        }
    }
}

/// Delivery settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub signature_tolerance_secs: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 3_600_000,
            signature_tolerance_secs: 300,
        }
    }
}

impl WebhookConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Every option the pipeline consumes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub crawl: CrawlConfig,
    pub llm: LlmConfig,
    pub synthesis: SynthesisConfig,
    pub webhook: WebhookConfig,
}

impl ExtractionConfig {
    /// Defaults overlaid with `INTAKE_*` process-env vars. Unparseable values
    /// keep the default and log a warning rather than aborting startup.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ua) = read_env_string("INTAKE_USER_AGENT") {
            config.crawl.user_agent = ua;
        }
        read_env_parsed("INTAKE_MAX_PAGES", &mut config.crawl.max_pages);
        read_env_parsed("INTAKE_CONCURRENCY", &mut config.crawl.concurrency);
        read_env_parsed("INTAKE_REQUEST_DELAY_MS", &mut config.crawl.request_delay_ms);
        read_env_parsed(
            "INTAKE_REQUEST_TIMEOUT_MS",
            &mut config.crawl.request_timeout_ms,
        );
        if let Some(model) = read_env_string("INTAKE_LLM_MODEL") {
            config.llm.model = model;
        }
        read_env_parsed(
            "INTAKE_EXTRACTION_CONCURRENCY",
            &mut config.llm.extraction_concurrency,
        );
        read_env_parsed("INTAKE_MAX_BODY_CHARS", &mut config.llm.max_body_chars);
        read_env_parsed("INTAKE_MIN_WORD_COUNT", &mut config.llm.min_word_count);
        read_env_parsed(
            "INTAKE_SOURCE_HINT_BOOST",
            &mut config.synthesis.source_hint_boost,
        );
        read_env_parsed(
            "INTAKE_CORROBORATION_BOOST",
            &mut config.synthesis.corroboration_boost,
        );
        read_env_parsed(
            "INTAKE_DEFAULT_CONFIDENCE_THRESHOLD",
            &mut config.synthesis.default_confidence_threshold,
        );
        read_env_parsed("INTAKE_WEBHOOK_TIMEOUT_MS", &mut config.webhook.timeout_ms);
        read_env_parsed(
            "INTAKE_WEBHOOK_MAX_ATTEMPTS",
            &mut config.webhook.max_attempts,
        );
        config
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_parsed<T: std::str::FromStr>(name: &str, target: &mut T) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable env override");
        }
    }
}
