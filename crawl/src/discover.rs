//! Page discovery: sitemaps first, heuristic paths as fallback.

use intake_config::CrawlConfig;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::robots::RobotsPolicy;
use crate::safety::{self, origin_of};

/// Where a discovered page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    Sitemap,
    Heuristic,
}

/// A candidate page, ordered by priority (ascending).
#[derive(Debug, Clone)]
pub struct DiscoveredPage {
    pub url: Url,
    pub source: PageSource,
    pub priority: usize,
}

/// Discover pages for an origin, capped at `max_pages`.
///
/// Sources, in priority order: every sitemap advertised by robots.txt, else
/// `<origin>/sitemap.xml`; when no sitemap yields a single usable URL, the
/// configured heuristic paths. Only same-origin pages survive.
pub async fn discover_pages(
    client: &reqwest::Client,
    origin_url: &Url,
    robots: &RobotsPolicy,
    config: &CrawlConfig,
) -> Vec<DiscoveredPage> {
    let origin = origin_of(origin_url);

    let sitemap_urls: Vec<String> = if robots.sitemaps().is_empty() {
        vec![format!("{origin}/sitemap.xml")]
    } else {
        robots.sitemaps().to_vec()
    };

    let mut pages: Vec<DiscoveredPage> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    'sitemaps: for sitemap_url in sitemap_urls {
        let Some(body) = fetch_text(client, &sitemap_url, config).await else {
            continue;
        };
        match parse_sitemap(&body) {
            SitemapDoc::UrlSet(locs) => {
                collect_pages(&locs, &origin, &mut pages, &mut seen);
            }
            SitemapDoc::Index(children) => {
                // One recursion level: children are fetched through the same
                // SSRF gate; nested indexes and unreachable children are
                // silently skipped.
                for child in children {
                    if pages.len() >= config.max_pages {
                        break 'sitemaps;
                    }
                    if safety::ensure_public(&child).await.is_err() {
                        tracing::debug!(url = %child, "skipping sitemap child that failed the safety check");
                        continue;
                    }
                    let Some(child_body) = fetch_text(client, &child, config).await else {
                        continue;
                    };
                    if let SitemapDoc::UrlSet(locs) = parse_sitemap(&child_body) {
                        collect_pages(&locs, &origin, &mut pages, &mut seen);
                    }
                }
            }
            SitemapDoc::Empty => {}
        }
        if pages.len() >= config.max_pages {
            break;
        }
    }

    if pages.is_empty() {
        for (index, path) in config.heuristic_paths.iter().enumerate() {
            if let Ok(url) = origin_url.join(path)
                && seen.insert(url.to_string())
            {
                pages.push(DiscoveredPage {
                    url,
                    source: PageSource::Heuristic,
                    priority: index,
                });
            }
        }
    }

    pages.sort_by_key(|p| p.priority);
    pages.truncate(config.max_pages);
    pages
}

fn collect_pages(
    locs: &[String],
    origin: &str,
    pages: &mut Vec<DiscoveredPage>,
    seen: &mut std::collections::HashSet<String>,
) {
    for loc in locs {
        let Ok(url) = Url::parse(loc.trim()) else {
            continue;
        };
        if origin_of(&url) != origin {
            continue;
        }
        if seen.insert(url.to_string()) {
            let priority = 100 + pages.len();
            pages.push(DiscoveredPage {
                url,
                source: PageSource::Sitemap,
                priority,
            });
        }
    }
}

async fn fetch_text(client: &reqwest::Client, url: &str, config: &CrawlConfig) -> Option<String> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, &config.user_agent)
        .timeout(config.request_timeout())
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.text().await.ok()
}

enum SitemapDoc {
    /// `<urlset>` — page URLs.
    UrlSet(Vec<String>),
    /// `<sitemapindex>` — child sitemap URLs.
    Index(Vec<String>),
    /// Malformed or unrecognized; discovery treats this as "no URLs".
    Empty,
}

/// Parse a sitemap document, tolerating namespaces and malformed input.
fn parse_sitemap(xml: &str) -> SitemapDoc {
    let mut reader = Reader::from_str(xml);

    let mut root: Option<Root> = None;
    let mut in_loc = false;
    let mut locs = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match (&root, name) {
                    (None, b"urlset") => root = Some(Root::UrlSet),
                    (None, b"sitemapindex") => root = Some(Root::Index),
                    (None, _) => return SitemapDoc::Empty,
                    (Some(_), b"loc") => in_loc = true,
                    _ => {}
                }
            }
            Ok(Event::Text(text)) => {
                if in_loc && let Ok(value) = text.unescape() {
                    let value = value.trim().to_string();
                    if !value.is_empty() {
                        locs.push(value);
                    }
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return SitemapDoc::Empty,
        }
    }

    match root {
        Some(Root::UrlSet) => SitemapDoc::UrlSet(locs),
        Some(Root::Index) => SitemapDoc::Index(locs),
        None => SitemapDoc::Empty,
    }
}

enum Root {
    UrlSet,
    Index,
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset() {
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://example.com/</loc><priority>1.0</priority></url>
              <url><loc>https://example.com/about</loc></url>
            </urlset>"#;
        let SitemapDoc::UrlSet(locs) = parse_sitemap(xml) else {
            panic!("expected urlset");
        };
        assert_eq!(locs, ["https://example.com/", "https://example.com/about"]);
    }

    #[test]
    fn parses_sitemapindex() {
        let xml = r#"<sitemapindex>
              <sitemap><loc>https://example.com/pages.xml</loc></sitemap>
            </sitemapindex>"#;
        let SitemapDoc::Index(children) = parse_sitemap(xml) else {
            panic!("expected index");
        };
        assert_eq!(children, ["https://example.com/pages.xml"]);
    }

    #[test]
    fn namespaced_elements_are_recognized() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
              <sm:url><sm:loc>https://example.com/x</sm:loc></sm:url>
            </sm:urlset>"#;
        let SitemapDoc::UrlSet(locs) = parse_sitemap(xml) else {
            panic!("expected urlset");
        };
        assert_eq!(locs, ["https://example.com/x"]);
    }

    #[test]
    fn malformed_xml_yields_no_urls() {
        assert!(matches!(parse_sitemap("not xml at all"), SitemapDoc::Empty));
        assert!(matches!(
            parse_sitemap("<html><body>hi</body></html>"),
            SitemapDoc::Empty
        ));
    }

    #[tokio::test]
    async fn heuristic_fallback_when_no_sitemap() {
        let server = wiremock::MockServer::start().await;
        // No sitemap mock mounted: /sitemap.xml 404s.
        let client = reqwest::Client::new();
        let config = CrawlConfig::default();
        let origin_url = Url::parse(&server.uri()).unwrap();

        let pages =
            discover_pages(&client, &origin_url, &RobotsPolicy::permissive(), &config).await;

        assert_eq!(pages.len(), config.heuristic_paths.len());
        assert!(pages.iter().all(|p| p.source == PageSource::Heuristic));
        assert_eq!(pages[0].url.path(), "/");
        // Priorities are the heuristic list indexes, already sorted.
        let priorities: Vec<usize> = pages.iter().map(|p| p.priority).collect();
        assert!(priorities.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn sitemap_pages_filtered_to_same_origin_and_capped() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let sitemap = format!(
            r#"<urlset>
              <url><loc>{0}/</loc></url>
              <url><loc>{0}/about</loc></url>
              <url><loc>{0}/about</loc></url>
              <url><loc>https://other-origin.example/</loc></url>
            </urlset>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let config = CrawlConfig {
            max_pages: 2,
            ..CrawlConfig::default()
        };
        let origin_url = Url::parse(&server.uri()).unwrap();

        let pages =
            discover_pages(&client, &origin_url, &RobotsPolicy::permissive(), &config).await;

        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|p| p.source == PageSource::Sitemap));
        assert!(
            pages
                .iter()
                .all(|p| origin_of(&p.url) == origin_of(&origin_url))
        );
    }
}
