//! robots.txt fetching and policy evaluation.
//!
//! The crawler asks three things of robots.txt: an allow predicate for
//! paths, the `Crawl-delay` politeness floor, and the advertised sitemaps.
//! A site with no robots.txt (or one we cannot fetch or parse) gets the
//! permissive policy: everything allowed, no sitemaps, no delay.

use std::collections::HashMap;
use std::time::Duration;

use intake_config::CrawlConfig;
use url::Url;

/// Resolved policy for one origin.
#[derive(Debug, Clone, Default)]
pub struct RobotsPolicy {
    allow: Vec<String>,
    disallow: Vec<String>,
    sitemaps: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl RobotsPolicy {
    /// The policy used when robots.txt is missing or unreadable.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// `Sitemap:` lines, absolute URLs in file order.
    #[must_use]
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }

    /// `Crawl-delay` from the matched group, if any.
    #[must_use]
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    /// Whether a URL's path may be fetched. Unspecified paths are allowed.
    ///
    /// Longest matching rule wins; Allow wins ties.
    #[must_use]
    pub fn is_allowed(&self, url: &Url) -> bool {
        self.is_path_allowed(url.path())
    }

    #[must_use]
    pub fn is_path_allowed(&self, path: &str) -> bool {
        let mut disallow_len = None;
        for rule in &self.disallow {
            if rule.is_empty() {
                // Empty Disallow means allow-all.
                continue;
            }
            if path_matches(path, rule) {
                let len = effective_length(rule);
                if disallow_len.is_none_or(|best| len > best) {
                    disallow_len = Some(len);
                }
            }
        }
        let Some(disallow_len) = disallow_len else {
            return true;
        };
        self.allow
            .iter()
            .filter(|rule| !rule.is_empty())
            .any(|rule| path_matches(path, rule) && effective_length(rule) >= disallow_len)
    }

    /// Parse robots.txt content, honoring the group for `user_agent` in
    /// preference to `*`. Group matching is a case-insensitive substring
    /// test; the longest matching token wins.
    #[must_use]
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let content = content.strip_prefix('\u{FEFF}').unwrap_or(content);

        let mut groups: HashMap<String, Group> = HashMap::new();
        let mut sitemaps = Vec::new();
        let mut current_agents: Vec<String> = Vec::new();
        let mut in_rules = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    if in_rules {
                        current_agents.clear();
                        in_rules = false;
                    }
                    current_agents.push(value.to_lowercase());
                }
                "allow" => {
                    in_rules = true;
                    for agent in &current_agents {
                        groups
                            .entry(agent.clone())
                            .or_default()
                            .allow
                            .push(value.to_string());
                    }
                }
                "disallow" => {
                    in_rules = true;
                    for agent in &current_agents {
                        groups
                            .entry(agent.clone())
                            .or_default()
                            .disallow
                            .push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    in_rules = true;
                    if let Ok(seconds) = value.parse::<f64>()
                        && seconds.is_finite()
                        && seconds >= 0.0
                    {
                        let delay = Duration::from_millis((seconds * 1000.0) as u64);
                        for agent in &current_agents {
                            groups.entry(agent.clone()).or_default().crawl_delay = Some(delay);
                        }
                    }
                }
                "sitemap" => {
                    // Global directive, outside any group.
                    if !value.is_empty() {
                        sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        let group = select_group(&groups, user_agent);
        Self {
            allow: group.map(|g| g.allow.clone()).unwrap_or_default(),
            disallow: group.map(|g| g.disallow.clone()).unwrap_or_default(),
            crawl_delay: group.and_then(|g| g.crawl_delay),
            sitemaps,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Group {
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<Duration>,
}

fn select_group<'a>(groups: &'a HashMap<String, Group>, user_agent: &str) -> Option<&'a Group> {
    let ua_lower = user_agent.to_lowercase();
    let mut best: Option<(&str, &Group)> = None;
    for (token, group) in groups {
        if token == "*" {
            continue;
        }
        if ua_lower.contains(token.as_str())
            && best.is_none_or(|(best_token, _)| token.len() > best_token.len())
        {
            best = Some((token, group));
        }
    }
    best.map(|(_, g)| g).or_else(|| groups.get("*"))
}

/// Rule specificity: wildcards and anchors do not count.
fn effective_length(pattern: &str) -> usize {
    pattern.chars().filter(|&c| c != '*' && c != '$').count()
}

/// Prefix matching with `*` wildcards and a `$` end anchor.
fn path_matches(path: &str, pattern: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };

    if !pattern.contains('*') {
        return if anchored {
            path == pattern
        } else {
            path.starts_with(pattern)
        };
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0;
    if !parts[0].is_empty() {
        if !path.starts_with(parts[0]) {
            return false;
        }
        pos = parts[0].len();
    }
    for part in &parts[1..parts.len().saturating_sub(1)] {
        if part.is_empty() {
            continue;
        }
        match path[pos..].find(part) {
            Some(found) => pos += found + part.len(),
            None => return false,
        }
    }
    let last = parts[parts.len() - 1];
    if last.is_empty() {
        return true;
    }
    if anchored {
        path.ends_with(last) && path.len() - last.len() >= pos
    } else {
        path[pos..].contains(last)
    }
}

/// Fetch `<origin>/robots.txt`. Any non-2xx response or transport failure
/// yields the permissive policy; robots problems never fail a run.
pub async fn fetch_robots(
    client: &reqwest::Client,
    origin: &str,
    config: &CrawlConfig,
) -> RobotsPolicy {
    let robots_url = format!("{origin}/robots.txt");
    let response = client
        .get(&robots_url)
        .header(reqwest::header::USER_AGENT, &config.user_agent)
        .timeout(config.request_timeout())
        .send()
        .await;

    match response {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(body) => RobotsPolicy::parse(&body, &config.user_agent),
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "robots.txt body unreadable, using permissive policy");
                RobotsPolicy::permissive()
            }
        },
        Ok(resp) => {
            tracing::debug!(url = %robots_url, status = %resp.status(), "robots.txt not available, using permissive policy");
            RobotsPolicy::permissive()
        }
        Err(e) => {
            tracing::debug!(url = %robots_url, error = %e, "robots.txt fetch failed, using permissive policy");
            RobotsPolicy::permissive()
        }
    }
}
