//! URL normalization and the SSRF gate.
//!
//! Every URL the pipeline will connect to passes through here first:
//! submitted site URLs, recursive sitemap-index children, and webhook
//! endpoints at registration time.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Ports the crawler will connect to. Everything else is rejected before DNS.
const ALLOWED_PORTS: &[u16] = &[80, 443];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("url must not be empty")]
    Empty,
    #[error("failed to parse url: {0}")]
    Parse(String),
    #[error("scheme {0:?} is not allowed; use http or https")]
    SchemeNotAllowed(String),
    #[error("port {0} is not allowed")]
    PortNotAllowed(u16),
    #[error("url has no host")]
    NoHost,
    #[error("hostname {0:?} did not resolve")]
    DnsResolution(String),
    #[error("address {ip} for {host:?} is private or reserved")]
    PrivateAddress { host: String, ip: IpAddr },
}

/// A normalized URL that passed scheme, port, and address checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeUrl {
    url: Url,
    href: String,
    hash: String,
}

impl SafeUrl {
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Normalized href: lowercase scheme and host, default port stripped,
    /// fragment removed, query keys sorted.
    #[must_use]
    pub fn href(&self) -> &str {
        &self.href
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    #[must_use]
    pub fn origin(&self) -> String {
        origin_of(&self.url)
    }

    /// SHA-256 of the normalized href, hex. Used for artifact keying.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.hash
    }
}

/// Scheme://host[:port] with default ports omitted.
#[must_use]
pub fn origin_of(url: &Url) -> String {
    let scheme = url.scheme();
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    }
}

/// Hex SHA-256 of an arbitrary href. Matches [`SafeUrl::sha256`] for
/// already-normalized input.
#[must_use]
pub fn sha256_hex(href: &str) -> String {
    hex::encode(Sha256::digest(href.as_bytes()))
}

/// Parse and normalize without touching the network.
///
/// The url crate already lowercases scheme/host and drops the scheme's
/// default port; on top of that the fragment is stripped and query pairs are
/// sorted by key so equal URLs hash equally.
pub fn normalize(raw: &str) -> Result<Url, UrlValidationError> {
    if raw.trim().is_empty() {
        return Err(UrlValidationError::Empty);
    }
    let mut url = Url::parse(raw.trim()).map_err(|e| UrlValidationError::Parse(e.to_string()))?;

    let scheme = url.scheme().to_string();
    if scheme != "http" && scheme != "https" {
        return Err(UrlValidationError::SchemeNotAllowed(scheme));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlValidationError::NoHost);
    }
    if let Some(port) = url.port()
        && !ALLOWED_PORTS.contains(&port)
    {
        return Err(UrlValidationError::PortNotAllowed(port));
    }

    url.set_fragment(None);
    sort_query_pairs(&mut url);
    Ok(url)
}

fn sort_query_pairs(url: &mut Url) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        // "?" with no pairs normalizes to no query at all.
        if url.query().is_some() {
            url.set_query(None);
        }
        return;
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(&k, &v);
    }
    let query = serializer.finish();
    url.set_query(Some(&query));
}

/// Normalize, resolve, and reject private or reserved destinations.
///
/// IPv4 answers are consulted first; IPv6 only when the name has no IPv4
/// answer. Any private/reserved address in the consulted family fails the
/// whole URL, so a host that fronts both a public and an internal address
/// cannot be used to reach the internal one.
pub async fn ensure_public(raw: &str) -> Result<SafeUrl, UrlValidationError> {
    let url = normalize(raw)?;
    let host = url.host_str().ok_or(UrlValidationError::NoHost)?.to_string();

    let addresses = resolve_host(&url, &host).await?;
    for ip in &addresses {
        if is_private_or_reserved(*ip) {
            return Err(UrlValidationError::PrivateAddress {
                host: host.clone(),
                ip: *ip,
            });
        }
    }

    let href = url.to_string();
    let hash = sha256_hex(&href);
    Ok(SafeUrl { url, href, hash })
}

/// The SSRF predicate applied to webhook endpoints at registration.
/// Endpoint URLs must additionally be HTTPS.
pub async fn ensure_public_https(raw: &str) -> Result<SafeUrl, UrlValidationError> {
    let safe = ensure_public(raw).await?;
    if safe.url().scheme() != "https" {
        return Err(UrlValidationError::SchemeNotAllowed(
            safe.url().scheme().to_string(),
        ));
    }
    Ok(safe)
}

async fn resolve_host(url: &Url, host: &str) -> Result<Vec<IpAddr>, UrlValidationError> {
    // IP literals skip DNS entirely.
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let port = url.port_or_known_default().unwrap_or(443);
    let resolved: Vec<IpAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| UrlValidationError::DnsResolution(host.to_string()))?
        .map(|addr| addr.ip())
        .collect();
    if resolved.is_empty() {
        return Err(UrlValidationError::DnsResolution(host.to_string()));
    }

    let v4: Vec<IpAddr> = resolved
        .iter()
        .copied()
        .filter(IpAddr::is_ipv4)
        .collect();
    Ok(if v4.is_empty() { resolved } else { v4 })
}

/// The private/reserved address predicate.
///
/// IPv4: 10/8, 172.16/12, 192.168/16, 127/8, 169.254/16, 0/8.
/// IPv6: ::1, ::, fc00::/7, fe80::/10; IPv4-mapped addresses are unwrapped
/// and re-checked as IPv4.
#[must_use]
pub fn is_private_or_reserved(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    ip.is_private()            // 10/8, 172.16/12, 192.168/16
        || ip.is_loopback()    // 127/8
        || ip.is_link_local()  // 169.254/16
        || octets[0] == 0 // 0/8
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_private_v4(mapped);
    }
    let segments = ip.segments();
    ip.is_loopback()
        || ip.is_unspecified()
        || (segments[0] & 0xfe00) == 0xfc00 // fc00::/7 unique local
        || (segments[0] & 0xffc0) == 0xfe80 // fe80::/10 link local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_port_fragment_and_query() {
        let url = normalize("HTTPS://Example.COM:443/Path?b=2&a=1#frag").unwrap();
        assert_eq!(url.to_string(), "https://example.com/Path?a=1&b=2");
    }

    #[test]
    fn preserves_path_case() {
        let url = normalize("https://example.com/About-Us").unwrap();
        assert_eq!(url.path(), "/About-Us");
    }

    #[test]
    fn rejects_bad_scheme_and_port() {
        assert!(matches!(
            normalize("ftp://example.com"),
            Err(UrlValidationError::SchemeNotAllowed(_))
        ));
        assert!(matches!(
            normalize("http://example.com:8080"),
            Err(UrlValidationError::PortNotAllowed(8080))
        ));
        assert!(matches!(normalize("   "), Err(UrlValidationError::Empty)));
    }

    #[test]
    fn explicit_443_on_http_is_allowed() {
        // Non-default but inside the allowlist.
        let url = normalize("http://example.com:443/").unwrap();
        assert_eq!(url.port(), Some(443));
    }

    #[test]
    fn private_v4_ranges() {
        for addr in [
            "10.0.0.1",
            "172.16.0.1",
            "172.31.255.255",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.10.10",
            "0.0.0.0",
        ] {
            let ip: IpAddr = addr.parse().unwrap();
            assert!(is_private_or_reserved(ip), "{addr} should be blocked");
        }
        for addr in ["8.8.8.8", "172.32.0.1", "1.1.1.1"] {
            let ip: IpAddr = addr.parse().unwrap();
            assert!(!is_private_or_reserved(ip), "{addr} should be allowed");
        }
    }

    #[test]
    fn private_v6_ranges() {
        for addr in ["::1", "::", "fc00::1", "fd12::1", "fe80::1"] {
            let ip: IpAddr = addr.parse().unwrap();
            assert!(is_private_or_reserved(ip), "{addr} should be blocked");
        }
        let public: IpAddr = "2606:4700::1111".parse().unwrap();
        assert!(!is_private_or_reserved(public));
    }

    #[test]
    fn v4_mapped_v6_is_unwrapped() {
        let ip: IpAddr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(is_private_or_reserved(ip));
        let ip: IpAddr = "::ffff:8.8.8.8".parse().unwrap();
        assert!(!is_private_or_reserved(ip));
    }

    #[tokio::test]
    async fn loopback_literal_is_blocked() {
        let err = ensure_public("http://127.0.0.1/").await.unwrap_err();
        assert!(matches!(err, UrlValidationError::PrivateAddress { .. }));
    }

    #[tokio::test]
    async fn localhost_is_blocked() {
        let err = ensure_public("http://localhost/").await.unwrap_err();
        assert!(matches!(
            err,
            UrlValidationError::PrivateAddress { .. } | UrlValidationError::DnsResolution(_)
        ));
    }

    #[test]
    fn hash_is_stable_for_equal_normal_forms() {
        let a = normalize("https://example.com/?b=2&a=1").unwrap();
        let b = normalize("https://EXAMPLE.com/?a=1&b=2#x").unwrap();
        assert_eq!(sha256_hex(a.as_str()), sha256_hex(b.as_str()));
    }
}
