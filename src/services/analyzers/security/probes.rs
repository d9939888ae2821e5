//! Security probes
//!
//! Each probe issues its own HTTP request so one failing check never blocks
//! another. Probes report findings plus a `recommendations` array in their
//! details; the phase collects those from completed probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use url::Url;
use webaudit_core::{CoreResult, HttpClient, HttpErrorKind, HttpRequest};
use webaudit_pipeline::{Probe, ProbeOutput, ProbeRole, Reachability};

use crate::services::analyzers::clamp_score;

/// Header importance tiers and their share of the headers score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Importance {
    Critical,
    High,
    Medium,
    Low,
}

impl Importance {
    fn weight(self) -> f64 {
        match self {
            Importance::Critical => 40.0,
            Importance::High => 30.0,
            Importance::Medium => 20.0,
            Importance::Low => 10.0,
        }
    }
}

/// Security headers checked by `HeadersProbe`.
pub const SECURITY_HEADERS: &[(&str, &str, Importance)] = &[
    ("strict-transport-security", "HTTP Strict Transport Security (HSTS)", Importance::Critical),
    ("content-security-policy", "Content Security Policy (CSP)", Importance::High),
    ("x-frame-options", "X-Frame-Options", Importance::High),
    ("x-content-type-options", "X-Content-Type-Options", Importance::Medium),
    ("x-xss-protection", "X-XSS-Protection", Importance::Medium),
    ("referrer-policy", "Referrer Policy", Importance::Medium),
    ("permissions-policy", "Permissions Policy", Importance::Low),
];

/// Headers that leak server implementation details.
const DISCLOSURE_HEADERS: &[&str] = &["server", "x-powered-by", "x-aspnet-version", "x-aspnetmvc-version"];

/// Cookie names that should always carry every security flag.
const SENSITIVE_COOKIE_MARKERS: &[&str] = &["session", "auth", "login", "token", "csrf"];

// ============================================================================
// Connectivity
// ============================================================================

/// Foundational probe: can the target be fetched at all?
pub struct ConnectivityProbe {
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl ConnectivityProbe {
    pub fn new(http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl Probe for ConnectivityProbe {
    fn id(&self) -> &str {
        "connectivity"
    }

    fn role(&self) -> ProbeRole {
        ProbeRole::Foundational
    }

    async fn run(&self, target: &Url) -> CoreResult<ProbeOutput> {
        let request = HttpRequest::get(target.as_str()).with_timeout(self.timeout);
        match self.http.request(request).await {
            Ok(response) if response.status < 500 => Ok(ProbeOutput::new(
                100,
                json!({ "connected": true, "statusCode": response.status }),
            )
            .with_reachability(Reachability::Reachable)),
            Ok(response) => Ok(ProbeOutput::new(
                50,
                json!({
                    "connected": true,
                    "statusCode": response.status,
                    "recommendations": ["Fix server errors so the site can be served reliably"],
                }),
            )
            .with_reachability(Reachability::Degraded {
                reason: format!("server answered HTTP {}", response.status),
            })),
            Err(e) => match e.http_kind() {
                Some(HttpErrorKind::Tls) => Ok(ProbeOutput::new(
                    20,
                    json!({
                        "connected": false,
                        "error": e.to_string(),
                        "recommendations": ["Fix the TLS configuration so browsers can connect securely"],
                    }),
                )
                .with_reachability(Reachability::Degraded {
                    reason: format!("TLS handshake failed: {}", e),
                })),
                Some(HttpErrorKind::Connect) | Some(HttpErrorKind::Timeout) => Ok(ProbeOutput::new(
                    0,
                    json!({ "connected": false, "error": e.to_string() }),
                )
                .with_reachability(Reachability::Unreachable {
                    reason: e.to_string(),
                })),
                _ => Err(e),
            },
        }
    }
}

// ============================================================================
// Certificate
// ============================================================================

/// Verifies the certificate chain by completing a strict TLS handshake.
///
/// Independent of reachability: a TLS failure is exactly what it reports.
pub struct CertificateProbe {
    http: Arc<dyn HttpClient>,
}

impl CertificateProbe {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Probe for CertificateProbe {
    fn id(&self) -> &str {
        "certificate"
    }

    fn role(&self) -> ProbeRole {
        ProbeRole::Independent
    }

    async fn run(&self, target: &Url) -> CoreResult<ProbeOutput> {
        if target.scheme() != "https" {
            return Ok(ProbeOutput::new(
                0,
                json!({
                    "https": false,
                    "recommendations": ["Serve the site over HTTPS with a valid certificate"],
                }),
            ));
        }

        let request = HttpRequest::head(target.as_str()).with_redirects(false);
        match self.http.request(request).await {
            Ok(_) => Ok(ProbeOutput::new(100, json!({ "https": true, "valid": true }))),
            Err(e) if e.http_kind() == Some(HttpErrorKind::Tls) => Ok(ProbeOutput::new(
                0,
                json!({
                    "https": true,
                    "valid": false,
                    "error": e.to_string(),
                    "recommendations": ["Renew or reissue the TLS certificate for this host"],
                }),
            )),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Headers
// ============================================================================

/// Weighted presence check of the standard security headers.
pub struct HeadersProbe {
    http: Arc<dyn HttpClient>,
}

impl HeadersProbe {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

/// Score header presence by tier: each tier contributes its weight times the
/// fraction of its headers present.
pub fn score_headers(present: &[&str]) -> u8 {
    let tiers = [
        Importance::Critical,
        Importance::High,
        Importance::Medium,
        Importance::Low,
    ];
    let total: f64 = tiers
        .iter()
        .map(|tier| {
            let in_tier: Vec<&str> = SECURITY_HEADERS
                .iter()
                .filter(|(_, _, importance)| importance == tier)
                .map(|(name, _, _)| *name)
                .collect();
            let found = in_tier.iter().filter(|name| present.contains(*name)).count();
            tier.weight() * found as f64 / in_tier.len().max(1) as f64
        })
        .sum();
    clamp_score(total)
}

#[async_trait]
impl Probe for HeadersProbe {
    fn id(&self) -> &str {
        "headers"
    }

    async fn run(&self, target: &Url) -> CoreResult<ProbeOutput> {
        let response = self.http.request(HttpRequest::get(target.as_str())).await?;

        let present: Vec<&str> = SECURITY_HEADERS
            .iter()
            .map(|(name, _, _)| *name)
            .filter(|name| response.header(name).is_some())
            .collect();
        let missing: Vec<&str> = SECURITY_HEADERS
            .iter()
            .filter(|(name, _, _)| !present.contains(name))
            .map(|(_, label, _)| *label)
            .collect();
        let disclosed: Vec<&str> = DISCLOSURE_HEADERS
            .iter()
            .copied()
            .filter(|name| response.header(name).is_some())
            .collect();

        let mut recommendations: Vec<String> = SECURITY_HEADERS
            .iter()
            .filter(|(name, _, importance)| {
                !present.contains(name) && matches!(importance, Importance::Critical | Importance::High)
            })
            .map(|(_, label, _)| format!("Add the {} header", label))
            .collect();
        if !disclosed.is_empty() {
            recommendations.push(format!(
                "Remove server information headers ({})",
                disclosed.join(", ")
            ));
        }

        Ok(ProbeOutput::new(
            score_headers(&present),
            json!({
                "present": present,
                "missing": missing,
                "informationDisclosure": disclosed,
                "recommendations": recommendations,
            }),
        ))
    }
}

// ============================================================================
// HTTPS redirect
// ============================================================================

/// Does the plain-HTTP origin redirect to HTTPS?
pub struct HttpsRedirectProbe {
    http: Arc<dyn HttpClient>,
}

impl HttpsRedirectProbe {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Probe for HttpsRedirectProbe {
    fn id(&self) -> &str {
        "https_redirect"
    }

    async fn run(&self, target: &Url) -> CoreResult<ProbeOutput> {
        let uses_https = target.scheme() == "https";
        let mut plain = target.clone();
        // http and https are both special schemes, so this cannot fail
        let _ = plain.set_scheme("http");
        let _ = plain.set_port(None);

        let request = HttpRequest::get(plain.as_str()).with_redirects(false);
        let (redirects, status, location) = match self.http.request(request).await {
            Ok(response) => {
                let location = response.header("location").map(str::to_string);
                let redirects = response.is_redirect()
                    && location.as_deref().is_some_and(|l| l.starts_with("https://"));
                (redirects, Some(response.status), location)
            }
            // An origin that refuses plain HTTP entirely is not a failure of this check
            Err(e) if matches!(e.http_kind(), Some(HttpErrorKind::Connect)) => (false, None, None),
            Err(e) => return Err(e),
        };

        let mut score = 0u8;
        let mut recommendations = Vec::new();
        if uses_https {
            score += 50;
        } else {
            recommendations.push("Serve the site over HTTPS".to_string());
        }
        if redirects {
            score += 50;
        } else {
            recommendations.push("Redirect all HTTP traffic to HTTPS with a 301".to_string());
        }

        Ok(ProbeOutput::new(
            score,
            json!({
                "usesHttps": uses_https,
                "redirectWorking": redirects,
                "httpStatus": status,
                "location": location,
                "recommendations": recommendations,
            }),
        ))
    }
}

// ============================================================================
// Cookies
// ============================================================================

/// Flag adoption across the cookies the target sets.
pub struct CookiesProbe {
    http: Arc<dyn HttpClient>,
}

impl CookiesProbe {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CookieTally {
    pub total: usize,
    pub secure: usize,
    pub http_only: usize,
    pub same_site: usize,
    pub insecure_sensitive: Vec<String>,
}

pub fn tally_cookies(set_cookie: &[&str]) -> CookieTally {
    let mut tally = CookieTally {
        total: set_cookie.len(),
        ..Default::default()
    };
    for header in set_cookie {
        let lower = header.to_ascii_lowercase();
        let attributes: Vec<&str> = lower.split(';').skip(1).map(str::trim).collect();
        let secure = attributes.iter().any(|a| *a == "secure");
        let http_only = attributes.iter().any(|a| *a == "httponly");
        let same_site = attributes.iter().any(|a| a.starts_with("samesite="));

        tally.secure += secure as usize;
        tally.http_only += http_only as usize;
        tally.same_site += same_site as usize;

        let name = header.split('=').next().unwrap_or_default().trim().to_string();
        let sensitive = SENSITIVE_COOKIE_MARKERS
            .iter()
            .any(|marker| name.to_ascii_lowercase().contains(marker));
        if sensitive && !(secure && http_only && same_site) {
            tally.insecure_sensitive.push(name);
        }
    }
    tally
}

/// Secure 40%, HttpOnly 30%, SameSite 30%, minus 20 per sensitive cookie
/// missing a flag. No cookies scores 100.
pub fn score_cookies(tally: &CookieTally) -> u8 {
    if tally.total == 0 {
        return 100;
    }
    let pct = |n: usize| n as f64 * 100.0 / tally.total as f64;
    let base = pct(tally.secure) * 0.4 + pct(tally.http_only) * 0.3 + pct(tally.same_site) * 0.3;
    clamp_score(base - 20.0 * tally.insecure_sensitive.len() as f64)
}

#[async_trait]
impl Probe for CookiesProbe {
    fn id(&self) -> &str {
        "cookies"
    }

    async fn run(&self, target: &Url) -> CoreResult<ProbeOutput> {
        let response = self.http.request(HttpRequest::get(target.as_str())).await?;
        let tally = tally_cookies(&response.header_values("set-cookie"));

        let mut recommendations = Vec::new();
        if tally.secure < tally.total {
            recommendations.push("Set the Secure flag on all cookies".to_string());
        }
        if tally.http_only < tally.total {
            recommendations.push("Set the HttpOnly flag on cookies not read by scripts".to_string());
        }
        if tally.same_site < tally.total {
            recommendations.push("Set a SameSite attribute on all cookies".to_string());
        }

        Ok(ProbeOutput::new(
            score_cookies(&tally),
            json!({
                "totalCookies": tally.total,
                "secureCookies": tally.secure,
                "httpOnlyCookies": tally.http_only,
                "sameSiteCookies": tally.same_site,
                "insecureSensitiveCookies": tally.insecure_sensitive,
                "recommendations": recommendations,
            }),
        ))
    }
}
