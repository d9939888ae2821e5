//! Target Validation
//!
//! Normalizes user-supplied targets into absolute http(s) URLs and blocks
//! private or loopback hosts unless explicitly allowed.

use std::net::IpAddr;

use url::Url;
use webaudit_core::{CoreError, CoreResult};

/// Longest target URL accepted.
pub const MAX_URL_LENGTH: usize = 2048;

/// Check if an IP address is in a private/reserved range.
///
/// IPv4-mapped IPv6 addresses are judged by their IPv4 form; unique local
/// (fc00::/7) and link-local (fe80::/10) IPv6 ranges are private.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_unspecified()
                || ipv4.is_broadcast()
        }
        IpAddr::V6(ipv6) => {
            if let Some(mapped) = ipv6.to_ipv4_mapped() {
                return is_private_ip(IpAddr::V4(mapped));
            }
            let first = ipv6.segments()[0];
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Check if a hostname is a known private/local name or private IP literal.
pub fn is_private_host(host: &str) -> bool {
    let lower = host.trim_start_matches('[').trim_end_matches(']').to_lowercase();
    if lower == "localhost" || lower.ends_with(".local") || lower.ends_with(".internal") {
        return true;
    }

    match lower.parse::<IpAddr>() {
        Ok(ip) => is_private_ip(ip),
        Err(_) => false,
    }
}

/// Parse and validate an analysis target.
///
/// A missing scheme defaults to `https://`.
pub fn validate_target(raw: &str, allow_private: bool) -> CoreResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::invalid_target("URL cannot be empty"));
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(CoreError::invalid_target(format!(
            "URL exceeds {} characters",
            MAX_URL_LENGTH
        )));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&candidate)
        .map_err(|e| CoreError::invalid_target(format!("Invalid URL '{}': {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::invalid_target(format!(
            "Unsupported scheme '{}', only http and https are allowed",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CoreError::invalid_target("URL has no host"))?;

    if !allow_private && is_private_host(host) {
        return Err(CoreError::invalid_target(format!(
            "Private or local address '{}' is not allowed",
            host
        )));
    }

    Ok(url)
}
