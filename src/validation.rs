//! Destination normalization and validation.
//!
//! Every destination goes through [`normalize_destination`] before it is
//! deduplicated or persisted, so the stored form is always a parsed,
//! canonical absolute URL. Normalizing before the dedup lookup also means
//! `example.com` and `https://example.com/` land on the same dedup key.

use crate::config::Environment;
use crate::error::AppError;
use std::net::IpAddr;
use url::{Host, Url};

/// Upper bound on raw destination input length.
pub const MAX_DESTINATION_LEN: usize = 2048;

/// Normalize and validate a raw destination string.
///
/// Steps:
/// 1. Trim surrounding whitespace, reject empty or over-length input
/// 2. Reject control characters
/// 3. Prepend `https://` when the input carries no scheme
/// 4. Parse as an absolute URL, allowing only `http` / `https` (which
///    rejects `javascript:`, `data:`, `vbscript:` and friends)
/// 5. In production deployments, reject loopback / private / internal hosts
///    so the tracking redirect cannot probe internal networks
///
/// Returns the canonical string form of the parsed URL.
pub fn normalize_destination(input: &str, environment: Environment) -> Result<String, AppError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AppError::InvalidDestination("destination is empty".into()));
    }
    if trimmed.len() > MAX_DESTINATION_LEN {
        return Err(AppError::InvalidDestination(format!(
            "destination exceeds {MAX_DESTINATION_LEN} characters"
        )));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(AppError::InvalidDestination(
            "destination contains control characters".into(),
        ));
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| AppError::InvalidDestination(format!("not an absolute address: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AppError::InvalidDestination(format!(
                "scheme '{other}' is not allowed"
            )));
        }
    }

    let host = url
        .host()
        .ok_or_else(|| AppError::InvalidDestination("destination has no host".into()))?;

    if environment == Environment::Production && is_internal_host(&host) {
        return Err(AppError::InvalidDestination(
            "destination points at a private or internal network".into(),
        ));
    }

    Ok(url.to_string())
}

/// Whether the input already starts with a `scheme:` prefix.
fn has_scheme(input: &str) -> bool {
    let Some(colon) = input.find(':') else {
        return false;
    };
    let prefix = &input[..colon];
    let mut chars = prefix.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

/// Loopback, private-range, and conventionally-internal hosts.
fn is_internal_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
        }
        Host::Ipv4(ip) => is_internal_ip(IpAddr::V4(*ip)),
        Host::Ipv6(ip) => is_internal_ip(IpAddr::V6(*ip)),
    }
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique-local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}
