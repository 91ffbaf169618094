// SPDX-FileCopyrightText: 2026 Coreclaw Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! URL policy for outbound web fetches.
//!
//! Blocks requests that could reach internal services: non-HTTP schemes,
//! localhost names, literal private IPs, and hostnames that resolve to
//! private ranges. Domain and port allowlists narrow the surface further.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use coreclaw_core::CoreclawError;
use tracing::warn;
use url::Url;

/// Domain and port constraints applied after the address checks.
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    /// When non-empty, host must exact- or suffix-match one entry.
    pub allowed_domains: Vec<String>,
    /// When non-empty, the (scheme-defaulted) port must be listed.
    pub allowed_ports: Vec<u16>,
    /// Ports that are always rejected.
    pub blocked_ports: Vec<u16>,
}

/// Check if an IP is in a private or reserved range.
///
/// Blocks: RFC 1918, loopback, "this network" (0/8), link-local, CGNAT
/// (100.64/10); IPv6 loopback, unspecified, unique-local, link-local, and
/// IPv4-mapped addresses in the same ranges.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(&mapped);
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7 unique local
                || (v6.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10 link-local
        }
    }
}

fn is_private_v4(v4: &Ipv4Addr) -> bool {
    let octets = v4.octets();
    v4.is_private()
        || v4.is_loopback()
        || v4.is_link_local()
        || v4.is_broadcast()
        || v4.is_unspecified()
        || octets[0] == 0 // 0.0.0.0/8 "this network"
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64) // 100.64.0.0/10 CGNAT
}

/// Validate a URL against the fetch policy, resolving DNS as needed.
///
/// Returns the parsed URL on success so the caller issues the request
/// against exactly what was checked.
pub async fn check_url(raw: &str, policy: &UrlPolicy) -> Result<Url, CoreclawError> {
    let url = Url::parse(raw)
        .map_err(|e| CoreclawError::PolicyDenied(format!("invalid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CoreclawError::PolicyDenied(format!(
                "scheme {other:?} is not allowed, use http or https"
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| CoreclawError::PolicyDenied("URL has no host".to_string()))?
        .to_ascii_lowercase();

    if host == "localhost" || host.ends_with(".localhost") {
        return Err(CoreclawError::PolicyDenied(
            "localhost is not allowed".to_string(),
        ));
    }

    let port = url
        .port_or_known_default()
        .ok_or_else(|| CoreclawError::PolicyDenied("URL has no usable port".to_string()))?;

    if policy.blocked_ports.contains(&port) {
        return Err(CoreclawError::PolicyDenied(format!(
            "port {port} is blocked"
        )));
    }
    if !policy.allowed_ports.is_empty() && !policy.allowed_ports.contains(&port) {
        return Err(CoreclawError::PolicyDenied(format!(
            "port {port} is not in the allowed port list"
        )));
    }

    if !policy.allowed_domains.is_empty() && !domain_allowed(&host, &policy.allowed_domains) {
        return Err(CoreclawError::PolicyDenied(format!(
            "host {host:?} is not in the allowed domain list"
        )));
    }

    // Literal IPs are checked directly; hostnames are resolved and every
    // returned address must be public.
    if let Ok(ip) = host.trim_matches(['[', ']']).parse::<IpAddr>() {
        if is_private_ip(&ip) {
            warn!(%ip, url = raw, "fetch blocked: literal private IP");
            return Err(CoreclawError::PolicyDenied(format!(
                "address {ip} is in a private range"
            )));
        }
    } else {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| {
                CoreclawError::PolicyDenied(format!("failed to resolve {host}: {e}"))
            })?
            .collect();
        if addrs.is_empty() {
            return Err(CoreclawError::PolicyDenied(format!(
                "{host} did not resolve to any address"
            )));
        }
        for addr in &addrs {
            if is_private_ip(&addr.ip()) {
                warn!(ip = %addr.ip(), url = raw, "fetch blocked: resolved to private IP");
                return Err(CoreclawError::PolicyDenied(format!(
                    "{host} resolves to private address {}",
                    addr.ip()
                )));
            }
        }
    }

    Ok(url)
}

fn domain_allowed(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|entry| {
        let entry = entry.to_ascii_lowercase();
        host == entry || host.ends_with(&format!(".{entry}"))
    })
}
