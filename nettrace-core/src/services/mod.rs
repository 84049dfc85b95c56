//! Protocol drivers behind [`NetTraceClient`](crate::NetTraceClient).
//!
//! Each driver is a set of free functions taking its collaborators explicitly;
//! the client only wires configuration, the global semaphore and backends.

pub(crate) mod dns;
pub mod icmp;
pub(crate) mod ping;
pub(crate) mod resolver;
pub(crate) mod ssl;
pub(crate) mod traceroute;
pub mod whois;

use std::net::IpAddr;

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::retry::RetryPolicy;

const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Validate and normalise a domain name or IP address input.
///
/// Trims whitespace, passes through valid IP addresses unchanged, converts
/// internationalised domain names (IDN) to ASCII via IDNA 2008, and enforces
/// label rules: 1-63 octets, no leading or trailing hyphen, at least two labels,
/// at most 253 octets overall. Failures carry `code` as a validation error.
pub(crate) fn validate_domain(domain: &str, code: ErrorCode) -> NetTraceResult<String> {
    normalise_name(domain, code, 2)
}

/// Like [`validate_domain`] but accepts single-label names such as `localhost`.
pub(crate) fn validate_host(host: &str, code: ErrorCode) -> NetTraceResult<String> {
    normalise_name(host, code, 1)
}

fn normalise_name(domain: &str, code: ErrorCode, min_labels: usize) -> NetTraceResult<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(NetTraceError::validation(code, "Domain name is required"));
    }
    // If it's a valid IP address, pass through without IDNA processing.
    if domain.parse::<IpAddr>().is_ok() {
        return Ok(domain.to_string());
    }

    let invalid = |reason: &str| {
        NetTraceError::validation(code, format!("Invalid domain name: {domain} ({reason})"))
            .with_context("query", domain)
    };

    let fqdn = domain.strip_suffix('.').unwrap_or(domain);
    // IDNA processing: converts Unicode labels to Punycode and validates.
    let ascii_domain =
        idna::domain_to_ascii_strict(fqdn).map_err(|_| invalid("not a valid host name"))?;

    if ascii_domain.len() > MAX_DOMAIN_LEN {
        return Err(NetTraceError::validation(
            code,
            format!(
                "Domain name exceeds maximum length of {MAX_DOMAIN_LEN} characters (got {})",
                ascii_domain.len()
            ),
        ));
    }

    let labels: Vec<&str> = ascii_domain.split('.').collect();
    if labels.len() < min_labels {
        return Err(invalid("at least two labels required"));
    }
    for label in labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(invalid("labels must be 1-63 characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels must not start or end with a hyphen"));
        }
    }
    Ok(ascii_domain)
}

/// Resolve `host` to a single address of the requested family.
///
/// IP literals short-circuit; names go through the system resolver under `policy`.
pub(crate) async fn resolve_host(
    cancel: &CancellationToken,
    policy: RetryPolicy,
    host: &str,
    ipv6: bool,
) -> NetTraceResult<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let family = if ipv6 { "IPv6" } else { "IPv4" };
    let ip = policy
        .run(cancel, "host resolution", |_| async move {
            let addrs = tokio::net::lookup_host((host, 0)).await.map_err(|e| {
                NetTraceError::network(
                    ErrorCode::HostResolutionFailed,
                    format!("Failed to resolve {host}: {e}"),
                )
                .with_context("host", host)
                .with_source(e)
            })?;
            addrs
                .map(|addr| addr.ip())
                .find(|ip| ip.is_ipv6() == ipv6)
                .ok_or_else(|| {
                    NetTraceError::network(
                        ErrorCode::HostResolutionFailed,
                        format!("No {family} address found for {host}"),
                    )
                    .with_context("host", host)
                })
        })
        .await?;

    debug!("Resolved {host} to {ip}");
    Ok(ip)
}
