//! WHOIS lookup with server routing and referral chasing.

mod dates;
mod parser;
mod servers;

use std::net::IpAddr;
use std::sync::LazyLock;

use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use servers::{server_for_domain, server_for_ip};

use super::validate_domain;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::retry::RetryPolicy;
use crate::types::WhoisResult;

/// Referrals followed after the first server, at most.
pub const MAX_REFERRALS: usize = 3;
/// Well-known WHOIS TCP port.
pub const WHOIS_PORT: u16 = 43;
/// Responses are truncated beyond this many bytes.
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

/// Sends one WHOIS query to one server and returns the raw response text.
#[async_trait]
pub trait WhoisTransport: Send + Sync {
    async fn query(&self, server: &str, query: &str) -> NetTraceResult<String>;
}

/// Plain-text WHOIS over TCP port 43 (RFC 3912).
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpWhoisTransport;

#[async_trait]
impl WhoisTransport for TcpWhoisTransport {
    async fn query(&self, server: &str, query: &str) -> NetTraceResult<String> {
        let failed = |stage: &str, e: std::io::Error| {
            NetTraceError::network(
                ErrorCode::WhoisLookupFailed,
                format!("WHOIS {stage} {server} failed: {e}"),
            )
            .with_context("server", server)
            .with_context("query", query)
            .with_source(e)
        };

        let mut stream = TcpStream::connect((server, WHOIS_PORT))
            .await
            .map_err(|e| failed("connection to", e))?;
        stream
            .write_all(format!("{query}\r\n").as_bytes())
            .await
            .map_err(|e| failed("request to", e))?;

        let mut buf = Vec::new();
        stream
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| failed("response from", e))?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// A classified WHOIS query.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Query {
    Ip(IpAddr),
    Domain(String),
}

impl Query {
    fn classify(input: &str) -> NetTraceResult<Self> {
        let input = input.trim();
        if let Ok(ip) = input.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }
        validate_domain(input, ErrorCode::WhoisValidationFailed).map(Self::Domain)
    }

    fn text(&self) -> String {
        match self {
            Self::Ip(ip) => ip.to_string(),
            Self::Domain(domain) => domain.clone(),
        }
    }

    fn initial_server(&self) -> NetTraceResult<String> {
        match self {
            Self::Ip(ip) => Ok(server_for_ip(*ip).to_string()),
            Self::Domain(domain) => server_for_domain(domain)
                .map(str::to_string)
                .ok_or_else(|| {
                    let tld = domain.rsplit('.').next().unwrap_or(domain);
                    NetTraceError::validation(
                        ErrorCode::WhoisServerNotFound,
                        format!("No WHOIS server known for .{tld}"),
                    )
                    .with_context("query", domain)
                }),
        }
    }

    /// Server-specific request syntax.
    fn request_for(&self, server: &str) -> String {
        match (self, server) {
            (Self::Ip(ip), "whois.arin.net") => format!("n + {ip}"),
            (Self::Domain(domain), "whois.denic.de") => format!("-T dn,ace {domain}"),
            _ => self.text(),
        }
    }
}

static REFERRAL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:refer|whois|registrar whois server|whois server|referralserver)[ \t]*:[ \t]*(\S+)[ \t]*\r?$",
    )
    .ok()
});

/// Find the next server a response points to, if any.
///
/// `whois://host:port` forms are reduced to the host; web URLs and `rwhois://`
/// referrals are not followed.
fn find_referral(raw: &str) -> Option<String> {
    let re = REFERRAL_RE.as_ref()?;
    re.captures_iter(raw).find_map(|caps| {
        let value = caps.get(1)?.as_str().trim().to_ascii_lowercase();
        let host = value.strip_prefix("whois://").unwrap_or(&value);
        if host.contains("://") {
            return None;
        }
        let host = host.trim_end_matches('/');
        let host = host.split_once(':').map_or(host, |(h, _)| h);
        let host = host.trim_end_matches('.');
        (!host.is_empty() && host.contains('.')).then(|| host.to_string())
    })
}

/// Query WHOIS for a domain or IP, following referrals.
///
/// The parsed result comes from the last server that answered. A failing
/// referral degrades to the previous response.
pub(crate) async fn lookup(
    transport: &dyn WhoisTransport,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    input: &str,
) -> NetTraceResult<WhoisResult> {
    let query = Query::classify(input)?;
    let first_server = query.initial_server()?;
    info!("[WHOIS] Looking up {} via {}", query.text(), first_server);

    let mut raw = fetch(transport, policy, cancel, &query, &first_server).await?;
    let mut server = first_server;
    let mut chain = vec![server.clone()];

    for _ in 0..MAX_REFERRALS {
        let Some(next) = find_referral(&raw) else {
            break;
        };
        if chain.iter().any(|visited| visited.eq_ignore_ascii_case(&next)) {
            debug!("[WHOIS] Referral to {next} already visited, stopping");
            break;
        }
        debug!("[WHOIS] {server} refers to {next}");
        chain.push(next.clone());

        match fetch(transport, policy, cancel, &query, &next).await {
            Ok(response) => {
                raw = response;
                server = next;
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("[WHOIS] Referral to {next} failed, keeping response from {server}: {e}");
                break;
            }
        }
    }

    let mut result = parser::parse(&query.text(), &raw);
    result.server = server;
    result.referral_chain = chain;
    Ok(result)
}

async fn fetch(
    transport: &dyn WhoisTransport,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    query: &Query,
    server: &str,
) -> NetTraceResult<String> {
    let request = query.request_for(server);
    policy
        .run(cancel, "WHOIS query", |_| transport.query(server, &request))
        .await
        .map_err(|e| {
            e.with_code(ErrorCode::WhoisLookupFailed)
                .with_context("server", server)
                .with_context("query", query.text())
        })
}
