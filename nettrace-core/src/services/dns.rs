//! DNS lookups, single type or fanned out across several.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hickory_resolver::{
    ResolveError, TokioResolver,
    proto::{
        ProtoErrorKind,
        rr::{Record, RecordType, record_data::RData, rdata::SOA},
    },
};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::resolver::{build_resolver, server_label};
use super::validate_domain;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::limiter::ConcurrencyLimiter;
use crate::retry::RetryPolicy;
use crate::types::{DnsRecord, DnsRecordType, DnsResult};
use crate::utils::net::reverse_name;

/// Records returned by one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsAnswer {
    /// Answer section, in server order. May hold other types (CNAME chains).
    pub answers: Vec<DnsRecord>,
    /// Authority section (the zone SOA for an empty answer).
    pub authority: Vec<DnsRecord>,
}

/// One-shot DNS query transport.
///
/// The driver adds validation, retries and result shaping on top.
#[async_trait]
pub trait DnsBackend: Send + Sync {
    async fn query(&self, name: &str, record_type: DnsRecordType) -> NetTraceResult<DnsAnswer>;

    /// Label for the servers queried, reported in [`DnsResult::server`].
    fn server(&self) -> String;
}

/// [`DnsBackend`] over `hickory-resolver`.
pub struct HickoryBackend {
    resolver: TokioResolver,
    server: String,
}

impl HickoryBackend {
    /// Query `servers` on port 53, or the system configuration when empty.
    pub fn new(servers: &[IpAddr], timeout: Duration) -> Self {
        Self {
            resolver: build_resolver(servers, timeout),
            server: server_label(servers),
        }
    }
}

#[async_trait]
impl DnsBackend for HickoryBackend {
    async fn query(&self, name: &str, record_type: DnsRecordType) -> NetTraceResult<DnsAnswer> {
        match self.resolver.lookup(name, to_hickory(record_type)).await {
            Ok(lookup) => Ok(DnsAnswer {
                answers: lookup.record_iter().filter_map(convert_record).collect(),
                authority: Vec::new(),
            }),
            // NODATA is an answer, not a failure; NXDOMAIN is a failure.
            Err(e) if e.is_no_records_found() && !e.is_nx_domain() => Ok(DnsAnswer {
                answers: Vec::new(),
                authority: negative_authority(&e),
            }),
            Err(e) => Err(NetTraceError::network(
                ErrorCode::DnsLookupFailed,
                format!("{record_type} lookup for {name} failed: {e}"),
            )
            .with_context("query", name)
            .with_context("record_type", record_type)
            .with_context("server", &self.server)
            .with_source(e)),
        }
    }

    fn server(&self) -> String {
        self.server.clone()
    }
}

const fn to_hickory(record_type: DnsRecordType) -> RecordType {
    match record_type {
        DnsRecordType::A => RecordType::A,
        DnsRecordType::Aaaa => RecordType::AAAA,
        DnsRecordType::Mx => RecordType::MX,
        DnsRecordType::Txt => RecordType::TXT,
        DnsRecordType::Cname => RecordType::CNAME,
        DnsRecordType::Ns => RecordType::NS,
        DnsRecordType::Soa => RecordType::SOA,
        DnsRecordType::Ptr => RecordType::PTR,
        DnsRecordType::Srv => RecordType::SRV,
        DnsRecordType::Caa => RecordType::CAA,
    }
}

fn trim_dot(name: &impl ToString) -> String {
    name.to_string().trim_end_matches('.').to_string()
}

fn format_soa(soa: &SOA) -> String {
    format!(
        "{} {} {} {} {} {} {}",
        trim_dot(soa.mname()),
        trim_dot(soa.rname()),
        soa.serial(),
        soa.refresh(),
        soa.retry(),
        soa.expire(),
        soa.minimum()
    )
}

/// Convert a hickory record; unsupported types are dropped.
fn convert_record(record: &Record) -> Option<DnsRecord> {
    let (record_type, value, priority) = match record.data() {
        RData::A(a) => (DnsRecordType::A, a.0.to_string(), None),
        RData::AAAA(aaaa) => (DnsRecordType::Aaaa, aaaa.0.to_string(), None),
        RData::MX(mx) => (
            DnsRecordType::Mx,
            trim_dot(mx.exchange()),
            Some(mx.preference()),
        ),
        RData::TXT(txt) => (
            DnsRecordType::Txt,
            txt.iter()
                .map(|data| String::from_utf8_lossy(data).to_string())
                .collect::<String>(),
            None,
        ),
        RData::CNAME(cname) => (DnsRecordType::Cname, trim_dot(&cname.0), None),
        RData::NS(ns) => (DnsRecordType::Ns, trim_dot(&ns.0), None),
        RData::SOA(soa) => (DnsRecordType::Soa, format_soa(soa), None),
        RData::PTR(ptr) => (DnsRecordType::Ptr, trim_dot(&ptr.0), None),
        RData::SRV(srv) => (
            DnsRecordType::Srv,
            format!("{} {} {}", srv.weight(), srv.port(), trim_dot(srv.target())),
            Some(srv.priority()),
        ),
        RData::CAA(caa) => (
            DnsRecordType::Caa,
            format!(
                "{} {} \"{}\"",
                if caa.issuer_critical() { 128 } else { 0 },
                caa.tag().as_str(),
                String::from_utf8_lossy(caa.raw_value())
            ),
            None,
        ),
        other => {
            debug!("[DNS] Skipping unsupported record data: {other:?}");
            return None;
        }
    };

    Some(DnsRecord {
        name: trim_dot(record.name()),
        record_type,
        value,
        ttl: record.ttl(),
        priority,
    })
}

/// SOA carried by a negative response, as an authority record.
fn negative_authority(err: &ResolveError) -> Vec<DnsRecord> {
    let Some(proto) = err.proto() else {
        return Vec::new();
    };
    match proto.kind() {
        ProtoErrorKind::NoRecordsFound { soa: Some(soa), .. } => vec![DnsRecord {
            name: trim_dot(soa.name()),
            record_type: DnsRecordType::Soa,
            value: format_soa(soa.data()),
            ttl: soa.ttl(),
            priority: None,
        }],
        _ => Vec::new(),
    }
}

/// Name actually sent for a query: PTR lookups of IP literals use the reverse zone.
fn query_name(domain: &str, record_type: DnsRecordType) -> String {
    match (record_type, domain.parse::<IpAddr>()) {
        (DnsRecordType::Ptr, Ok(ip)) => reverse_name(ip),
        _ => domain.to_string(),
    }
}

/// Look up one record type for `domain`.
pub(crate) async fn lookup(
    backend: &dyn DnsBackend,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    domain: &str,
    record_type: DnsRecordType,
) -> NetTraceResult<DnsResult> {
    let domain = validate_domain(domain, ErrorCode::DnsValidationFailed)?;
    query_one(backend, policy, cancel, &domain, record_type).await
}

/// Look up several record types through `limiter`, one task per type.
///
/// Succeeds when at least one type answered; the result merges every successful
/// type. When all fail, the first error encountered is returned. An empty
/// `record_types` means [`DnsRecordType::DEFAULT_SET`].
pub(crate) async fn lookup_many(
    backend: Arc<dyn DnsBackend>,
    limiter: &ConcurrencyLimiter,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    domain: &str,
    record_types: &[DnsRecordType],
) -> NetTraceResult<DnsResult> {
    let domain = validate_domain(domain, ErrorCode::DnsValidationFailed)?;

    let mut types = if record_types.is_empty() {
        DnsRecordType::default_set()
    } else {
        record_types.to_vec()
    };
    types.sort_unstable();
    types.dedup();

    debug!(
        "[DNS] Querying {} record types for {} ({} in flight)",
        types.len(),
        domain,
        limiter.width()
    );

    let outcomes = limiter
        .fan_out(types, |record_type| {
            let backend = backend.clone();
            let cancel = cancel.clone();
            let domain = domain.clone();
            async move { query_one(backend.as_ref(), policy, &cancel, &domain, record_type).await }
        })
        .await;

    if cancel.is_cancelled() {
        return Err(NetTraceError::cancelled("DNS lookup"));
    }

    let mut successes = Vec::new();
    let mut first_error = None;
    for (record_type, outcome) in outcomes {
        match outcome {
            Ok(result) => successes.push(result),
            Err(e) => {
                warn!("[DNS] {record_type} lookup for {domain} failed, dropping: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    match DnsResult::consolidate(&domain, successes) {
        Some(result) => Ok(result),
        None => Err(first_error.unwrap_or_else(|| {
            NetTraceError::network(
                ErrorCode::DnsLookupFailed,
                format!("No record type could be resolved for {domain}"),
            )
            .with_context("query", &domain)
        })),
    }
}

async fn query_one(
    backend: &dyn DnsBackend,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    domain: &str,
    record_type: DnsRecordType,
) -> NetTraceResult<DnsResult> {
    let name = query_name(domain, record_type);
    let started = Instant::now();
    let answer = policy
        .run(cancel, "DNS lookup", |_| backend.query(&name, record_type))
        .await
        .map_err(|e| {
            e.with_code(ErrorCode::DnsLookupFailed)
                .with_context("query", &name)
                .with_context("record_type", record_type)
        })?;
    let response_time = started.elapsed();

    let (records, additional): (Vec<_>, Vec<_>) = answer
        .answers
        .into_iter()
        .partition(|r| r.record_type == record_type);

    debug!(
        "[DNS] {} {}: {} records in {:?}",
        record_type,
        name,
        records.len(),
        response_time
    );

    Ok(DnsResult {
        domain: domain.to_string(),
        records,
        authority: answer.authority,
        additional,
        response_time,
        server: backend.server(),
        queried_types: vec![record_type],
    })
}
