//! Tool output and its export formats.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::types::{DnsResult, PingReport, SslReport, TraceReport, WhoisResult};
use crate::utils::duration_ms::to_millis;

/// Payload of a tool run, one variant per tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "data", rename_all = "lowercase")]
pub enum ResultData {
    Ping(PingReport),
    Traceroute(TraceReport),
    Dns(DnsResult),
    Whois(WhoisResult),
    Ssl(SslReport),
}

impl ResultData {
    pub const fn tool_name(&self) -> &'static str {
        match self {
            Self::Ping(_) => "ping",
            Self::Traceroute(_) => "traceroute",
            Self::Dns(_) => "dns",
            Self::Whois(_) => "whois",
            Self::Ssl(_) => "ssl",
        }
    }
}

/// Output of [`DiagnosticTool::execute`](crate::tools::DiagnosticTool::execute).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticResult {
    #[serde(flatten)]
    pub data: ResultData,
    /// Free-form run information (target, start time, duration, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Export encodings supported by [`DiagnosticResult::export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Text,
}

impl FromStr for ExportFormat {
    type Err = NetTraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "text" | "txt" => Ok(Self::Text),
            other => Err(NetTraceError::validation(
                ErrorCode::InvalidParameter,
                format!("Unknown export format: {other}"),
            )),
        }
    }
}

/// Renders a result for display.
pub trait ResultFormatter: Send + Sync {
    fn format(&self, result: &DiagnosticResult) -> String;
}

impl DiagnosticResult {
    pub fn new(data: ResultData) -> Self {
        Self {
            data,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub const fn tool_name(&self) -> &'static str {
        self.data.tool_name()
    }

    pub fn format(&self, formatter: &dyn ResultFormatter) -> String {
        formatter.format(self)
    }

    /// Encode the result. JSON is lossless and parses back into an equal value.
    pub fn export(&self, format: ExportFormat) -> NetTraceResult<Vec<u8>> {
        match format {
            ExportFormat::Json => serde_json::to_vec_pretty(self).map_err(|e| {
                NetTraceError::export(format!("JSON export failed: {e}")).with_source(e)
            }),
            ExportFormat::Csv => self.to_csv(),
            ExportFormat::Text => Ok(self.format(&TextFormatter).into_bytes()),
        }
    }

    fn to_csv(&self) -> NetTraceResult<Vec<u8>> {
        let (header, rows) = csv_rows(&self.data);
        let mut writer = csv::Writer::from_writer(Vec::new());
        let failed = |e: csv::Error| {
            NetTraceError::export(format!("CSV export failed: {e}")).with_source(e)
        };
        writer.write_record(header).map_err(failed)?;
        for row in rows {
            writer.write_record(&row).map_err(failed)?;
        }
        writer
            .into_inner()
            .map_err(|e| NetTraceError::export(format!("CSV export failed: {e}")))
    }
}

fn ms(d: Duration) -> String {
    format!("{:.3}", to_millis(d))
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

const PING_HEADER: &[&str] = &[
    "sequence", "host", "ip", "rttMs", "ttl", "size", "timestamp", "error",
];
const TRACE_HEADER: &[&str] = &["hop", "address", "rttsMs", "timeout", "reached"];
const DNS_HEADER: &[&str] = &["section", "name", "type", "ttl", "priority", "value"];
const FIELD_HEADER: &[&str] = &["field", "value"];

/// Header plus one row per natural record of each result type.
fn csv_rows(data: &ResultData) -> (&'static [&'static str], Vec<Vec<String>>) {
    match data {
        ResultData::Ping(report) => (
            PING_HEADER,
            report
                .results
                .iter()
                .map(|r| {
                    vec![
                        r.sequence.to_string(),
                        r.host.hostname.clone(),
                        r.host.ip.to_string(),
                        opt(r.rtt.map(ms)),
                        opt(r.ttl),
                        r.size.to_string(),
                        r.timestamp.to_rfc3339(),
                        opt(r.error.as_ref()),
                    ]
                })
                .collect(),
        ),
        ResultData::Traceroute(report) => (
            TRACE_HEADER,
            report
                .hops
                .iter()
                .map(|h| {
                    let rtts = h
                        .rtts
                        .iter()
                        .map(|rtt| rtt.map_or_else(|| "*".to_string(), ms))
                        .collect::<Vec<_>>()
                        .join(";");
                    vec![
                        h.hop.to_string(),
                        opt(h.address),
                        rtts,
                        h.timeout.to_string(),
                        h.reached.to_string(),
                    ]
                })
                .collect(),
        ),
        ResultData::Dns(result) => {
            let sections = [
                ("answer", &result.records),
                ("authority", &result.authority),
                ("additional", &result.additional),
            ];
            (
                DNS_HEADER,
                sections
                    .iter()
                    .flat_map(|(section, records)| {
                        records.iter().map(move |r| {
                            vec![
                                (*section).to_string(),
                                r.name.clone(),
                                r.record_type.to_string(),
                                r.ttl.to_string(),
                                opt(r.priority),
                                r.value.clone(),
                            ]
                        })
                    })
                    .collect(),
            )
        }
        ResultData::Whois(result) => {
            let mut rows = vec![
                field("domain", &result.domain),
                field("registrar", &opt(result.registrar.as_ref())),
                field("created", &opt(result.created.map(|d| d.to_rfc3339()))),
                field("updated", &opt(result.updated.map(|d| d.to_rfc3339()))),
                field("expires", &opt(result.expires.map(|d| d.to_rfc3339()))),
            ];
            rows.extend(result.name_servers.iter().map(|ns| field("nameServer", ns)));
            rows.extend(result.status.iter().map(|s| field("status", s)));
            for (role, contact) in &result.contacts {
                let parts = [
                    ("name", &contact.name),
                    ("organization", &contact.organization),
                    ("email", &contact.email),
                    ("phone", &contact.phone),
                    ("address", &contact.address),
                ];
                for (key, value) in parts {
                    if let Some(value) = value {
                        rows.push(field(&format!("{role}.{key}"), value));
                    }
                }
            }
            rows.push(field("server", &result.server));
            rows.push(field("referralChain", &result.referral_chain.join(" -> ")));
            (FIELD_HEADER, rows)
        }
        ResultData::Ssl(report) => {
            let r = &report.result;
            let mut rows = vec![
                field("host", &r.host),
                field("port", &r.port.to_string()),
                field("valid", &r.valid.to_string()),
                field("securityLevel", &report.security_level.to_string()),
                field("subject", &r.subject),
                field("issuer", &r.issuer),
                field("expires", &opt(r.expires.map(|d| d.to_rfc3339()))),
                field("daysUntilExpiry", &r.days_until_expiry.to_string()),
                field("protocolVersion", &opt(r.protocol_version.as_ref())),
                field("cipherSuite", &opt(r.cipher_suite.as_ref())),
                field("chainLength", &r.chain.len().to_string()),
            ];
            rows.extend(r.sans.iter().map(|san| field("san", san)));
            rows.extend(r.errors.iter().map(|e| field("error", e)));
            rows.extend(
                report
                    .recommendations
                    .iter()
                    .map(|rec| field("recommendation", rec)),
            );
            (FIELD_HEADER, rows)
        }
    }
}

fn field(name: &str, value: &str) -> Vec<String> {
    vec![name.to_string(), value.to_string()]
}

/// Plain-text rendering modelled on the classic command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl ResultFormatter for TextFormatter {
    fn format(&self, result: &DiagnosticResult) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = match &result.data {
            ResultData::Ping(report) => write_ping(&mut out, report),
            ResultData::Traceroute(report) => write_trace(&mut out, report),
            ResultData::Dns(dns) => write_dns(&mut out, dns),
            ResultData::Whois(whois) => write_whois(&mut out, whois),
            ResultData::Ssl(report) => write_ssl(&mut out, report),
        };
        out
    }
}

fn write_ping(out: &mut String, report: &PingReport) -> std::fmt::Result {
    if let Some(first) = report.results.first() {
        writeln!(
            out,
            "PING {} ({}): {} data bytes",
            report.host, first.host.ip, first.size
        )?;
    } else {
        writeln!(out, "PING {}", report.host)?;
    }
    for r in &report.results {
        match (&r.error, r.rtt) {
            (None, Some(rtt)) => writeln!(
                out,
                "{} bytes from {}: icmp_seq={} ttl={} time={} ms",
                r.size,
                r.host.ip,
                r.sequence,
                opt(r.ttl),
                ms(rtt)
            )?,
            (Some(e), _) if e.is_timeout() => {
                writeln!(out, "Request timeout for icmp_seq {}", r.sequence)?;
            }
            (Some(e), _) => writeln!(out, "icmp_seq {}: {e}", r.sequence)?,
            (None, None) => writeln!(out, "icmp_seq {}: no reply", r.sequence)?,
        }
    }

    let s = &report.statistics;
    writeln!(out, "--- {} ping statistics ---", report.host)?;
    writeln!(
        out,
        "{} packets transmitted, {} packets received, {:.1}% packet loss",
        s.sent, s.received, s.loss_percent
    )?;
    if let (Some(min), Some(avg), Some(max)) = (s.min_rtt, s.avg_rtt, s.max_rtt) {
        writeln!(
            out,
            "round-trip min/avg/max = {}/{}/{} ms",
            ms(min),
            ms(avg),
            ms(max)
        )?;
    }
    Ok(())
}

fn write_trace(out: &mut String, report: &TraceReport) -> std::fmt::Result {
    match report.destination {
        Some(ip) => writeln!(out, "traceroute to {} ({ip})", report.host)?,
        None => writeln!(out, "traceroute to {}", report.host)?,
    }
    for hop in &report.hops {
        write!(out, "{:>2}  ", hop.hop)?;
        match hop.address {
            Some(addr) => write!(out, "{addr}")?,
            None => write!(out, "*")?,
        }
        for rtt in &hop.rtts {
            match rtt {
                Some(rtt) => write!(out, "  {} ms", ms(*rtt))?,
                None => write!(out, "  *")?,
            }
        }
        writeln!(out)?;
    }
    if !report.destination_reached {
        writeln!(out, "destination not reached")?;
    }
    Ok(())
}

fn write_dns(out: &mut String, dns: &DnsResult) -> std::fmt::Result {
    let types = dns
        .queried_types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(
        out,
        ";; {} [{types}] via {} in {} ms",
        dns.domain,
        dns.server,
        ms(dns.response_time)
    )?;
    for (title, records) in [
        ("ANSWER", &dns.records),
        ("AUTHORITY", &dns.authority),
        ("ADDITIONAL", &dns.additional),
    ] {
        if records.is_empty() {
            continue;
        }
        writeln!(out, ";; {title} SECTION:")?;
        for r in records {
            writeln!(
                out,
                "{}\t{}\tIN\t{}\t{}",
                r.name, r.ttl, r.record_type, r.value
            )?;
        }
    }
    Ok(())
}

fn write_whois(out: &mut String, whois: &WhoisResult) -> std::fmt::Result {
    writeln!(out, "Domain: {}", whois.domain)?;
    if let Some(registrar) = &whois.registrar {
        writeln!(out, "Registrar: {registrar}")?;
    }
    for (label, date) in [
        ("Created", whois.created),
        ("Updated", whois.updated),
        ("Expires", whois.expires),
    ] {
        if let Some(date) = date {
            writeln!(out, "{label}: {}", date.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
    }
    for ns in &whois.name_servers {
        writeln!(out, "Name server: {ns}")?;
    }
    for status in &whois.status {
        writeln!(out, "Status: {status}")?;
    }
    for (role, contact) in &whois.contacts {
        let details = [
            &contact.name,
            &contact.organization,
            &contact.email,
            &contact.phone,
            &contact.address,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
        writeln!(out, "Contact ({role}): {details}")?;
    }
    writeln!(out, "Server: {}", whois.server)?;
    if whois.referral_chain.len() > 1 {
        writeln!(out, "Referrals: {}", whois.referral_chain.join(" -> "))?;
    }
    Ok(())
}

fn write_ssl(out: &mut String, report: &SslReport) -> std::fmt::Result {
    let r = &report.result;
    writeln!(out, "Host: {}:{}", r.host, r.port)?;
    writeln!(out, "Security level: {}", report.security_level)?;
    writeln!(out, "Valid: {}", if r.valid { "yes" } else { "no" })?;
    writeln!(out, "Subject: {}", r.subject)?;
    writeln!(out, "Issuer: {}", r.issuer)?;
    if let Some(expires) = r.expires {
        writeln!(
            out,
            "Expires: {} ({} days)",
            expires.format("%Y-%m-%d %H:%M:%S UTC"),
            r.days_until_expiry
        )?;
    }
    if !r.sans.is_empty() {
        writeln!(out, "SANs: {}", r.sans.join(", "))?;
    }
    if let Some(protocol) = &r.protocol_version {
        write!(out, "Protocol: {protocol}")?;
        if let Some(cipher) = &r.cipher_suite {
            write!(out, " ({cipher})")?;
        }
        writeln!(out)?;
    }
    writeln!(out, "Chain length: {}", r.chain.len())?;
    if !r.errors.is_empty() {
        writeln!(out, "Findings:")?;
        for e in &r.errors {
            writeln!(out, "  - {e}")?;
        }
    }
    writeln!(out, "Recommendations:")?;
    for rec in &report.recommendations {
        writeln!(out, "  - {rec}")?;
    }
    Ok(())
}
