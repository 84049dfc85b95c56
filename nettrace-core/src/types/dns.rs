use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// DNS record type for lookup operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
    /// Mail exchange record.
    Mx,
    /// Text record.
    Txt,
    /// Canonical name (alias) record.
    Cname,
    /// Name server record.
    Ns,
    /// Start of authority record.
    Soa,
    /// Pointer record (reverse DNS).
    Ptr,
    /// Service locator record.
    Srv,
    /// Certificate Authority Authorization record.
    Caa,
}

impl DnsRecordType {
    /// Types queried when the caller asks for none in particular.
    pub const DEFAULT_SET: [Self; 6] = [
        Self::A,
        Self::Aaaa,
        Self::Mx,
        Self::Txt,
        Self::Cname,
        Self::Ns,
    ];

    pub fn default_set() -> Vec<Self> {
        Self::DEFAULT_SET.to_vec()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Cname => "CNAME",
            Self::Ns => "NS",
            Self::Soa => "SOA",
            Self::Ptr => "PTR",
            Self::Srv => "SRV",
            Self::Caa => "CAA",
        }
    }
}

impl fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DnsRecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "MX" => Ok(Self::Mx),
            "TXT" => Ok(Self::Txt),
            "CNAME" => Ok(Self::Cname),
            "NS" => Ok(Self::Ns),
            "SOA" => Ok(Self::Soa),
            "PTR" => Ok(Self::Ptr),
            "SRV" => Ok(Self::Srv),
            "CAA" => Ok(Self::Caa),
            _ => Err(format!("Unsupported DNS record type: {s}")),
        }
    }
}

/// A single DNS record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    /// Record name (owner).
    pub name: String,
    pub record_type: DnsRecordType,
    /// Record value / rdata.
    ///
    /// Notes:
    /// - For `NS`, `CNAME`, `MX`, `SRV`, `SOA`, and `PTR` records, trailing dots are removed from
    ///   domain names.
    /// - For some record types the value is returned in a human-readable, space-separated form:
    ///   - `SOA`: `mname rname serial refresh retry expire minimum`
    ///   - `SRV`: `weight port target`
    ///   - `CAA`: `flags tag "value"`
    pub value: String,
    /// Time-to-live in seconds.
    pub ttl: u32,
    /// Priority (MX / SRV records only).
    pub priority: Option<u16>,
}

/// Result of a DNS lookup for one or more record types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsResult {
    /// Queried name.
    pub domain: String,
    /// Answer records of the queried type(s).
    pub records: Vec<DnsRecord>,
    pub authority: Vec<DnsRecord>,
    /// Other answer-section records (e.g. the CNAME chain behind an `A` answer).
    pub additional: Vec<DnsRecord>,
    /// Query time; the mean over successful types for a multi-type lookup.
    #[serde(with = "crate::utils::duration_ms")]
    pub response_time: Duration,
    /// DNS resolver used for this query.
    ///
    /// When custom nameservers are configured this lists them. Otherwise, this is a
    /// best-effort, human-readable label for the system DNS configuration.
    pub server: String,
    /// Record types that answered successfully.
    pub queried_types: Vec<DnsRecordType>,
}

impl DnsResult {
    /// Merge per-type results: sections are concatenated and the response time averaged.
    ///
    /// Returns `None` for an empty input.
    pub fn consolidate(domain: &str, results: Vec<Self>) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        // usize -> u32: one entry per record type
        #[allow(clippy::cast_possible_truncation)]
        let n = results.len() as u32;
        let total: Duration = results.iter().map(|r| r.response_time).sum();

        let mut merged = Self {
            domain: domain.to_string(),
            records: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            response_time: total / n,
            server: String::new(),
            queried_types: Vec::new(),
        };
        for result in results {
            if merged.server.is_empty() {
                merged.server = result.server;
            }
            merged.records.extend(result.records);
            merged.authority.extend(result.authority);
            merged.additional.extend(result.additional);
            merged.queried_types.extend(result.queried_types);
        }
        merged.queried_types.sort_unstable();
        merged.queried_types.dedup();
        Some(merged)
    }
}
