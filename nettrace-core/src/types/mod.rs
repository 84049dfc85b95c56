//! Public types returned by diagnostic operations.
//!
//! Every value here is created once by a driver and never mutated afterwards;
//! all of them are plain data and safe to move across tasks.

mod dns;
mod host;
mod ping;
mod ssl;
mod trace;
mod whois;

pub use dns::{DnsRecord, DnsRecordType, DnsResult};
pub use host::{GeoLocation, NetworkHost};
pub use ping::{MAX_PACKET_SIZE, PingOptions, PingReport, PingResult, PingStatistics, ProbeError};
pub use ssl::{CertificateInfo, KeyAlgorithm, PublicKeyInfo, SecurityLevel, SslReport, SslResult};
pub use trace::{TraceHop, TraceOptions, TraceReport};
pub use whois::{Contact, ContactRole, WhoisResult};
