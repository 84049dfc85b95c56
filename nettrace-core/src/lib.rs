//! Network diagnostics engine.
//!
//! Ping, traceroute, DNS, WHOIS and TLS certificate checks behind one async
//! [`NetworkClient`], plus a [`ToolRegistry`] of [`DiagnosticTool`]s that turn
//! typed [`Parameters`] into exportable [`DiagnosticResult`]s.
//!
//! Every operation takes a [`CancellationToken`](tokio_util::sync::CancellationToken),
//! runs under the client's global concurrency limit and retries transient
//! failures according to its [`RetryPolicy`].

mod client;
mod config;
mod error;
mod limiter;
mod params;
mod result;
mod retry;
mod services;
mod tools;
mod types;
mod utils;

pub use client::{NetTraceClient, NetTraceClientBuilder, NetworkClient};
pub use config::{
    DEFAULT_DNS_CONCURRENCY, DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_HOPS, DEFAULT_PACKET_SIZE,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT, NetworkConfig,
};
pub use error::{ErrorCode, ErrorKind, NetTraceError, NetTraceResult};
pub use limiter::ConcurrencyLimiter;
pub use params::{
    DEFAULT_SSL_PORT, DnsParameters, Parameters, PingParameters, SslParameters, TraceParameters,
    WhoisParameters,
};
pub use result::{DiagnosticResult, ExportFormat, ResultData, ResultFormatter, TextFormatter};
pub use retry::RetryPolicy;
pub use services::dns::{DnsAnswer, DnsBackend, HickoryBackend};
pub use services::icmp::{IcmpProber, ProbeReply, ProbeRequest, SystemProber};
pub use services::ssl::analysis::{
    EXPIRY_WARNING_DAYS, analyze as analyze_certificate, recommendations, security_level,
};
pub use services::whois::{MAX_REFERRALS, TcpWhoisTransport, WHOIS_PORT, WhoisTransport};
pub use tools::{
    DiagnosticTool, DnsTool, PingTool, SslTool, ToolRegistry, TracerouteTool, WhoisTool,
};
pub use types::{
    CertificateInfo, Contact, ContactRole, DnsRecord, DnsRecordType, DnsResult, GeoLocation,
    KeyAlgorithm, MAX_PACKET_SIZE, NetworkHost, PingOptions, PingReport, PingResult,
    PingStatistics, ProbeError, PublicKeyInfo, SecurityLevel, SslReport, SslResult, TraceHop,
    TraceOptions, TraceReport, WhoisResult,
};
