use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::NetworkHost;
use crate::config::{DEFAULT_PACKET_SIZE, DEFAULT_TIMEOUT};
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};

/// Largest ICMP payload accepted (fits an IPv4 datagram with headers).
pub const MAX_PACKET_SIZE: usize = 65_500;

const MAX_PING_COUNT: u32 = 10_000;
const MIN_INTERVAL: Duration = Duration::from_millis(10);
const MAX_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Caller-supplied ping settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PingOptions {
    /// Number of echo requests to send.
    pub count: u32,
    /// Delay between two consecutive requests.
    #[serde(with = "crate::utils::duration_ms")]
    pub interval: Duration,
    /// How long to wait for each reply.
    #[serde(with = "crate::utils::duration_ms")]
    pub timeout: Duration,
    /// ICMP payload size in bytes.
    pub packet_size: usize,
    /// Outgoing TTL / hop limit.
    pub ttl: u8,
    /// Resolve and ping over IPv6 instead of IPv4.
    pub ipv6: bool,
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            count: 4,
            interval: Duration::from_secs(1),
            timeout: DEFAULT_TIMEOUT,
            packet_size: DEFAULT_PACKET_SIZE,
            ttl: 64,
            ipv6: false,
        }
    }
}

impl PingOptions {
    pub fn validate(&self) -> NetTraceResult<()> {
        let invalid = |msg: String| NetTraceError::validation(ErrorCode::PingValidationFailed, msg);

        if self.count == 0 || self.count > MAX_PING_COUNT {
            return Err(invalid(format!(
                "count must be between 1 and {MAX_PING_COUNT} (got {})",
                self.count
            )));
        }
        if self.interval < MIN_INTERVAL {
            return Err(invalid(format!(
                "interval must be at least {}ms",
                MIN_INTERVAL.as_millis()
            )));
        }
        if self.timeout.is_zero() || self.timeout > MAX_PROBE_TIMEOUT {
            return Err(invalid(format!(
                "timeout must be between 1ms and {}s",
                MAX_PROBE_TIMEOUT.as_secs()
            )));
        }
        if self.packet_size > MAX_PACKET_SIZE {
            return Err(invalid(format!(
                "packet size must not exceed {MAX_PACKET_SIZE} bytes (got {})",
                self.packet_size
            )));
        }
        if self.ttl == 0 {
            return Err(invalid("ttl must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Why a single probe produced no reply.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "lowercase")]
pub enum ProbeError {
    /// No reply within the probe timeout.
    #[error("request timed out")]
    Timeout,
    /// An ICMP destination-unreachable came back.
    #[error("destination unreachable: {0}")]
    Unreachable(String),
    /// Local socket failure for this probe.
    #[error("socket error: {0}")]
    Io(String),
}

impl ProbeError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Outcome of one echo request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    pub host: NetworkHost,
    pub sequence: u16,
    /// Round-trip time; `None` when no reply arrived.
    #[serde(with = "crate::utils::duration_ms::option")]
    pub rtt: Option<Duration>,
    /// TTL of the reply packet, when the socket exposes it.
    pub ttl: Option<u8>,
    /// Payload bytes sent.
    pub size: usize,
    /// When the request was sent.
    pub timestamp: DateTime<Utc>,
    pub error: Option<ProbeError>,
}

impl PingResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.rtt.is_some()
    }
}

/// Summary over a collected ping stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingStatistics {
    pub sent: u32,
    pub received: u32,
    /// Percentage of requests without a reply (0-100).
    pub loss_percent: f64,
    #[serde(with = "crate::utils::duration_ms::option")]
    pub min_rtt: Option<Duration>,
    #[serde(with = "crate::utils::duration_ms::option")]
    pub avg_rtt: Option<Duration>,
    #[serde(with = "crate::utils::duration_ms::option")]
    pub max_rtt: Option<Duration>,
}

impl PingStatistics {
    pub fn from_results(results: &[PingResult]) -> Self {
        let rtts: Vec<Duration> = results
            .iter()
            .filter(|r| r.is_success())
            .filter_map(|r| r.rtt)
            .collect();

        // usize -> u32: a ping run is capped at MAX_PING_COUNT results
        #[allow(clippy::cast_possible_truncation)]
        let sent = results.len() as u32;
        #[allow(clippy::cast_possible_truncation)]
        let received = rtts.len() as u32;

        let loss_percent = if sent == 0 {
            0.0
        } else {
            f64::from(sent - received) / f64::from(sent) * 100.0
        };

        let avg_rtt = if rtts.is_empty() {
            None
        } else {
            Some(rtts.iter().sum::<Duration>() / received)
        };

        Self {
            sent,
            received,
            loss_percent,
            min_rtt: rtts.iter().min().copied(),
            avg_rtt,
            max_rtt: rtts.iter().max().copied(),
        }
    }
}

/// Collected ping run, as returned by the ping tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReport {
    /// Host as requested by the caller.
    pub host: String,
    pub results: Vec<PingResult>,
    pub statistics: PingStatistics,
}

impl PingReport {
    pub fn new(host: impl Into<String>, results: Vec<PingResult>) -> Self {
        let statistics = PingStatistics::from_results(&results);
        Self {
            host: host.into(),
            results,
            statistics,
        }
    }
}
