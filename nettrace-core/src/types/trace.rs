use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::MAX_PACKET_SIZE;
use crate::config::{DEFAULT_MAX_HOPS, DEFAULT_PACKET_SIZE};
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};

const MAX_QUERIES: u8 = 10;

/// Caller-supplied traceroute settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceOptions {
    /// Highest TTL probed (1-255).
    pub max_hops: u8,
    /// Per-probe wait.
    #[serde(with = "crate::utils::duration_ms")]
    pub timeout: Duration,
    /// Probes sent per hop.
    pub queries: u8,
    pub packet_size: usize,
    pub ipv6: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            timeout: Duration::from_secs(3),
            queries: 3,
            packet_size: DEFAULT_PACKET_SIZE,
            ipv6: false,
        }
    }
}

impl TraceOptions {
    pub fn validate(&self) -> NetTraceResult<()> {
        let invalid =
            |msg: String| NetTraceError::validation(ErrorCode::TracerouteValidationFailed, msg);

        if self.max_hops == 0 {
            return Err(invalid("max hops must be between 1 and 255".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout must be greater than zero".to_string()));
        }
        if self.queries == 0 || self.queries > MAX_QUERIES {
            return Err(invalid(format!(
                "queries per hop must be between 1 and {MAX_QUERIES} (got {})",
                self.queries
            )));
        }
        if self.packet_size > MAX_PACKET_SIZE {
            return Err(invalid(format!(
                "packet size must not exceed {MAX_PACKET_SIZE} bytes"
            )));
        }
        Ok(())
    }
}

/// One TTL step of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceHop {
    /// TTL used for this hop, starting at 1.
    pub hop: u8,
    /// First address that answered at this TTL.
    pub address: Option<IpAddr>,
    /// One slot per probe; `None` marks a probe that timed out.
    #[serde(with = "crate::utils::duration_ms::option_vec")]
    pub rtts: Vec<Option<Duration>>,
    /// No probe at this TTL got a reply.
    pub timeout: bool,
    /// The responder is the destination itself.
    pub reached: bool,
}

impl TraceHop {
    /// Mean over the probes that answered.
    pub fn avg_rtt(&self) -> Option<Duration> {
        let answered: Vec<Duration> = self.rtts.iter().flatten().copied().collect();
        if answered.is_empty() {
            return None;
        }
        // usize -> u32: bounded by MAX_QUERIES
        #[allow(clippy::cast_possible_truncation)]
        let n = answered.len() as u32;
        Some(answered.iter().sum::<Duration>() / n)
    }
}

/// Collected trace, as returned by the traceroute tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceReport {
    pub host: String,
    pub destination: Option<IpAddr>,
    pub hops: Vec<TraceHop>,
    pub destination_reached: bool,
}

impl TraceReport {
    pub fn new(host: impl Into<String>, destination: Option<IpAddr>, hops: Vec<TraceHop>) -> Self {
        let destination_reached = hops.iter().any(|h| h.reached);
        Self {
            host: host.into(),
            destination,
            hops,
            destination_reached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_bounds() {
        assert!(TraceOptions::default().validate().is_ok());
        let no_hops = TraceOptions {
            max_hops: 0,
            ..TraceOptions::default()
        };
        assert!(no_hops.validate().is_err());
        let too_many = TraceOptions {
            queries: 11,
            ..TraceOptions::default()
        };
        assert!(too_many.validate().is_err());
        let max = TraceOptions {
            max_hops: 255,
            ..TraceOptions::default()
        };
        assert!(max.validate().is_ok());
    }

    #[test]
    fn test_avg_rtt_skips_timeouts() {
        let hop = TraceHop {
            hop: 3,
            address: None,
            rtts: vec![Some(Duration::from_millis(10)), None, Some(Duration::from_millis(20))],
            timeout: false,
            reached: false,
        };
        assert_eq!(hop.avg_rtt(), Some(Duration::from_millis(15)));
    }
}
