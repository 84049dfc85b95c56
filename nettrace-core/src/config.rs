//! Network configuration consumed by the client.
//!
//! Loading and persisting configuration files is the host application's
//! job; this module only defines the shape, the defaults and the sanity checks.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NetTraceError, NetTraceResult};
use crate::retry::RetryPolicy;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default traceroute hop limit.
pub const DEFAULT_MAX_HOPS: u8 = 30;
/// Default ICMP payload size in bytes.
pub const DEFAULT_PACKET_SIZE: usize = 56;
/// Default width of the global operation semaphore.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;
/// Default number of DNS record-type queries in flight at once.
pub const DEFAULT_DNS_CONCURRENCY: usize = 3;
/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default delay before the first retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Shared network settings for every diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
    /// Per-attempt timeout for connects, reads and DNS queries.
    #[serde(with = "crate::utils::duration_ms")]
    pub timeout: Duration,
    /// Default hop limit for traceroute.
    pub max_hops: u8,
    /// Default ICMP payload size.
    pub packet_size: usize,
    /// Upstream DNS servers (IP addresses). Empty means the system configuration.
    pub dns_servers: Vec<String>,
    /// Maximum number of operations running at once on one client.
    pub max_concurrency: usize,
    /// Maximum number of per-record-type DNS queries in flight for one lookup.
    pub dns_concurrency: usize,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
    /// Delay before the first retry; doubled on each following attempt.
    #[serde(with = "crate::utils::duration_ms")]
    pub retry_delay: Duration,
    /// Identification string for protocols that carry one.
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_hops: DEFAULT_MAX_HOPS,
            packet_size: DEFAULT_PACKET_SIZE,
            dns_servers: Vec::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            dns_concurrency: DEFAULT_DNS_CONCURRENCY,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            user_agent: format!("nettrace/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl NetworkConfig {
    /// Check that every value is usable.
    pub fn validate(&self) -> NetTraceResult<()> {
        if self.timeout.is_zero() {
            return Err(NetTraceError::configuration("timeout must be greater than zero"));
        }
        if self.max_hops == 0 {
            return Err(NetTraceError::configuration("maxHops must be between 1 and 255"));
        }
        if self.packet_size > crate::types::MAX_PACKET_SIZE {
            return Err(NetTraceError::configuration(format!(
                "packetSize must not exceed {} bytes",
                crate::types::MAX_PACKET_SIZE
            )));
        }
        if self.max_concurrency == 0 {
            return Err(NetTraceError::configuration("maxConcurrency must be at least 1"));
        }
        if self.dns_concurrency == 0 {
            return Err(NetTraceError::configuration("dnsConcurrency must be at least 1"));
        }
        for server in &self.dns_servers {
            if server.trim().parse::<IpAddr>().is_err() {
                return Err(NetTraceError::configuration(format!(
                    "Invalid DNS server address: {server}"
                ))
                .with_context("dnsServer", server));
            }
        }
        Ok(())
    }

    /// Parsed upstream DNS servers; entries were checked by [`validate`](Self::validate).
    pub fn dns_server_ips(&self) -> Vec<IpAddr> {
        self.dns_servers
            .iter()
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    /// Retry policy derived from the configured attempts, delay and timeout.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay, self.timeout)
    }
}
