//! Scripted protocol backends shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use nettrace_core::{
    DnsAnswer, DnsBackend, DnsRecord, DnsRecordType, ErrorCode, IcmpProber, NetTraceError,
    NetTraceResult, NetworkConfig, ProbeReply, ProbeRequest, WhoisTransport,
};

/// Config with fast, non-retrying operations.
pub fn test_config() -> NetworkConfig {
    NetworkConfig {
        timeout: Duration::from_millis(500),
        retry_attempts: 0,
        retry_delay: Duration::from_millis(1),
        ..NetworkConfig::default()
    }
}

// ===== DNS =====

/// Answers per record type; types without an entry fail with a lookup error.
#[derive(Default)]
pub struct MockDns {
    answers: HashMap<DnsRecordType, Vec<DnsRecord>>,
    calls: AtomicUsize,
}

impl MockDns {
    pub fn answer(mut self, record_type: DnsRecordType, value: &str) -> Self {
        self.answers.entry(record_type).or_default().push(DnsRecord {
            name: "example.com".to_string(),
            record_type,
            value: value.to_string(),
            ttl: 300,
            priority: None,
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsBackend for MockDns {
    async fn query(&self, name: &str, record_type: DnsRecordType) -> NetTraceResult<DnsAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .get(&record_type)
            .map(|answers| DnsAnswer {
                answers: answers.clone(),
                authority: Vec::new(),
            })
            .ok_or_else(|| {
                NetTraceError::network(
                    ErrorCode::DnsLookupFailed,
                    format!("SERVFAIL for {name} {record_type}"),
                )
            })
    }

    fn server(&self) -> String {
        "mock-dns".to_string()
    }
}

// ===== WHOIS =====

/// Canned responses per server; unknown servers refuse the connection.
#[derive(Default)]
pub struct MockWhois {
    responses: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MockWhois {
    pub fn respond(mut self, server: &str, body: &str) -> Self {
        self.responses.insert(server.to_string(), body.to_string());
        self
    }

    pub fn servers_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WhoisTransport for MockWhois {
    async fn query(&self, server: &str, _query: &str) -> NetTraceResult<String> {
        self.calls.lock().unwrap().push(server.to_string());
        self.responses.get(server).cloned().ok_or_else(|| {
            NetTraceError::network(ErrorCode::WhoisLookupFailed, "connection refused")
                .with_context("server", server)
        })
    }
}

// ===== ICMP =====

/// Never answers: every probe waits out its timeout.
pub struct SilentProber;

#[async_trait]
impl IcmpProber for SilentProber {
    async fn probe(&self, request: ProbeRequest) -> io::Result<Option<ProbeReply>> {
        tokio::time::sleep(request.timeout).await;
        Ok(None)
    }
}

/// Routers at 10.0.0.<ttl> until `hops`, then the target answers.
pub struct PathProber {
    pub hops: u8,
}

#[async_trait]
impl IcmpProber for PathProber {
    async fn probe(&self, request: ProbeRequest) -> io::Result<Option<ProbeReply>> {
        let rtt = Duration::from_millis(u64::from(request.ttl));
        if request.ttl >= self.hops {
            return Ok(Some(ProbeReply::Echo {
                from: request.target,
                rtt,
                ttl: Some(64u8.saturating_sub(request.ttl)),
            }));
        }
        Ok(Some(ProbeReply::TimeExceeded {
            from: IpAddr::from([10, 0, 0, request.ttl]),
            rtt,
        }))
    }
}
