//! Diagnostic tools: one [`DiagnosticTool`] per operation, looked up through a [`ToolRegistry`].
//!
//! A tool validates its [`Parameters`], drives the matching [`NetworkClient`]
//! operation to completion (collecting streams) and wraps the outcome in a
//! [`DiagnosticResult`] with run metadata.

mod dns;
mod ping;
mod registry;
mod ssl;
mod traceroute;
mod whois;

pub use dns::DnsTool;
pub use ping::PingTool;
pub use registry::ToolRegistry;
pub use ssl::SslTool;
pub use traceroute::TracerouteTool;
pub use whois::WhoisTool;

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

#[cfg(doc)]
use crate::client::NetworkClient;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::params::Parameters;
use crate::result::{DiagnosticResult, ResultData};

/// A runnable diagnostic.
#[async_trait]
pub trait DiagnosticTool: Send + Sync {
    /// Registry key; matches [`Parameters::tool_name`].
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Run to completion. Fails with `CANCELLED` if `cancel` fires first.
    async fn execute(
        &self,
        cancel: CancellationToken,
        params: &Parameters,
    ) -> NetTraceResult<DiagnosticResult>;

    /// Reject parameters meant for another tool or failing their own checks.
    fn validate(&self, params: &Parameters) -> NetTraceResult<()> {
        if params.tool_name() != self.name() {
            return Err(NetTraceError::validation(
                ErrorCode::InvalidParameter,
                format!(
                    "{} parameters passed to the {} tool",
                    params.tool_name(),
                    self.name()
                ),
            )
            .with_context("tool", self.name()));
        }
        params.validate()
    }

    /// Presentation state for front ends that keep one per tool. Opaque to the engine.
    fn model(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        None
    }
}

/// Start of a tool run, for the metadata attached to its result.
struct RunClock {
    started_at: DateTime<Utc>,
    start: Instant,
}

impl RunClock {
    fn start() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    fn finish(self, params: &Parameters, data: ResultData) -> DiagnosticResult {
        DiagnosticResult::new(data)
            .with_metadata("target", params.target())
            .with_metadata("startedAt", self.started_at.to_rfc3339())
            .with_metadata(
                "durationMs",
                u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX),
            )
    }
}

/// Streams close silently on cancellation; tools report it as an error instead.
fn ensure_not_cancelled(cancel: &CancellationToken, operation: &str) -> NetTraceResult<()> {
    if cancel.is_cancelled() {
        Err(NetTraceError::cancelled(operation))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    //! A scripted [`NetworkClient`] shared by the tool tests.

    use std::net::IpAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::client::NetworkClient;
    use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
    use crate::types::{
        DnsRecordType, DnsResult, NetworkHost, PingOptions, PingResult, SslResult, TraceHop,
        TraceOptions, WhoisResult,
    };

    #[derive(Default)]
    pub(crate) struct ScriptedClient {
        pub calls: Mutex<Vec<String>>,
        pub ssl: Mutex<Option<SslResult>>,
    }

    impl ScriptedClient {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl NetworkClient for ScriptedClient {
        async fn ping(
            &self,
            cancel: CancellationToken,
            host: &str,
            options: PingOptions,
        ) -> NetTraceResult<mpsc::Receiver<PingResult>> {
            self.record(format!("ping {host} x{}", options.count));
            let (tx, rx) = mpsc::channel(16);
            let ip: IpAddr = "192.0.2.1".parse().unwrap();
            for sequence in 1..=u16::try_from(options.count).unwrap() {
                if cancel.is_cancelled() {
                    break;
                }
                tx.send(PingResult {
                    host: NetworkHost::new(host, ip),
                    sequence,
                    rtt: Some(Duration::from_millis(u64::from(sequence) * 10)),
                    ttl: Some(57),
                    size: options.packet_size,
                    timestamp: Utc::now(),
                    error: None,
                })
                .await
                .unwrap();
            }
            Ok(rx)
        }

        async fn traceroute(
            &self,
            _cancel: CancellationToken,
            host: &str,
            options: TraceOptions,
        ) -> NetTraceResult<mpsc::Receiver<TraceHop>> {
            self.record(format!("traceroute {host}"));
            let (tx, rx) = mpsc::channel(16);
            for hop in 1..=2u8 {
                tx.send(TraceHop {
                    hop,
                    address: Some(IpAddr::from([192, 0, 2, hop])),
                    rtts: vec![Some(Duration::from_millis(5)); usize::from(options.queries)],
                    timeout: false,
                    reached: hop == 2,
                })
                .await
                .unwrap();
            }
            Ok(rx)
        }

        async fn dns_lookup(
            &self,
            _cancel: CancellationToken,
            domain: &str,
            record_type: DnsRecordType,
        ) -> NetTraceResult<DnsResult> {
            self.record(format!("dns {domain} {record_type}"));
            Ok(empty_dns(domain, vec![record_type]))
        }

        async fn dns_lookup_many(
            &self,
            _cancel: CancellationToken,
            domain: &str,
            record_types: &[DnsRecordType],
        ) -> NetTraceResult<DnsResult> {
            self.record(format!("dns_many {domain} {}", record_types.len()));
            Ok(empty_dns(domain, record_types.to_vec()))
        }

        async fn whois_lookup(
            &self,
            _cancel: CancellationToken,
            query: &str,
        ) -> NetTraceResult<WhoisResult> {
            self.record(format!("whois {query}"));
            Err(NetTraceError::network(
                ErrorCode::WhoisLookupFailed,
                "scripted failure",
            ))
        }

        async fn ssl_check(
            &self,
            _cancel: CancellationToken,
            host: &str,
            port: u16,
        ) -> NetTraceResult<SslResult> {
            self.record(format!("ssl {host}:{port}"));
            self.ssl.lock().unwrap().clone().ok_or_else(|| {
                NetTraceError::network(ErrorCode::SslCheckFailed, "no scripted certificate")
            })
        }
    }

    fn empty_dns(domain: &str, queried_types: Vec<DnsRecordType>) -> DnsResult {
        DnsResult {
            domain: domain.to_string(),
            records: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            response_time: Duration::from_millis(3),
            server: "mock".to_string(),
            queried_types,
        }
    }
}
