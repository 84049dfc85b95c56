use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::{DiagnosticTool, RunClock, ensure_not_cancelled};
use crate::client::NetworkClient;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::params::Parameters;
use crate::result::{DiagnosticResult, ResultData};
use crate::types::TraceReport;

/// TTL-stepped path discovery, collected into a [`TraceReport`].
pub struct TracerouteTool {
    client: Arc<dyn NetworkClient>,
}

impl TracerouteTool {
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticTool for TracerouteTool {
    fn name(&self) -> &'static str {
        "traceroute"
    }

    fn description(&self) -> &'static str {
        "Discover the routers between this host and the target"
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        params: &Parameters,
    ) -> NetTraceResult<DiagnosticResult> {
        self.validate(params)?;
        let Parameters::Traceroute(trace) = params else {
            return Err(NetTraceError::validation(
                ErrorCode::InvalidParameter,
                "traceroute tool requires traceroute parameters",
            ));
        };

        let clock = RunClock::start();
        let mut rx = self
            .client
            .traceroute(cancel.clone(), &trace.host, trace.options.clone())
            .await?;

        let mut hops = Vec::with_capacity(usize::from(trace.options.max_hops));
        while let Some(hop) = rx.recv().await {
            hops.push(hop);
        }
        ensure_not_cancelled(&cancel, "traceroute")?;

        // The stream does not carry the resolved target; the reached hop does.
        let destination = hops
            .iter()
            .find(|h| h.reached)
            .and_then(|h| h.address)
            .or_else(|| trace.host.parse::<IpAddr>().ok());

        let report = TraceReport::new(&trace.host, destination, hops);
        debug!(
            "[TRACE] {}: {} hops, reached={}",
            trace.host,
            report.hops.len(),
            report.destination_reached
        );
        Ok(clock.finish(params, ResultData::Traceroute(report)))
    }
}
