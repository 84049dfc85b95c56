use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::{DiagnosticTool, RunClock, ensure_not_cancelled};
use crate::client::NetworkClient;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::params::Parameters;
use crate::result::{DiagnosticResult, ResultData};
use crate::types::PingReport;

/// ICMP echo run, collected into a [`PingReport`] with statistics.
pub struct PingTool {
    client: Arc<dyn NetworkClient>,
}

impl PingTool {
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticTool for PingTool {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn description(&self) -> &'static str {
        "Send ICMP echo requests and report round-trip times and packet loss"
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        params: &Parameters,
    ) -> NetTraceResult<DiagnosticResult> {
        self.validate(params)?;
        let Parameters::Ping(ping) = params else {
            return Err(NetTraceError::validation(
                ErrorCode::InvalidParameter,
                "ping tool requires ping parameters",
            ));
        };

        let clock = RunClock::start();
        let mut rx = self
            .client
            .ping(cancel.clone(), &ping.host, ping.options.clone())
            .await?;

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        ensure_not_cancelled(&cancel, "ping")?;

        let report = PingReport::new(&ping.host, results);
        debug!(
            "[PING] {}: {}/{} replies",
            ping.host, report.statistics.received, report.statistics.sent
        );
        Ok(clock.finish(params, ResultData::Ping(report)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tools::test_support::ScriptedClient;

    #[tokio::test]
    async fn test_collects_stream_into_report() {
        let client = Arc::new(ScriptedClient::default());
        let tool = PingTool::new(client.clone());

        let mut params = Parameters::ping("example.com");
        params.set("count", serde_json::json!(3)).unwrap();
        let result = tool.execute(CancellationToken::new(), &params).await.unwrap();

        let ResultData::Ping(report) = &result.data else {
            panic!("expected ping data");
        };
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.statistics.sent, 3);
        assert_eq!(report.statistics.received, 3);
        assert_eq!(result.metadata["target"], "example.com");
        assert!(result.metadata.contains_key("startedAt"));
        assert!(result.metadata.contains_key("durationMs"));
        assert_eq!(*client.calls.lock().unwrap(), vec!["ping example.com x3"]);
    }

    #[tokio::test]
    async fn test_rejects_foreign_parameters() {
        let client = Arc::new(ScriptedClient::default());
        let tool = PingTool::new(client.clone());

        let err = tool
            .execute(CancellationToken::new(), &Parameters::dns("example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
        assert!(client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_is_an_error() {
        let tool = PingTool::new(Arc::new(ScriptedClient::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tool
            .execute(cancel, &Parameters::ping("example.com"))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
