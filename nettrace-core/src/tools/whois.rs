use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DiagnosticTool, RunClock};
use crate::client::NetworkClient;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::params::Parameters;
use crate::result::{DiagnosticResult, ResultData};

/// WHOIS registration lookup with referral chasing.
pub struct WhoisTool {
    client: Arc<dyn NetworkClient>,
}

impl WhoisTool {
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticTool for WhoisTool {
    fn name(&self) -> &'static str {
        "whois"
    }

    fn description(&self) -> &'static str {
        "Look up domain or IP registration data"
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        params: &Parameters,
    ) -> NetTraceResult<DiagnosticResult> {
        self.validate(params)?;
        let Parameters::Whois(whois) = params else {
            return Err(NetTraceError::validation(
                ErrorCode::InvalidParameter,
                "whois tool requires whois parameters",
            ));
        };

        let clock = RunClock::start();
        let result = self.client.whois_lookup(cancel, &whois.query).await?;
        Ok(clock.finish(params, ResultData::Whois(result)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tools::test_support::ScriptedClient;

    #[tokio::test]
    async fn test_client_error_passes_through() {
        let client = Arc::new(ScriptedClient::default());
        let tool = WhoisTool::new(client.clone());

        let err = tool
            .execute(CancellationToken::new(), &Parameters::whois("example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::WhoisLookupFailed);
        assert_eq!(*client.calls.lock().unwrap(), vec!["whois example.com"]);
    }
}
