use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{DiagnosticTool, RunClock};
use crate::client::NetworkClient;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::params::Parameters;
use crate::result::{DiagnosticResult, ResultData};

/// DNS lookup of one or many record types.
pub struct DnsTool {
    client: Arc<dyn NetworkClient>,
}

impl DnsTool {
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticTool for DnsTool {
    fn name(&self) -> &'static str {
        "dns"
    }

    fn description(&self) -> &'static str {
        "Query DNS records for a domain"
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        params: &Parameters,
    ) -> NetTraceResult<DiagnosticResult> {
        self.validate(params)?;
        let Parameters::Dns(dns) = params else {
            return Err(NetTraceError::validation(
                ErrorCode::InvalidParameter,
                "dns tool requires dns parameters",
            ));
        };

        let clock = RunClock::start();
        // A single type keeps its error; the fan-out only fails when every type does.
        let result = match dns.record_types.as_slice() {
            [single] => self.client.dns_lookup(cancel, &dns.domain, *single).await?,
            types => self.client.dns_lookup_many(cancel, &dns.domain, types).await?,
        };
        Ok(clock.finish(params, ResultData::Dns(result)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::test_support::ScriptedClient;
    use crate::types::DnsRecordType;

    #[tokio::test]
    async fn test_single_type_uses_single_lookup() {
        let client = Arc::new(ScriptedClient::default());
        let tool = DnsTool::new(client.clone());
        let mut params = Parameters::dns("example.com");
        params.set("recordTypes", json!(["MX"])).unwrap();

        let result = tool.execute(CancellationToken::new(), &params).await.unwrap();
        let ResultData::Dns(dns) = &result.data else {
            panic!("expected dns data");
        };
        assert_eq!(dns.queried_types, vec![DnsRecordType::Mx]);
        assert_eq!(*client.calls.lock().unwrap(), vec!["dns example.com MX"]);
    }

    #[tokio::test]
    async fn test_empty_types_fan_out() {
        let client = Arc::new(ScriptedClient::default());
        let tool = DnsTool::new(client.clone());

        tool.execute(CancellationToken::new(), &Parameters::dns("example.com"))
            .await
            .unwrap();
        assert_eq!(*client.calls.lock().unwrap(), vec!["dns_many example.com 0"]);
    }

    #[tokio::test]
    async fn test_invalid_domain_never_reaches_client() {
        let client = Arc::new(ScriptedClient::default());
        let tool = DnsTool::new(client.clone());

        let err = tool
            .execute(CancellationToken::new(), &Parameters::dns("invalid..domain"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DnsValidationFailed);
        assert!(client.calls.lock().unwrap().is_empty());
    }
}
