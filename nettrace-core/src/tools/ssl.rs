use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;

use super::{DiagnosticTool, RunClock};
use crate::client::NetworkClient;
use crate::error::{ErrorCode, NetTraceError, NetTraceResult};
use crate::params::Parameters;
use crate::result::{DiagnosticResult, ResultData};
use crate::services::ssl::analysis::{recommendations, security_level};
use crate::types::SslReport;

/// TLS certificate check, classified with a security level and recommendations.
pub struct SslTool {
    client: Arc<dyn NetworkClient>,
}

impl SslTool {
    pub fn new(client: Arc<dyn NetworkClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiagnosticTool for SslTool {
    fn name(&self) -> &'static str {
        "ssl"
    }

    fn description(&self) -> &'static str {
        "Inspect a server's TLS certificate and chain"
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        params: &Parameters,
    ) -> NetTraceResult<DiagnosticResult> {
        self.validate(params)?;
        let Parameters::Ssl(ssl) = params else {
            return Err(NetTraceError::validation(
                ErrorCode::InvalidParameter,
                "ssl tool requires ssl parameters",
            ));
        };

        let clock = RunClock::start();
        let result = self.client.ssl_check(cancel, &ssl.host, ssl.port).await?;
        let report = SslReport {
            security_level: security_level(&result),
            recommendations: recommendations(&result),
            result,
        };
        debug!(
            "[SSL] {}:{} classified {}",
            ssl.host, ssl.port, report.security_level
        );
        Ok(clock.finish(params, ResultData::Ssl(report)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::tools::test_support::ScriptedClient;
    use crate::types::{SecurityLevel, SslResult};

    fn expired_result() -> SslResult {
        SslResult {
            host: "example.com".to_string(),
            port: 8443,
            certificate: None,
            chain: Vec::new(),
            valid: false,
            errors: vec!["certificate has expired".to_string()],
            expires: Some(Utc::now()),
            days_until_expiry: -3,
            issuer: "CN=Test CA".to_string(),
            subject: "CN=example.com".to_string(),
            sans: vec!["example.com".to_string()],
            protocol_version: Some("TLSv1_3".to_string()),
            cipher_suite: None,
        }
    }

    #[tokio::test]
    async fn test_report_carries_classification() {
        let client = Arc::new(ScriptedClient::default());
        *client.ssl.lock().unwrap() = Some(expired_result());
        let tool = SslTool::new(client.clone());

        let mut params = Parameters::ssl("example.com");
        params.set("port", serde_json::json!(8443)).unwrap();
        let result = tool.execute(CancellationToken::new(), &params).await.unwrap();

        let ResultData::Ssl(report) = &result.data else {
            panic!("expected ssl data");
        };
        assert_eq!(report.security_level, SecurityLevel::Insecure);
        assert!(!report.recommendations.is_empty());
        assert_eq!(*client.calls.lock().unwrap(), vec!["ssl example.com:8443"]);
    }
}
