//! Tool registry, indexed by tool name.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{DiagnosticTool, DnsTool, PingTool, SslTool, TracerouteTool, WhoisTool};
use crate::client::NetworkClient;
use crate::error::{ErrorCode, ErrorKind, NetTraceError, NetTraceResult};
use crate::params::Parameters;
use crate::result::DiagnosticResult;

/// Registered [`DiagnosticTool`]s.
///
/// Clones share the same table, so a tool registered through one handle is
/// visible through all of them.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn DiagnosticTool>>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the five built-in tools, all driven by `client`.
    #[must_use]
    pub fn with_default_tools(client: Arc<dyn NetworkClient>) -> Self {
        let tools: [Arc<dyn DiagnosticTool>; 5] = [
            Arc::new(PingTool::new(client.clone())),
            Arc::new(TracerouteTool::new(client.clone())),
            Arc::new(DnsTool::new(client.clone())),
            Arc::new(WhoisTool::new(client.clone())),
            Arc::new(SslTool::new(client)),
        ];
        let table: HashMap<_, _> = tools
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Self {
            tools: Arc::new(RwLock::new(table)),
        }
    }

    /// Register a tool under its name, replacing any tool already there.
    pub async fn register(&self, tool: Arc<dyn DiagnosticTool>) {
        debug!("[TOOLS] Registered {}", tool.name());
        self.tools.write().await.insert(tool.name().to_string(), tool);
    }

    pub async fn unregister(&self, name: &str) {
        self.tools.write().await.remove(name);
    }

    /// Look up a tool; unknown names fail with `TOOL_NOT_FOUND`.
    pub async fn get(&self, name: &str) -> NetTraceResult<Arc<dyn DiagnosticTool>> {
        self.tools.read().await.get(name).cloned().ok_or_else(|| {
            NetTraceError::new(
                ErrorKind::Plugin,
                ErrorCode::ToolNotFound,
                format!("No tool registered as '{name}'"),
            )
            .with_context("tool", name)
        })
    }

    /// Registered tool names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the tool the parameters name.
    pub async fn execute(
        &self,
        cancel: CancellationToken,
        params: &Parameters,
    ) -> NetTraceResult<DiagnosticResult> {
        let tool = self.get(params.tool_name()).await?;
        tool.execute(cancel, params).await
    }
}
