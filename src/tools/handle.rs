//! Tool handles: per-turn, invocable bindings of declared tools.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::TurnContext;
use crate::error::ToolError;
use crate::skills::metrics::{MetricStatus, SkillMetrics};
use crate::skills::provider::SkillProvider;
use crate::tools::mcp::RemoteToolCaller;
use crate::tools::tool::{Tool, ToolOutput};

/// A tool bound to a skill's loaded code provider.
#[derive(Clone)]
pub struct LocalToolHandle {
    pub skill_name: String,
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub export: String,
    pub provider: Arc<dyn SkillProvider>,
    pub metrics: Arc<dyn SkillMetrics>,
}

/// A tool served by a remote MCP session.
#[derive(Clone)]
pub struct RemoteToolHandle {
    /// Prefixed server name (`{skill}_{server}`).
    pub server: String,
    /// Exposed name, `{server}__{remote_name}`.
    pub name: String,
    /// Name the server knows the tool by.
    pub remote_name: String,
    pub description: String,
    pub schema: Value,
    pub session: Arc<dyn RemoteToolCaller>,
    pub metrics: Arc<dyn SkillMetrics>,
}

impl RemoteToolHandle {
    pub fn exposed_name(server: &str, tool: &str) -> String {
        format!("{}__{}", server, tool)
    }
}

/// Any tool a turn can expose.
#[derive(Clone)]
pub enum ToolHandle {
    Local(LocalToolHandle),
    Remote(RemoteToolHandle),
}

impl ToolHandle {
    pub fn name(&self) -> &str {
        match self {
            Self::Local(h) => &h.name,
            Self::Remote(h) => &h.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Local(h) => &h.description,
            Self::Remote(h) => &h.description,
        }
    }

    pub fn schema(&self) -> &Value {
        match self {
            Self::Local(h) => &h.schema,
            Self::Remote(h) => &h.schema,
        }
    }

    /// Skill (local) or prefixed server (remote) the tool belongs to.
    pub fn owner(&self) -> &str {
        match self {
            Self::Local(h) => &h.skill_name,
            Self::Remote(h) => &h.server,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Invoke the tool and record a tool-call metric.
    pub async fn invoke(&self, params: Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let result = match self {
            Self::Local(h) => h
                .provider
                .invoke(&h.export, &params)
                .await
                .map(|value| ToolOutput::success(value, start.elapsed())),
            Self::Remote(h) => h
                .session
                .call_tool(&h.remote_name, &params)
                .await
                .map(|text| ToolOutput::text(text, start.elapsed()))
                .map_err(|e| ToolError::ExecutionFailed {
                    name: h.name.clone(),
                    reason: e.to_string(),
                }),
        };

        let status = match &result {
            Ok(_) => MetricStatus::Success,
            Err(ToolError::Timeout { .. }) => MetricStatus::Timeout,
            Err(_) => MetricStatus::Error,
        };
        let metrics = match self {
            Self::Local(h) => &h.metrics,
            Self::Remote(h) => &h.metrics,
        };
        metrics.record_tool_call(self.owner(), self.name(), status, start.elapsed());

        if let Err(e) = &result {
            tracing::warn!(tool = %self.name(), owner = %self.owner(), error = %e, "Tool call failed");
        }
        result
    }
}

impl std::fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_remote() { "Remote" } else { "Local" };
        f.debug_struct(kind)
            .field("name", &self.name())
            .field("owner", &self.owner())
            .finish()
    }
}

#[async_trait]
impl Tool for ToolHandle {
    fn name(&self) -> &str {
        ToolHandle::name(self)
    }

    fn description(&self) -> &str {
        ToolHandle::description(self)
    }

    fn parameters_schema(&self) -> Value {
        self.schema().clone()
    }

    async fn execute(&self, params: Value, _ctx: &TurnContext) -> Result<ToolOutput, ToolError> {
        self.invoke(params).await
    }
}
