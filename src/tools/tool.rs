//! The `Tool` trait implemented by everything the model can call.

use std::time::Duration;

use async_trait::async_trait;

use crate::context::TurnContext;
use crate::error::ToolError;

/// Output of a successful tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Result payload handed back to the model.
    pub result: serde_json::Value,
    /// Wall-clock execution time.
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            result: serde_json::Value::String(text.into()),
            duration,
        }
    }
}

/// A callable capability exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError>;

    /// OpenAI-style function schema for this tool.
    fn function_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters_schema(),
            }
        })
    }
}
