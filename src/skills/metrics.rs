//! Observational metrics for skill loads, MCP connections and tool calls.
//!
//! Recording never affects control flow. The default sink emits structured
//! `tracing` events on the `skillhost::metrics` target so an exporter layer
//! can pick them up.

use std::time::Duration;

/// Outcome label attached to every recorded metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricStatus {
    Success,
    Error,
    Denied,
    Timeout,
    NotReady,
}

impl MetricStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Denied => "denied",
            Self::Timeout => "timeout",
            Self::NotReady => "not_ready",
        }
    }
}

impl std::fmt::Display for MetricStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for skill orchestration metrics.
pub trait SkillMetrics: Send + Sync {
    /// A provider load attempt for a skill.
    fn record_skill_load(&self, skill: &str, status: MetricStatus, duration: Duration);

    /// A connection attempt to one MCP server (or a whole batch on timeout).
    fn record_mcp_connection(&self, server: &str, status: MetricStatus, duration: Duration);

    /// One tool invocation.
    fn record_tool_call(&self, skill: &str, tool: &str, status: MetricStatus, duration: Duration);
}

/// Emits metrics as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl SkillMetrics for TracingMetrics {
    fn record_skill_load(&self, skill: &str, status: MetricStatus, duration: Duration) {
        tracing::debug!(
            target: "skillhost::metrics",
            metric = "skill_loads_total",
            skill,
            status = status.as_str(),
            duration_secs = duration.as_secs_f64(),
        );
    }

    fn record_mcp_connection(&self, server: &str, status: MetricStatus, duration: Duration) {
        tracing::debug!(
            target: "skillhost::metrics",
            metric = "mcp_connections_total",
            server,
            status = status.as_str(),
            duration_secs = duration.as_secs_f64(),
        );
    }

    fn record_tool_call(&self, skill: &str, tool: &str, status: MetricStatus, duration: Duration) {
        tracing::debug!(
            target: "skillhost::metrics",
            metric = "skill_tool_calls_total",
            skill,
            tool,
            status = status.as_str(),
            duration_secs = duration.as_secs_f64(),
        );
    }
}
