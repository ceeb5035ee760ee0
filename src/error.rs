//! Error types for skillhost.

use std::time::Duration;

use crate::tools::wasm::WasmError;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Skills error: {0}")]
    Skills(#[from] SkillsError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("MCP error: {0}")]
    Mcp(#[from] McpError),

    #[error("WASM error: {0}")]
    Wasm(#[from] WasmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Tool {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Tool {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("Invalid parameters for tool {name}: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Sandbox error for tool {name}: {reason}")]
    Sandbox { name: String, reason: String },
}

/// Skill loading and orchestration errors.
///
/// Every variant except `InvalidDefinition` is a per-skill soft failure: the
/// orchestrator logs it and carries on with the rest of the turn.
#[derive(Debug, thiserror::Error)]
pub enum SkillsError {
    #[error("Skill {name} not found")]
    NotFound { name: String },

    #[error("Invalid skill definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("Code loading denied for non-public skill {name} (owner: {owner:?})")]
    SecurityDenied { name: String, owner: Option<i64> },

    #[error("Bundle download from {url} failed: {reason}")]
    FetchFailed {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Provider for skill {name} failed to load: {reason}")]
    LoadFailed { name: String, reason: String },
}

/// Remote tool server (MCP) errors.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Connection to MCP server {server} failed: {reason}")]
    ConnectionFailed { server: String, reason: String },

    #[error("MCP connect timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("MCP client connected but not ready: {reason}")]
    NotReady { reason: String },

    #[error("MCP protocol error from {server}: {message}")]
    Protocol { server: String, message: String },

    #[error("MCP tool {tool} failed: {reason}")]
    ToolCallFailed { tool: String, reason: String },
}

impl McpError {
    /// Short status label used for metrics and span events.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::NotReady { .. } => "not_ready",
            _ => "error",
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
