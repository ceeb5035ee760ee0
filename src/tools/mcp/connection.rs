//! One initialized MCP session with one server.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::McpError;
use crate::tools::mcp::config::McpServerConfig;
use crate::tools::mcp::protocol::{CallToolResult, ListToolsResult, McpToolInfo, initialize_params};
use crate::tools::mcp::transport::{HttpTransport, McpTransport, StdioTransport};

/// Invokes tools on a remote server. Implemented by live connections and by
/// test doubles.
#[async_trait]
pub trait RemoteToolCaller: Send + Sync {
    /// Prefixed server name, e.g. `web_search`.
    fn server_name(&self) -> &str;

    /// Call `tool` and return its text output.
    async fn call_tool(&self, tool: &str, args: &Value) -> Result<String, McpError>;
}

/// Connection to an MCP server.
pub struct McpConnection {
    server: String,
    transport: Box<dyn McpTransport>,
}

impl McpConnection {
    /// Open the transport and perform the initialize handshake.
    pub async fn connect(server: &str, config: &McpServerConfig) -> Result<Self, McpError> {
        let transport: Box<dyn McpTransport> = match config {
            McpServerConfig::Stdio { command, args, env } => {
                Box::new(StdioTransport::spawn(server, command, args, env)?)
            }
            McpServerConfig::Http { url, headers } => {
                Box::new(HttpTransport::new(server, url, headers)?)
            }
        };
        Self::handshake(server, transport).await
    }

    /// Initialize over an already-open transport.
    pub async fn handshake(
        server: &str,
        transport: Box<dyn McpTransport>,
    ) -> Result<Self, McpError> {
        let connection = Self {
            server: server.to_string(),
            transport,
        };

        let init = async {
            let info = connection
                .transport
                .request("initialize", Some(initialize_params()))
                .await?;
            connection
                .transport
                .notify("notifications/initialized", None)
                .await?;
            Ok::<_, McpError>(info)
        };

        let outcome = init.await;
        match outcome {
            Ok(info) => {
                tracing::debug!(
                    server,
                    remote = ?info.get("serverInfo").and_then(|s| s.get("name")),
                    "MCP handshake complete"
                );
                Ok(connection)
            }
            Err(e) => {
                if let Err(close_err) = connection.transport.close().await {
                    tracing::debug!(server, error = %close_err, "Close after failed handshake failed");
                }
                Err(e)
            }
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// List every tool the server advertises, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let raw = self.transport.request("tools/list", params).await?;
            let page: ListToolsResult =
                serde_json::from_value(raw).map_err(|e| McpError::Protocol {
                    server: self.server.clone(),
                    message: format!("Failed to parse tools/list result: {}", e),
                })?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn close(&self) -> Result<(), McpError> {
        self.transport.close().await
    }
}

#[async_trait]
impl RemoteToolCaller for McpConnection {
    fn server_name(&self) -> &str {
        &self.server
    }

    async fn call_tool(&self, tool: &str, args: &Value) -> Result<String, McpError> {
        let arguments = if args.is_object() {
            args.clone()
        } else {
            serde_json::json!({})
        };
        let raw = self
            .transport
            .request(
                "tools/call",
                Some(serde_json::json!({ "name": tool, "arguments": arguments })),
            )
            .await
            .map_err(|e| McpError::ToolCallFailed {
                tool: tool.to_string(),
                reason: e.to_string(),
            })?;

        let result: CallToolResult =
            serde_json::from_value(raw).map_err(|e| McpError::ToolCallFailed {
                tool: tool.to_string(),
                reason: format!("malformed result: {}", e),
            })?;

        if result.is_error {
            return Err(McpError::ToolCallFailed {
                tool: tool.to_string(),
                reason: result.text(),
            });
        }
        Ok(result.text())
    }
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection")
            .field("server", &self.server)
            .field("alive", &self.is_alive())
            .finish()
    }
}
