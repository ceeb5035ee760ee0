//! Remote tool client: one session spanning every MCP server of a batch.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::context::TurnContext;
use crate::error::McpError;
use crate::skills::metrics::{MetricStatus, SkillMetrics};
use crate::tools::handle::{RemoteToolHandle, ToolHandle};
use crate::tools::mcp::config::McpServerConfig;
use crate::tools::mcp::connection::{McpConnection, RemoteToolCaller};

/// A session over one or more (already prefixed) remote servers.
#[async_trait]
pub trait RemoteToolClient: Send + Sync {
    /// Prefixed names of the servers this client was built for.
    fn servers(&self) -> Vec<String>;

    /// Connect to every server, bounded by `timeout`.
    async fn connect(&mut self, timeout: Duration) -> Result<(), McpError>;

    fn is_connected(&self) -> bool;

    /// Handles for every discovered tool; empty when not connected.
    fn get_tools(&self) -> Vec<ToolHandle>;

    /// Close every connection. Safe after a failed or timed-out connect,
    /// and safe to call twice.
    async fn disconnect(&mut self) -> Result<(), McpError>;
}

/// Builds remote clients for a turn.
pub trait RemoteClientFactory: Send + Sync {
    fn create(
        &self,
        servers: BTreeMap<String, McpServerConfig>,
        ctx: &TurnContext,
    ) -> Box<dyn RemoteToolClient>;
}

struct ConnectedServer {
    connection: Arc<McpConnection>,
    tools: Vec<ToolHandle>,
}

/// MCP-backed remote tool client.
pub struct McpClient {
    servers: BTreeMap<String, McpServerConfig>,
    connected: Vec<ConnectedServer>,
    metrics: Arc<dyn SkillMetrics>,
}

impl McpClient {
    /// Build a client; `${var}` placeholders are resolved against `ctx`.
    pub fn new(
        servers: BTreeMap<String, McpServerConfig>,
        ctx: Option<&TurnContext>,
        metrics: Arc<dyn SkillMetrics>,
    ) -> Self {
        let servers = match ctx {
            Some(ctx) => {
                let vars = ctx.template_vars();
                servers
                    .into_iter()
                    .map(|(name, config)| {
                        let config = config.substitute(&vars);
                        (name, config)
                    })
                    .collect()
            }
            None => servers,
        };
        Self {
            servers,
            connected: Vec::new(),
            metrics,
        }
    }

    async fn connect_one(
        name: String,
        config: McpServerConfig,
        metrics: Arc<dyn SkillMetrics>,
    ) -> Result<ConnectedServer, McpError> {
        let start = Instant::now();
        let connection = McpConnection::connect(&name, &config).await?;
        let listed = match connection.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                if let Err(close_err) = connection.close().await {
                    tracing::debug!(server = %name, error = %close_err, "Close after failed tools/list failed");
                }
                return Err(e);
            }
        };

        let connection = Arc::new(connection);
        let session: Arc<dyn RemoteToolCaller> = connection.clone();
        let tools = listed
            .into_iter()
            .map(|tool| {
                ToolHandle::Remote(RemoteToolHandle {
                    server: name.clone(),
                    name: RemoteToolHandle::exposed_name(&name, &tool.name),
                    description: tool.description.unwrap_or_default(),
                    schema: tool.input_schema,
                    remote_name: tool.name,
                    session: Arc::clone(&session),
                    metrics: Arc::clone(&metrics),
                })
            })
            .collect::<Vec<_>>();

        tracing::info!(
            server = %name,
            transport = config.transport(),
            tools = tools.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Connected to MCP server"
        );
        metrics.record_mcp_connection(&name, MetricStatus::Success, start.elapsed());
        Ok(ConnectedServer { connection, tools })
    }
}

#[async_trait]
impl RemoteToolClient for McpClient {
    fn servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    async fn connect(&mut self, timeout: Duration) -> Result<(), McpError> {
        let start = Instant::now();
        let mut attempts: FuturesUnordered<_> = self
            .servers
            .iter()
            .map(|(name, config)| {
                let name = name.clone();
                let metrics = Arc::clone(&self.metrics);
                let config = config.clone();
                async move {
                    let result = Self::connect_one(name.clone(), config, metrics).await;
                    (name, result)
                }
            })
            .collect();

        // Servers are kept as soon as they connect, so a later `disconnect`
        // closes them even when the batch as a whole times out.
        let connected = &mut self.connected;
        let metrics = &self.metrics;
        let mut settled = HashSet::new();
        let mut first_error = None;
        let drained = tokio::time::timeout(timeout, async {
            while let Some((name, result)) = attempts.next().await {
                match result {
                    Ok(server) => connected.push(server),
                    Err(e) => {
                        tracing::error!(server = %name, error = %e, "Failed to connect to MCP server");
                        metrics.record_mcp_connection(&name, MetricStatus::Error, start.elapsed());
                        first_error.get_or_insert(e);
                    }
                }
                settled.insert(name);
            }
        })
        .await;
        drop(attempts);

        if drained.is_err() {
            let pending: Vec<&String> = self
                .servers
                .keys()
                .filter(|name| !settled.contains(*name))
                .collect();
            for name in &pending {
                self.metrics
                    .record_mcp_connection(name, MetricStatus::Timeout, start.elapsed());
            }
            tracing::error!(
                servers = ?pending,
                timeout_secs = timeout.as_secs_f64(),
                "MCP connect timed out"
            );
            return Err(McpError::Timeout { timeout });
        }

        match first_error {
            Some(e) if self.connected.is_empty() => Err(e),
            _ => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        !self.connected.is_empty() && self.connected.iter().all(|s| s.connection.is_alive())
    }

    fn get_tools(&self) -> Vec<ToolHandle> {
        if !self.is_connected() {
            return Vec::new();
        }
        self.connected
            .iter()
            .flat_map(|s| s.tools.iter().cloned())
            .collect()
    }

    async fn disconnect(&mut self) -> Result<(), McpError> {
        let mut first_error = None;
        for server in self.connected.drain(..) {
            if let Err(e) = server.connection.close().await {
                tracing::debug!(server = %server.connection.server(), error = %e, "MCP close failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Creates [`McpClient`]s sharing one metrics sink.
pub struct McpClientFactory {
    metrics: Arc<dyn SkillMetrics>,
}

impl McpClientFactory {
    pub fn new(metrics: Arc<dyn SkillMetrics>) -> Self {
        Self { metrics }
    }
}

impl RemoteClientFactory for McpClientFactory {
    fn create(
        &self,
        servers: BTreeMap<String, McpServerConfig>,
        ctx: &TurnContext,
    ) -> Box<dyn RemoteToolClient> {
        Box::new(McpClient::new(servers, Some(ctx), Arc::clone(&self.metrics)))
    }
}
