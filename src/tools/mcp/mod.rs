//! Model Context Protocol client.
//!
//! Skills reference remote tool servers by name; before connecting, every
//! server is renamed `{skill}_{server}` so that a batch of servers from
//! several skills can share one [`RemoteToolClient`]. Discovered tools are
//! exposed as `{skill}_{server}__{tool}`.

mod client;
mod config;
mod connection;
mod protocol;
mod transport;

use std::collections::BTreeMap;
use std::time::Duration;

pub use client::{McpClient, McpClientFactory, RemoteClientFactory, RemoteToolClient};
pub use config::McpServerConfig;
pub use connection::{McpConnection, RemoteToolCaller};
pub use protocol::{CallToolResult, McpToolInfo, PROTOCOL_VERSION};
pub use transport::{HttpTransport, McpTransport, StdioTransport};

use crate::context::TurnContext;
use crate::error::McpError;

/// Disconnect a client that will not be handed to anyone, logging and
/// swallowing any error.
pub async fn safe_disconnect(client: &mut dyn RemoteToolClient) {
    if let Err(e) = client.disconnect().await {
        tracing::warn!(servers = ?client.servers(), error = %e, "Error disconnecting MCP client");
    }
}

/// Create a client for `servers` and connect it within `timeout`.
///
/// On success the connected client is returned and the caller owns it. On
/// any failure, including a client that connects but is not ready, the
/// client is disconnected here before the error is returned.
pub async fn connect_remote_tools(
    factory: &dyn RemoteClientFactory,
    servers: BTreeMap<String, McpServerConfig>,
    ctx: &TurnContext,
    timeout: Duration,
) -> Result<Box<dyn RemoteToolClient>, McpError> {
    let mut client = factory.create(servers, ctx);

    let outcome = match client.connect(timeout).await {
        Ok(()) if client.is_connected() => Ok(()),
        Ok(()) => Err(McpError::NotReady {
            reason: format!("no live session for {:?}", client.servers()),
        }),
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => Ok(client),
        Err(e) => {
            safe_disconnect(client.as_mut()).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::tools::handle::ToolHandle;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Ready,
        NotReady,
        Fails,
        Hangs,
    }

    struct ScriptedClient {
        behaviour: Behaviour,
        connected: bool,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteToolClient for ScriptedClient {
        fn servers(&self) -> Vec<String> {
            vec!["s_srv".to_string()]
        }

        async fn connect(&mut self, timeout: Duration) -> Result<(), McpError> {
            match self.behaviour {
                Behaviour::Ready => {
                    self.connected = true;
                    Ok(())
                }
                Behaviour::NotReady => Ok(()),
                Behaviour::Fails => Err(McpError::ConnectionFailed {
                    server: "s_srv".to_string(),
                    reason: "refused".to_string(),
                }),
                Behaviour::Hangs => Err(McpError::Timeout { timeout }),
            }
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn get_tools(&self) -> Vec<ToolHandle> {
            Vec::new()
        }

        async fn disconnect(&mut self) -> Result<(), McpError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connected = false;
            Err(McpError::ConnectionFailed {
                server: "s_srv".to_string(),
                reason: "already gone".to_string(),
            })
        }
    }

    struct ScriptedFactory {
        behaviour: Behaviour,
        disconnects: Arc<AtomicUsize>,
    }

    impl RemoteClientFactory for ScriptedFactory {
        fn create(
            &self,
            _servers: BTreeMap<String, McpServerConfig>,
            _ctx: &TurnContext,
        ) -> Box<dyn RemoteToolClient> {
            Box::new(ScriptedClient {
                behaviour: self.behaviour,
                connected: false,
                disconnects: Arc::clone(&self.disconnects),
            })
        }
    }

    async fn run(behaviour: Behaviour) -> (Result<Box<dyn RemoteToolClient>, McpError>, usize) {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let factory = ScriptedFactory {
            behaviour,
            disconnects: Arc::clone(&disconnects),
        };
        let result = connect_remote_tools(
            &factory,
            BTreeMap::new(),
            &TurnContext::new(1, 1, 1),
            Duration::from_secs(1),
        )
        .await;
        (result, disconnects.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_ready_client_is_returned_without_disconnect() {
        let (result, disconnects) = run(Behaviour::Ready).await;
        assert!(result.is_ok());
        assert_eq!(disconnects, 0);
    }

    #[tokio::test]
    async fn test_not_ready_client_is_disconnected() {
        let (result, disconnects) = run(Behaviour::NotReady).await;
        assert!(matches!(result, Err(McpError::NotReady { .. })));
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_failed_and_timed_out_clients_are_disconnected() {
        let (result, disconnects) = run(Behaviour::Fails).await;
        assert!(matches!(result, Err(McpError::ConnectionFailed { .. })));
        assert_eq!(disconnects, 1);

        let (result, disconnects) = run(Behaviour::Hangs).await;
        assert!(matches!(result, Err(McpError::Timeout { .. })));
        assert_eq!(disconnects, 1);
    }
}
