//! Transports carrying JSON-RPC to an MCP server.
//!
//! - `StdioTransport` spawns the server and speaks newline-delimited JSON
//!   over its stdin/stdout.
//! - `HttpTransport` POSTs each message to one endpoint and accepts either a
//!   JSON body or a `text/event-stream` body in reply.

use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::McpError;
use crate::tools::mcp::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

/// Session header used by streamable HTTP servers.
const SESSION_HEADER: &str = "mcp-session-id";

/// A bidirectional JSON-RPC channel to one server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for its response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;

    /// Send a notification.
    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError>;

    /// False once the server went away or the transport was closed.
    fn is_alive(&self) -> bool;

    /// Release the underlying process or session. Safe to call twice.
    async fn close(&self) -> Result<(), McpError>;
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcMessage>>>>;

/// Child-process transport.
pub struct StdioTransport {
    server: String,
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the server process and start reading its output.
    pub fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Self, McpError> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::ConnectionFailed {
                server: server.to_string(),
                reason: format!("Failed to spawn '{}': {}", command, e),
            })?;

        let missing_pipe = |pipe: &str| McpError::ConnectionFailed {
            server: server.to_string(),
            reason: format!("child {} not captured", pipe),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader = {
            let server = server.to_string();
            let pending = Arc::clone(&pending);
            let alive = Arc::clone(&alive);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JsonRpcMessage>(&line) {
                        Ok(msg) => match msg.response_id() {
                            Some(id) => {
                                let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
                                if let Some(tx) = waiter {
                                    let _ = tx.send(msg);
                                }
                            }
                            None => {
                                tracing::debug!(server = %server, method = ?msg.method, "Ignoring server-initiated message");
                            }
                        },
                        Err(e) => {
                            tracing::debug!(server = %server, error = %e, "Unparseable line from MCP server");
                        }
                    }
                }
                alive.store(false, Ordering::SeqCst);
                // Dropping the senders fails every outstanding request.
                if let Ok(mut p) = pending.lock() {
                    p.clear();
                }
            })
        };

        {
            let server = server.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %server, "stderr: {}", line);
                }
            });
        }

        Ok(Self {
            server: server.to_string(),
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(Some(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            alive,
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn write_line(&self, payload: &impl serde::Serialize) -> Result<(), McpError> {
        let mut line = serde_json::to_string(payload).map_err(|e| McpError::Protocol {
            server: self.server.clone(),
            message: e.to_string(),
        })?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        let stdin = stdin.as_mut().ok_or_else(|| self.closed())?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::ConnectionFailed {
                server: self.server.clone(),
                reason: format!("write failed: {}", e),
            })?;
        stdin.flush().await.map_err(|e| McpError::ConnectionFailed {
            server: self.server.clone(),
            reason: format!("flush failed: {}", e),
        })
    }

    fn closed(&self) -> McpError {
        McpError::ConnectionFailed {
            server: self.server.clone(),
            reason: "server connection closed".to_string(),
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        if !self.is_alive() {
            return Err(self.closed());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }

        if let Err(e) = self.write_line(&JsonRpcRequest::new(id, method, params)).await {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&id);
            }
            return Err(e);
        }

        let msg = rx.await.map_err(|_| self.closed())?;
        msg.into_result().map_err(|e| McpError::Protocol {
            server: self.server.clone(),
            message: format!("{} failed: {}", method, e),
        })
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.write_line(&JsonRpcNotification::new(method, params)).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), McpError> {
        self.alive.store(false, Ordering::SeqCst);
        // Closing stdin lets well-behaved servers exit on their own.
        self.stdin.lock().await.take();

        let mut child = self.child.lock().await;
        if let Ok(None) = child.try_wait() {
            child.kill().await.map_err(|e| McpError::ConnectionFailed {
                server: self.server.clone(),
                reason: format!("Failed to stop server: {}", e),
            })?;
        }

        if let Some(reader) = self.reader.lock().ok().and_then(|mut r| r.take()) {
            reader.abort();
        }
        Ok(())
    }
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("server", &self.server)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Streamable HTTP transport.
pub struct HttpTransport {
    server: String,
    url: String,
    client: reqwest::Client,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl HttpTransport {
    pub fn new(
        server: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, McpError> {
        let invalid = |reason: String| McpError::ConnectionFailed {
            server: server.to_string(),
            reason,
        };

        url::Url::parse(url).map_err(|e| invalid(format!("invalid url '{}': {}", url, e)))?;

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| invalid(format!("invalid header name '{}': {}", key, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| invalid(format!("invalid value for header '{}': {}", key, e)))?;
            header_map.insert(name, value);
        }

        Ok(Self {
            server: server.to_string(),
            url: url.to_string(),
            client: reqwest::Client::new(),
            headers: header_map,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|s| s.clone())
    }

    async fn post(&self, body: &impl serde::Serialize) -> Result<reqwest::Response, McpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::ConnectionFailed {
                server: self.server.clone(),
                reason: "session closed".to_string(),
            });
        }

        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|e| McpError::ConnectionFailed {
            server: self.server.clone(),
            reason: e.to_string(),
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            && let Ok(mut slot) = self.session_id.lock()
        {
            *slot = Some(session.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(McpError::ConnectionFailed {
                server: self.server.clone(),
                reason: format!("HTTP {}: {}", status.as_u16(), preview),
            });
        }
        Ok(response)
    }
}

/// Pick the response with `id` out of an event-stream body.
fn find_in_event_stream(body: &str, id: u64) -> Option<JsonRpcMessage> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<JsonRpcMessage>(data.trim()).ok())
        .find(|msg| msg.response_id() == Some(id))
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self.post(&JsonRpcRequest::new(id, method, params)).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));
        let body = response.text().await.map_err(|e| McpError::ConnectionFailed {
            server: self.server.clone(),
            reason: format!("Failed to read response: {}", e),
        })?;

        let protocol = |message: String| McpError::Protocol {
            server: self.server.clone(),
            message,
        };
        let msg = if is_stream {
            find_in_event_stream(&body, id)
                .ok_or_else(|| protocol(format!("no response to {} in event stream", method)))?
        } else {
            serde_json::from_str::<JsonRpcMessage>(&body)
                .map_err(|e| protocol(format!("invalid JSON-RPC response: {}", e)))?
        };

        msg.into_result()
            .map_err(|e| protocol(format!("{} failed: {}", method, e)))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), McpError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(session) = self.session_id() else {
            return Ok(());
        };

        // Servers may not support explicit termination; that is not an error.
        if let Err(e) = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session)
            .send()
            .await
        {
            tracing::debug!(server = %self.server, error = %e, "MCP session termination failed");
        }
        Ok(())
    }
}

impl Drop for HttpTransport {
    /// Sessions dropped without `close` (e.g. a cancelled connect) are
    /// terminated in the background when a runtime is available.
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(session) = self.session_id() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let request = self
            .client
            .delete(&self.url)
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session);
        let server = self.server.clone();
        runtime.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(server = %server, error = %e, "MCP session termination on drop failed");
            }
        });
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("server", &self.server)
            .field("url", &self.url)
            .field("alive", &self.is_alive())
            .finish()
    }
}
