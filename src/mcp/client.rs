use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use super::jsonrpc::{jsonrpc_error, jsonrpc_notification, jsonrpc_request, jsonrpc_response};
use super::PROTOCOL_VERSION;
use crate::error::{Error, Result};
use crate::tools::ToolSpec;
use crate::transport::{SubprocessTransport, Transport, TransportWriter};
use crate::types::{CallToolResult, McpServerInfo, NamedServer};

/// How long a tool server gets to answer `initialize`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsPage {
    #[serde(default)]
    tools: Vec<ToolSpec>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    #[serde(default)]
    server_info: Option<McpServerInfo>,
}

/// MCP client session with one external tool server.
///
/// Requests are correlated with responses by id; a router task owns the
/// incoming side of the transport and answers server-initiated `ping`s.
pub struct McpClient {
    name: String,
    transport: Mutex<Box<dyn Transport>>,
    writer: TransportWriter,
    pending: PendingMap,
    next_id: AtomicU64,
    cancel: CancellationToken,
    server_info: Option<McpServerInfo>,
    tools: Vec<ToolSpec>,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("name", &self.name)
            .field("server_info", &self.server_info)
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

impl McpClient {
    /// Start the server process described by `server` and complete the handshake.
    pub async fn spawn(server: NamedServer) -> Result<Self> {
        let name = server.name.clone();
        Self::connect(name, Box::new(SubprocessTransport::new(server)), HANDSHAKE_TIMEOUT).await
    }

    /// Connect over `transport`, run `initialize`, and fetch the tool list.
    ///
    /// On any failure the transport is closed before the error is returned.
    pub async fn connect(
        name: impl Into<String>,
        mut transport: Box<dyn Transport>,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let name = name.into();
        let (raw_rx, writer) = transport.connect().await?;

        let mut client = Self {
            name,
            transport: Mutex::new(transport),
            writer,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            server_info: None,
            tools: Vec::new(),
        };
        client.spawn_router(raw_rx);

        match client.handshake(handshake_timeout).await {
            Ok(()) => {
                tracing::info!(
                    server = %client.name,
                    tools = client.tools.len(),
                    "connected to tool server"
                );
                Ok(client)
            }
            Err(e) => {
                if let Err(close_err) = client.close().await {
                    tracing::warn!(server = %client.name, "error closing after failed handshake: {close_err}");
                }
                Err(e)
            }
        }
    }

    /// `initialize`, the `initialized` notification and every `tools/list`
    /// page, all within `timeout`.
    async fn handshake(&mut self, timeout: Duration) -> Result<()> {
        let (server_info, tools) = tokio::time::timeout(timeout, self.exchange_hello())
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        self.server_info = server_info;
        self.tools = tools;
        Ok(())
    }

    async fn exchange_hello(&self) -> Result<(Option<McpServerInfo>, Vec<ToolSpec>)> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let init: InitializeResult = serde_json::from_value(self.request("initialize", params).await?)?;

        self.writer
            .write(jsonrpc_notification("notifications/initialized", None))
            .await?;

        let tools = self.fetch_tools().await?;
        Ok((init.server_info, tools))
    }

    async fn fetch_tools(&self) -> Result<Vec<ToolSpec>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({"cursor": c}),
                None => json!({}),
            };
            let page: ListToolsPage = serde_json::from_value(self.request("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.cancel.is_cancelled() {
            return Err(Error::TransportClosed);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        if let Err(e) = self.writer.write(jsonrpc_request(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        tokio::select! {
            outcome = rx => outcome.map_err(|_| Error::TransportClosed)?,
            _ = self.cancel.cancelled() => {
                self.pending.lock().await.remove(&id);
                Err(Error::TransportClosed)
            }
        }
    }

    /// Invoke a tool on the server.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Tools advertised during the handshake.
    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_info(&self) -> Option<&McpServerInfo> {
        self.server_info.as_ref()
    }

    /// Stop the router and the server. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        self.pending.lock().await.clear();
        self.transport.lock().await.close().await
    }

    fn spawn_router(&self, mut raw_rx: mpsc::Receiver<Result<Value>>) {
        let pending = self.pending.clone();
        let writer = self.writer.clone();
        let cancel = self.cancel.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = raw_rx.recv() => {
                        match msg {
                            Some(Ok(value)) => route_incoming(&name, value, &pending, &writer).await,
                            Some(Err(e)) => {
                                tracing::warn!(server = %name, "transport error: {e}");
                                break;
                            }
                            None => break,
                        }
                    }
                }
            }
            // Dropping the senders fails every in-flight request.
            cancel.cancel();
            pending.lock().await.clear();
            tracing::debug!(server = %name, "router stopped");
        });
    }
}

/// Opens client sessions for server specifications.
#[async_trait]
pub trait ServerConnector: Send + Sync {
    async fn connect(&self, server: &NamedServer) -> Result<McpClient>;
}

/// Connects by spawning the configured command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnConnector;

#[async_trait]
impl ServerConnector for SpawnConnector {
    async fn connect(&self, server: &NamedServer) -> Result<McpClient> {
        McpClient::spawn(server.clone()).await
    }
}

async fn route_incoming(name: &str, value: Value, pending: &PendingMap, writer: &TransportWriter) {
    let method = value.get("method").and_then(Value::as_str);
    let id = value.get("id").cloned();

    match (method, id) {
        // Response to one of our requests.
        (None, Some(id)) => {
            let Some(id) = id.as_u64() else {
                tracing::warn!(server = name, "response with non-numeric id: {id}");
                return;
            };
            let outcome = match value.get("error") {
                Some(err) => Err(Error::Mcp {
                    code: err.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                    message: err
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                }),
                None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
            };
            match pending.lock().await.remove(&id) {
                Some(tx) => {
                    let _ = tx.send(outcome);
                }
                None => tracing::warn!(server = name, id, "response for unknown request"),
            }
        }
        // Request from the server.
        (Some(method), Some(id)) => {
            let reply = match method {
                "ping" => jsonrpc_response(Some(id), json!({})),
                other => jsonrpc_error(Some(id), -32601, &format!("method not found: {other}")),
            };
            if let Err(e) = writer.write(reply).await {
                tracing::warn!(server = name, "failed to answer server request: {e}");
            }
        }
        (Some(method), None) => {
            tracing::trace!(server = name, method, "server notification");
        }
        (None, None) => tracing::warn!(server = name, "unroutable message: {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::testing::FakeServer;

    async fn connect_fake(server: FakeServer) -> Result<McpClient> {
        McpClient::connect("fake", Box::new(server), HANDSHAKE_TIMEOUT).await
    }

    #[tokio::test]
    async fn handshake_collects_every_page_of_tools() {
        let client = connect_fake(FakeServer::with_tools(&["echo", "fail", "third"]).page_size(2))
            .await
            .unwrap();
        let names: Vec<&str> = client.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "fail", "third"]);
        assert_eq!(client.server_info().unwrap().name, "fake-server");
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn call_tool_returns_content() {
        let client = connect_fake(FakeServer::with_tools(&["echo"])).await.unwrap();
        let result = client.call_tool("echo", json!({"text": "hello"})).await.unwrap();
        assert_eq!(result.joined_text(), "hello");
        assert!(!result.is_error);

        let result = client.call_tool("fail", json!({})).await.unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn protocol_errors_carry_code() {
        let client = connect_fake(FakeServer::with_tools(&["echo"])).await.unwrap();
        match client.request("resources/list", json!({})).await {
            Err(Error::Mcp { code, .. }) => assert_eq!(code, -32601),
            other => panic!("expected Mcp error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let result = McpClient::connect(
            "silent",
            Box::new(FakeServer::silent()),
            Duration::from_secs(60),
        )
        .await;
        match result {
            Err(Error::Timeout(d)) => assert_eq!(d, Duration::from_secs(60)),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_tool_listing_times_out() {
        let server = FakeServer::with_tools(&["echo"]).answering(&["initialize"]);
        let result = tokio::time::timeout(
            Duration::from_secs(3600),
            McpClient::connect("half-open", Box::new(server), Duration::from_secs(60)),
        )
        .await
        .expect("connect must give up within the handshake timeout");
        match result {
            Err(Error::Timeout(d)) => assert_eq!(d, Duration::from_secs(60)),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn requests_fail_after_close() {
        let client = connect_fake(FakeServer::with_tools(&["echo"])).await.unwrap();
        client.close().await.unwrap();
        assert!(client.call_tool("echo", json!({"text": "x"})).await.is_err());
    }
}
