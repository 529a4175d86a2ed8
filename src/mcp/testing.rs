//! In-memory MCP tool server for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::client::{McpClient, ServerConnector};
use super::jsonrpc::{jsonrpc_error, jsonrpc_response};
use crate::error::{Error, Result};
use crate::types::NamedServer;
use crate::transport::{Transport, TransportWriter};

/// Answers `initialize`, paginated `tools/list`, and `tools/call` for
/// `echo` (returns `arguments.text`) and `fail` (returns an error result).
pub(crate) struct FakeServer {
    tools: Vec<String>,
    page_size: usize,
    answers: Option<&'static [&'static str]>,
    cancel: CancellationToken,
    ready: bool,
}

impl FakeServer {
    pub(crate) fn with_tools(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            page_size: usize::MAX,
            answers: None,
            cancel: CancellationToken::new(),
            ready: false,
        }
    }

    /// A server that never answers anything.
    pub(crate) fn silent() -> Self {
        Self::with_tools(&[]).answering(&[])
    }

    /// Answer only the listed methods; every other request goes unanswered.
    pub(crate) fn answering(mut self, methods: &'static [&'static str]) -> Self {
        self.answers = Some(methods);
        self
    }

    pub(crate) fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }
}

fn answer(request: &Value, tools: &[String], page_size: usize) -> Option<Value> {
    let id = request.get("id").cloned()?;
    let method = request.get("method").and_then(Value::as_str)?;
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let reply = match method {
        "initialize" => jsonrpc_response(
            Some(id),
            json!({
                "protocolVersion": super::PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake-server", "version": "0.1.0"}
            }),
        ),
        "tools/list" => {
            let start: usize = params["cursor"]
                .as_str()
                .and_then(|c| c.parse().ok())
                .unwrap_or(0)
                .min(tools.len());
            let end = start.saturating_add(page_size).min(tools.len());
            let page: Vec<Value> = tools[start..end]
                .iter()
                .map(|name| {
                    json!({
                        "name": name,
                        "description": format!("fake {name}"),
                        "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}
                    })
                })
                .collect();
            let mut result = json!({"tools": page});
            if end < tools.len() {
                result["nextCursor"] = json!(end.to_string());
            }
            jsonrpc_response(Some(id), result)
        }
        "tools/call" => match params["name"].as_str() {
            Some("echo") => jsonrpc_response(
                Some(id),
                json!({"content": [{"type": "text", "text": params["arguments"]["text"]}]}),
            ),
            Some("fail") => jsonrpc_response(
                Some(id),
                json!({"content": [{"type": "text", "text": "tool failed"}], "isError": true}),
            ),
            _ => jsonrpc_error(Some(id), -32602, "unknown tool"),
        },
        other => jsonrpc_error(Some(id), -32601, &format!("method not found: {other}")),
    };
    Some(reply)
}

#[async_trait]
impl Transport for FakeServer {
    async fn connect(&mut self) -> Result<(mpsc::Receiver<Result<Value>>, TransportWriter)> {
        let (read_tx, read_rx) = mpsc::channel::<Result<Value>>(16);
        let (write_tx, mut write_rx) = mpsc::channel::<Value>(16);

        let tools = self.tools.clone();
        let page_size = self.page_size;
        let answers = self.answers;
        let cancel = self.cancel.clone();
        self.ready = true;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = write_rx.recv() => {
                        let Some(request) = msg else { break };
                        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
                        if answers.is_some_and(|allowed| !allowed.contains(&method)) {
                            continue;
                        }
                        if let Some(reply) = answer(&request, &tools, page_size) {
                            if read_tx.send(Ok(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok((read_rx, TransportWriter::new(write_tx)))
    }

    async fn close(&mut self) -> Result<()> {
        self.ready = false;
        self.cancel.cancel();
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Connects every server to a [`FakeServer`] and counts connections.
///
/// Servers whose command is `missing` fail like an unresolvable binary.
pub(crate) struct FakeConnector {
    tools: Vec<&'static str>,
    connects: AtomicUsize,
    delay: Duration,
}

impl FakeConnector {
    pub(crate) fn new(tools: &[&'static str]) -> Self {
        Self {
            tools: tools.to_vec(),
            connects: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Hold each connection attempt open for `delay`.
    pub(crate) fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServerConnector for FakeConnector {
    async fn connect(&self, server: &NamedServer) -> Result<McpClient> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if server.config.command == "missing" {
            return Err(Error::ServerSpawn {
                server: server.name.clone(),
                reason: "failed to run 'missing': No such file or directory".into(),
            });
        }
        McpClient::connect(
            server.name.clone(),
            Box::new(FakeServer::with_tools(&self.tools)),
            Duration::from_secs(5),
        )
        .await
    }
}
