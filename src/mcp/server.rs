use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::jsonrpc::{self, JsonRpcAction};
use crate::agent::dispatch::{agent_tool_schema, AgentToolArgs};
use crate::agent::{run_agent, AgentRegistry, StepEvent};
use crate::error::{Error, Result};
use crate::tools::ToolSpec;
use crate::types::CallToolResult;

const OUTGOING_CAPACITY: usize = 256;
const PROGRESS_CAPACITY: usize = 16;

/// MCP server exposing each registered agent as one tool.
pub struct AgentServer {
    registry: Arc<AgentRegistry>,
}

impl AgentServer {
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Descriptors for `tools/list`: exposed agents only.
    pub fn list_tools(&self) -> Vec<ToolSpec> {
        self.registry
            .exposed()
            .map(|agent| ToolSpec {
                name: agent.tool_name(),
                description: agent.description().to_string(),
                input_schema: agent_tool_schema(),
            })
            .collect()
    }

    /// Run the agent behind tool `name`.
    ///
    /// Lookup and argument errors are returned as `Err`; failures while
    /// initializing or generating become an error result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        progress: Option<mpsc::Sender<StepEvent>>,
    ) -> Result<CallToolResult> {
        let agent = self
            .registry
            .by_tool_name(name)
            .filter(|a| a.is_exposed())
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;

        let args: AgentToolArgs =
            serde_json::from_value(arguments).map_err(|e| Error::ToolCallValidation {
                tool: name.to_string(),
                reason: e.to_string(),
            })?;

        match run_agent(agent, &args.prompt, &args.context, progress).await {
            Ok(response) => Ok(CallToolResult::text(response.text)),
            Err(e) => {
                tracing::error!(tool = name, "agent call failed: {e}");
                Ok(CallToolResult::error(e.to_string()))
            }
        }
    }

    /// Handle one JSONRPC message and return the reply, if any.
    ///
    /// Progress notifications for `tools/call` are written to `outgoing`
    /// before the reply is returned.
    pub async fn handle_message(&self, message: Value, outgoing: Option<&mpsc::Sender<Value>>) -> Option<Value> {
        let tools = self.list_tools();
        let Some(action) = jsonrpc::route_jsonrpc(&message, &tools) else {
            return Some(jsonrpc::jsonrpc_error(
                message.get("id").cloned(),
                -32600,
                "invalid request",
            ));
        };

        match action {
            JsonRpcAction::Response { id, result } => Some(jsonrpc::jsonrpc_response(id, result)),

            JsonRpcAction::ToolCall {
                id,
                tool_name,
                arguments,
                progress_token,
            } => {
                let (progress, forwarder) = match (progress_token, outgoing) {
                    (Some(token), Some(out)) => {
                        let (tx, rx) = mpsc::channel(PROGRESS_CAPACITY);
                        (Some(tx), Some(tokio::spawn(forward_progress(rx, token, out.clone()))))
                    }
                    _ => (None, None),
                };

                let result = self.call_tool(&tool_name, arguments, progress).await;
                if let Some(forwarder) = forwarder {
                    let _ = forwarder.await;
                }

                Some(match result {
                    Ok(result) => match serde_json::to_value(&result) {
                        Ok(value) => jsonrpc::jsonrpc_response(id, value),
                        Err(e) => jsonrpc::jsonrpc_error(id, -32603, &e.to_string()),
                    },
                    Err(e) => jsonrpc::jsonrpc_error(id, e.jsonrpc_code(), &e.to_string()),
                })
            }

            JsonRpcAction::Error { id, code, message } => Some(jsonrpc::jsonrpc_error(id, code, &message)),

            JsonRpcAction::None => None,
        }
    }

    /// Serve newline-delimited JSONRPC until `reader` reaches EOF.
    ///
    /// Every `tools/call` runs in its own task; all output goes through one
    /// writer task. At EOF, in-flight calls are allowed to finish.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel::<Value>(OUTGOING_CAPACITY);
        let writer_task = tokio::spawn(write_messages(out_rx, writer));
        let mut calls = JoinSet::new();

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message: Value = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("unparseable message: {e}");
                    let _ = out_tx.send(jsonrpc::jsonrpc_error(None, -32700, "parse error")).await;
                    continue;
                }
            };

            let is_call = message.get("method").and_then(Value::as_str) == Some("tools/call");
            if is_call {
                let server = self.clone();
                let out = out_tx.clone();
                calls.spawn(async move {
                    if let Some(reply) = server.handle_message(message, Some(&out)).await {
                        let _ = out.send(reply).await;
                    }
                });
            } else if let Some(reply) = self.handle_message(message, Some(&out_tx)).await {
                if out_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }

        tracing::info!(in_flight = calls.len(), "input closed");
        while let Some(joined) = calls.join_next().await {
            if let Err(e) = joined {
                tracing::error!("tool call task failed: {e}");
            }
        }
        drop(out_tx);
        writer_task
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

async fn forward_progress(mut rx: mpsc::Receiver<StepEvent>, token: Value, out: mpsc::Sender<Value>) {
    while let Some(event) = rx.recv().await {
        let message = jsonrpc::progress_notification(&token, event.step, event.total, &event.summary());
        if out.send(message).await.is_err() {
            break;
        }
    }
}

async fn write_messages<W>(mut rx: mpsc::Receiver<Value>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        let mut data = serde_json::to_string(&message)?;
        data.push('\n');
        writer.write_all(data.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
