use serde_json::{json, Value};

use super::PROTOCOL_VERSION;
use crate::tools::ToolSpec;

/// Name this process reports in `initialize` results.
pub const SERVER_NAME: &str = "mcp-agent-server";

/// Route a JSONRPC message received by the agent server.
///
/// Returns `None` for messages that are not requests at all.
pub fn route_jsonrpc(request: &Value, tools: &[ToolSpec]) -> Option<JsonRpcAction> {
    let Some(method) = request.get("method").and_then(Value::as_str) else {
        // Responses from the host need no reply.
        if request.get("result").is_some() || request.get("error").is_some() {
            return Some(JsonRpcAction::None);
        }
        return None;
    };
    let id = request.get("id").cloned();

    // Notifications never get a reply, known or not.
    if id.is_none() {
        if method != "notifications/initialized" && method != "notifications/cancelled" {
            tracing::debug!(method, "ignoring notification");
        }
        return Some(JsonRpcAction::None);
    }

    match method {
        "initialize" => Some(JsonRpcAction::Response {
            id,
            result: json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        }),

        "ping" => Some(JsonRpcAction::Response {
            id,
            result: json!({}),
        }),

        "tools/list" => {
            let tools_list: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "inputSchema": t.input_schema,
                    })
                })
                .collect();

            Some(JsonRpcAction::Response {
                id,
                result: json!({ "tools": tools_list }),
            })
        }

        "tools/call" => {
            let params = request.get("params");
            let Some(tool_name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
                return Some(JsonRpcAction::Error {
                    id,
                    code: -32602,
                    message: "tools/call requires a tool name".into(),
                });
            };
            let arguments = params
                .and_then(|p| p.get("arguments"))
                .cloned()
                .unwrap_or_else(|| Value::Object(Default::default()));
            let progress_token = params
                .and_then(|p| p.get("_meta"))
                .and_then(|m| m.get("progressToken"))
                .cloned();

            Some(JsonRpcAction::ToolCall {
                id,
                tool_name: tool_name.to_string(),
                arguments,
                progress_token,
            })
        }

        _ => Some(JsonRpcAction::Error {
            id,
            code: -32601,
            message: format!("method not found: {method}"),
        }),
    }
}

/// Action to take after routing a JSONRPC request.
#[derive(Debug)]
pub enum JsonRpcAction {
    /// Send a response immediately.
    Response { id: Option<Value>, result: Value },
    /// Run an agent (async), then send response.
    ToolCall {
        id: Option<Value>,
        tool_name: String,
        arguments: Value,
        progress_token: Option<Value>,
    },
    /// Send an error response.
    Error {
        id: Option<Value>,
        code: i64,
        message: String,
    },
    /// No response needed (notifications).
    None,
}

/// Build a JSONRPC request.
pub fn jsonrpc_request(id: u64, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

/// Build a JSONRPC notification.
pub fn jsonrpc_notification(method: &str, params: Option<Value>) -> Value {
    let mut message = json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        message["params"] = params;
    }
    message
}

/// Build a JSONRPC success response.
pub fn jsonrpc_response(id: Option<Value>, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Build a JSONRPC error response.
pub fn jsonrpc_error(id: Option<Value>, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

/// Build a `notifications/progress` message.
pub fn progress_notification(token: &Value, progress: u32, total: u32, message: &str) -> Value {
    jsonrpc_notification(
        "notifications/progress",
        Some(json!({
            "progressToken": token,
            "progress": progress,
            "total": total,
            "message": message,
        })),
    )
}
