use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::{NativeTool, ToolSpec};
use crate::agent::{dispatch, Agent};
use crate::mcp::McpClient;
use crate::types::{ToolCall, ToolOutput};

enum Route {
    Server(Arc<McpClient>),
    Native(NativeTool),
    SubAgent(Arc<Agent>),
}

/// The tools of one initialized agent, keyed by the name the model sees.
#[derive(Default)]
pub struct Toolbox {
    specs: Vec<ToolSpec>,
    routes: HashMap<String, Route>,
    clients: Vec<Arc<McpClient>>,
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("tools", &self.specs.iter().map(|s| &s.name).collect::<Vec<_>>())
            .field("servers", &self.clients.len())
            .finish()
    }
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool a connected server advertised.
    pub fn add_server(&mut self, client: McpClient) {
        let client = Arc::new(client);
        for spec in client.tools() {
            self.insert(spec.clone(), Route::Server(client.clone()));
        }
        self.clients.push(client);
    }

    pub fn add_native(&mut self, tool: NativeTool) {
        self.insert(tool.spec.clone(), Route::Native(tool));
    }

    /// Expose another agent as `agent_<normalized name>`.
    pub fn add_sub_agent(&mut self, agent: Arc<Agent>) {
        let spec = ToolSpec {
            name: agent.tool_name(),
            description: agent.description().to_string(),
            input_schema: dispatch::agent_tool_schema(),
        };
        self.insert(spec, Route::SubAgent(agent));
    }

    fn insert(&mut self, spec: ToolSpec, route: Route) {
        if self.routes.contains_key(&spec.name) {
            tracing::warn!(tool = %spec.name, "duplicate tool name, keeping the first definition");
            return;
        }
        self.routes.insert(spec.name.clone(), route);
        self.specs.push(spec);
    }

    /// Tools in registration order.
    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn server_count(&self) -> usize {
        self.clients.len()
    }

    /// Run one tool call. Failures come back as error output for the model.
    pub async fn call(&self, call: &ToolCall) -> ToolOutput {
        let Some(route) = self.routes.get(&call.name) else {
            return ToolOutput::error(format!("unknown tool: {}", call.name));
        };

        tracing::debug!(tool = %call.name, "calling tool");
        match route {
            Route::Server(client) => match client.call_tool(&call.name, call.input.clone()).await {
                Ok(result) => result.into(),
                Err(e) => ToolOutput::error(format!("tool {} failed: {e}", call.name)),
            },
            Route::Native(tool) => tool.call(call.input.clone()).await,
            Route::SubAgent(agent) => agent.call_as_tool(call.input.clone()).await,
        }
    }

    /// Close every server connection.
    pub async fn close(&self) {
        let results = join_all(self.clients.iter().map(|c| c.close())).await;
        for (client, result) in self.clients.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(server = %client.name(), "error closing tool server: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::client::ServerConnector;
    use crate::mcp::testing::FakeConnector;
    use crate::tools::NativeOperations;
    use crate::types::{InlineToolConfig, McpServerConfig, NamedServer};
    use serde_json::json;

    fn native(name: &str) -> NativeTool {
        NativeOperations::builtin()
            .resolve(&InlineToolConfig {
                name: name.into(),
                description: String::new(),
                parameters: json!({"type": "object"}),
                execute: None,
            })
            .unwrap()
    }

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "1".into(),
            name: name.into(),
            input,
        }
    }

    #[tokio::test]
    async fn routes_to_server_and_native_tools() {
        let connector = FakeConnector::new(&["echo", "fail"]);
        let server = NamedServer {
            name: "fake".into(),
            config: McpServerConfig::new("fake", &[]),
        };
        let mut toolbox = Toolbox::new();
        toolbox.add_server(connector.connect(&server).await.unwrap());
        toolbox.add_native(native("add"));

        let names: Vec<&str> = toolbox.specs().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "fail", "add"]);

        let out = toolbox.call(&call("echo", json!({"text": "hi"}))).await;
        assert_eq!(out, ToolOutput::text("hi"));
        assert!(toolbox.call(&call("fail", json!({}))).await.is_error);
        assert_eq!(
            toolbox.call(&call("add", json!({"number1": 1, "number2": 2}))).await.text,
            "3"
        );
        toolbox.close().await;
    }

    #[tokio::test]
    async fn unknown_tool_is_error_output() {
        let toolbox = Toolbox::new();
        let out = toolbox.call(&call("nope", json!({}))).await;
        assert!(out.is_error);
        assert!(out.text.contains("nope"));
    }

    #[test]
    fn first_definition_wins() {
        let mut toolbox = Toolbox::new();
        toolbox.add_native(native("add"));
        let mut shadow = native("subtract");
        shadow.spec.name = "add".into();
        toolbox.add_native(shadow);
        assert_eq!(toolbox.specs().len(), 1);
    }
}
