//! Runtime agents: a model bound to a resolved set of tools.

pub mod builder;
pub mod dispatch;
pub mod progress;
pub mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, OnceCell};

use crate::error::{Error, Result};
use crate::mcp::client::ServerConnector;
use crate::model::{LanguageModel, ModelRequest};
use crate::tools::{NativeTool, Toolbox};
use crate::types::{AgentConfig, AgentResponse, ChatMessage, FinishReason, NamedServer, ToolOutput};

pub use builder::AgentBuilder;
pub use dispatch::{compose_prompt, dispatch, run_agent, AgentToolArgs};
pub use progress::{StepEvent, ToolCallStep};
pub use registry::{normalize, AgentRegistry, TOOL_PREFIX};

/// Step ceiling of one generation loop.
pub const MAX_STEPS: u32 = 100;

/// A resolved entry of an agent's tool configuration.
pub enum Capability {
    /// External servers, connected on initialization.
    Servers(Vec<NamedServer>),
    /// An inline tool bound to its native operation.
    Native(NativeTool),
    /// Another agent, callable as a tool.
    SubAgent(Arc<Agent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    ExternalServer,
    Inline,
    SubAgent,
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::Servers(_) => CapabilityKind::ExternalServer,
            Capability::Native(_) => CapabilityKind::Inline,
            Capability::SubAgent(_) => CapabilityKind::SubAgent,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Servers(servers) => f
                .debug_tuple("Servers")
                .field(&servers.iter().map(|s| &s.name).collect::<Vec<_>>())
                .finish(),
            Capability::Native(tool) => f.debug_tuple("Native").field(&tool.spec.name).finish(),
            Capability::SubAgent(agent) => f.debug_tuple("SubAgent").field(&agent.name).finish(),
        }
    }
}

/// A model plus its tools, addressable by name.
///
/// Tool servers are connected lazily by [`Agent::initialize`]; the first call
/// does the work and concurrent callers wait for it. After [`Agent::close`]
/// the agent cannot be initialized again.
pub struct Agent {
    name: String,
    description: String,
    system_prompt: Option<String>,
    expose: bool,
    model: Arc<dyn LanguageModel>,
    capabilities: Vec<Capability>,
    connector: Arc<dyn ServerConnector>,
    toolbox: OnceCell<Toolbox>,
    closed: AtomicBool,
    max_steps: u32,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model.id())
            .field("capabilities", &self.capabilities)
            .field("initialized", &self.is_initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Agent {
    pub fn new(
        config: &AgentConfig,
        model: Arc<dyn LanguageModel>,
        capabilities: Vec<Capability>,
        connector: Arc<dyn ServerConnector>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            description: config.description.clone(),
            system_prompt: config.system_prompt.clone(),
            expose: config.expose,
            model,
            capabilities,
            connector,
            toolbox: OnceCell::new(),
            closed: AtomicBool::new(false),
            max_steps: MAX_STEPS,
        }
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn is_exposed(&self) -> bool {
        self.expose
    }

    /// Normalized name.
    pub fn key(&self) -> String {
        normalize(&self.name)
    }

    /// Name under which the agent is offered as a tool.
    pub fn tool_name(&self) -> String {
        format!("{TOOL_PREFIX}{}", self.key())
    }

    pub fn model_id(&self) -> String {
        self.model.id()
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn is_initialized(&self) -> bool {
        self.toolbox.initialized()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Tools offered to the model, once initialized.
    pub fn toolbox(&self) -> Option<&Toolbox> {
        self.toolbox.get()
    }

    /// Connect every configured tool server. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::AgentClosed(self.name.clone()));
        }
        self.toolbox.get_or_try_init(|| self.open_toolbox()).await?;

        // Closed while connecting: release what was just opened.
        if self.is_closed() {
            if let Some(toolbox) = self.toolbox.get() {
                toolbox.close().await;
            }
            return Err(Error::AgentClosed(self.name.clone()));
        }
        Ok(())
    }

    async fn open_toolbox(&self) -> Result<Toolbox> {
        let mut toolbox = Toolbox::new();
        for capability in &self.capabilities {
            match capability {
                Capability::Servers(servers) => {
                    for server in servers {
                        match self.connector.connect(server).await {
                            Ok(client) => toolbox.add_server(client),
                            Err(e) => {
                                toolbox.close().await;
                                return Err(match e {
                                    e @ Error::ServerSpawn { .. } => e,
                                    other => Error::ServerSpawn {
                                        server: server.name.clone(),
                                        reason: other.to_string(),
                                    },
                                });
                            }
                        }
                    }
                }
                Capability::Native(tool) => toolbox.add_native(tool.clone()),
                Capability::SubAgent(agent) => toolbox.add_sub_agent(agent.clone()),
            }
        }
        tracing::info!(
            agent = %self.name,
            tools = toolbox.specs().len(),
            servers = toolbox.server_count(),
            "agent initialized"
        );
        Ok(toolbox)
    }

    /// Release every tool-server connection.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(toolbox) = self.toolbox.get() {
            toolbox.close().await;
        }
        tracing::debug!(agent = %self.name, "agent closed");
    }

    /// Run the generate-and-call-tools loop on `prompt`.
    ///
    /// Each step is one model call followed by every tool call it requested,
    /// in order. A [`StepEvent`] is sent after each step; sending waits for
    /// channel capacity, so events arrive in step order.
    pub async fn generate(
        &self,
        prompt: &str,
        progress: Option<mpsc::Sender<StepEvent>>,
    ) -> Result<AgentResponse> {
        self.initialize().await?;
        let toolbox = self
            .toolbox
            .get()
            .ok_or_else(|| Error::AgentClosed(self.name.clone()))?;

        let mut messages = vec![ChatMessage::user(prompt)];
        let mut last_text = String::new();

        for step in 0..self.max_steps {
            let turn = self
                .model
                .generate(ModelRequest {
                    system: self.system_prompt.as_deref(),
                    messages: &messages,
                    tools: toolbox.specs(),
                })
                .await?;
            last_text = turn.text.clone();

            let mut calls = Vec::with_capacity(turn.tool_calls.len());
            if turn.has_tool_calls() {
                messages.push(ChatMessage::assistant(turn.text, turn.tool_calls.clone()));
                for call in turn.tool_calls {
                    let output = toolbox.call(&call).await;
                    if output.is_error {
                        tracing::debug!(agent = %self.name, tool = %call.name, "tool returned error: {}", output.text);
                    }
                    messages.push(ChatMessage::ToolResult {
                        call_id: call.id,
                        content: output.text.clone(),
                        is_error: output.is_error,
                    });
                    calls.push(ToolCallStep {
                        name: call.name,
                        input: call.input,
                        output: output.text,
                        is_error: output.is_error,
                    });
                }
            }

            let done = calls.is_empty();
            if let Some(tx) = &progress {
                let event = StepEvent {
                    step,
                    total: self.max_steps,
                    calls,
                };
                if tx.send(event).await.is_err() {
                    tracing::debug!(agent = %self.name, "progress receiver dropped");
                }
            }

            if done {
                return Ok(AgentResponse {
                    text: last_text,
                    steps: step + 1,
                    finish_reason: FinishReason::Stop,
                });
            }
        }

        tracing::warn!(agent = %self.name, max_steps = self.max_steps, "step limit reached");
        Ok(AgentResponse {
            text: last_text,
            steps: self.max_steps,
            finish_reason: FinishReason::StepLimit,
        })
    }

    /// Run as a sub-agent tool on `{context, prompt}` input.
    pub fn call_as_tool(&self, input: Value) -> BoxFuture<'_, ToolOutput> {
        async move {
            let args: AgentToolArgs = match serde_json::from_value(input) {
                Ok(args) => args,
                Err(e) => {
                    let err = Error::ToolCallValidation {
                        tool: self.tool_name(),
                        reason: e.to_string(),
                    };
                    return ToolOutput::error(err.to_string());
                }
            };
            match run_agent(self, &args.prompt, &args.context, None).await {
                Ok(response) => ToolOutput::text(response.text),
                Err(e) => ToolOutput::error(e.to_string()),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::testing::FakeConnector;
    use crate::model::testing::{call, ScriptedModel};
    use crate::tools::NativeOperations;
    use crate::types::{InlineToolConfig, McpServerConfig, ModelConfig, ModelTurn};
    use serde_json::json;
    use std::time::Duration;

    fn config(name: &str) -> AgentConfig {
        AgentConfig::new(name, format!("{name} description"), ModelConfig::new("openai", "gpt-4o-mini"))
    }

    fn server(name: &str, command: &str) -> NamedServer {
        NamedServer {
            name: name.into(),
            config: McpServerConfig::new(command, &[]),
        }
    }

    fn native(name: &str) -> Capability {
        let tool = NativeOperations::builtin()
            .resolve(&InlineToolConfig {
                name: name.into(),
                description: format!("{name} two numbers"),
                parameters: json!({"type": "object"}),
                execute: None,
            })
            .unwrap();
        Capability::Native(tool)
    }

    #[tokio::test]
    async fn concurrent_initialize_connects_once() {
        let connector = Arc::new(FakeConnector::new(&["echo"]).slow(Duration::from_millis(20)));
        let agent = Agent::new(
            &config("Memory Agent"),
            Arc::new(ScriptedModel::default()),
            vec![Capability::Servers(vec![server("memory", "npx")])],
            connector.clone(),
        );

        let results = futures::future::join_all((0..5).map(|_| agent.initialize())).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(connector.connects(), 1);

        agent.initialize().await.unwrap();
        assert_eq!(connector.connects(), 1);
        assert!(agent.toolbox().unwrap().contains("echo"));
        agent.close().await;
    }

    #[tokio::test]
    async fn closed_agent_refuses_to_initialize() {
        let agent = Agent::new(
            &config("A"),
            Arc::new(ScriptedModel::default()),
            vec![],
            Arc::new(FakeConnector::new(&[])),
        );
        agent.initialize().await.unwrap();
        agent.close().await;
        assert!(matches!(agent.initialize().await, Err(Error::AgentClosed(_))));
        assert!(matches!(agent.generate("hi", None).await, Err(Error::AgentClosed(_))));
    }

    #[tokio::test]
    async fn failed_server_aborts_initialization() {
        let connector = Arc::new(FakeConnector::new(&["echo"]));
        let agent = Agent::new(
            &config("A"),
            Arc::new(ScriptedModel::default()),
            vec![Capability::Servers(vec![server("ok", "npx"), server("broken", "missing")])],
            connector.clone(),
        );
        match agent.initialize().await {
            Err(Error::ServerSpawn { server, .. }) => assert_eq!(server, "broken"),
            other => panic!("expected ServerSpawn, got {other:?}"),
        }
        assert!(!agent.is_initialized());
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelTurn {
                text: String::new(),
                tool_calls: vec![call("c1", "divide", json!({"number1": 1, "number2": 0}))],
            },
            ModelTurn::text("cannot divide by zero"),
        ]));
        let agent = Agent::new(
            &config("Calc").with_system_prompt("You are a calculator."),
            model.clone(),
            vec![native("divide")],
            Arc::new(FakeConnector::new(&[])),
        );

        let response = agent.generate("1/0", None).await.unwrap();
        assert_eq!(response.text, "cannot divide by zero");
        assert_eq!(response.steps, 2);
        assert_eq!(response.finish_reason, FinishReason::Stop);

        let seen = model.seen();
        assert_eq!(seen[0].system.as_deref(), Some("You are a calculator."));
        assert_eq!(seen[0].tools, vec!["divide"]);
        match &seen[1].messages[2] {
            ChatMessage::ToolResult { is_error, content, .. } => {
                assert!(*is_error);
                assert!(content.contains("division by zero"));
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn loop_stops_at_step_ceiling() {
        let model = Arc::new(ScriptedModel::looping(
            "add",
            json!({"number1": 1, "number2": 1}),
            150,
        ));
        let agent = Agent::new(
            &config("Looper"),
            model.clone(),
            vec![native("add")],
            Arc::new(FakeConnector::new(&[])),
        );

        let (tx, mut rx) = mpsc::channel::<StepEvent>(8);
        let collector = tokio::spawn(async move {
            let mut steps = Vec::new();
            while let Some(event) = rx.recv().await {
                steps.push(event.step);
            }
            steps
        });

        let response = agent.generate("count", Some(tx)).await.unwrap();
        assert_eq!(response.finish_reason, FinishReason::StepLimit);
        assert_eq!(response.steps, MAX_STEPS);
        assert_eq!(response.text, "step 99");
        assert_eq!(model.seen().len(), MAX_STEPS as usize);

        let steps = collector.await.unwrap();
        assert_eq!(steps, (0..MAX_STEPS).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sub_agent_runs_its_own_loop() {
        let child_model = Arc::new(ScriptedModel::new(vec![ModelTurn::text("42")]));
        let child = Arc::new(Agent::new(
            &config("Deep Thought").hidden(),
            child_model.clone(),
            vec![],
            Arc::new(FakeConnector::new(&[])),
        ));

        let parent_model = Arc::new(ScriptedModel::new(vec![
            ModelTurn {
                text: String::new(),
                tool_calls: vec![call(
                    "c1",
                    "agent_deep_thought",
                    json!({"context": "life", "prompt": "answer?"}),
                )],
            },
            ModelTurn::text("The answer is 42"),
        ]));
        let parent = Agent::new(
            &config("Asker"),
            parent_model.clone(),
            vec![Capability::SubAgent(child.clone())],
            Arc::new(FakeConnector::new(&[])),
        );

        let response = parent.generate("ask", None).await.unwrap();
        assert_eq!(response.text, "The answer is 42");
        assert!(child.is_initialized());

        let child_seen = child_model.seen();
        assert_eq!(
            child_seen[0].messages[0],
            ChatMessage::user("<Context>life</Context>\n<Prompt>answer?</Prompt>")
        );
        match &parent_model.seen()[1].messages[2] {
            ChatMessage::ToolResult { content, is_error, .. } => {
                assert_eq!(content, "42");
                assert!(!*is_error);
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sub_agent_rejects_bad_arguments() {
        let child = Agent::new(
            &config("Child"),
            Arc::new(ScriptedModel::default()),
            vec![],
            Arc::new(FakeConnector::new(&[])),
        );
        let out = child.call_as_tool(json!({"prompt": "no context"})).await;
        assert!(out.is_error);
        assert!(out.text.contains("agent_child"));
    }

    #[test]
    fn capability_kinds() {
        assert_eq!(native("add").kind(), CapabilityKind::Inline);
        assert_eq!(
            Capability::Servers(vec![]).kind(),
            CapabilityKind::ExternalServer
        );
    }
}
