use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{Agent, AgentRegistry, StepEvent};
use crate::error::{Error, Result};
use crate::types::AgentResponse;

/// Arguments every agent tool takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentToolArgs {
    pub context: String,
    pub prompt: String,
}

/// JSON schema of [`AgentToolArgs`].
pub fn agent_tool_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "context": {
                "type": "string",
                "description": "Background information relevant to the task"
            },
            "prompt": {
                "type": "string",
                "description": "The task or question for the agent"
            }
        },
        "required": ["context", "prompt"]
    })
}

/// The user message an agent receives for one request.
pub fn compose_prompt(context: &str, prompt: &str) -> String {
    format!("<Context>{context}</Context>\n<Prompt>{prompt}</Prompt>")
}

/// Resolve `name` in the registry and run that agent.
///
/// `name` may be the configured name, its normalized form, or the tool name.
pub async fn dispatch(
    registry: &AgentRegistry,
    name: &str,
    prompt: &str,
    context: &str,
    progress: Option<mpsc::Sender<StepEvent>>,
) -> Result<AgentResponse> {
    let agent = registry
        .resolve(name)
        .ok_or_else(|| Error::AgentNotFound(name.to_string()))?;
    run_agent(agent, prompt, context, progress).await
}

/// Initialize `agent` if needed and run its loop on the composed prompt.
pub async fn run_agent(
    agent: &Agent,
    prompt: &str,
    context: &str,
    progress: Option<mpsc::Sender<StepEvent>>,
) -> Result<AgentResponse> {
    agent.initialize().await.map_err(|e| match e {
        e @ Error::AgentClosed(_) => e,
        other => Error::AgentInitialization {
            agent: agent.tool_name(),
            reason: other.to_string(),
        },
    })?;

    tracing::info!(agent = %agent.name(), "running agent");
    let response = agent
        .generate(&compose_prompt(context, prompt), progress)
        .await?;
    tracing::info!(
        agent = %agent.name(),
        steps = response.steps,
        finish_reason = ?response.finish_reason,
        "agent finished"
    );
    Ok(response)
}
