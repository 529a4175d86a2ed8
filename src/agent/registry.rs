use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use super::{Agent, AgentBuilder};
use crate::error::{Error, Result};
use crate::types::AgentConfig;

/// Prefix of every agent's tool name.
pub const TOOL_PREFIX: &str = "agent_";

/// Registry key of an agent name: lowercase, spaces replaced by `_`.
pub fn normalize(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Every built agent, keyed by normalized name. Immutable once built.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: Vec<Arc<Agent>>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    /// Index `agents`, keeping their order for enumeration.
    pub fn new(agents: Vec<Arc<Agent>>) -> Result<Self> {
        let mut index = HashMap::with_capacity(agents.len());
        for (i, agent) in agents.iter().enumerate() {
            if let Some(&prev) = index.get(&agent.key()) {
                let first: &Arc<Agent> = &agents[prev];
                return Err(if first.name() == agent.name() {
                    Error::DuplicateAgentName(agent.name().to_string())
                } else {
                    Error::AgentNameConflict {
                        first: first.name().to_string(),
                        second: agent.name().to_string(),
                        normalized: agent.key(),
                    }
                });
            }
            index.insert(agent.key(), i);
        }
        Ok(Self { agents, index })
    }

    /// Build every agent of `configs` and index them.
    pub fn build(configs: &[AgentConfig], builder: &AgentBuilder) -> Result<Self> {
        let registry = Self::new(builder.build(configs)?)?;
        tracing::info!(
            agents = registry.len(),
            exposed = registry.exposed().count(),
            "agent registry built"
        );
        Ok(registry)
    }

    /// Look up by normalized name.
    pub fn get(&self, key: &str) -> Option<&Arc<Agent>> {
        self.index.get(key).map(|&i| &self.agents[i])
    }

    /// Look up by tool name (`agent_<normalized>`).
    pub fn by_tool_name(&self, tool: &str) -> Option<&Arc<Agent>> {
        tool.strip_prefix(TOOL_PREFIX).and_then(|key| self.get(key))
    }

    /// Look up free-form user input: any casing, with or without the prefix.
    pub fn resolve(&self, input: &str) -> Option<&Arc<Agent>> {
        let key = normalize(input.trim());
        self.get(&key).or_else(|| {
            key.strip_prefix(TOOL_PREFIX)
                .and_then(|stripped| self.get(stripped))
        })
    }

    /// All agents in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Agent>> {
        self.agents.iter()
    }

    /// Agents offered to the host.
    pub fn exposed(&self) -> impl Iterator<Item = &Arc<Agent>> {
        self.agents.iter().filter(|a| a.is_exposed())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Close every agent concurrently.
    pub async fn close_all(&self) {
        join_all(self.agents.iter().map(|a| a.close())).await;
        tracing::info!(agents = self.agents.len(), "all agents closed");
    }
}
