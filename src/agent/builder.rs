use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::{normalize, Agent, Capability, MAX_STEPS};
use crate::error::{Error, Result};
use crate::mcp::client::{ServerConnector, SpawnConnector};
use crate::model::ModelFactory;
use crate::tools::{prebuilt_server, NativeOperations};
use crate::types::{AgentConfig, NamedServer, ToolConfig};

/// Turns agent configurations into runtime agents.
///
/// Building is pure: no process is spawned and no network is touched until an
/// agent is initialized.
pub struct AgentBuilder {
    models: Arc<dyn ModelFactory>,
    operations: NativeOperations,
    connector: Arc<dyn ServerConnector>,
    max_steps: u32,
}

impl AgentBuilder {
    pub fn new(models: Arc<dyn ModelFactory>) -> Self {
        Self {
            models,
            operations: NativeOperations::builtin(),
            connector: Arc::new(SpawnConnector),
            max_steps: MAX_STEPS,
        }
    }

    /// Replace the operations inline tools may select.
    #[must_use]
    pub fn with_operations(mut self, operations: NativeOperations) -> Self {
        self.operations = operations;
        self
    }

    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn ServerConnector>) -> Self {
        self.connector = connector;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Build every agent, referenced agents first. The result keeps
    /// configuration order.
    pub fn build(&self, configs: &[AgentConfig]) -> Result<Vec<Arc<Agent>>> {
        check_names(configs)?;
        let order = build_order(configs)?;

        let mut built: HashMap<&str, Arc<Agent>> = HashMap::with_capacity(configs.len());
        for i in order {
            let config = &configs[i];
            let agent = self.build_one(config, &built)?;
            tracing::debug!(agent = %config.name, tools = config.tools_configs.len(), "built agent");
            built.insert(config.name.as_str(), Arc::new(agent));
        }

        configs
            .iter()
            .map(|c| {
                built
                    .remove(c.name.as_str())
                    .ok_or_else(|| Error::UnresolvedAgentReference(c.name.clone()))
            })
            .collect()
    }

    fn build_one(&self, config: &AgentConfig, built: &HashMap<&str, Arc<Agent>>) -> Result<Agent> {
        let model = self.models.create(&config.model)?;

        let mut capabilities = Vec::with_capacity(config.tools_configs.len());
        for tool in &config.tools_configs {
            let capability = match tool {
                ToolConfig::McpServers { mcp_servers } => Capability::Servers(
                    mcp_servers
                        .iter()
                        .map(|(name, server)| NamedServer {
                            name: name.clone(),
                            config: server.clone(),
                        })
                        .collect(),
                ),
                ToolConfig::Prebuilt { prebuilt } => {
                    Capability::Servers(vec![prebuilt_server(prebuilt)?])
                }
                ToolConfig::Tool(inline) => Capability::Native(self.operations.resolve(inline)?),
                ToolConfig::Agent { agent_ref } => Capability::SubAgent(
                    built
                        .get(agent_ref.as_str())
                        .cloned()
                        .ok_or_else(|| Error::UnresolvedAgentReference(agent_ref.clone()))?,
                ),
            };
            capabilities.push(capability);
        }

        Ok(Agent::new(config, model, capabilities, self.connector.clone()).with_max_steps(self.max_steps))
    }
}

/// Reject exact duplicates, names that collide once normalized, and names
/// that normalize to nothing.
pub fn check_names(configs: &[AgentConfig]) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(configs.len());
    for config in configs {
        let key = normalize(&config.name);
        if key.trim_matches('_').is_empty() {
            return Err(Error::ConfigShape(format!(
                "agent name {:?} is empty once normalized",
                config.name
            )));
        }
        if let Some(first) = seen.get(&key) {
            return Err(if *first == config.name {
                Error::DuplicateAgentName(config.name.clone())
            } else {
                Error::AgentNameConflict {
                    first: first.to_string(),
                    second: config.name.clone(),
                    normalized: key,
                }
            });
        }
        seen.insert(key, &config.name);
    }
    Ok(())
}

/// Indices of `configs` such that every agent comes after the agents it
/// references. Among agents that are ready, configuration order wins.
pub fn build_order(configs: &[AgentConfig]) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = configs
        .iter()
        .enumerate()
        .map(|(i, c)| (c.name.as_str(), i))
        .collect();

    // deps[i]: agents i references; users[j]: agents referencing j.
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); configs.len()];
    let mut users: Vec<Vec<usize>> = vec![Vec::new(); configs.len()];
    for (i, config) in configs.iter().enumerate() {
        for reference in config.agent_refs() {
            let &j = index
                .get(reference)
                .ok_or_else(|| Error::UnresolvedAgentReference(reference.to_string()))?;
            if deps[i].insert(j) {
                users[j].push(i);
            }
        }
    }

    let mut pending: Vec<usize> = deps.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = (0..configs.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(configs.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &user in &users[i] {
            pending[user] -= 1;
            if pending[user] == 0 {
                ready.insert(user);
            }
        }
    }

    if order.len() < configs.len() {
        let cycle = find_cycle(&deps, &pending);
        return Err(Error::AgentReferenceCycle(
            cycle.into_iter().map(|i| configs[i].name.clone()).collect(),
        ));
    }
    Ok(order)
}

/// Walk unbuilt references from the first unbuilt agent until a node repeats.
fn find_cycle(deps: &[BTreeSet<usize>], pending: &[usize]) -> Vec<usize> {
    let Some(start) = (0..deps.len()).find(|&i| pending[i] > 0) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        // Every unbuilt agent has at least one unbuilt dependency.
        let Some(&next) = deps[current].iter().find(|&&d| pending[d] > 0) else {
            return path;
        };
        if let Some(&at) = position.get(&next) {
            let mut cycle = path.split_off(at);
            cycle.push(next);
            return cycle;
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }
}
