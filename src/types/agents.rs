use serde::{Deserialize, Serialize};

use super::tools::ToolConfig;

/// The configuration document: a version string and the agents it declares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsDocument {
    #[serde(default = "default_version")]
    pub version: String,
    pub agents: Vec<AgentConfig>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Declarative description of one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Unique, human-readable name.
    pub name: String,

    /// Description advertised to the host.
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    pub model: ModelConfig,

    #[serde(default)]
    pub tools_configs: Vec<ToolConfig>,

    /// Whether the agent is advertised to the host. Hidden agents can still
    /// be used as sub-agents.
    #[serde(default = "default_expose")]
    pub expose: bool,
}

fn default_expose() -> bool {
    true
}

/// Model reference for an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the provider's default endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            api_key: None,
            base_url: None,
        }
    }
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: None,
            model,
            tools_configs: Vec::new(),
            expose: true,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_tool(mut self, tool: ToolConfig) -> Self {
        self.tools_configs.push(tool);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.expose = false;
        self
    }

    /// Names of the agents this one references as sub-tools.
    pub fn agent_refs(&self) -> impl Iterator<Item = &str> {
        self.tools_configs.iter().filter_map(ToolConfig::agent_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_agent_with_defaults() {
        let json = r#"{
            "name": "Brave Search",
            "description": "Use this agent to search the web",
            "model": {"provider": "openai", "model": "gpt-4o-mini"},
            "toolsConfigs": [{"prebuilt": "braveSearch"}]
        }"#;
        let agent: AgentConfig = serde_json::from_str(json).unwrap();
        assert!(agent.expose);
        assert!(agent.system_prompt.is_none());
        assert_eq!(agent.tools_configs, vec![ToolConfig::prebuilt("braveSearch")]);
        assert_eq!(agent.model.provider, "openai");
    }

    #[test]
    fn agent_refs_lists_references_only() {
        let agent = AgentConfig::new("Master Agent", "manages others", ModelConfig::new("openai", "gpt-4o-mini"))
            .with_tool(ToolConfig::agent("Memory Agent"))
            .with_tool(ToolConfig::prebuilt("fetch"))
            .with_tool(ToolConfig::agent("Brave Search"));
        let refs: Vec<&str> = agent.agent_refs().collect();
        assert_eq!(refs, vec!["Memory Agent", "Brave Search"]);
    }

    #[test]
    fn serializes_camel_case() {
        let agent = AgentConfig::new("Memory Agent", "memories", ModelConfig::new("anthropic", "claude-3-5-haiku-latest"))
            .with_system_prompt("store things");
        let value = serde_json::to_value(&agent).unwrap();
        assert_eq!(value["systemPrompt"], "store things");
        assert_eq!(value["toolsConfigs"], serde_json::json!([]));
        assert!(value["model"].get("apiKey").is_none());
    }
}
