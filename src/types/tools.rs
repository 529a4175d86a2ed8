use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::mcp_config::McpServerConfig;
use crate::error::{Error, Result};

/// One entry of an agent's `toolsConfigs`.
///
/// Serialized with a `type` tag. Documents written without the tag are still
/// accepted: the variant is inferred from whichever identifying key is present.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ToolConfig {
    /// Custom external servers, keyed by server name.
    #[serde(rename = "mcpServers")]
    McpServers {
        #[serde(rename = "mcpServers")]
        mcp_servers: BTreeMap<String, McpServerConfig>,
    },

    /// A server from the built-in catalog.
    #[serde(rename = "prebuilt")]
    Prebuilt { prebuilt: String },

    /// An inline tool backed by a compiled-in operation.
    #[serde(rename = "tool")]
    Tool(InlineToolConfig),

    /// Another agent of the same configuration, exposed as a sub-tool.
    #[serde(rename = "agent")]
    Agent {
        #[serde(rename = "agentRef")]
        agent_ref: String,
    },
}

/// Definition of an inline tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InlineToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    /// Name of the native operation to run. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<String>,
}

impl InlineToolConfig {
    pub fn operation(&self) -> &str {
        self.execute.as_deref().unwrap_or(&self.name)
    }
}

/// Tag of a [`ToolConfig`], used for inspection and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    McpServers,
    Prebuilt,
    Tool,
    Agent,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolConfig {
    pub fn kind(&self) -> ToolKind {
        match self {
            ToolConfig::McpServers { .. } => ToolKind::McpServers,
            ToolConfig::Prebuilt { .. } => ToolKind::Prebuilt,
            ToolConfig::Tool(_) => ToolKind::Tool,
            ToolConfig::Agent { .. } => ToolKind::Agent,
        }
    }

    pub fn prebuilt(name: impl Into<String>) -> Self {
        ToolConfig::Prebuilt {
            prebuilt: name.into(),
        }
    }

    pub fn agent(name: impl Into<String>) -> Self {
        ToolConfig::Agent {
            agent_ref: name.into(),
        }
    }

    /// Name of the referenced agent, if this entry is an agent reference.
    pub fn agent_ref(&self) -> Option<&str> {
        match self {
            ToolConfig::Agent { agent_ref } => Some(agent_ref),
            _ => None,
        }
    }

    /// Validate a raw JSON entry into a tool configuration.
    ///
    /// Fails with [`Error::InvalidToolConfig`] carrying the offending entry.
    pub fn from_value(entry: &Value) -> Result<Self> {
        let invalid = || Error::InvalidToolConfig(entry.to_string());
        let obj = entry.as_object().ok_or_else(invalid)?;

        let kind = match obj.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            None | Some(Value::Null) => infer_kind(obj).ok_or_else(invalid)?,
            Some(_) => return Err(invalid()),
        };

        let parsed = match kind {
            "prebuilt" => obj
                .get("prebuilt")
                .and_then(Value::as_str)
                .map(ToolConfig::prebuilt),
            "mcpServers" => obj
                .get("mcpServers")
                .cloned()
                .and_then(|servers| serde_json::from_value(servers).ok())
                .map(|mcp_servers| ToolConfig::McpServers { mcp_servers }),
            "tool" => serde_json::from_value::<InlineToolConfig>(entry.clone())
                .ok()
                .map(ToolConfig::Tool),
            "agent" => obj
                .get("agentRef")
                .and_then(Value::as_str)
                .map(ToolConfig::agent),
            _ => None,
        };

        parsed.ok_or_else(invalid)
    }
}

fn infer_kind(obj: &Map<String, Value>) -> Option<&'static str> {
    if obj.contains_key("prebuilt") {
        Some("prebuilt")
    } else if obj.contains_key("mcpServers") {
        Some("mcpServers")
    } else if obj.contains_key("agentRef") {
        Some("agent")
    } else if obj.contains_key("name") {
        Some("tool")
    } else {
        None
    }
}

impl<'de> Deserialize<'de> for ToolConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        ToolConfig::from_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn untagged_entries_are_inferred() {
        let prebuilt = ToolConfig::from_value(&json!({"prebuilt": "memory"})).unwrap();
        assert_eq!(prebuilt.kind(), ToolKind::Prebuilt);

        let servers = ToolConfig::from_value(&json!({
            "mcpServers": {"memory": {"command": "npx", "args": ["-y", "@modelcontextprotocol/server-memory"]}}
        }))
        .unwrap();
        assert_eq!(servers.kind(), ToolKind::McpServers);

        let agent = ToolConfig::from_value(&json!({"agentRef": "Memory Agent"})).unwrap();
        assert_eq!(agent.agent_ref(), Some("Memory Agent"));
    }

    #[test]
    fn tagged_inline_tool() {
        let tool = ToolConfig::from_value(&json!({
            "type": "tool",
            "name": "add",
            "description": "A tool for adding two numbers",
            "parameters": {"type": "object"}
        }))
        .unwrap();
        match tool {
            ToolConfig::Tool(inline) => {
                assert_eq!(inline.name, "add");
                assert_eq!(inline.operation(), "add");
            }
            other => panic!("expected Tool, got {other:?}"),
        }
    }

    #[test]
    fn tag_must_match_fields() {
        let err = ToolConfig::from_value(&json!({"type": "agent", "prebuilt": "memory"})).unwrap_err();
        assert!(matches!(err, Error::InvalidToolConfig(_)));
    }

    #[test]
    fn import_entries_are_rejected() {
        let err = ToolConfig::from_value(&json!({"type": "import", "importPath": "./agent.js"}))
            .unwrap_err();
        match err {
            Error::InvalidToolConfig(entry) => assert!(entry.contains("importPath")),
            other => panic!("expected InvalidToolConfig, got {other:?}"),
        }
    }

    #[test]
    fn unrecognized_shape_is_rejected() {
        let err = ToolConfig::from_value(&json!({"something": true})).unwrap_err();
        assert!(matches!(err, Error::InvalidToolConfig(_)));
    }

    #[test]
    fn serializes_with_type_tag() {
        let value = serde_json::to_value(ToolConfig::agent("Memory Agent")).unwrap();
        assert_eq!(value, json!({"type": "agent", "agentRef": "Memory Agent"}));
        let back: ToolConfig = serde_json::from_value(value).unwrap();
        assert_eq!(back, ToolConfig::agent("Memory Agent"));
    }
}
