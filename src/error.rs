use std::io;
use std::path::PathBuf;

/// Hint attached to initialization failures. Spawned tool servers are the
/// most common thing to fail, usually because the command is not on PATH.
pub const INIT_HINT: &str = "Check the agent MCP server configurations. \
Commands such as 'npx' or 'uvx' may need to be given as a full path.";

/// All errors that can occur while building or running agents.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- Configuration (fatal at startup) ---
    #[error("no configuration file found, tried: {}", format_paths(.tried))]
    ConfigNotFound { tried: Vec<PathBuf> },

    #[error("failed to parse configuration {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    ConfigShape(String),

    #[error("unsupported model provider: {0}")]
    UnsupportedProvider(String),

    #[error("unknown prebuilt server: {0}")]
    UnknownPrebuiltServer(String),

    #[error("referenced agent not found: {0}")]
    UnresolvedAgentReference(String),

    #[error("agent references form a cycle: {}", .0.join(" -> "))]
    AgentReferenceCycle(Vec<String>),

    #[error("duplicate agent name: {0}")]
    DuplicateAgentName(String),

    #[error("agent names '{first}' and '{second}' both normalize to '{normalized}'")]
    AgentNameConflict {
        first: String,
        second: String,
        normalized: String,
    },

    #[error("invalid tool configuration: {0}")]
    InvalidToolConfig(String),

    // --- Per request ---
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("agent {agent} failed to initialize. {hint} {reason}", hint = INIT_HINT)]
    AgentInitialization { agent: String, reason: String },

    #[error("agent {0} is closed")]
    AgentClosed(String),

    #[error("invalid arguments for {tool}: {reason}")]
    ToolCallValidation { tool: String, reason: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // --- Tool servers ---
    #[error("failed to spawn tool server '{server}': {reason}")]
    ServerSpawn { server: String, reason: String },

    #[error("transport closed")]
    TransportClosed,

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("MCP error: {code}: {message}")]
    Mcp { code: i64, message: String },

    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// JSON-RPC error code used when this error is returned to a host.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Error::UnknownTool(_) | Error::AgentNotFound(_) | Error::ToolCallValidation { .. } => {
                -32602
            }
            Error::Mcp { code, .. } => *code,
            _ => -32603,
        }
    }

    /// Whether the error belongs to configuration loading or graph building.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigShape(_)
                | Error::UnsupportedProvider(_)
                | Error::UnknownPrebuiltServer(_)
                | Error::UnresolvedAgentReference(_)
                | Error::AgentReferenceCycle(_)
                | Error::DuplicateAgentName(_)
                | Error::AgentNameConflict { .. }
                | Error::InvalidToolConfig(_)
        )
    }
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
