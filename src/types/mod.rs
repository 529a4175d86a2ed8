pub mod agents;
pub mod content;
pub mod mcp_config;
pub mod messages;
pub mod tools;

// Re-exports for convenience.
pub use agents::{AgentConfig, AgentsDocument, ModelConfig};
pub use content::{CallToolResult, ContentBlock, ToolOutput};
pub use mcp_config::{McpServerConfig, McpServerInfo, NamedServer};
pub use messages::{AgentResponse, ChatMessage, FinishReason, ModelTurn, ToolCall};
pub use tools::{InlineToolConfig, ToolConfig, ToolKind};
