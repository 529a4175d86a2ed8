//! Expose configurable LLM agents as MCP tools.
//!
//! A JSON document declares agents: a model, a system prompt, and tools
//! drawn from external MCP servers, native operations, or other agents.
//! [`agent::AgentBuilder`] turns the document into runtime agents,
//! [`agent::AgentRegistry`] indexes them, and [`mcp::AgentServer`] serves
//! each one as a tool over stdio.

pub mod agent;
pub mod config;
pub mod error;
pub mod mcp;
pub mod model;
pub mod tools;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic use.
pub use error::{Error, Result};
pub use types::{
    AgentConfig, AgentResponse, AgentsDocument, FinishReason, ModelConfig, McpServerConfig,
    ToolConfig,
};

// Re-export primary APIs.
pub use agent::{dispatch, Agent, AgentBuilder, AgentRegistry, StepEvent};
pub use mcp::{AgentServer, McpClient};
pub use model::{LanguageModel, ModelFactory, ProviderFactory};
pub use tools::NativeOperations;
