pub mod client;
pub mod jsonrpc;
pub mod server;
#[cfg(test)]
pub(crate) mod testing;

/// MCP protocol revision spoken on both sides.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub use client::McpClient;
pub use server::AgentServer;
