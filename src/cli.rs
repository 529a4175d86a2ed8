use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Serve configured LLM agents as MCP tools over stdio.
#[derive(Parser, Debug)]
#[command(name = "mcp-agent-server", version, about)]
pub struct Cli {
    /// Path to the JSON agents configuration
    #[arg(short, long, global = true, env = "MCP_AGENTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the MCP agent server on stdio (default)
    Serve,

    /// Run one agent on a prompt and print each step
    TestAgent {
        /// Name of the agent to test
        #[arg(long)]
        name: String,

        /// Prompt to send to the agent
        #[arg(long)]
        prompt: String,

        /// Context to provide to the agent
        #[arg(long, default_value = "")]
        context: String,
    },

    /// List configured agents and their tool names
    ListAgents,
}
