mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Command};
use mcp_agent_server::agent::{run_agent, AgentBuilder, AgentRegistry, StepEvent};
use mcp_agent_server::mcp::AgentServer;
use mcp_agent_server::model::ProviderFactory;
use mcp_agent_server::{config, Result};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) if e.is_config_error() => {
            tracing::error!("invalid agents configuration: {e}");
            eprintln!("Configuration error: {e}");
            eprintln!("Fix the agents configuration and restart the server.");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let registry = load_registry(cli.config.as_deref()).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(registry).await,
        Command::TestAgent {
            name,
            prompt,
            context,
        } => test_agent(&registry, &name, &prompt, &context).await,
        Command::ListAgents => {
            list_agents(&registry);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn load_registry(path: Option<&Path>) -> Result<Arc<AgentRegistry>> {
    let document = config::load(path).await?;
    let builder = AgentBuilder::new(Arc::new(ProviderFactory::new()));
    Ok(Arc::new(AgentRegistry::build(&document.agents, &builder)?))
}

async fn serve(registry: Arc<AgentRegistry>) -> Result<ExitCode> {
    let server = Arc::new(AgentServer::new(registry.clone()));
    tracing::info!(tools = server.list_tools().len(), "serving agents on stdio");

    let outcome = tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            Ok(())
        }
    };

    registry.close_all().await;
    outcome.map(|()| ExitCode::SUCCESS)
}

async fn test_agent(registry: &AgentRegistry, name: &str, prompt: &str, context: &str) -> Result<ExitCode> {
    let Some(agent) = registry.resolve(name) else {
        eprintln!("Agent \"{name}\" not found. Available agents:");
        for agent in registry.iter() {
            eprintln!("- {}", agent.name());
        }
        return Ok(ExitCode::FAILURE);
    };

    println!("Testing agent: {}", agent.name());
    println!("Prompt: {prompt}");
    println!("Context: {}", if context.is_empty() { "None" } else { context });

    let (tx, rx) = mpsc::channel::<StepEvent>(16);
    let printer = tokio::spawn(async move {
        let mut steps = ReceiverStream::new(rx);
        while let Some(step) = steps.next().await {
            if !step.calls.is_empty() {
                println!("{}", step.summary());
            }
        }
    });

    let result = run_agent(agent, prompt, context, Some(tx)).await;
    let _ = printer.await;
    registry.close_all().await;

    match result {
        Ok(response) => {
            println!("\nAgent Response:\n");
            println!("{}", response.text);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error testing agent: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn list_agents(registry: &AgentRegistry) {
    for agent in registry.iter() {
        let visibility = if agent.is_exposed() { "" } else { " (hidden)" };
        println!("{}{visibility}", agent.tool_name());
        println!("    name:  {}", agent.name());
        println!("    model: {}", agent.model_id());
        println!("    {}", agent.description());
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the protocol.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
