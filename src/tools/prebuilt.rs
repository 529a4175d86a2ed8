use crate::error::{Error, Result};
use crate::types::{McpServerConfig, NamedServer};

/// Names accepted by `{"prebuilt": ...}`.
pub const PREBUILT_SERVERS: &[&str] = &[
    "sequentialThinking",
    "memory",
    "braveSearch",
    "firecrawlMcp",
    "fetch",
    "awsKbRetrieval",
    "everart",
    "fileSystem",
    "sqlite",
];

/// Resolve a catalog name to its server specification.
///
/// Credentials such as `BRAVE_API_KEY` reach the server through the inherited
/// process environment.
pub fn prebuilt_server(name: &str) -> Result<NamedServer> {
    let config = match name {
        "sequentialThinking" => npx("@modelcontextprotocol/server-sequential-thinking"),
        "memory" => npx("@modelcontextprotocol/server-memory"),
        "braveSearch" => npx("@modelcontextprotocol/server-brave-search"),
        "firecrawlMcp" => npx("firecrawl-mcp"),
        "fetch" => McpServerConfig::new("uvx", &["mcp-server-fetch"]),
        "awsKbRetrieval" => npx("@modelcontextprotocol/server-aws-kb-retrieval"),
        "everart" => npx("@modelcontextprotocol/server-everart"),
        "fileSystem" => McpServerConfig::new(
            "npx",
            &["-y", "@modelcontextprotocol/server-filesystem", "."],
        ),
        "sqlite" => McpServerConfig::new("uvx", &["mcp-server-sqlite", "--db-path", "./database.db"]),
        other => return Err(Error::UnknownPrebuiltServer(other.to_string())),
    };
    Ok(NamedServer {
        name: name.to_string(),
        config,
    })
}

fn npx(package: &str) -> McpServerConfig {
    McpServerConfig::new("npx", &["-y", package])
}
