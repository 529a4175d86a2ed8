//! Locating, parsing and validating the agents configuration document.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{AgentsDocument, ToolConfig};

/// Files probed, in order, when no explicit path is given.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["agents-config.json", "my-agents-config.json"];

/// Major version of the document format this build understands.
const SUPPORTED_MAJOR: u64 = 1;

/// Locate the configuration document.
///
/// An explicit path wins; otherwise the default filenames are probed in the
/// given directory.
pub fn locate(explicit: Option<&Path>, dir: &Path) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::ConfigNotFound {
            tried: vec![path.to_path_buf()],
        });
    }

    let candidates: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(|p| dir.join(p)).collect();
    let found = candidates.iter().find(|p| p.is_file()).cloned();
    found.ok_or(Error::ConfigNotFound { tried: candidates })
}

/// Locate and load the configuration document relative to the working directory.
pub async fn load(explicit: Option<&Path>) -> Result<AgentsDocument> {
    let path = locate(explicit, Path::new("."))?;
    load_file(&path).await
}

/// Read and validate the document at `path`.
pub async fn load_file(path: &Path) -> Result<AgentsDocument> {
    let content = tokio::fs::read_to_string(path).await?;
    let document = parse(&content, path)?;
    tracing::info!(
        path = %path.display(),
        agents = document.agents.len(),
        "loaded agents configuration"
    );
    Ok(document)
}

/// Parse a document from a string. `path` is only used in error messages.
pub fn parse(content: &str, path: &Path) -> Result<AgentsDocument> {
    let value: Value = serde_json::from_str(content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    from_value(value, path)
}

/// Parse a document supplied in code rather than read from a file.
pub fn from_str(content: &str) -> Result<AgentsDocument> {
    parse(content, Path::new("<inline>"))
}

/// Validate an already-parsed document.
pub fn from_value(value: Value, path: &Path) -> Result<AgentsDocument> {
    validate_shape(&value)?;
    let document: AgentsDocument =
        serde_json::from_value(value).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
    check_version(&document.version)?;
    Ok(document)
}

fn validate_shape(value: &Value) -> Result<()> {
    let agents = match value.get("agents") {
        Some(Value::Array(agents)) => agents,
        Some(_) => {
            return Err(Error::ConfigShape("'agents' must be an array".into()));
        }
        None => {
            return Err(Error::ConfigShape("'agents' array not found".into()));
        }
    };

    if agents.is_empty() {
        return Err(Error::ConfigShape("'agents' array is empty".into()));
    }

    // Tool entries are checked here so a bad entry is reported as such rather
    // than as a generic parse failure.
    for agent in agents {
        if let Some(Value::Array(tools)) = agent.get("toolsConfigs") {
            for entry in tools {
                ToolConfig::from_value(entry)?;
            }
        }
    }

    Ok(())
}

fn check_version(version: &str) -> Result<()> {
    match semver::Version::parse(version) {
        Ok(v) if v.major == SUPPORTED_MAJOR => Ok(()),
        Ok(v) => Err(Error::ConfigShape(format!(
            "unsupported configuration version {v}, expected {SUPPORTED_MAJOR}.x"
        ))),
        Err(e) => {
            tracing::warn!(version, "configuration version is not semver: {e}");
            Ok(())
        }
    }
}
