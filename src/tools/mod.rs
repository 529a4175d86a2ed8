//! Tools an agent can call: external servers, native operations and
//! sub-agents, all routed through a per-agent [`Toolbox`].

pub mod native;
pub mod prebuilt;
pub mod toolbox;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use native::{NativeOperations, NativeTool};
pub use prebuilt::prebuilt_server;
pub use toolbox::Toolbox;

/// Schema-level description of a tool, as advertised to a model or host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object"})
}
