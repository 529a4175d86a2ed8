use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::Value;

use super::ToolSpec;
use crate::error::{Error, Result};
use crate::types::{InlineToolConfig, ToolOutput};

/// Async body of a native operation.
pub type NativeHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Named operations that inline tools may select with `execute`.
///
/// Configuration can only pick among these; it never carries code.
#[derive(Clone)]
pub struct NativeOperations {
    handlers: HashMap<String, NativeHandler>,
}

impl std::fmt::Debug for NativeOperations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("NativeOperations")
            .field("operations", &names)
            .finish()
    }
}

impl Default for NativeOperations {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Deserialize)]
struct BinaryArgs {
    number1: f64,
    number2: f64,
}

fn binary(op: fn(f64, f64) -> Result<f64>) -> NativeHandler {
    Arc::new(move |args| {
        async move {
            let args: BinaryArgs = serde_json::from_value(args)?;
            op(args.number1, args.number2).map(number_value)
        }
        .boxed()
    })
}

impl NativeOperations {
    /// An empty set of operations.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The arithmetic operations: `add`, `subtract`, `multiply`, `divide`.
    pub fn builtin() -> Self {
        let mut ops = Self::empty();
        ops.handlers.insert("add".into(), binary(|a, b| Ok(a + b)));
        ops.handlers.insert("subtract".into(), binary(|a, b| Ok(a - b)));
        ops.handlers.insert("multiply".into(), binary(|a, b| Ok(a * b)));
        ops.handlers.insert(
            "divide".into(),
            binary(|a, b| {
                if b == 0.0 {
                    Err(Error::ToolExecution("division by zero".into()))
                } else {
                    Ok(a / b)
                }
            }),
        );
        ops
    }

    /// Register an operation under `name`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.handlers
            .insert(name.into(), Arc::new(move |input| handler(input).boxed()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Bind an inline tool definition to its operation.
    pub fn resolve(&self, config: &InlineToolConfig) -> Result<NativeTool> {
        let handler = self.handlers.get(config.operation()).cloned().ok_or_else(|| {
            Error::InvalidToolConfig(format!(
                "tool '{}' names unknown operation '{}'",
                config.name,
                config.operation()
            ))
        })?;
        Ok(NativeTool {
            spec: ToolSpec {
                name: config.name.clone(),
                description: config.description.clone(),
                input_schema: config.parameters.clone(),
            },
            handler,
        })
    }
}

/// An inline tool bound to its native operation.
#[derive(Clone)]
pub struct NativeTool {
    pub spec: ToolSpec,
    handler: NativeHandler,
}

impl std::fmt::Debug for NativeTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeTool")
            .field("name", &self.spec.name)
            .finish_non_exhaustive()
    }
}

impl NativeTool {
    pub async fn call(&self, input: Value) -> ToolOutput {
        match (self.handler)(input).await {
            Ok(Value::String(text)) => ToolOutput::text(text),
            Ok(value) => ToolOutput::text(value.to_string()),
            Err(e) => ToolOutput::error(e.to_string()),
        }
    }
}

/// JSON number for `n`, integral when `n` has no fractional part.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
