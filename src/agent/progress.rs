use serde_json::Value;

const SUMMARY_LIMIT: usize = 200;

/// One tool call made during a step.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallStep {
    pub name: String,
    pub input: Value,
    pub output: String,
    pub is_error: bool,
}

/// Emitted after every step of a generation loop.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    /// Zero-based step index.
    pub step: u32,
    /// Step ceiling of the loop.
    pub total: u32,
    pub calls: Vec<ToolCallStep>,
}

impl StepEvent {
    /// Human-readable digest of the step's tool calls, one block per call.
    pub fn summary(&self) -> String {
        self.calls
            .iter()
            .map(|call| {
                format!(
                    "{}({}): \n{}...",
                    call.name,
                    truncate(&call.input.to_string(), SUMMARY_LIMIT),
                    truncate(&call.output, SUMMARY_LIMIT)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
