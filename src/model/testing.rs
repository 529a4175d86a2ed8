//! Scripted language model for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{LanguageModel, ModelFactory, ModelRequest};
use crate::error::Result;
use crate::types::{ChatMessage, ModelConfig, ModelTurn, ToolCall};

/// What the model saw on one call.
#[derive(Debug, Clone)]
pub(crate) struct SeenRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<String>,
}

/// Replays queued turns in order, then answers with plain text.
#[derive(Default)]
pub(crate) struct ScriptedModel {
    turns: Mutex<VecDeque<ModelTurn>>,
    seen: Mutex<Vec<SeenRequest>>,
    fallback: String,
}

impl ScriptedModel {
    pub(crate) fn new(turns: Vec<ModelTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
            fallback: "done".into(),
        }
    }

    /// Always requests `tool` and never finishes on its own.
    pub(crate) fn looping(tool: &str, input: Value, times: usize) -> Self {
        let turns = (0..times)
            .map(|i| ModelTurn {
                text: format!("step {i}"),
                tool_calls: vec![call(&format!("c{i}"), tool, input.clone())],
            })
            .collect();
        Self::new(turns)
    }

    pub(crate) fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

pub(crate) fn call(id: &str, name: &str, input: Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        input,
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn id(&self) -> String {
        "scripted:test".into()
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelTurn> {
        self.seen.lock().unwrap().push(SeenRequest {
            system: request.system.map(str::to_string),
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
        });
        let next = self.turns.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ModelTurn::text(self.fallback.clone())))
    }
}

/// Hands out the same model for every configuration.
pub(crate) struct StaticFactory(pub Arc<dyn LanguageModel>);

impl ModelFactory for StaticFactory {
    fn create(&self, _config: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
        Ok(self.0.clone())
    }
}

/// Gives each agent its own model, chosen by `model.model`.
pub(crate) struct ByNameFactory(pub Vec<(String, Arc<dyn LanguageModel>)>);

impl ModelFactory for ByNameFactory {
    fn create(&self, config: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
        self.0
            .iter()
            .find(|(name, _)| *name == config.model)
            .map(|(_, model)| model.clone())
            .ok_or_else(|| crate::Error::UnsupportedProvider(config.model.clone()))
    }
}
