//! Language model clients.
//!
//! The loop only needs one non-streaming call: send the conversation and the
//! available tools, get back text and tool calls. [`LanguageModel`] is that
//! seam; [`ModelFactory`] turns a [`ModelConfig`] into one.

pub mod anthropic;
pub mod factory;
pub mod openai;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::tools::ToolSpec;
use crate::types::{ChatMessage, ModelConfig, ModelTurn};

pub use anthropic::AnthropicModel;
pub use factory::ProviderFactory;
pub use openai::OpenAiCompatibleModel;

/// Everything the model sees for one step.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolSpec],
}

/// A chat model able to request tool calls.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Identifier for logs, e.g. `openai:gpt-4o-mini`.
    fn id(&self) -> String;

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelTurn>;
}

/// Creates model clients from configuration.
pub trait ModelFactory: Send + Sync {
    /// Fails with [`crate::Error::UnsupportedProvider`] for unknown providers.
    fn create(&self, config: &ModelConfig) -> Result<Arc<dyn LanguageModel>>;
}

/// Credential resolved at build time; a missing key only fails on use.
pub(crate) fn resolve_api_key(config: &ModelConfig, env_var: Option<&str>) -> Option<String> {
    config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| env_var.and_then(|var| std::env::var(var).ok()))
        .filter(|k| !k.is_empty())
}
