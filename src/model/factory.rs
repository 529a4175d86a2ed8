use std::sync::Arc;
use std::time::Duration;

use super::{resolve_api_key, AnthropicModel, LanguageModel, ModelFactory, OpenAiCompatibleModel};
use crate::error::{Error, Result};
use crate::types::ModelConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint and credential variable of a provider with an
/// OpenAI-compatible chat-completions API.
struct CompatibleProvider {
    name: &'static str,
    base_url: &'static str,
    key_env: Option<&'static str>,
}

const COMPATIBLE_PROVIDERS: &[CompatibleProvider] = &[
    CompatibleProvider { name: "openai", base_url: "https://api.openai.com/v1", key_env: Some("OPENAI_API_KEY") },
    CompatibleProvider { name: "google", base_url: "https://generativelanguage.googleapis.com/v1beta/openai", key_env: Some("GOOGLE_GENERATIVE_AI_API_KEY") },
    CompatibleProvider { name: "mistral", base_url: "https://api.mistral.ai/v1", key_env: Some("MISTRAL_API_KEY") },
    CompatibleProvider { name: "groq", base_url: "https://api.groq.com/openai/v1", key_env: Some("GROQ_API_KEY") },
    CompatibleProvider { name: "deepseek", base_url: "https://api.deepseek.com/v1", key_env: Some("DEEPSEEK_API_KEY") },
    CompatibleProvider { name: "xai", base_url: "https://api.x.ai/v1", key_env: Some("XAI_API_KEY") },
    CompatibleProvider { name: "togetherai", base_url: "https://api.together.xyz/v1", key_env: Some("TOGETHER_AI_API_KEY") },
    CompatibleProvider { name: "fireworks", base_url: "https://api.fireworks.ai/inference/v1", key_env: Some("FIREWORKS_API_KEY") },
    CompatibleProvider { name: "cerebras", base_url: "https://api.cerebras.ai/v1", key_env: Some("CEREBRAS_API_KEY") },
    CompatibleProvider { name: "deepinfra", base_url: "https://api.deepinfra.com/v1/openai", key_env: Some("DEEPINFRA_API_KEY") },
    CompatibleProvider { name: "perplexity", base_url: "https://api.perplexity.ai", key_env: Some("PERPLEXITY_API_KEY") },
    CompatibleProvider { name: "cohere", base_url: "https://api.cohere.ai/compatibility/v1", key_env: Some("COHERE_API_KEY") },
    CompatibleProvider { name: "openrouter", base_url: "https://openrouter.ai/api/v1", key_env: Some("OPENROUTER_API_KEY") },
    CompatibleProvider { name: "ollama", base_url: "http://localhost:11434/v1", key_env: None },
];

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// The default [`ModelFactory`]: maps provider names to HTTP clients.
///
/// Client construction does no I/O. Credentials come from `apiKey` or the
/// provider's environment variable; a missing key fails on first use.
#[derive(Clone)]
pub struct ProviderFactory {
    client: reqwest::Client,
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Names accepted in `model.provider`.
    pub fn supported_providers() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = COMPATIBLE_PROVIDERS.iter().map(|p| p.name).collect();
        names.push("anthropic");
        names
    }
}

impl ModelFactory for ProviderFactory {
    fn create(&self, config: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
        let provider = config.provider.as_str();

        if provider == "anthropic" {
            let base_url = config.base_url.as_deref().unwrap_or(ANTHROPIC_BASE_URL);
            let api_key = resolve_api_key(config, Some("ANTHROPIC_API_KEY"));
            return Ok(Arc::new(AnthropicModel::new(
                self.client.clone(),
                &config.model,
                base_url,
                api_key,
            )));
        }

        let entry = COMPATIBLE_PROVIDERS
            .iter()
            .find(|p| p.name == provider)
            .ok_or_else(|| Error::UnsupportedProvider(config.provider.clone()))?;

        let base_url = config.base_url.as_deref().unwrap_or(entry.base_url);
        let api_key = resolve_api_key(config, entry.key_env);
        let model = OpenAiCompatibleModel::new(self.client.clone(), entry.name, &config.model, base_url)
            .with_api_key(api_key, entry.key_env);
        Ok(Arc::new(model))
    }
}
