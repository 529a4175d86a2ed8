use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{LanguageModel, ModelRequest};
use crate::error::{Error, Result};
use crate::tools::ToolSpec;
use crate::types::{ChatMessage, ModelTurn, ToolCall};

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    arguments: String,
}

/// Client for any provider speaking the OpenAI chat-completions API.
pub struct OpenAiCompatibleModel {
    client: reqwest::Client,
    provider: String,
    model: String,
    base_url: String,
    api_key: Option<String>,
    key_env: Option<&'static str>,
}

impl OpenAiCompatibleModel {
    pub fn new(
        client: reqwest::Client,
        provider: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            provider: provider.into(),
            model: model.into(),
            base_url: base_url.into(),
            api_key: None,
            key_env: None,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>, key_env: Option<&'static str>) -> Self {
        self.api_key = api_key;
        self.key_env = key_env;
        self
    }

    fn build_body(&self, request: &ModelRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": convert_messages(request.system, request.messages),
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(convert_tools(request.tools));
        }
        body
    }
}

fn convert_messages(system: Option<&str>, messages: &[ChatMessage]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        out.push(json!({"role": "system", "content": system}));
    }

    for message in messages {
        match message {
            ChatMessage::User(text) => out.push(json!({"role": "user", "content": text})),
            ChatMessage::Assistant { text, tool_calls } => {
                let mut msg = json!({"role": "assistant", "content": text});
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.input.to_string(),
                                }
                            })
                        })
                        .collect();
                    msg["tool_calls"] = Value::Array(calls);
                }
                out.push(msg);
            }
            ChatMessage::ToolResult {
                call_id, content, ..
            } => out.push(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": content,
            })),
        }
    }
    out
}

fn convert_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect()
}

fn parse_response(response: CompletionResponse) -> Result<ModelTurn> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::Model("no choices in response".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| {
            // Malformed arguments are passed through so the tool reports them.
            let input = serde_json::from_str(&c.function.arguments)
                .unwrap_or(Value::String(c.function.arguments));
            ToolCall {
                id: c.id,
                name: c.function.name,
                input,
            }
        })
        .collect();

    Ok(ModelTurn {
        text: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleModel {
    fn id(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelTurn> {
        let body = self.build_body(&request);
        tracing::trace!(model = %self.id(), "request: {body}");

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&body);
        match (&self.api_key, self.key_env) {
            (Some(key), _) => http = http.bearer_auth(key),
            (None, Some(var)) => {
                return Err(Error::Model(format!(
                    "no API key for {}: set {var} or model.apiKey",
                    self.provider
                )));
            }
            (None, None) => {}
        }

        let response = http.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!(
                "{} API error {status}: {error_text}",
                self.provider
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        parse_response(completion)
    }
}
