use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{LanguageModel, ModelRequest};
use crate::error::{Error, Result};
use crate::tools::ToolSpec;
use crate::types::{ChatMessage, ModelTurn, ToolCall};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

/// Client for the Anthropic Messages API.
pub struct AnthropicModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicModel {
    pub fn new(
        client: reqwest::Client,
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            base_url: base_url.into(),
            api_key,
        }
    }

    fn build_body(&self, request: &ModelRequest<'_>) -> Value {
        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": convert_messages(request.messages),
        });
        if let Some(system) = request.system {
            body["system"] = Value::String(system.to_string());
        }
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(convert_tools(request.tools));
        }
        body
    }
}

fn convert_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            ChatMessage::User(text) => out.push(json!({"role": "user", "content": text})),
            ChatMessage::Assistant { text, tool_calls } => {
                let mut content = Vec::new();
                if !text.is_empty() {
                    content.push(json!({"type": "text", "text": text}));
                }
                for tc in tool_calls {
                    content.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.input,
                    }));
                }
                if content.is_empty() {
                    content.push(json!({"type": "text", "text": ""}));
                }
                out.push(json!({"role": "assistant", "content": content}));
            }
            ChatMessage::ToolResult {
                call_id,
                content,
                is_error,
            } => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": content,
                    "is_error": is_error,
                });
                // All results of one step go into a single user turn.
                let merge = out
                    .last()
                    .is_some_and(|last| last["role"] == "user" && last["content"].is_array());
                if !merge {
                    out.push(json!({"role": "user", "content": []}));
                }
                if let Some(blocks) = out.last_mut().and_then(|last| last["content"].as_array_mut()) {
                    blocks.push(block);
                }
            }
        }
    }
    out
}

fn convert_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            })
        })
        .collect()
}

fn parse_response(response: MessagesResponse) -> ModelTurn {
    let mut turn = ModelTurn::default();
    for block in response.content {
        match block {
            ResponseBlock::Text { text } => turn.text.push_str(&text),
            ResponseBlock::ToolUse { id, name, input } => {
                turn.tool_calls.push(ToolCall { id, name, input })
            }
            ResponseBlock::Other => {}
        }
    }
    turn
}

#[async_trait]
impl LanguageModel for AnthropicModel {
    fn id(&self) -> String {
        format!("anthropic:{}", self.model)
    }

    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelTurn> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::Model("no API key for anthropic: set ANTHROPIC_API_KEY or model.apiKey".into())
        })?;

        let body = self.build_body(&request);
        tracing::trace!(model = %self.id(), "request: {body}");

        let response = self
            .client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("anthropic API error {status}: {error_text}")));
        }

        let raw: MessagesResponse = response.json().await?;
        Ok(parse_response(raw))
    }
}
