use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::providers::streaming::{ChunkStream, Delta, sse_text_stream};
use crate::providers::types::{
    ChatMessage, CompletionOptions, CompletionResult, FinishReason, FunctionCall, Role, Usage,
};
use crate::providers::ProviderAdapter;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    r#type: String,
    #[serde(default)]
    delta: Option<StreamEventDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamEventDelta {
    #[serde(default)]
    text: Option<String>,
}

/// system 消息不进消息数组，合并为顶层 system 提示
fn extract_system_prompt(messages: &[ChatMessage]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

fn to_wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| WireMessage {
            // Anthropic 只接受 user/assistant，function 结果按 user 回传
            role: match m.role {
                Role::Assistant => "assistant",
                _ => "user",
            }
            .to_string(),
            content: m.content.clone(),
        })
        .collect()
}

pub struct AnthropicAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl AnthropicAdapter {
    pub fn new(config: &GatewayConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn build_request(&self, options: &CompletionOptions, stream: bool) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            system: extract_system_prompt(&options.messages),
            messages: to_wire_messages(&options.messages),
            max_tokens: options
                .max_tokens
                .or(self.max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature.or(self.temperature),
            stop_sequences: options.stop_sequences.clone(),
            tools: options.functions.as_ref().map(|fns| {
                fns.iter()
                    .map(|f| WireTool {
                        name: f.name.clone(),
                        description: f.description.clone(),
                        input_schema: f.parameters.clone(),
                    })
                    .collect()
            }),
            stream: stream.then_some(true),
        }
    }

    fn request_builder(&self, request: &MessagesRequest) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn complete(&self, options: &CompletionOptions) -> Result<CompletionResult> {
        let request = self.build_request(options, false);
        let response = self.request_builder(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "anthropic returned {}: {}",
                status, body
            )));
        }

        let parsed: MessagesResponse = response.json().await?;

        let mut content = String::new();
        let mut function_call = None;
        for block in parsed.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { name, input } => {
                    if function_call.is_none() {
                        function_call = Some(FunctionCall {
                            name,
                            arguments: input.to_string(),
                        });
                    }
                }
                ContentBlock::Other => {}
            }
        }

        Ok(CompletionResult {
            content,
            finish_reason: parsed
                .stop_reason
                .as_deref()
                .map(FinishReason::from_anthropic)
                .unwrap_or(FinishReason::Stop),
            usage: Usage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
            function_call,
        })
    }

    async fn stream_complete(&self, options: &CompletionOptions) -> Result<ChunkStream> {
        let request = self.build_request(options, true);
        let builder = self
            .request_builder(&request)
            .header("Accept", "text/event-stream");

        sse_text_stream(builder, |data| {
            match serde_json::from_str::<StreamEvent>(data) {
                Ok(ev) if ev.r#type == "content_block_delta" => {
                    match ev.delta.and_then(|d| d.text) {
                        Some(text) => Delta::Text(text),
                        None => Delta::Skip,
                    }
                }
                Ok(ev) if ev.r#type == "message_stop" => Delta::Done,
                _ => Delta::Skip,
            }
        })
    }
}
