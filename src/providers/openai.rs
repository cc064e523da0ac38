use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::providers::streaming::{ChunkStream, Delta, sse_text_stream};
use crate::providers::types::{
    CompletionOptions, CompletionResult, FinishReason, FunctionCall, FunctionDef, Role, Usage,
};
use crate::providers::ProviderAdapter;

// ---- OpenAI 兼容协议的线格式（openai / zhipu / qwen 共用） ----

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct WireTool {
    pub r#type: String,
    pub function: WireFunction,
}

#[derive(Debug, Serialize)]
pub struct WireFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
pub struct WireToolCall {
    pub function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// canonical role -> 线上 role；不支持 function 角色的上游改写为 user
pub(crate) fn to_wire_messages(
    messages: &[crate::providers::types::ChatMessage],
    function_role_supported: bool,
) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::Function if !function_role_supported => "user",
                other => other.as_str(),
            };
            WireMessage {
                role: role.to_string(),
                content: m.content.clone(),
            }
        })
        .collect()
}

pub(crate) fn to_wire_tools(functions: &Option<Vec<FunctionDef>>) -> Option<Vec<WireTool>> {
    functions.as_ref().map(|fns| {
        fns.iter()
            .map(|f| WireTool {
                r#type: "function".to_string(),
                function: WireFunction {
                    name: f.name.clone(),
                    description: f.description.clone(),
                    parameters: f.parameters.clone(),
                },
            })
            .collect()
    })
}

/// openai / zhipu / qwen 的公共客户端；各 adapter 仅差 endpoint 与请求微调
pub(crate) struct OpenAiCompatible {
    pub name: &'static str,
    pub client: reqwest::Client,
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub function_role_supported: bool,
}

impl OpenAiCompatible {
    fn build_request(&self, options: &CompletionOptions, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: to_wire_messages(&options.messages, self.function_role_supported),
            temperature: options.temperature.or(self.temperature),
            max_tokens: options.max_tokens.or(self.max_tokens),
            tools: to_wire_tools(&options.functions),
            stop: options.stop_sequences.clone(),
            stream: stream.then_some(true),
        }
    }

    pub async fn complete(
        &self,
        options: &CompletionOptions,
        adapt: impl Fn(ChatRequest) -> ChatRequest,
    ) -> Result<CompletionResult> {
        let request = adapt(self.build_request(options, false));
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "{} returned {}: {}",
                self.name, status, body
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Provider(format!("{} returned no choices", self.name)))?;

        let function_call = choice
            .message
            .tool_calls
            .and_then(|calls| calls.into_iter().next())
            .map(|tc| FunctionCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            });

        let usage = parsed.usage.unwrap_or_default();
        Ok(CompletionResult {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_openai)
                .unwrap_or(FinishReason::Stop),
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            function_call,
        })
    }

    pub fn stream(
        &self,
        options: &CompletionOptions,
        adapt: impl Fn(ChatRequest) -> ChatRequest,
    ) -> Result<ChunkStream> {
        let request = adapt(self.build_request(options, true));
        let builder = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&request);

        sse_text_stream(builder, |data| {
            match serde_json::from_str::<StreamChunk>(data) {
                Ok(chunk) => match chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                {
                    Some(text) => Delta::Text(text),
                    None => Delta::Skip,
                },
                Err(_) => Delta::Skip,
            }
        })
    }
}

pub struct OpenAiAdapter {
    inner: OpenAiCompatible,
}

impl OpenAiAdapter {
    pub fn new(config: &GatewayConfig, api_key: String) -> Self {
        Self {
            inner: OpenAiCompatible {
                name: "openai",
                client: reqwest::Client::new(),
                url: format!("{}/chat/completions", config.base_url().trim_end_matches('/')),
                api_key,
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                // OpenAI 接受遗留 function 角色
                function_role_supported: true,
            },
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, options: &CompletionOptions) -> Result<CompletionResult> {
        self.inner.complete(options, |req| req).await
    }

    async fn stream_complete(&self, options: &CompletionOptions) -> Result<ChunkStream> {
        self.inner.stream(options, |req| req)
    }
}
