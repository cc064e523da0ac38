use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::providers::openai::{WireMessage, to_wire_messages};
use crate::providers::streaming::{ChunkStream, Delta, ndjson_text_stream};
use crate::providers::types::{
    CompletionOptions, CompletionResult, FinishReason, Usage,
};
use crate::providers::ProviderAdapter;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

#[derive(Debug, Serialize)]
struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// 本地 Ollama，走 /api/chat；无函数调用能力，functions 直接忽略
pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OllamaAdapter {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn build_request(&self, options: &CompletionOptions, stream: bool) -> ChatRequest {
        if options.functions.is_some() {
            tracing::debug!("ollama does not support function calling, dropping functions");
        }

        let temperature = options.temperature.or(self.temperature);
        let num_predict = options.max_tokens.or(self.max_tokens);
        let stop = options.stop_sequences.clone();
        let model_options = if temperature.is_none() && num_predict.is_none() && stop.is_none() {
            None
        } else {
            Some(ModelOptions {
                temperature,
                num_predict,
                stop,
            })
        };

        ChatRequest {
            model: self.model.clone(),
            messages: to_wire_messages(&options.messages, false),
            stream,
            options: model_options,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Provider(format!(
                "ollama returned {}: {}",
                status, body
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, options: &CompletionOptions) -> Result<CompletionResult> {
        let request = self.build_request(options, false);
        let parsed: ChatResponse = self.send(&request).await?.json().await?;

        let prompt_tokens = parsed.prompt_eval_count.unwrap_or(0);
        let completion_tokens = parsed.eval_count.unwrap_or(0);
        Ok(CompletionResult {
            content: parsed.message.map(|m| m.content).unwrap_or_default(),
            finish_reason: match parsed.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
            usage: Usage::new(prompt_tokens, completion_tokens),
            function_call: None,
        })
    }

    async fn stream_complete(&self, options: &CompletionOptions) -> Result<ChunkStream> {
        let request = self.build_request(options, true);
        let response = self.send(&request).await?;
        let bytes = response
            .bytes_stream()
            .map(|r| r.map(|b| b.to_vec()).map_err(GatewayError::Http));

        Ok(ndjson_text_stream(Box::pin(bytes), |line| {
            match serde_json::from_str::<ChatResponse>(line) {
                Ok(chunk) if chunk.done => Delta::Done,
                Ok(chunk) => match chunk.message {
                    Some(m) if !m.content.is_empty() => Delta::Text(m.content),
                    _ => Delta::Skip,
                },
                Err(_) => Delta::Skip,
            }
        }))
    }
}
