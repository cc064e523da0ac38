use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::providers::openai::OpenAiCompatible;
use crate::providers::streaming::ChunkStream;
use crate::providers::types::{CompletionOptions, CompletionResult};
use crate::providers::ProviderAdapter;

/// 通义千问，走 DashScope 的 OpenAI 兼容模式
pub struct QwenAdapter {
    inner: OpenAiCompatible,
}

impl QwenAdapter {
    pub fn new(config: &GatewayConfig, api_key: String) -> Self {
        Self {
            inner: OpenAiCompatible {
                name: "qwen",
                client: reqwest::Client::new(),
                url: format!("{}/chat/completions", config.base_url().trim_end_matches('/')),
                api_key,
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                function_role_supported: false,
            },
        }
    }
}

#[async_trait]
impl ProviderAdapter for QwenAdapter {
    fn name(&self) -> &'static str {
        "qwen"
    }

    async fn complete(&self, options: &CompletionOptions) -> Result<CompletionResult> {
        self.inner.complete(options, |req| req).await
    }

    async fn stream_complete(&self, options: &CompletionOptions) -> Result<ChunkStream> {
        self.inner.stream(options, |req| req)
    }
}
