use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::providers::openai::{ChatRequest, OpenAiCompatible};
use crate::providers::streaming::ChunkStream;
use crate::providers::types::{CompletionOptions, CompletionResult};
use crate::providers::ProviderAdapter;

// 轻量适配：智谱拒绝 temperature >= 1 的边界值，压至 0.99
fn adapt_request_for_zhipu(mut req: ChatRequest) -> ChatRequest {
    if let Some(t) = req.temperature
        && t >= 1.0
    {
        req.temperature = Some(0.99);
    }
    req
}

pub struct ZhipuAdapter {
    inner: OpenAiCompatible,
}

impl ZhipuAdapter {
    pub fn new(config: &GatewayConfig, api_key: String) -> Self {
        Self {
            inner: OpenAiCompatible {
                name: "zhipu",
                client: reqwest::Client::new(),
                url: format!(
                    "{}/api/paas/v4/chat/completions",
                    config.base_url().trim_end_matches('/')
                ),
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
impl ProviderAdapter for ZhipuAdapter {
    fn name(&self) -> &'static str {
        "zhipu"
    }

    async fn complete(&self, options: &CompletionOptions) -> Result<CompletionResult> {
        self.inner.complete(options, adapt_request_for_zhipu).await
    }

    async fn stream_complete(&self, options: &CompletionOptions) -> Result<ChunkStream> {
        self.inner.stream(options, adapt_request_for_zhipu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::openai::WireMessage;

    fn request_with_temperature(temperature: Option<f32>) -> ChatRequest {
        ChatRequest {
            model: "glm-4-plus".into(),
            messages: vec![WireMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            temperature,
            max_tokens: None,
            tools: None,
            stop: None,
            stream: None,
        }
    }

    #[test]
    fn clamps_boundary_temperature() {
        let req = adapt_request_for_zhipu(request_with_temperature(Some(1.0)));
        assert_eq!(req.temperature, Some(0.99));

        let req = adapt_request_for_zhipu(request_with_temperature(Some(0.7)));
        assert_eq!(req.temperature, Some(0.7));

        let req = adapt_request_for_zhipu(request_with_temperature(None));
        assert_eq!(req.temperature, None);
    }
}
