pub mod anthropic;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod qwen;
pub mod streaming;
pub mod types;
pub mod zhipu;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

use crate::error::Result;
use crate::providers::streaming::ChunkStream;
use crate::providers::types::{CompletionOptions, CompletionResult};

/// 各上游的统一补全契约；adapter 无状态，可按请求构造
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, options: &CompletionOptions) -> Result<CompletionResult>;

    /// 惰性、有限、不可重放的文本块序列；丢弃流即中止上游请求
    async fn stream_complete(&self, options: &CompletionOptions) -> Result<ChunkStream>;
}

pub use anthropic::AnthropicAdapter;
pub use factory::{AdapterFactory, DefaultAdapterFactory};
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use qwen::QwenAdapter;
pub use zhipu::ZhipuAdapter;
