use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::providers::factory::AdapterFactory;
use crate::providers::streaming::ChunkStream;
use crate::providers::types::{CompletionOptions, CompletionResult, FinishReason, Usage};
use crate::providers::ProviderAdapter;

/// 测试用的计数 adapter：记录调用次数与实际产出的块数
#[derive(Clone)]
pub struct MockAdapter {
    pub content: String,
    pub chunks: Vec<String>,
    pub complete_calls: Arc<AtomicUsize>,
    pub stream_calls: Arc<AtomicUsize>,
    pub chunks_produced: Arc<AtomicUsize>,
}

impl MockAdapter {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            chunks: Vec::new(),
            complete_calls: Arc::new(AtomicUsize::new(0)),
            stream_calls: Arc::new(AtomicUsize::new(0)),
            chunks_produced: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_chunks(mut self, chunks: Vec<&str>) -> Self {
        self.chunks = chunks.into_iter().map(String::from).collect();
        self
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, _options: &CompletionOptions) -> Result<CompletionResult> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CompletionResult {
            content: self.content.clone(),
            finish_reason: FinishReason::Stop,
            usage: Usage::new(10, 5),
            function_call: None,
        })
    }

    async fn stream_complete(&self, _options: &CompletionOptions) -> Result<ChunkStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let produced = self.chunks_produced.clone();
        let chunks: std::collections::VecDeque<String> = self.chunks.iter().cloned().collect();

        let stream =
            futures_util::stream::try_unfold((chunks, produced), |(mut chunks, produced)| async move {
                match chunks.pop_front() {
                    Some(chunk) => {
                        produced.fetch_add(1, Ordering::SeqCst);
                        Ok(Some((chunk, (chunks, produced))))
                    }
                    None => Ok(None),
                }
            });
        Ok(Box::pin(stream))
    }
}

/// 始终返回同一个 mock adapter 的工厂
pub struct MockFactory {
    pub adapter: MockAdapter,
}

impl MockFactory {
    pub fn new(adapter: MockAdapter) -> Self {
        Self { adapter }
    }
}

impl AdapterFactory for MockFactory {
    fn create(&self, _config: &GatewayConfig) -> Result<Box<dyn ProviderAdapter>> {
        Ok(Box::new(self.adapter.clone()))
    }
}
