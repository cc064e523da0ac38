use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::config::{GatewayConfig, Provider};
use crate::error::Result;
use crate::providers::types::{CompletionOptions, CompletionResult};

pub const CACHE_KEY_PREFIX: &str = "llm:cache:";
pub const DEFAULT_TTL_SECS: u64 = 86_400;

// 缓存键里省略 temperature 时按该默认值归一化
const DEFAULT_TEMPERATURE: f32 = 1.0;

/// TTL 键值存储抽象（可由 SQLite、Redis 等实现）
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
    pub hit_rate_percent: f64,
}

/// 内容寻址的补全结果缓存；存储故障一律降级为未命中
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    /// 对归一化后的请求内容做 SHA-256；字段内部顺序不影响键值
    pub fn generate_key(config: &GatewayConfig, options: &CompletionOptions) -> String {
        let canonical = json!({
            "provider": config.provider.as_str(),
            "model": config.model,
            "temperature": options
                .temperature
                .or(config.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            "max_tokens": options.max_tokens.or(config.max_tokens),
            "messages": options
                .messages
                .iter()
                .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
                .collect::<Vec<_>>(),
            "functions": options.functions.as_ref().map(|fns| {
                fns.iter()
                    .map(|f| json!({"name": f.name, "parameters": f.parameters}))
                    .collect::<Vec<_>>()
            }),
            "stop_sequences": options.stop_sequences,
        });

        let mut serialized = String::new();
        write_canonical(&canonical, &mut serialized);

        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        let digest = hasher.finalize();

        format!(
            "{}{}:{}",
            CACHE_KEY_PREFIX,
            config.provider.as_str(),
            hex::encode(digest)
        )
    }

    pub async fn get(&self, key: &str) -> Option<CompletionResult> {
        let value = match self.store.get(key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Cache read failed, treating as miss: {}", e);
                None
            }
        };

        match value.and_then(|v| match serde_json::from_str::<CompletionResult>(&v) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!("Cache entry corrupt, treating as miss: {}", e);
                None
            }
        }) {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, result: &CompletionResult) {
        let value = match serde_json::to_string(result) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Cache serialization failed: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set_with_ttl(key, &value, self.ttl).await {
            tracing::warn!("Cache write failed: {}", e);
        }
    }

    pub async fn clear_all(&self) -> Result<u64> {
        self.store.delete_by_prefix(CACHE_KEY_PREFIX).await
    }

    pub async fn clear_by_provider(&self, provider: Provider) -> Result<u64> {
        let prefix = format!("{}{}:", CACHE_KEY_PREFIX, provider.as_str());
        self.store.delete_by_prefix(&prefix).await
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            total,
            hit_rate_percent: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64 * 100.0
            },
        }
    }
}

// 不依赖 serde_json 的 map 顺序语义：对象键排序后自行序列化
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::{ChatMessage, FinishReason, FunctionDef, Usage};
    use crate::storage::memory::MemoryStore;

    fn config() -> GatewayConfig {
        GatewayConfig::new(Provider::OpenAI, "gpt-4o")
    }

    fn options_with_params(params: serde_json::Value) -> CompletionOptions {
        let mut options = CompletionOptions::from_messages(vec![
            ChatMessage::system("assistant"),
            ChatMessage::user("hello"),
        ]);
        options.functions = Some(vec![FunctionDef {
            name: "lookup".into(),
            description: Some("desc".into()),
            parameters: params,
        }]);
        options
    }

    #[test]
    fn key_is_stable_under_map_reordering() {
        let a = options_with_params(serde_json::json!({
            "type": "object",
            "properties": {"city": {"type": "string"}, "unit": {"type": "string"}}
        }));
        let b = options_with_params(
            serde_json::from_str(
                r#"{"properties": {"unit": {"type": "string"}, "city": {"type": "string"}}, "type": "object"}"#,
            )
            .unwrap(),
        );
        assert_eq!(
            ResponseCache::generate_key(&config(), &a),
            ResponseCache::generate_key(&config(), &b)
        );
    }

    #[test]
    fn omitted_temperature_matches_explicit_default() {
        let mut a = CompletionOptions::from_messages(vec![ChatMessage::user("hi")]);
        let mut b = a.clone();
        a.temperature = None;
        b.temperature = Some(1.0);
        assert_eq!(
            ResponseCache::generate_key(&config(), &a),
            ResponseCache::generate_key(&config(), &b)
        );

        b.temperature = Some(0.2);
        assert_ne!(
            ResponseCache::generate_key(&config(), &a),
            ResponseCache::generate_key(&config(), &b)
        );
    }

    #[test]
    fn key_changes_with_content() {
        let a = CompletionOptions::from_messages(vec![ChatMessage::user("hello")]);
        let b = CompletionOptions::from_messages(vec![ChatMessage::user("world")]);
        assert_ne!(
            ResponseCache::generate_key(&config(), &a),
            ResponseCache::generate_key(&config(), &b)
        );
    }

    #[test]
    fn key_embeds_provider_namespace() {
        let opts = CompletionOptions::from_messages(vec![ChatMessage::user("hi")]);
        let key = ResponseCache::generate_key(&config(), &opts);
        assert!(key.starts_with("llm:cache:openai:"));
    }

    fn sample_result() -> CompletionResult {
        CompletionResult {
            content: "cached".into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::new(7, 2),
            function_call: None,
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = ResponseCache::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(DEFAULT_TTL_SECS),
        );
        cache.set("llm:cache:openai:k1", &sample_result()).await;
        let got = cache.get("llm:cache:openai:k1").await.unwrap();
        assert_eq!(got, sample_result());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate_percent, 100.0);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()), Duration::from_secs(0));
        cache.set("llm:cache:openai:k1", &sample_result()).await;
        assert!(cache.get("llm:cache:openai:k1").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn clear_by_provider_only_touches_namespace() {
        let cache = ResponseCache::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(DEFAULT_TTL_SECS),
        );
        cache.set("llm:cache:openai:k1", &sample_result()).await;
        cache.set("llm:cache:zhipu:k2", &sample_result()).await;

        let removed = cache.clear_by_provider(Provider::OpenAI).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("llm:cache:openai:k1").await.is_none());
        assert!(cache.get("llm:cache:zhipu:k2").await.is_some());
    }
}
