use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::audit::{AuditEntry, AuditSink};
use crate::cache::KvStore;
use crate::error::Result;
use crate::filter::{FilterRule, FilterRuleStore};
use crate::usage::{DateRange, UsageRecord, UsageScope, UsageStore};

/// 纯内存存储，测试与无持久化场景使用
#[derive(Default)]
pub struct MemoryStore {
    cache: Mutex<HashMap<String, (String, Instant)>>,
    usage: Mutex<Vec<UsageRecord>>,
    rules: Mutex<HashMap<String, FilterRule>>,
    audits: Mutex<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn usage_rows(&self) -> Vec<UsageRecord> {
        self.usage.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn audit_rows(&self) -> Vec<AuditEntry> {
        self.audits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        match cache.get(key) {
            Some((_, expires_at)) if *expires_at <= Instant::now() => {
                cache.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let before = cache.len();
        cache.retain(|key, _| !key.starts_with(prefix));
        Ok((before - cache.len()) as u64)
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn insert_usage(&self, record: &UsageRecord) -> Result<()> {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    async fn query_usage(
        &self,
        scope: &UsageScope,
        range: &DateRange,
    ) -> Result<Vec<UsageRecord>> {
        let usage = self.usage.lock().unwrap_or_else(|e| e.into_inner());
        let rows = usage
            .iter()
            .filter(|r| match scope {
                UsageScope::User(id) => &r.user_id == id,
                UsageScope::Project(id) => r.project_id.as_deref() == Some(id.as_str()),
            })
            .filter(|r| r.timestamp >= range.start && r.timestamp < range.end)
            .cloned()
            .collect();
        Ok(rows)
    }
}

#[async_trait]
impl FilterRuleStore for MemoryStore {
    async fn upsert_rule(&self, rule: &FilterRule) -> Result<()> {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(rule.id.clone(), rule.clone());
        Ok(())
    }

    async fn load_rules(&self) -> Result<Vec<FilterRule>> {
        let rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<FilterRule> = rules.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn delete_rule(&self, id: &str) -> Result<()> {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn log_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn kv_ttl_zero_expires_immediately() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_by_prefix_counts() {
        let store = MemoryStore::new();
        for key in ["a:1", "a:2", "b:1"] {
            store
                .set_with_ttl(key, "v", Duration::from_secs(60))
                .await
                .unwrap();
        }
        assert_eq!(store.delete_by_prefix("a:").await.unwrap(), 2);
        assert!(store.get("b:1").await.unwrap().is_some());
    }
}
