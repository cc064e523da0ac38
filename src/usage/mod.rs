pub mod pricing;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Provider;
use crate::error::Result;
use crate::providers::types::Usage;

pub use pricing::{DEFAULT_PRICE, ModelPrice, calculate_cost, price_for};

/// 一次调用的用户上下文；无上下文的调用不落账
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallContext {
    pub user_id: String,
    pub project_id: Option<String>,
}

impl CallContext {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// 整数分，由静态价格表推导
    pub cost: i64,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum UsageScope {
    User(String),
    Project(String),
}

#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// 用量行持久化抽象
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn insert_usage(&self, record: &UsageRecord) -> Result<()>;
    async fn query_usage(&self, scope: &UsageScope, range: &DateRange)
    -> Result<Vec<UsageRecord>>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupUsage {
    pub calls: u64,
    pub tokens: u64,
    pub cost: i64,
}

#[derive(Debug, Clone, Default)]
pub struct UsageStatistics {
    pub total_calls: u64,
    pub cached_calls: u64,
    pub total_tokens: u64,
    pub total_cost: i64,
    pub by_provider: HashMap<String, GroupUsage>,
    pub by_model: HashMap<String, GroupUsage>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub monthly_token_limit: u64,
    pub monthly_cost_limit: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaStatus {
    pub exceeded: bool,
    pub tokens_used: u64,
    pub cost_used: i64,
    pub token_percent: f64,
    pub cost_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    None,
    Warning,
    Critical,
}

const WARNING_THRESHOLD_PERCENT: f64 = 90.0;

/// 成本与配额台账；写入均为 best-effort，绝不影响补全主路径
#[derive(Clone)]
pub struct UsageLedger {
    store: Arc<dyn UsageStore>,
}

impl UsageLedger {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        ctx: Option<&CallContext>,
        provider: Provider,
        model: &str,
        usage: &Usage,
    ) {
        let Some(ctx) = ctx else {
            tracing::debug!("No call context, skipping usage record");
            return;
        };
        let record = UsageRecord {
            id: Uuid::new_v4().to_string(),
            user_id: ctx.user_id.clone(),
            project_id: ctx.project_id.clone(),
            provider: provider.as_str().to_string(),
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cost: calculate_cost(model, usage.prompt_tokens, usage.completion_tokens),
            cached: false,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.store.insert_usage(&record).await {
            tracing::warn!("Usage record failed: {}", e);
        }
    }

    /// 缓存命中按零成本落账，且仅在存在用户上下文时
    pub async fn record_cache_hit(&self, ctx: Option<&CallContext>, provider: Provider, model: &str) {
        let Some(ctx) = ctx else {
            return;
        };
        let record = UsageRecord {
            id: Uuid::new_v4().to_string(),
            user_id: ctx.user_id.clone(),
            project_id: ctx.project_id.clone(),
            provider: provider.as_str().to_string(),
            model: model.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost: 0,
            cached: true,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.store.insert_usage(&record).await {
            tracing::warn!("Cache-hit usage record failed: {}", e);
        }
    }

    pub async fn statistics(
        &self,
        scope: &UsageScope,
        range: &DateRange,
    ) -> Result<UsageStatistics> {
        let rows = self.store.query_usage(scope, range).await?;
        let mut stats = UsageStatistics::default();
        for row in rows {
            stats.total_calls += 1;
            if row.cached {
                stats.cached_calls += 1;
            }
            stats.total_tokens += row.total_tokens as u64;
            stats.total_cost += row.cost;

            for (key, group) in [
                (row.provider.clone(), &mut stats.by_provider),
                (row.model.clone(), &mut stats.by_model),
            ] {
                let entry = group.entry(key).or_default();
                entry.calls += 1;
                entry.tokens += row.total_tokens as u64;
                entry.cost += row.cost;
            }
        }
        Ok(stats)
    }

    pub async fn check_quota(&self, scope: &UsageScope, quota: QuotaConfig) -> Result<QuotaStatus> {
        let range = current_month_range(Utc::now());
        let stats = self.statistics(scope, &range).await?;

        let token_percent = percent_of(stats.total_tokens as f64, quota.monthly_token_limit as f64);
        let cost_percent = percent_of(stats.total_cost as f64, quota.monthly_cost_limit as f64);
        let exceeded = (quota.monthly_token_limit > 0
            && stats.total_tokens >= quota.monthly_token_limit)
            || (quota.monthly_cost_limit > 0 && stats.total_cost >= quota.monthly_cost_limit);

        Ok(QuotaStatus {
            exceeded,
            tokens_used: stats.total_tokens,
            cost_used: stats.total_cost,
            token_percent,
            cost_percent,
        })
    }

    /// 告警分级；实际通知由外部协作方负责
    pub async fn check_and_alert(
        &self,
        scope: &UsageScope,
        quota: QuotaConfig,
    ) -> Result<AlertLevel> {
        let status = self.check_quota(scope, quota).await?;
        let level = if status.exceeded {
            AlertLevel::Critical
        } else if status.token_percent >= WARNING_THRESHOLD_PERCENT
            || status.cost_percent >= WARNING_THRESHOLD_PERCENT
        {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        };

        match level {
            AlertLevel::Critical => {
                tracing::warn!(
                    tokens = status.tokens_used,
                    cost = status.cost_used,
                    "Monthly quota exceeded"
                );
            }
            AlertLevel::Warning => {
                tracing::warn!(
                    token_percent = status.token_percent,
                    cost_percent = status.cost_percent,
                    "Monthly quota above warning threshold"
                );
            }
            AlertLevel::None => {}
        }
        Ok(level)
    }
}

fn percent_of(used: f64, limit: f64) -> f64 {
    if limit <= 0.0 { 0.0 } else { used / limit * 100.0 }
}

/// 自然月窗口 [月初, 下月初)
pub fn current_month_range(now: DateTime<Utc>) -> DateRange {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .unwrap();
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .unwrap();
    DateRange { start, end }
}
