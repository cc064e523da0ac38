use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const AUDIT_ACTION_COMPLETE: &str = "ai_complete";
pub const AUDIT_ACTION_STREAM_COMPLETE: &str = "ai_stream_complete";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub action: String,
    pub filtered: bool,
    pub sensitive_info_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// fire-and-forget 审计落地；失败只记日志
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_audit(&self, entry: AuditEntry) -> Result<()>;
}
