use async_trait::async_trait;
use rusqlite::Result;

use crate::audit::{AuditEntry, AuditSink};
use crate::error::Result as GatewayResult;

use super::database::GatewayStore;

impl GatewayStore {
    pub async fn insert_audit_log(&self, entry: &AuditEntry) -> Result<()> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO audit_logs (
                user_id, project_id, action, filtered, sensitive_info_count, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                &entry.user_id,
                &entry.project_id,
                &entry.action,
                entry.filtered,
                entry.sensitive_info_count,
                entry.timestamp.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub async fn count_audit_logs(&self, action: &str) -> Result<u64> {
        let conn = self.connection.lock().await;
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_logs WHERE action = ?1",
            [action],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[async_trait]
impl AuditSink for GatewayStore {
    async fn log_audit(&self, entry: AuditEntry) -> GatewayResult<()> {
        Ok(self.insert_audit_log(&entry).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AUDIT_ACTION_COMPLETE;
    use chrono::Utc;

    #[tokio::test]
    async fn audit_entries_are_persisted() {
        let store = GatewayStore::in_memory().await.unwrap();
        store
            .insert_audit_log(&AuditEntry {
                user_id: Some("u1".into()),
                project_id: None,
                action: AUDIT_ACTION_COMPLETE.into(),
                filtered: true,
                sensitive_info_count: 2,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(
            store.count_audit_logs(AUDIT_ACTION_COMPLETE).await.unwrap(),
            1
        );
        assert_eq!(store.count_audit_logs("other").await.unwrap(), 0);
    }
}
