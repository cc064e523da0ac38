use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Result;

use crate::error::Result as GatewayResult;
use crate::usage::{DateRange, UsageRecord, UsageScope, UsageStore};

use super::database::GatewayStore;

impl GatewayStore {
    pub async fn insert_usage_record(&self, record: &UsageRecord) -> Result<()> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO usage_records (
                id, user_id, project_id, provider, model,
                prompt_tokens, completion_tokens, total_tokens,
                cost, cached, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            (
                &record.id,
                &record.user_id,
                &record.project_id,
                &record.provider,
                &record.model,
                record.prompt_tokens,
                record.completion_tokens,
                record.total_tokens,
                record.cost,
                record.cached,
                record.timestamp.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub async fn query_usage_records(
        &self,
        scope: &UsageScope,
        range: &DateRange,
    ) -> Result<Vec<UsageRecord>> {
        let conn = self.connection.lock().await;
        let (column, value) = match scope {
            UsageScope::User(id) => ("user_id", id.as_str()),
            UsageScope::Project(id) => ("project_id", id.as_str()),
        };
        let sql = format!(
            "SELECT id, user_id, project_id, provider, model,
                    prompt_tokens, completion_tokens, total_tokens,
                    cost, cached, timestamp
             FROM usage_records
             WHERE {} = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp",
            column
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map(
            (value, range.start.to_rfc3339(), range.end.to_rfc3339()),
            |row| {
                let timestamp: String = row.get(10)?;
                Ok(UsageRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    project_id: row.get(2)?,
                    provider: row.get(3)?,
                    model: row.get(4)?,
                    prompt_tokens: row.get(5)?,
                    completion_tokens: row.get(6)?,
                    total_tokens: row.get(7)?,
                    cost: row.get(8)?,
                    cached: row.get(9)?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[async_trait]
impl UsageStore for GatewayStore {
    async fn insert_usage(&self, record: &UsageRecord) -> GatewayResult<()> {
        Ok(self.insert_usage_record(record).await?)
    }

    async fn query_usage(
        &self,
        scope: &UsageScope,
        range: &DateRange,
    ) -> GatewayResult<Vec<UsageRecord>> {
        Ok(self.query_usage_records(scope, range).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::current_month_range;

    fn record(user: &str, project: Option<&str>, tokens: u32) -> UsageRecord {
        UsageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            project_id: project.map(String::from),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            prompt_tokens: tokens,
            completion_tokens: 0,
            total_tokens: tokens,
            cost: 1,
            cached: false,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_query_by_user_scope() {
        let store = GatewayStore::in_memory().await.unwrap();
        store.insert_usage_record(&record("u1", None, 10)).await.unwrap();
        store.insert_usage_record(&record("u2", None, 20)).await.unwrap();

        let range = current_month_range(Utc::now());
        let rows = store
            .query_usage_records(&UsageScope::User("u1".into()), &range)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_tokens, 10);
    }

    #[tokio::test]
    async fn query_by_project_scope() {
        let store = GatewayStore::in_memory().await.unwrap();
        store
            .insert_usage_record(&record("u1", Some("p1"), 10))
            .await
            .unwrap();
        store.insert_usage_record(&record("u1", None, 20)).await.unwrap();

        let range = current_month_range(Utc::now());
        let rows = store
            .query_usage_records(&UsageScope::Project("p1".into()), &range)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].project_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn rows_outside_range_excluded() {
        let store = GatewayStore::in_memory().await.unwrap();
        let mut old = record("u1", None, 10);
        old.timestamp = Utc::now() - chrono::Duration::days(400);
        store.insert_usage_record(&old).await.unwrap();

        let range = current_month_range(Utc::now());
        let rows = store
            .query_usage_records(&UsageScope::User("u1".into()), &range)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
