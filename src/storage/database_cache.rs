use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Result};

use crate::cache::KvStore;
use crate::error::Result as GatewayResult;

use super::database::GatewayStore;

impl GatewayStore {
    pub async fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection.lock().await;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((value, expires_at)) = row else {
            return Ok(None);
        };

        // 惰性过期：读到已过期条目时顺手删除
        let expired = DateTime::parse_from_rfc3339(&expires_at)
            .map(|t| t.with_timezone(&Utc) <= Utc::now())
            .unwrap_or(true);
        if expired {
            conn.execute("DELETE FROM cache_entries WHERE key = ?1", [key])?;
            return Ok(None);
        }
        Ok(Some(value))
    }

    pub async fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let conn = self.connection.lock().await;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        conn.execute(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at",
            (key, value, expires_at.to_rfc3339()),
        )?;
        Ok(())
    }

    pub async fn cache_delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let conn = self.connection.lock().await;
        // LIKE 通配符需转义前缀中的 % 与 _
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let deleted = conn.execute(
            "DELETE FROM cache_entries WHERE key LIKE ?1 ESCAPE '\\'",
            [format!("{}%", escaped)],
        )?;
        Ok(deleted as u64)
    }
}

#[async_trait]
impl KvStore for GatewayStore {
    async fn get(&self, key: &str) -> GatewayResult<Option<String>> {
        Ok(self.cache_get(key).await?)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> GatewayResult<()> {
        Ok(self.cache_set(key, value, ttl).await?)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> GatewayResult<u64> {
        Ok(self.cache_delete_by_prefix(prefix).await?)
    }
}
