use async_trait::async_trait;
use rusqlite::Result;

use crate::error::Result as GatewayResult;
use crate::filter::{FilterAction, FilterRule, FilterRuleStore, SensitiveKind};

use super::database::GatewayStore;

impl GatewayStore {
    pub async fn upsert_filter_rule(&self, rule: &FilterRule) -> Result<()> {
        let conn = self.connection.lock().await;
        conn.execute(
            "INSERT INTO filter_rules (id, name, kind, pattern, action, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                pattern = excluded.pattern,
                action = excluded.action,
                enabled = excluded.enabled",
            (
                &rule.id,
                &rule.name,
                rule.kind.as_str(),
                &rule.pattern,
                rule.action.as_str(),
                rule.enabled,
            ),
        )?;
        Ok(())
    }

    pub async fn load_filter_rules(&self) -> Result<Vec<FilterRule>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, kind, pattern, action, enabled FROM filter_rules ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, name, kind, pattern, action, enabled) = row?;
            // 未知枚举值说明库比代码新，跳过而不是整体失败
            let (Some(kind), Some(action)) =
                (SensitiveKind::parse(&kind), FilterAction::parse(&action))
            else {
                tracing::warn!(id, "Skipping filter rule with unknown kind or action");
                continue;
            };
            out.push(FilterRule {
                id,
                name,
                kind,
                pattern,
                action,
                enabled,
            });
        }
        Ok(out)
    }

    pub async fn delete_filter_rule(&self, id: &str) -> Result<()> {
        let conn = self.connection.lock().await;
        conn.execute("DELETE FROM filter_rules WHERE id = ?1", [id])?;
        Ok(())
    }
}

#[async_trait]
impl FilterRuleStore for GatewayStore {
    async fn upsert_rule(&self, rule: &FilterRule) -> GatewayResult<()> {
        Ok(self.upsert_filter_rule(rule).await?)
    }

    async fn load_rules(&self) -> GatewayResult<Vec<FilterRule>> {
        Ok(self.load_filter_rules().await?)
    }

    async fn delete_rule(&self, id: &str) -> GatewayResult<()> {
        Ok(self.delete_filter_rule(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, action: FilterAction) -> FilterRule {
        FilterRule {
            id: id.to_string(),
            name: "email".to_string(),
            kind: SensitiveKind::Email,
            pattern: r"\S+@\S+".to_string(),
            action,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn upsert_then_load_round_trip() {
        let store = GatewayStore::in_memory().await.unwrap();
        store
            .upsert_filter_rule(&rule("r1", FilterAction::Mask))
            .await
            .unwrap();

        let rules = store.load_filter_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].kind, SensitiveKind::Email);
        assert_eq!(rules[0].action, FilterAction::Mask);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_id() {
        let store = GatewayStore::in_memory().await.unwrap();
        store
            .upsert_filter_rule(&rule("r1", FilterAction::Mask))
            .await
            .unwrap();
        store
            .upsert_filter_rule(&rule("r1", FilterAction::Block))
            .await
            .unwrap();

        let rules = store.load_filter_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].action, FilterAction::Block);
    }

    #[tokio::test]
    async fn delete_removes_rule() {
        let store = GatewayStore::in_memory().await.unwrap();
        store
            .upsert_filter_rule(&rule("r1", FilterAction::Mask))
            .await
            .unwrap();
        store.delete_filter_rule("r1").await.unwrap();
        assert!(store.load_filter_rules().await.unwrap().is_empty());
    }
}
