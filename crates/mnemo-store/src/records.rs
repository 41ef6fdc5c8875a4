//! Append-only diff and error records.

use serde_json::Value as JsonValue;
use sqlx::QueryBuilder;

use crate::types::{DiffRecord, ErrorLevel};
use crate::{Store, StoreError};

impl Store {
    pub async fn save_diff(
        &self,
        id: &str,
        project_id: &str,
        file_path: &str,
        diff: &str,
        author: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO diffs (id, project_id, file_path, diff, author) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(project_id)
        .bind(file_path)
        .bind(diff)
        .bind(author)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Most recent diffs, newest first. The diff body is intentionally not
    /// returned by listings.
    pub async fn list_recent_diffs(
        &self,
        project_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DiffRecord>, StoreError> {
        let mut qb =
            QueryBuilder::new("SELECT id, project_id, file_path, author, created_at FROM diffs");
        if let Some(project_id) = project_id {
            qb.push(" WHERE project_id = ").push_bind(project_id);
        }
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let records = qb
            .build_query_as::<DiffRecord>()
            .fetch_all(self.pool()?)
            .await?;
        Ok(records)
    }

    pub async fn log_error(
        &self,
        id: &str,
        level: ErrorLevel,
        message: &str,
        project_id: Option<&str>,
        context: JsonValue,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO errors (id, project_id, level, message, context) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(project_id)
        .bind(level.as_str())
        .bind(message)
        .bind(context)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_record_ops_require_pool() {
        let store = Store::unavailable();
        assert!(store
            .save_diff("d1", "p1", "src/main.rs", "--- a\n+++ b\n", None)
            .await
            .unwrap_err()
            .is_unavailable());
        assert!(store
            .list_recent_diffs(None, 20)
            .await
            .unwrap_err()
            .is_unavailable());
        assert!(store
            .log_error("e1", ErrorLevel::Error, "boom", None, json!({}))
            .await
            .unwrap_err()
            .is_unavailable());
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_diff_listing_is_newest_first_and_scoped(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool);
        store
            .save_diff("d1", "p1", "a.rs", "-a\n+b\n", Some("alice"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.save_diff("d2", "p1", "b.rs", "-x\n+y\n", None).await.unwrap();
        store.save_diff("d3", "p2", "c.rs", "-1\n+2\n", None).await.unwrap();

        let records = store.list_recent_diffs(Some("p1"), 10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "d2");
        assert_eq!(records[1].id, "d1");
        assert_eq!(records[1].author.as_deref(), Some("alice"));

        let records = store.list_recent_diffs(None, 1).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_log_error_accepts_optional_project(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool);
        store
            .log_error("e1", ErrorLevel::Warn, "deprecation", None, json!({"module": "x"}))
            .await
            .unwrap();
        store
            .log_error("e2", ErrorLevel::Error, "panic", Some("p1"), json!({}))
            .await
            .unwrap();
    }
}
