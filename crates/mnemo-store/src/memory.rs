//! Memory entry operations.
//!
//! Entries are write-once. Embeddings are bound as text literals and cast
//! to `vector` on the server, so reads and writes work whether or not the
//! client links any vector support.

use serde_json::Value as JsonValue;
use sqlx::QueryBuilder;

use crate::embedding::pgvector_literal;
use crate::types::MemoryEntry;
use crate::{Store, StoreError};

const ENTRY_COLUMNS: &str =
    "id, project_id, content, metadata, quarantined, created_at, group_id";

/// Parameters for a memory insert.
#[derive(Debug, Clone)]
pub struct NewMemory<'a> {
    pub id: &'a str,
    pub project_id: &'a str,
    pub content: &'a str,
    pub metadata: JsonValue,
    pub quarantined: bool,
    pub embedding: Option<&'a [f32]>,
    pub group_id: Option<&'a str>,
}

impl Store {
    pub async fn add_memory(&self, memory: NewMemory<'_>) -> Result<(), StoreError> {
        let embedding_literal = memory.embedding.map(pgvector_literal);
        sqlx::query(
            "INSERT INTO memory_entries \
             (id, project_id, content, metadata, quarantined, group_id, embedding) \
             VALUES ($1, $2, $3, $4, $5, $6, $7::vector)",
        )
        .bind(memory.id)
        .bind(memory.project_id)
        .bind(memory.content)
        .bind(memory.metadata)
        .bind(memory.quarantined)
        .bind(memory.group_id)
        .bind(embedding_literal)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    pub async fn get_memory(&self, id: &str) -> Result<Option<MemoryEntry>, StoreError> {
        let entry = sqlx::query_as::<_, MemoryEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM memory_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(entry)
    }

    /// Substring search over `content`, newest first.
    pub async fn search_memory(
        &self,
        query: &str,
        project_id: Option<&str>,
        limit: i64,
        include_quarantined: bool,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ENTRY_COLUMNS} FROM memory_entries WHERE content ILIKE "
        ));
        qb.push_bind(format!("%{query}%"));
        if let Some(project_id) = project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if !include_quarantined {
            qb.push(" AND quarantined = FALSE");
        }
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

        let entries = qb
            .build_query_as::<MemoryEntry>()
            .fetch_all(self.pool()?)
            .await?;
        Ok(entries)
    }

    /// Vector similarity search ordered by cosine distance ascending.
    /// `threshold` filters by maximum distance when supplied.
    pub async fn semantic_search_memory(
        &self,
        query_embedding: &[f32],
        project_id: Option<&str>,
        k: i64,
        include_quarantined: bool,
        threshold: Option<f64>,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        let literal = pgvector_literal(query_embedding);

        let mut qb = QueryBuilder::new(format!(
            "SELECT {ENTRY_COLUMNS} FROM memory_entries WHERE embedding IS NOT NULL"
        ));
        if let Some(project_id) = project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if !include_quarantined {
            qb.push(" AND quarantined = FALSE");
        }
        if let Some(threshold) = threshold {
            qb.push(" AND (embedding <=> ")
                .push_bind(literal.clone())
                .push("::vector) <= ")
                .push_bind(threshold);
        }
        qb.push(" ORDER BY embedding <=> ")
            .push_bind(literal)
            .push("::vector LIMIT ")
            .push_bind(k);

        let entries = qb
            .build_query_as::<MemoryEntry>()
            .fetch_all(self.pool()?)
            .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::mock_embed;

    #[tokio::test]
    async fn test_memory_ops_require_pool() {
        let store = Store::unavailable();
        assert!(store.get_memory("m1").await.unwrap_err().is_unavailable());
        assert!(store
            .search_memory("q", None, 20, false)
            .await
            .unwrap_err()
            .is_unavailable());
        assert!(store
            .semantic_search_memory(&mock_embed("q"), None, 5, false, None)
            .await
            .unwrap_err()
            .is_unavailable());
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL with pgvector"]
    async fn test_add_get_round_trip(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool);
        store
            .add_memory(NewMemory {
                id: "mem-1",
                project_id: "p1",
                content: "remember the milk",
                metadata: serde_json::json!({"source": "test"}),
                quarantined: false,
                embedding: None,
                group_id: None,
            })
            .await
            .unwrap();

        let entry = store.get_memory("mem-1").await.unwrap().unwrap();
        assert_eq!(entry.content, "remember the milk");
        assert_eq!(entry.metadata.unwrap()["source"], "test");
        assert!(!entry.quarantined);

        assert!(store.get_memory("missing").await.unwrap().is_none());
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL with pgvector"]
    async fn test_search_filters_and_ordering(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool);
        for (id, content, quarantined) in [
            ("m1", "alpha result", false),
            ("m2", "beta result", false),
            ("m3", "alpha quarantined", true),
        ] {
            store
                .add_memory(NewMemory {
                    id,
                    project_id: "p1",
                    content,
                    metadata: serde_json::json!({}),
                    quarantined,
                    embedding: None,
                    group_id: None,
                })
                .await
                .unwrap();
        }

        let hits = store.search_memory("alpha", Some("p1"), 20, false).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");

        let hits = store.search_memory("alpha", Some("p1"), 20, true).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = store.search_memory("result", Some("other"), 20, true).await.unwrap();
        assert!(hits.is_empty());
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    #[ignore = "requires DATABASE_URL with pgvector"]
    async fn test_semantic_search_orders_by_distance(pool: sqlx::PgPool) {
        let store = Store::from_pool(pool);
        for (id, content) in [("m1", "postgres tuning"), ("m2", "gardening notes")] {
            let embedding = mock_embed(content);
            store
                .add_memory(NewMemory {
                    id,
                    project_id: "p1",
                    content,
                    metadata: serde_json::json!({}),
                    quarantined: false,
                    embedding: Some(&embedding),
                    group_id: None,
                })
                .await
                .unwrap();
        }

        let query = mock_embed("postgres tuning");
        let hits = store
            .semantic_search_memory(&query, Some("p1"), 2, false, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "m1", "identical embedding ranks first");

        // A tight threshold keeps only the exact match.
        let hits = store
            .semantic_search_memory(&query, Some("p1"), 2, false, Some(0.01))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "m1");
    }
}
