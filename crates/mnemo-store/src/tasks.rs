//! Durable task queue operations.
//!
//! The claim path is the contended one: a CTE selects the oldest queued row
//! with `FOR UPDATE SKIP LOCKED` and flips it to `in_progress` in the same
//! statement, so two concurrent claimants can never receive the same task.
//! Stale-task recovery treats `updated_at IS NULL` as stale and picks
//! victims oldest-first (`updated_at NULLS FIRST`).

use serde_json::{json, Value as JsonValue};
use sqlx::{QueryBuilder, Row};

use mnemo_shared::ErrorCode;

use crate::types::{ClaimedTask, StaleTask, Task, TaskStatus};
use crate::{Store, StoreError};

fn decode_status(raw: &str) -> Result<TaskStatus, sqlx::Error> {
    raw.parse().map_err(|_| sqlx::Error::ColumnDecode {
        index: "status".into(),
        source: format!("unknown task status '{raw}'").into(),
    })
}

/// Append the shared stale-task predicate to `qb`.
fn push_stale_conditions(qb: &mut QueryBuilder<'_, sqlx::Postgres>, ttl_seconds: i64, project_id: Option<&str>) {
    qb.push("status = 'in_progress' AND (updated_at IS NULL OR updated_at < NOW() - make_interval(secs => ")
        .push_bind(ttl_seconds as f64)
        .push("))");
    if let Some(project_id) = project_id {
        qb.push(" AND project_id = ").push_bind(project_id.to_string());
    }
}

impl Store {
    pub async fn enqueue_task(
        &self,
        id: &str,
        project_id: &str,
        payload: JsonValue,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tasks (id, project_id, status, payload) VALUES ($1, $2, 'queued', $3)",
        )
        .bind(id)
        .bind(project_id)
        .bind(payload)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Atomically claim the oldest queued task, optionally filtered by
    /// project. Tie-break is `created_at ASC`. Returns `None` when the
    /// queue is empty.
    pub async fn claim_next_task(
        &self,
        project_id: Option<&str>,
    ) -> Result<Option<ClaimedTask>, StoreError> {
        let mut qb = QueryBuilder::new(
            "WITH next_task AS ( \
               SELECT id FROM tasks WHERE status = 'queued'",
        );
        if let Some(project_id) = project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        qb.push(
            "   ORDER BY created_at ASC \
               FOR UPDATE SKIP LOCKED \
               LIMIT 1 \
             ) \
             UPDATE tasks t \
             SET status = 'in_progress', updated_at = NOW() \
             FROM next_task nt \
             WHERE t.id = nt.id \
             RETURNING t.id, t.project_id, t.payload, t.created_at",
        );

        let row = qb.build().fetch_optional(self.pool()?).await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ClaimedTask {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            status: TaskStatus::InProgress,
            payload: row
                .try_get::<Option<JsonValue>, _>("payload")?
                .unwrap_or_else(|| json!({})),
            created_at: row.try_get("created_at")?,
        }))
    }

    /// Update a task's status, advancing `updated_at`. Returns `false` when
    /// the id is unknown (no side effects in that case).
    pub async fn update_task_status(
        &self,
        id: &str,
        status: TaskStatus,
        result: Option<JsonValue>,
    ) -> Result<bool, StoreError> {
        let outcome = sqlx::query(
            "UPDATE tasks SET status = $1, result = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(status.as_str())
        .bind(result.unwrap_or_else(|| json!({})))
        .bind(id)
        .execute(self.pool()?)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(
            "SELECT id, project_id, status, payload, result, created_at, updated_at \
             FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool()?)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status")?;
        Ok(Some(Task {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            status: decode_status(&status)?,
            payload: row
                .try_get::<Option<JsonValue>, _>("payload")?
                .unwrap_or_else(|| json!({})),
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    pub async fn count_stale_in_progress(
        &self,
        ttl_seconds: i64,
        project_id: Option<&str>,
    ) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) AS count FROM tasks WHERE ");
        push_stale_conditions(&mut qb, ttl_seconds, project_id);
        let row = qb.build().fetch_one(self.pool()?).await?;
        Ok(row.try_get("count")?)
    }

    /// Preview stale tasks oldest-first, with their age in seconds.
    pub async fn list_stale_in_progress(
        &self,
        ttl_seconds: i64,
        limit: i64,
        project_id: Option<&str>,
    ) -> Result<Vec<StaleTask>, StoreError> {
        let mut qb = QueryBuilder::new(
            "SELECT id, project_id, updated_at, created_at, \
                    EXTRACT(EPOCH FROM (NOW() - COALESCE(updated_at, created_at)))::float8 AS age_seconds \
             FROM tasks WHERE ",
        );
        push_stale_conditions(&mut qb, ttl_seconds, project_id);
        qb.push(" ORDER BY updated_at NULLS FIRST LIMIT ").push_bind(limit);

        let tasks = qb
            .build_query_as::<StaleTask>()
            .fetch_all(self.pool()?)
            .await?;
        Ok(tasks)
    }

    /// Return stale in-progress tasks to the queue. Returns the affected
    /// count; a second run inside the same TTL window affects nothing.
    pub async fn requeue_stale_in_progress(
        &self,
        ttl_seconds: i64,
        limit: i64,
        project_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::new("WITH stale AS ( SELECT id FROM tasks WHERE ");
        push_stale_conditions(&mut qb, ttl_seconds, project_id);
        qb.push(" ORDER BY updated_at NULLS FIRST LIMIT ").push_bind(limit);
        qb.push(
            " ) \
             UPDATE tasks t \
             SET status = 'queued', updated_at = NOW() \
             FROM stale s WHERE t.id = s.id \
             RETURNING t.id",
        );

        let rows = qb.build().fetch_all(self.pool()?).await?;
        Ok(rows.len() as u64)
    }

    /// Fail stale in-progress tasks, recording the watchdog verdict in
    /// `result` so callers can observe why the task died.
    pub async fn fail_stale_in_progress(
        &self,
        ttl_seconds: i64,
        limit: i64,
        project_id: Option<&str>,
        reason: &str,
    ) -> Result<u64, StoreError> {
        let result = json!({
            "error": ErrorCode::StaleTask.as_str(),
            "watchdog": {
                "action": "fail",
                "reason": reason,
                "ttlSeconds": ttl_seconds,
            },
        });

        let mut qb = QueryBuilder::new("WITH stale AS ( SELECT id FROM tasks WHERE ");
        push_stale_conditions(&mut qb, ttl_seconds, project_id);
        qb.push(" ORDER BY updated_at NULLS FIRST LIMIT ").push_bind(limit);
        qb.push(" ) UPDATE tasks t SET status = 'failed', result = ")
            .push_bind(result)
            .push(", updated_at = NOW() FROM stale s WHERE t.id = s.id RETURNING t.id");

        let rows = qb.build().fetch_all(self.pool()?).await?;
        Ok(rows.len() as u64)
    }
}
