//! Governance token effectiveness metrics.
//!
//! One row per `(token_id, project_id)`. The upsert is conflict-safe under
//! concurrent writers: the streaming mean is computed inside the
//! `ON CONFLICT` arm from the row's current values, so interleaved updates
//! never lose samples.

use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use crate::types::TokenMetric;
use crate::{Store, StoreError};

const METRIC_COLUMNS: &str = "token_id, project_id, activation_count, effectiveness_score, \
                              last_applied_at, created_at, updated_at";

impl Store {
    /// Record one effectiveness sample for a token.
    ///
    /// On conflict: `activation_count` increments, `effectiveness_score`
    /// becomes the running mean over all samples, `last_applied_at` keeps
    /// the maximum (null-safe), and `updated_at` takes `applied_at`.
    /// `project_id` must already be normalized (`"global"` when unscoped).
    pub async fn record_token_metric(
        &self,
        token_id: &str,
        project_id: &str,
        sample: f64,
        applied_at: DateTime<Utc>,
    ) -> Result<TokenMetric, StoreError> {
        let metric = sqlx::query_as::<_, TokenMetric>(&format!(
            "INSERT INTO governance_token_metrics \
             (token_id, project_id, activation_count, effectiveness_score, \
              last_applied_at, created_at, updated_at) \
             VALUES ($1, $2, 1, $3, $4, NOW(), $4) \
             ON CONFLICT (token_id, project_id) DO UPDATE SET \
               activation_count = governance_token_metrics.activation_count + 1, \
               effectiveness_score = \
                 (governance_token_metrics.effectiveness_score \
                    * governance_token_metrics.activation_count \
                    + EXCLUDED.effectiveness_score) \
                 / (governance_token_metrics.activation_count + 1), \
               last_applied_at = GREATEST( \
                 COALESCE(governance_token_metrics.last_applied_at, EXCLUDED.last_applied_at), \
                 EXCLUDED.last_applied_at), \
               updated_at = EXCLUDED.updated_at \
             RETURNING {METRIC_COLUMNS}"
        ))
        .bind(token_id)
        .bind(project_id)
        .bind(sample)
        .bind(applied_at)
        .fetch_one(self.pool()?)
        .await?;
        Ok(metric)
    }

    /// Fetch metrics ordered by `activation_count DESC, updated_at DESC`.
    pub async fn fetch_token_metrics(
        &self,
        token_ids: Option<&[String]>,
        project_id: Option<&str>,
        min_activations: i32,
        limit: i64,
    ) -> Result<Vec<TokenMetric>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {METRIC_COLUMNS} FROM governance_token_metrics \
             WHERE activation_count >= "
        ));
        qb.push_bind(min_activations);
        if let Some(project_id) = project_id {
            qb.push(" AND project_id = ").push_bind(project_id);
        }
        if let Some(token_ids) = token_ids {
            qb.push(" AND token_id = ANY(").push_bind(token_ids.to_vec()).push(")");
        }
        qb.push(" ORDER BY activation_count DESC, updated_at DESC LIMIT ")
            .push_bind(limit);

        let metrics = qb
            .build_query_as::<TokenMetric>()
            .fetch_all(self.pool()?)
            .await?;
        Ok(metrics)
    }
}
