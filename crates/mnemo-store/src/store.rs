//! The [`Store`] handle and pool lifecycle.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::StoreError;

/// Data-access handle over an optional PostgreSQL pool.
///
/// Cheap to clone. When constructed without a pool, every operation returns
/// [`StoreError::Unavailable`]; callers surface that as `ERR.DB_UNAVAILABLE`
/// rather than falling back to any local storage.
#[derive(Debug, Clone)]
pub struct Store {
    pool: Option<PgPool>,
}

impl Store {
    /// Connect when a database URL is configured; otherwise return an
    /// unavailable store.
    pub async fn connect(database_url: Option<&str>) -> Result<Self, StoreError> {
        let Some(url) = database_url else {
            info!("store not configured, persistent operations will be unavailable");
            return Ok(Self::unavailable());
        };
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect(url)
            .await?;
        info!("store connected");
        Ok(Self { pool: Some(pool) })
    }

    /// Wrap an existing pool (tests and embedding callers).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    pub fn is_available(&self) -> bool {
        self.pool.is_some()
    }

    /// Run embedded migrations against the configured database.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        crate::MIGRATOR.run(self.pool()?).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool.as_ref().ok_or(StoreError::Unavailable)
    }
}
