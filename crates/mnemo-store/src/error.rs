//! Store-layer errors.

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store has no configured connection pool (`DATABASE_URL` unset).
    /// Surfaces on the wire as `ERR.DB_UNAVAILABLE`.
    #[error("store unavailable: DATABASE_URL not configured")]
    Unavailable,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable)
    }
}

impl From<StoreError> for mnemo_shared::ToolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable => mnemo_shared::ToolError::db_unavailable(),
            other => mnemo_shared::ToolError::unavailable(other.to_string()),
        }
    }
}
