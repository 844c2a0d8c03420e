//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for gitopsd_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => gitopsd_core::Error::NotFound(msg),
            DbError::Duplicate(msg) => gitopsd_core::Error::Conflict(msg),
            other => gitopsd_core::Error::Internal(other.to_string()),
        }
    }
}
