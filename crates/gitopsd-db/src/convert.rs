//! Small conversions between `gitopsd_core` domain enums and the plain text
//! representation they're stored as. Reuses each type's existing `Serialize`
//! impl rather than hand-writing a `Display`/`FromStr` pair for every enum.

use gitopsd_core::Error as CoreError;
use serde::{Serialize, de::DeserializeOwned};

use crate::{DbError, DbResult};

pub fn to_text<T: Serialize>(value: &T) -> DbResult<String> {
    match serde_json::to_value(value).map_err(|e| DbError::Database(sqlx::Error::ColumnDecode {
        index: "<enum>".to_string(),
        source: Box::new(e),
    }))? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(DbError::Database(sqlx::Error::ColumnDecode {
            index: "<enum>".to_string(),
            source: format!("expected string encoding, got {other}").into(),
        })),
    }
}

pub fn from_text<T: DeserializeOwned>(text: &str) -> DbResult<T> {
    serde_json::from_value(serde_json::Value::String(text.to_string())).map_err(|e| {
        DbError::Database(sqlx::Error::ColumnDecode { index: "<enum>".to_string(), source: Box::new(e) })
    })
}

pub fn not_found(resource: impl std::fmt::Display) -> DbError {
    DbError::NotFound(resource.to_string())
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => CoreError::NotFound(msg),
            DbError::Duplicate(msg) => CoreError::Conflict(msg),
            DbError::Database(sqlx::Error::PoolTimedOut) => CoreError::Transient(err.to_string()),
            other => CoreError::Internal(other.to_string()),
        }
    }
}
