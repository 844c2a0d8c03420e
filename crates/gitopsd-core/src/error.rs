//! Error taxonomy shared across the controller.
//!
//! Variants map directly onto the error kinds a reconcile tick or promotion can
//! surface: transient failures retry, `Conflict` triggers a refetch-and-retry-once,
//! `Validation`/`Authz` abort the operation and set a degraded phase, `Fatal` is an
//! invariant violation that should crash-loop the owning task rather than be masked.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient: {0}")]
    Transient(String),

    #[error("sync failed: {0}")]
    SyncFailed(String),

    #[error("drift remediation failed: {0}")]
    DriftRemediationFailed(String),

    #[error("promotion failed: {0}")]
    PromotionFailed(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("invariant violation: {0}")]
    Fatal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Transient and conflict errors are worth retrying within backoff; everything
    /// else requires user input or code to change before retrying would help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
