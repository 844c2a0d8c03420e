//! Errors from the repository sync engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("clone failed: {0}")]
    Clone(String),

    #[error("checkout failed: {0}")]
    Checkout(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Non-fast-forward push rejection. The caller is expected to refetch
    /// and retry once before surfacing this.
    #[error("push conflict: {0}")]
    Conflict(String),

    #[error("transient network failure: {0}")]
    Transient(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl GitError {
    /// Classifies a raw `git2::Error` into the taxonomy above. Authentication
    /// failures are fatal to the operation (never retried); everything else
    /// network-shaped is transient and retried with backoff.
    pub fn classify(err: git2::Error) -> Self {
        use git2::ErrorClass;
        match err.class() {
            ErrorClass::Ssh | ErrorClass::Http if is_auth_error(&err) => {
                GitError::Authentication(err.message().to_string())
            }
            ErrorClass::Net | ErrorClass::Ssh | ErrorClass::Http | ErrorClass::Os => {
                GitError::Transient(err.message().to_string())
            }
            _ => GitError::Git(err),
        }
    }
}

fn is_auth_error(err: &git2::Error) -> bool {
    matches!(err.code(), git2::ErrorCode::Auth | git2::ErrorCode::Certificate)
}

pub type GitResult<T> = std::result::Result<T, GitError>;

impl From<GitError> for gitopsd_core::Error {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Authentication(msg) => gitopsd_core::Error::Unauthorized(msg),
            GitError::Conflict(msg) => gitopsd_core::Error::Conflict(msg),
            GitError::Transient(msg) => gitopsd_core::Error::Transient(msg),
            GitError::Cancelled => gitopsd_core::Error::Cancelled,
            other => gitopsd_core::Error::SyncFailed(other.to_string()),
        }
    }
}
