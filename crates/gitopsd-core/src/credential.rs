//! Git credential modeling.
//!
//! A credentials secret carries either an SSH private key, or a
//! username/password (token) pair — no other keys are read. `Credentials` is
//! the materialized-in-memory form; `CredentialsRef` is what a
//! `GitOpsDeployment` stores (a pointer into an external secret store, never
//! the secret bytes themselves).
//!
//! `SecretStore` abstracts over the backend that resolves a `CredentialsRef`
//! into `Credentials`. The only backend this controller needs is the
//! cluster's own Secret API, so the trait is narrowed to that one shape
//! rather than a general key-value interface.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A pointer to a credentials secret. The controller resolves this against a
/// `SecretStore` implementation at the point of use and never persists the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsRef {
    /// Namespace the secret lives in.
    pub namespace: String,
    /// Secret name.
    pub name: String,
}

/// Materialized credentials, held only for the duration of a single git2 call.
///
/// `Drop` does not need to zero the buffers explicitly here — `String`'s heap
/// allocation is freed normally — but callers must not log or persist this type.
#[derive(Clone)]
pub enum Credentials {
    /// SSH private key in PEM form, optional passphrase.
    SshKey {
        private_key_pem: String,
        passphrase: Option<String>,
        username: String,
    },
    /// Username + password or personal-access-token.
    UserToken { username: String, password: String },
}

impl Credentials {
    /// Preference order: SSH key beats user/token when a secret carries both
    /// (it should not, but callers constructing from raw secret data should
    /// resolve ambiguity this way rather than erroring).
    pub fn prefer(ssh: Option<Credentials>, user_token: Option<Credentials>) -> Option<Credentials> {
        ssh.or(user_token)
    }
}

/// Secret-store keys this crate reads from a credentials secret.
pub const SECRET_KEY_SSH_PRIVATE_KEY: &str = "ssh-privatekey";
pub const SECRET_KEY_SSH_PASSPHRASE: &str = "ssh-passphrase";
pub const SECRET_KEY_USERNAME: &str = "username";
pub const SECRET_KEY_PASSWORD: &str = "password";

/// Resolves raw secret data (as read from a `CredentialsRef`'s target) into
/// `Credentials`, preferring an SSH key when both shapes are present.
pub fn credentials_from_secret_data(data: &HashMap<String, Vec<u8>>) -> Option<Credentials> {
    let as_string = |key: &str| data.get(key).and_then(|bytes| String::from_utf8(bytes.clone()).ok());

    let ssh = as_string(SECRET_KEY_SSH_PRIVATE_KEY).map(|private_key_pem| Credentials::SshKey {
        private_key_pem,
        passphrase: as_string(SECRET_KEY_SSH_PASSPHRASE),
        username: as_string(SECRET_KEY_USERNAME).unwrap_or_else(|| "git".to_string()),
    });
    let user_token = match (as_string(SECRET_KEY_USERNAME), as_string(SECRET_KEY_PASSWORD)) {
        (Some(username), Some(password)) => Some(Credentials::UserToken { username, password }),
        _ => None,
    };
    Credentials::prefer(ssh, user_token)
}

/// Resolves a `CredentialsRef` into materialized `Credentials`. Implementations
/// read the referenced secret from wherever it lives (the cluster Secret API)
/// and never cache the result beyond a single call's scope.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn resolve(&self, credentials_ref: &CredentialsRef) -> Result<Option<Credentials>>;
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::SshKey { username, .. } => {
                f.debug_struct("SshKey").field("username", username).finish_non_exhaustive()
            }
            Credentials::UserToken { username, .. } => {
                f.debug_struct("UserToken").field("username", username).finish_non_exhaustive()
            }
        }
    }
}
