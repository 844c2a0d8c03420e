//! Errors from cluster discovery, normalization, and remediation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum K8sError {
    #[error("failed to resolve API resource for {group}/{version} {kind}: {source}")]
    Discovery {
        group: String,
        version: String,
        kind: String,
        #[source]
        source: kube::Error,
    },

    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("manifest parse error: {0}")]
    Manifest(String),

    #[error("malformed resource document: {0}")]
    Malformed(String),
}

pub type K8sResult<T> = std::result::Result<T, K8sError>;

impl From<K8sError> for gitopsd_core::Error {
    fn from(err: K8sError) -> Self {
        match &err {
            K8sError::Api(kube::Error::Api(resp)) if resp.code == 409 => gitopsd_core::Error::Conflict(err.to_string()),
            K8sError::Api(kube::Error::Api(resp)) if resp.code == 401 || resp.code == 403 => {
                gitopsd_core::Error::Unauthorized(err.to_string())
            }
            K8sError::Api(_) | K8sError::Discovery { .. } => gitopsd_core::Error::Transient(err.to_string()),
            K8sError::Manifest(_) | K8sError::Malformed(_) => gitopsd_core::Error::InvalidInput(err.to_string()),
        }
    }
}
