//! KDL configuration parsing for the GitOps controller daemon.
//!
//! Handles the ambient startup config only — listen address, credential-store
//! backend, and backoff/timeout tuning. Cluster-declarative resources
//! (`GitOpsDeployment`, `GitOpsPromotion`, `ApprovalRequest`) live in
//! `gitopsd-core` as plain `serde` types, not KDL.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    CredentialStoreConfig, GitRetryConfig, PromotionConfig, ReconcileConfig, SystemConfig,
    parse_system_config,
};
