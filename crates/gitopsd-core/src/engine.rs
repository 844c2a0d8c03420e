//! Engine-variant abstraction.
//!
//! A naive per-external-engine implementation ("argocd", "flux") tends to
//! grow bespoke inventory-reading and sync-trigger code with placeholder
//! desired-state objects on some paths — drift remediation against a
//! placeholder would overwrite real resources with empty ones. Modeling
//! this as a trait makes the contract explicit instead: `get_desired_state`
//! MUST come from parsed working-tree manifests, never from an external
//! engine's own status/cache.

use async_trait::async_trait;
use serde_json::Value;

use crate::deployment::GitOpsDeployment;
use crate::error::Result;
use crate::resource::{ManagedResource, ResourceIdentity};

#[async_trait]
pub trait GitOpsEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// List resources this engine currently considers managed for `deployment`.
    async fn list_managed_resources(&self, deployment: &GitOpsDeployment) -> Result<Vec<ManagedResource>>;

    /// Desired state for one resource, loaded from the working tree's parsed
    /// manifests — never from the engine's own inventory cache.
    async fn get_desired_state(
        &self,
        deployment: &GitOpsDeployment,
        resource: &ResourceIdentity,
    ) -> Result<Option<Value>>;

    /// Ask the engine to re-sync after the controller has remediated drift.
    /// A no-op for `self-managed`, since the next reconcile tick re-verifies;
    /// meaningful for external engines that own their own sync loop.
    async fn trigger_sync(&self, deployment: &GitOpsDeployment) -> Result<()>;
}
