//! The Reconciler: one logical control loop per `GitOpsDeployment`.
//!
//! `tick` runs the six-step sequence exactly in order — fetch-and-resolve,
//! load desired state, compute inventory, invoke the drift engine, remediate,
//! emit status — short-circuiting step 2/3's expensive file read+parse when
//! the resolved revision is unchanged from the last tick, while still
//! re-running drift detection every tick: cluster state can drift
//! independently of Git.
//!
//! "Live inventory" for the `Added` classification ("liveInventory ∪
//! desiredInventory") is approximated as the deployment's previously-recorded
//! `status.inventory` rather than a full cluster scan — see DESIGN.md for why
//! an unbounded kind-agnostic cluster listing isn't a sound default here.

use std::collections::HashMap;

use chrono::Utc;
use kube::Client;
use serde_json::Value;

use gitopsd_core::credential::Credentials;
use gitopsd_core::deployment::{DeploymentPhase, GitOpsDeployment, GitOpsEngineVariant};
use gitopsd_core::engine::GitOpsEngine;
use gitopsd_core::error::{Error, Result};
use gitopsd_core::resource::{DriftStatus, ManagedResource, ResourceIdentity};
use gitopsd_git::{GitRef, RetryConfig, WorkingTree, checkout, files_at};
use gitopsd_k8s::SelfManagedEngine;
use gitopsd_k8s::drift::{detect_drift, remediate};
use gitopsd_k8s::manifest::parse_manifests;

/// Parsed desired-state manifests for one deployment, cached across ticks by
/// the resolved revision they were parsed at.
#[derive(Default, Clone)]
pub struct DesiredStateCache {
    revision: Option<String>,
    manifests: HashMap<ResourceIdentity, Value>,
}

/// Outcome of one reconcile tick, for callers deciding backoff/metrics.
#[derive(Debug)]
pub struct TickOutcome {
    pub revision_changed: bool,
    pub drift_detected: bool,
    pub remediated: usize,
    pub remediation_failed: usize,
}

pub struct Reconciler {
    client: Client,
}

impl Reconciler {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Runs one full tick against an already-cloned working tree, mutating
    /// `deployment.status` in place.
    pub async fn tick(
        &self,
        deployment: &mut GitOpsDeployment,
        tree: &WorkingTree,
        git_ref: &GitRef,
        credentials: Option<Credentials>,
        retry: RetryConfig,
        cache: &mut DesiredStateCache,
    ) -> Result<TickOutcome> {
        if deployment.engine != GitOpsEngineVariant::SelfManaged {
            deployment.status.phase = DeploymentPhase::Degraded;
            deployment.status.reason = Some("UnsupportedEngine".to_string());
            deployment.status.message =
                Some(format!("engine variant {:?} delegates to an external sync loop; this controller only drives self-managed deployments", deployment.engine));
            deployment.status.resource_version += 1;
            return Err(Error::InvalidInput("external gitOpsEngine variants are not reconciled by this controller".to_string()));
        }

        // Step 1: fetch-and-resolve.
        let resolved = match checkout(tree, git_ref, credentials, retry).await {
            Ok(revision) => revision,
            Err(err) => {
                let core_err: Error = err.into();
                self.mark_failed(deployment, &core_err);
                return Err(core_err);
            }
        };
        let revision_changed = cache.revision.as_deref() != Some(resolved.as_str());

        // Steps 2-3: load desired state + compute inventory, reusing the
        // cache when the revision hasn't moved.
        if revision_changed {
            let files = match files_at(tree, &deployment.repository.path).await {
                Ok(files) => files,
                Err(err) => {
                    let core_err: Error = err.into();
                    self.mark_failed(deployment, &core_err);
                    return Err(core_err);
                }
            };
            let manifests = match parse_manifests(&files) {
                Ok(manifests) => manifests,
                Err(err) => {
                    let core_err: Error = err.into();
                    deployment.status.phase = DeploymentPhase::Degraded;
                    deployment.status.reason = Some("InvalidManifest".to_string());
                    deployment.status.message = Some(core_err.to_string());
                    deployment.status.resource_version += 1;
                    return Err(core_err);
                }
            };
            cache.revision = Some(resolved.clone());
            cache.manifests = manifests;
        }

        // Step 4: invoke the drift engine over (previous inventory ∪ desired).
        let mut universe: Vec<ResourceIdentity> = deployment.status.inventory.iter().map(|r| r.identity.clone()).collect();
        for identity in cache.manifests.keys() {
            if !universe.contains(identity) {
                universe.push(identity.clone());
            }
        }

        let ignore_fields = deployment.drift_detection.ignore_fields.clone();
        let records = detect_drift(&self.client, &universe, &cache.manifests, &ignore_fields).await;
        let drift_detected = !records.is_empty();

        // Step 5: remediate if configured.
        let (remediated, remediation_failed) = if deployment.drift_detection.auto_remediate && drift_detected {
            let summary = remediate(&self.client, &records, &cache.manifests, deployment.drift_detection.remove_untracked_resources).await;
            (summary.remediated_count(), summary.failed_count())
        } else {
            (0, 0)
        };

        // Step 6: emit status.
        let engine = SelfManagedEngine::new(self.client.clone(), cache.manifests.clone());
        let inventory: Vec<ManagedResource> = match engine.list_managed_resources(deployment).await {
            Ok(inventory) => inventory,
            Err(_) => deployment.status.inventory.clone(),
        };

        deployment.status.phase = if remediation_failed > 0 {
            DeploymentPhase::Degraded
        } else if drift_detected && !deployment.drift_detection.auto_remediate {
            DeploymentPhase::Progressing
        } else {
            DeploymentPhase::Ready
        };
        deployment.status.reason = None;
        deployment.status.message = None;
        deployment.status.last_synced_commit = Some(resolved.clone());
        deployment.status.last_sync_time = Some(Utc::now());
        deployment.status.inventory = inventory;
        deployment.status.drift_status = DriftStatus { detected: drift_detected, last_check: Some(Utc::now()), drifted: records };
        deployment.status.resource_version += 1;

        Ok(TickOutcome { revision_changed, drift_detected, remediated, remediation_failed })
    }

    fn mark_failed(&self, deployment: &mut GitOpsDeployment, err: &Error) {
        deployment.status.phase = if err.is_retryable() { DeploymentPhase::Progressing } else { DeploymentPhase::Failed };
        deployment.status.reason = Some("SyncFailed".to_string());
        deployment.status.message = Some(err.to_string());
        deployment.status.resource_version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_state_cache_starts_empty() {
        let cache = DesiredStateCache::default();
        assert!(cache.revision.is_none());
        assert!(cache.manifests.is_empty());
    }
}
