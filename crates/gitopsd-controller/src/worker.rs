//! Background workers: one reconcile loop per deployment (a logical control
//! loop per tracked `GitOpsDeployment`) and a promotion worker draining
//! `PromotionStore::claim_next`.
//!
//! The promotion worker follows a claim loop shape: claim, sleep-and-retry
//! on none, backoff on error, with the job queue as `PromotionStore` and the
//! executor as `PromotionManager`. The per-deployment reconcile loop
//! generalizes the same claim/sleep/backoff shape to a tick-on-interval-or-wake
//! loop instead of draining a flat job queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gitopsd_core::credential::{Credentials, SecretStore};
use gitopsd_core::deployment::{DeploymentPhase, GitOpsDeployment};
use gitopsd_core::promotion::PromotionRequest;
use gitopsd_core::ResourceId;
use gitopsd_db::PromotionStore;
use gitopsd_git::{clone, GitRef, RetryConfig};

use crate::backoff::ReconcileBackoff;
use crate::promotion::PromotionManager;
use crate::reconcile::{DesiredStateCache, Reconciler};
use crate::registry::DeploymentRegistry;

/// Looks up and persists `GitOpsDeployment`s. Deployments are cluster-declarative
/// resources normally backed by a CRD; this trait keeps that wiring out of
/// the scheduler, depending on a repository trait rather than a concrete
/// Postgres type.
#[async_trait::async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn get(&self, id: ResourceId) -> Option<GitOpsDeployment>;
    async fn save_status(&self, deployment: &GitOpsDeployment);
}

/// Runs one deployment's reconcile loop until its wake sender is dropped:
/// clone once, then tick on `poll_interval` or whenever woken, backing off on
/// tick failure.
pub struct ReconcileLoop {
    reconciler: Arc<Reconciler>,
    registry: Arc<DeploymentRegistry>,
    secrets: Option<Arc<dyn SecretStore>>,
    repository: Arc<dyn DeploymentRepository>,
    git_retry: RetryConfig,
}

impl ReconcileLoop {
    pub fn new(
        reconciler: Arc<Reconciler>,
        registry: Arc<DeploymentRegistry>,
        secrets: Option<Arc<dyn SecretStore>>,
        repository: Arc<dyn DeploymentRepository>,
    ) -> Self {
        Self { reconciler, registry, secrets, repository, git_retry: RetryConfig::default() }
    }

    /// Intended to be spawned as its own `tokio::task` per deployment. Exits
    /// when `wake_rx`'s paired `WakeSender` (and every clone of it) is dropped.
    pub async fn run(&self, mut deployment: GitOpsDeployment, mut wake_rx: mpsc::Receiver<()>) {
        let git_ref = self.git_ref_for(&deployment);
        let credentials = self.resolve_credentials(&deployment).await;

        let tree = match clone(&deployment.repository.url, &git_ref, credentials, self.git_retry).await {
            Ok(tree) => tree,
            Err(err) => {
                error!(deployment = %deployment.id, error = %err, "initial clone failed, abandoning reconcile loop");
                return;
            }
        };

        let mut cache = DesiredStateCache::default();
        let mut backoff = ReconcileBackoff::default();
        let working_tree_lock = self.registry.working_tree_lock(deployment.id);

        loop {
            let tick_result = {
                let _guard = working_tree_lock.lock().await;
                let credentials = self.resolve_credentials(&deployment).await;
                self.reconciler.tick(&mut deployment, &tree, &git_ref, credentials, self.git_retry, &mut cache).await
            };

            match &tick_result {
                Ok(outcome) => info!(
                    deployment = %deployment.id,
                    revision_changed = outcome.revision_changed,
                    drift_detected = outcome.drift_detected,
                    remediated = outcome.remediated,
                    remediation_failed = outcome.remediation_failed,
                    "reconcile tick complete"
                ),
                Err(err) => warn!(deployment = %deployment.id, error = %err, "reconcile tick failed"),
            }
            self.repository.save_status(&deployment).await;

            let delay = if tick_result.is_err() {
                backoff.record_failure()
            } else {
                backoff.record_success();
                deployment.poll_interval.get()
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                woken = wake_rx.recv() => {
                    if woken.is_none() {
                        self.registry.forget(deployment.id);
                        return;
                    }
                }
            }
        }
    }

    fn git_ref_for(&self, deployment: &GitOpsDeployment) -> GitRef {
        match &deployment.repository.tag {
            Some(tag) => GitRef::Tag(tag.clone()),
            None => GitRef::Branch(deployment.repository.branch.clone()),
        }
    }

    async fn resolve_credentials(&self, deployment: &GitOpsDeployment) -> Option<Credentials> {
        let secrets = self.secrets.as_ref()?;
        let credentials_ref = deployment.repository.credentials_ref.as_ref()?;
        match secrets.resolve(credentials_ref).await {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(deployment = %deployment.id, error = %err, "failed to resolve git credentials");
                None
            }
        }
    }
}

/// Claims and executes promotions via a claim loop. `stale_after` reclaims a
/// promotion left claimed by a crashed worker, using the same
/// `FOR UPDATE SKIP LOCKED` pattern the claim query itself relies on.
pub struct PromotionWorker {
    id: String,
    promotions: Arc<dyn PromotionStore>,
    manager: Arc<PromotionManager>,
    repository: Arc<dyn DeploymentRepository>,
    secrets: Option<Arc<dyn SecretStore>>,
    stale_after: chrono::Duration,
}

impl PromotionWorker {
    pub fn new(
        id: impl Into<String>,
        promotions: Arc<dyn PromotionStore>,
        manager: Arc<PromotionManager>,
        repository: Arc<dyn DeploymentRepository>,
        secrets: Option<Arc<dyn SecretStore>>,
    ) -> Self {
        Self { id: id.into(), promotions, manager, repository, secrets, stale_after: chrono::Duration::minutes(15) }
    }

    pub async fn run(&self) {
        info!(worker_id = %self.id, "starting promotion worker");
        loop {
            match self.promotions.claim_next(&self.id, self.stale_after).await {
                Ok(Some(request)) => self.process(request).await,
                Ok(None) => tokio::time::sleep(std::time::Duration::from_secs(2)).await,
                Err(err) => {
                    warn!(worker_id = %self.id, error = %err, "failed to claim promotion");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn process(&self, mut request: PromotionRequest) {
        let Some(deployment) = self.repository.get(request.deployment_id).await else {
            request.fail("deployment no longer exists");
            if let Err(err) = self.promotions.save(&request).await {
                error!(promotion = %request.id, error = %err, "failed to persist orphaned promotion request");
            }
            return;
        };

        let credentials = match (&self.secrets, &deployment.repository.credentials_ref) {
            (Some(secrets), Some(credentials_ref)) => secrets.resolve(credentials_ref).await.ok().flatten(),
            _ => None,
        };

        info!(promotion = %request.id, from = %request.from_env, to = %request.to_env, "processing promotion");
        if let Err(err) = self.manager.execute(&deployment, &mut request, credentials).await {
            warn!(promotion = %request.id, error = %err, "promotion failed");
        }
        if let Err(err) = self.promotions.release(request.id).await {
            warn!(promotion = %request.id, error = %err, "failed to release promotion claim");
        }
        match request.phase {
            gitopsd_core::promotion::PromotionPhase::Completed => {}
            gitopsd_core::promotion::PromotionPhase::PendingApproval => {
                info!(promotion = %request.id, "promotion awaiting approval, will be re-claimed on a later pass");
            }
            phase => warn!(promotion = %request.id, phase = ?phase, "promotion ended without completing"),
        }
    }
}

/// Derives an overall `SyncStatus`/`HealthStatus` pair for display surfaces —
/// the ambient read model `gitopsd-server`'s status endpoint serves.
pub fn deployment_sync_status(deployment: &GitOpsDeployment) -> gitopsd_core::resource::SyncStatus {
    match deployment.status.phase {
        DeploymentPhase::Ready => gitopsd_core::resource::SyncStatus::Synced,
        DeploymentPhase::Progressing => gitopsd_core::resource::SyncStatus::Syncing,
        DeploymentPhase::Degraded | DeploymentPhase::Failed => gitopsd_core::resource::SyncStatus::OutOfSync,
        DeploymentPhase::Pending => gitopsd_core::resource::SyncStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_tracks_phase() {
        let mut deployment = test_deployment();
        deployment.status.phase = DeploymentPhase::Ready;
        assert_eq!(deployment_sync_status(&deployment), gitopsd_core::resource::SyncStatus::Synced);
        deployment.status.phase = DeploymentPhase::Degraded;
        assert_eq!(deployment_sync_status(&deployment), gitopsd_core::resource::SyncStatus::OutOfSync);
    }

    fn test_deployment() -> GitOpsDeployment {
        use gitopsd_core::deployment::{DriftDetectionConfig, GitOpsEngineVariant, PollInterval, PromotionConfig, RepositorySpec};
        GitOpsDeployment {
            id: ResourceId::new(),
            name: "demo".to_string(),
            repository: RepositorySpec { url: "https://example.invalid/repo.git".to_string(), branch: "main".to_string(), tag: None, path: String::new(), credentials_ref: None },
            poll_interval: PollInterval::new(std::time::Duration::from_secs(30)).unwrap(),
            engine: GitOpsEngineVariant::SelfManaged,
            drift_detection: DriftDetectionConfig::default(),
            environments: vec![],
            promotion: PromotionConfig::default(),
            status: Default::default(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }
}
