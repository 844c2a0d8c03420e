//! Promotion Manager: gated, revision-pinned promotion of one environment's
//! manifests into the next, rewritten, committed, and pushed as a dedicated
//! commit — never a merge.
//!
//! The algorithm runs end to end under a per-`(deployment, to_env)` advisory
//! lock from [`DeploymentRegistry`] so two promotions can never interleave
//! their commit phases. A strategy this controller cannot execute is
//! rejected at admission rather than accepted and failed mid-flight.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};

use gitopsd_core::credential::Credentials;
use gitopsd_core::deployment::GitOpsDeployment;
use gitopsd_core::error::{Error, Result};
use gitopsd_core::promotion::{GateResult, PromotionHistoryEntry, PromotionPhase, PromotionRequest};
use gitopsd_db::{HistoryStore, PromotionStore};
use gitopsd_git::{GitError, GitRef, RetryConfig, checkout, clone, commit_and_push, current_revision, files_at, write_files};

use crate::gate::{GateContext, GateEvaluator};
use crate::registry::DeploymentRegistry;
use crate::transform::{PROMOTION_METADATA_FILE, render_promotion_metadata, transform_files};

/// Default per-promotion wall-clock budget: a promotion that cannot complete
/// within a bounded time is failed, not left in-flight forever.
pub const DEFAULT_PROMOTION_TIMEOUT: StdDuration = StdDuration::from_secs(600);

const COMMIT_AUTHOR_NAME: &str = "gitopsd";
const COMMIT_AUTHOR_EMAIL: &str = "gitopsd@localhost";

/// What a set of evaluated [`GateResult`]s means for the request's phase.
#[derive(Debug, PartialEq, Eq)]
enum GateOutcome {
    /// Every gate passed; the promotion may proceed.
    Clear,
    /// Every unmet gate is a manual gate merely awaiting more approvals —
    /// the request stays `PendingApproval`, not `Failed`.
    AwaitingApproval,
    /// At least one gate terminally failed: rejected, timed out, or any
    /// non-manual gate that returned false.
    Failed(String),
}

/// Classifies gate results without any side effects, so the pending-vs-failed
/// distinction can be exercised directly without driving a full `execute()`.
fn classify_gate_results(results: &[GateResult]) -> GateOutcome {
    let failing: Vec<&GateResult> = results.iter().filter(|r| !r.passed).collect();
    if failing.is_empty() {
        return GateOutcome::Clear;
    }
    if failing.iter().all(|r| r.pending) {
        return GateOutcome::AwaitingApproval;
    }
    GateOutcome::Failed(failing.iter().map(|r| r.message.as_str()).collect::<Vec<_>>().join("; "))
}

pub struct PromotionManager {
    gates: Arc<GateEvaluator>,
    promotions: Arc<dyn PromotionStore>,
    history: Arc<dyn HistoryStore>,
    registry: Arc<DeploymentRegistry>,
    git_retry: RetryConfig,
    timeout: StdDuration,
}

impl PromotionManager {
    pub fn new(
        gates: Arc<GateEvaluator>,
        promotions: Arc<dyn PromotionStore>,
        history: Arc<dyn HistoryStore>,
        registry: Arc<DeploymentRegistry>,
    ) -> Self {
        Self { gates, promotions, history, registry, git_retry: RetryConfig::default(), timeout: DEFAULT_PROMOTION_TIMEOUT }
    }

    /// Side-effect-free eligibility query: used both to validate a
    /// manually-triggered promotion before it is persisted and by the
    /// auto-promotion scheduler deciding whether to open one.
    pub fn can_promote(
        &self,
        deployment: &GitOpsDeployment,
        from: &str,
        to: &str,
        last_promoted_at: Option<DateTime<Utc>>,
    ) -> (bool, String) {
        if deployment.environment(from).is_none() {
            return (false, format!("unknown source environment '{from}'"));
        }
        if deployment.environment(to).is_none() {
            return (false, format!("unknown target environment '{to}'"));
        }
        let Some(policy) = deployment.promotion.policy(from, to) else {
            return (false, format!("no promotion policy from '{from}' to '{to}'"));
        };
        if let Some(auto_after) = policy.auto_promote_after {
            if let Some(last) = last_promoted_at {
                if Utc::now() - last < auto_after {
                    return (false, format!("edge {from}->{to} auto-promotes at most once every {auto_after}"));
                }
            }
        }
        (true, "eligible".to_string())
    }

    /// Runs the full algorithm against an already-persisted `request`,
    /// enforcing [`DEFAULT_PROMOTION_TIMEOUT`] and recording the outcome to
    /// history regardless of success. Callers must have already validated the
    /// strategy is implemented and the request has been `PromotionStore::create`d.
    pub async fn execute(&self, deployment: &GitOpsDeployment, request: &mut PromotionRequest, credentials: Option<Credentials>) -> Result<()> {
        match tokio::time::timeout(self.timeout, self.execute_inner(deployment, request, credentials)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                request.fail(err.to_string());
                self.save_and_record(deployment, request).await;
                Err(err)
            }
            Err(_) => {
                let err = Error::Timeout(format!("promotion {} did not complete within {:?}", request.id, self.timeout));
                request.fail(err.to_string());
                self.save_and_record(deployment, request).await;
                Err(err)
            }
        }
    }

    async fn execute_inner(&self, deployment: &GitOpsDeployment, request: &mut PromotionRequest, credentials: Option<Credentials>) -> Result<()> {
        if !request.strategy.is_implemented() {
            return Err(Error::InvalidInput(format!("promotion strategy '{}' has no executor in this controller", request.strategy)));
        }

        let lock = self.registry.promotion_target_lock(deployment.id, &request.to_env);
        let _guard = lock.lock().await;

        let from_env = deployment
            .environment(&request.from_env)
            .ok_or_else(|| Error::InvalidInput(format!("unknown source environment '{}'", request.from_env)))?
            .clone();
        let to_env = deployment
            .environment(&request.to_env)
            .ok_or_else(|| Error::InvalidInput(format!("unknown target environment '{}'", request.to_env)))?
            .clone();

        // Step 1: open the source environment's branch and resolve the candidate revision.
        let source_ref = GitRef::Branch(from_env.branch.clone());
        let source_tree = clone(&deployment.repository.url, &source_ref, credentials.clone(), self.git_retry).await?;
        let candidate_revision = match &request.candidate_revision {
            Some(rev) => rev.clone(),
            None => current_revision(&source_tree).await?,
        };
        request.from_revision = Some(candidate_revision.clone());

        // Step 2: evaluate every gate guarding entry into the target environment.
        request.phase = PromotionPhase::PendingApproval;
        let ctx = GateContext { promotion_id: request.id, candidate_revision: &candidate_revision, source_entered_at: None, auto: request.auto, now: Utc::now() };
        let results = self.gates.evaluate_all(&to_env.gates, &ctx).await;
        request.gate_results = results.clone();
        match classify_gate_results(&results) {
            GateOutcome::Clear => {}
            // Still PendingApproval, set above: persist without recording
            // history so a later approval can re-evaluate this to
            // Progressing/Completed, rather than failing it terminally.
            GateOutcome::AwaitingApproval => {
                if let Err(err) = self.promotions.save(request).await {
                    tracing::error!(promotion = %request.id, error = %err, "failed to persist promotion request");
                }
                return Ok(());
            }
            GateOutcome::Failed(reasons) => {
                return Err(Error::PromotionFailed(format!("gate(s) failed for {} -> {}: {reasons}", from_env.name, to_env.name)));
            }
        }
        request.phase = PromotionPhase::Progressing;

        // Step 3: read the source environment's manifests at the candidate revision.
        let source_files = files_at(&source_tree, &from_env.path).await?;

        // Step 4: rewrite namespace/environment/host references for the target.
        let mut transformed = transform_files(&source_files, &from_env.name, &to_env.name);

        // Step 5: stamp the promotion with its provenance metadata file.
        transformed.insert(
            PROMOTION_METADATA_FILE.to_string(),
            render_promotion_metadata(&from_env.name, &to_env.name, &candidate_revision, &request.requester, Utc::now(), deployment.id),
        );

        // Step 6: write the target environment's branch working tree.
        let target_ref = GitRef::Branch(to_env.branch.clone());
        let target_tree = clone(&deployment.repository.url, &target_ref, credentials.clone(), self.git_retry).await?;
        write_files(&target_tree, &to_env.path, transformed.clone()).await?;

        // Step 7: commit and push; on a non-fast-forward conflict, refetch
        // the target branch and retry exactly once.
        let message = format!("promote {} -> {} @ {}", from_env.name, to_env.name, candidate_revision);
        let to_revision = match commit_and_push(&target_tree, credentials.clone(), &message, COMMIT_AUTHOR_NAME, COMMIT_AUTHOR_EMAIL, self.git_retry).await {
            Ok(rev) => rev,
            Err(GitError::Conflict(_)) => {
                checkout(&target_tree, &target_ref, credentials.clone(), self.git_retry).await?;
                write_files(&target_tree, &to_env.path, transformed).await?;
                commit_and_push(&target_tree, credentials.clone(), &message, COMMIT_AUTHOR_NAME, COMMIT_AUTHOR_EMAIL, self.git_retry).await?
            }
            Err(err) => return Err(err.into()),
        };

        // Step 8: record completion.
        request.complete(to_revision);
        self.save_and_record(deployment, request).await;
        Ok(())
    }

    async fn save_and_record(&self, deployment: &GitOpsDeployment, request: &PromotionRequest) {
        if let Err(err) = self.promotions.save(request).await {
            tracing::error!(promotion = %request.id, error = %err, "failed to persist promotion request");
        }
        let entry = PromotionHistoryEntry {
            timestamp: request.completed_at.unwrap_or_else(Utc::now),
            from: request.from_env.clone(),
            to: request.to_env.clone(),
            from_revision: request.from_revision.clone().unwrap_or_default(),
            to_revision: request.to_revision.clone().unwrap_or_default(),
            user: request.requester.clone(),
            success: request.phase == PromotionPhase::Completed,
            message: request.message.clone().unwrap_or_default(),
            gate_results: request.gate_results.clone(),
        };
        if let Err(err) = self.history.append(deployment.id, &entry).await {
            tracing::error!(promotion = %request.id, error = %err, "failed to append promotion history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitopsd_core::deployment::{DriftDetectionConfig, GitOpsEngineVariant, PollInterval, PromotionConfig, RepositorySpec};
    use gitopsd_core::environment::EnvironmentSpec;
    use gitopsd_core::promotion::PromotionPolicy;
    use gitopsd_core::ResourceId;
    use std::time::Duration;

    fn deployment_with_policy(auto_promote_after: Option<chrono::Duration>) -> GitOpsDeployment {
        GitOpsDeployment {
            id: ResourceId::new(),
            name: "demo".to_string(),
            repository: RepositorySpec { url: "https://example.invalid/repo.git".to_string(), branch: "main".to_string(), tag: None, path: "".to_string(), credentials_ref: None },
            poll_interval: PollInterval::new(Duration::from_secs(30)).unwrap(),
            engine: GitOpsEngineVariant::SelfManaged,
            drift_detection: DriftDetectionConfig::default(),
            environments: vec![
                EnvironmentSpec { name: "dev".to_string(), branch: "env/dev".to_string(), path: "envs/dev".to_string(), auto_sync: true, gates: vec![] },
                EnvironmentSpec { name: "staging".to_string(), branch: "env/staging".to_string(), path: "envs/staging".to_string(), auto_sync: false, gates: vec![] },
            ],
            promotion: PromotionConfig {
                strategy: None,
                auto_promotion: true,
                policies: vec![PromotionPolicy { from: "dev".to_string(), to: "staging".to_string(), required_approvals: 0, auto_promote_after }],
            },
            status: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn manager() -> PromotionManager {
        struct NoopPromotions;
        #[async_trait::async_trait]
        impl PromotionStore for NoopPromotions {
            async fn create(&self, _r: &PromotionRequest) -> gitopsd_db::DbResult<()> { Ok(()) }
            async fn get(&self, id: gitopsd_core::ResourceId) -> gitopsd_db::DbResult<PromotionRequest> { Err(gitopsd_db::DbError::NotFound(id.to_string())) }
            async fn save(&self, _r: &PromotionRequest) -> gitopsd_db::DbResult<()> { Ok(()) }
            async fn list_for_edge(&self, _d: gitopsd_core::ResourceId, _f: &str, _t: &str, _l: i64) -> gitopsd_db::DbResult<Vec<PromotionRequest>> { Ok(vec![]) }
            async fn claim_next(&self, _w: &str, _s: chrono::Duration) -> gitopsd_db::DbResult<Option<PromotionRequest>> { Ok(None) }
            async fn release(&self, _id: gitopsd_core::ResourceId) -> gitopsd_db::DbResult<()> { Ok(()) }
        }
        struct NoopHistory;
        #[async_trait::async_trait]
        impl HistoryStore for NoopHistory {
            async fn append(&self, _d: gitopsd_core::ResourceId, _e: &PromotionHistoryEntry) -> gitopsd_db::DbResult<()> { Ok(()) }
            async fn list_for_edge(&self, _d: gitopsd_core::ResourceId, _f: &str, _t: &str, _l: i64) -> gitopsd_db::DbResult<Vec<PromotionHistoryEntry>> { Ok(vec![]) }
        }
        struct NoopApprovals;
        #[async_trait::async_trait]
        impl gitopsd_db::ApprovalStore for NoopApprovals {
            async fn create(&self, _r: &gitopsd_core::approval::ApprovalRequest) -> gitopsd_db::DbResult<()> { Ok(()) }
            async fn get(&self, id: gitopsd_core::ResourceId) -> gitopsd_db::DbResult<gitopsd_core::approval::ApprovalRequest> { Err(gitopsd_db::DbError::NotFound(id.to_string())) }
            async fn get_by_promotion(&self, _p: gitopsd_core::ResourceId) -> gitopsd_db::DbResult<Option<gitopsd_core::approval::ApprovalRequest>> { Ok(None) }
            async fn with_lock(
                &self,
                id: gitopsd_core::ResourceId,
                _m: Box<dyn FnOnce(&mut gitopsd_core::approval::ApprovalRequest) -> std::result::Result<(), String> + Send>,
            ) -> gitopsd_db::DbResult<gitopsd_core::approval::ApprovalRequest> {
                Err(gitopsd_db::DbError::NotFound(id.to_string()))
            }
        }

        let gates = Arc::new(GateEvaluator::new(Arc::new(NoopApprovals), Arc::new(crate::check::UnconfiguredChecks), Arc::new(crate::check::UnconfiguredChecks)));
        PromotionManager::new(gates, Arc::new(NoopPromotions), Arc::new(NoopHistory), Arc::new(DeploymentRegistry::new()))
    }

    #[test]
    fn can_promote_rejects_unknown_environments() {
        let deployment = deployment_with_policy(None);
        let mgr = manager();
        let (ok, reason) = mgr.can_promote(&deployment, "dev", "prod", None);
        assert!(!ok);
        assert!(reason.contains("unknown target environment"));
    }

    #[test]
    fn can_promote_rejects_missing_policy() {
        let deployment = deployment_with_policy(None);
        let mgr = manager();
        let (ok, _) = mgr.can_promote(&deployment, "staging", "dev", None);
        assert!(!ok);
    }

    #[test]
    fn can_promote_enforces_auto_promote_cooldown() {
        let deployment = deployment_with_policy(Some(chrono::Duration::hours(1)));
        let mgr = manager();
        let (ok, reason) = mgr.can_promote(&deployment, "dev", "staging", Some(Utc::now() - chrono::Duration::minutes(5)));
        assert!(!ok);
        assert!(reason.contains("auto-promotes at most once"));

        let (ok, _) = mgr.can_promote(&deployment, "dev", "staging", Some(Utc::now() - chrono::Duration::hours(2)));
        assert!(ok);
    }

    #[tokio::test]
    async fn execute_rejects_unimplemented_strategy() {
        let deployment = deployment_with_policy(None);
        let mgr = manager();
        let mut request = PromotionRequest::new(deployment.id, "dev", "staging", "alice", false, gitopsd_core::promotion::PromotionStrategy::Canary);
        let result = mgr.execute(&deployment, &mut request, None).await;
        assert!(result.is_err());
        assert_eq!(request.phase, PromotionPhase::Failed);
    }

    fn gate_result(passed: bool, pending: bool, message: &str) -> GateResult {
        GateResult { gate_type: "manual".to_string(), passed, pending, message: message.to_string() }
    }

    #[test]
    fn classify_gate_results_all_passed_is_clear() {
        let results = vec![gate_result(true, false, "approved"), gate_result(true, false, "soaked")];
        assert_eq!(classify_gate_results(&results), GateOutcome::Clear);
    }

    #[test]
    fn classify_gate_results_insufficient_approvals_is_awaiting_not_failed() {
        let results = vec![gate_result(false, true, "Needs 1 more approvals (has 0/1)")];
        assert_eq!(classify_gate_results(&results), GateOutcome::AwaitingApproval);
    }

    #[test]
    fn classify_gate_results_rejection_is_terminal_even_alongside_a_pending_gate() {
        let results = vec![gate_result(false, true, "needs more approvals"), gate_result(false, false, "rejected")];
        assert!(matches!(classify_gate_results(&results), GateOutcome::Failed(_)));
    }

    #[test]
    fn classify_gate_results_non_manual_failure_is_terminal() {
        let results = vec![GateResult { gate_type: "test".to_string(), passed: false, pending: false, message: "suite failed".to_string() }];
        assert!(matches!(classify_gate_results(&results), GateOutcome::Failed(_)));
    }
}
