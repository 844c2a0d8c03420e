//! `GitOpsDeployment`: the top-level declarative resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::CredentialsRef;
use crate::environment::EnvironmentSpec;
use crate::id::ResourceId;
use crate::promotion::{PromotionPolicy, PromotionStrategy};
use crate::resource::{DriftStatus, ManagedResource};

/// Which sync engine drives this deployment. `SelfManaged` reads the working
/// tree directly and writes the cluster API directly; the others delegate
/// inventory and desired-state reads to an external engine (see `gitopsd_k8s::engine`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitOpsEngineVariant {
    SelfManaged,
    ArgoCd,
    Flux,
}

impl Default for GitOpsEngineVariant {
    fn default() -> Self {
        GitOpsEngineVariant::SelfManaged
    }
}

/// Repository connection details for a deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositorySpec {
    pub url: String,
    pub branch: String,
    pub tag: Option<String>,
    /// Repository-relative subdirectory; must not escape the repository root.
    pub path: String,
    pub credentials_ref: Option<CredentialsRef>,
}

/// Poll interval newtype enforcing a `>= 1s` floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollInterval(std::time::Duration);

impl PollInterval {
    pub fn new(duration: std::time::Duration) -> Result<Self, String> {
        if duration < std::time::Duration::from_secs(1) {
            return Err("pollInterval must be >= 1s".into());
        }
        Ok(Self(duration))
    }

    pub fn get(&self) -> std::time::Duration {
        self.0
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(std::time::Duration::from_secs(30))
    }
}

/// Drift-detection configuration for a deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriftDetectionConfig {
    pub auto_remediate: bool,
    /// Dot-separated paths removed from both sides before comparison.
    pub ignore_fields: Vec<String>,
    /// Gates deletion of live-only ("Added") resources behind an explicit
    /// flag — the highest-risk remediation action.
    pub remove_untracked_resources: bool,
}

/// Promotion configuration for a deployment's pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromotionConfig {
    pub strategy: Option<PromotionStrategy>,
    pub auto_promotion: bool,
    pub policies: Vec<PromotionPolicy>,
}

impl PromotionConfig {
    pub fn policy(&self, from: &str, to: &str) -> Option<&PromotionPolicy> {
        self.policies.iter().find(|p| p.from == from && p.to == to)
    }
}

/// Reconcile phase surfaced on `status.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentPhase {
    Pending,
    Ready,
    Progressing,
    Degraded,
    Failed,
}

impl Default for DeploymentPhase {
    fn default() -> Self {
        DeploymentPhase::Pending
    }
}

/// Observed status of a `GitOpsDeployment`, mutated only by the Reconciler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub phase: DeploymentPhase,
    pub last_synced_commit: Option<String>,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub inventory: Vec<ManagedResource>,
    pub drift_status: DriftStatus,
    pub reason: Option<String>,
    pub message: Option<String>,
    /// Compare-and-set token to avoid lost-update races with concurrent user
    /// edits across ticks for one deployment.
    pub resource_version: u64,
}

/// The top-level declarative resource binding a cluster workload to a Git
/// repository across a linear pipeline of named environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOpsDeployment {
    pub id: ResourceId,
    pub name: String,
    pub repository: RepositorySpec,
    pub poll_interval: PollInterval,
    pub engine: GitOpsEngineVariant,
    pub drift_detection: DriftDetectionConfig,
    pub environments: Vec<EnvironmentSpec>,
    pub promotion: PromotionConfig,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GitOpsDeployment {
    pub fn environment(&self, name: &str) -> Option<&EnvironmentSpec> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Validates unique environment names, in-bounds paths, and that the
    /// promotion policy set forms a DAG over environment names.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for env in &self.environments {
            env.validate()?;
            if !seen.insert(env.name.as_str()) {
                return Err(format!("duplicate environment name '{}'", env.name));
            }
        }
        let root = std::path::Path::new(&self.repository.path);
        if root.is_absolute() || root.components().any(|c| c.as_os_str() == "..") {
            return Err("repository path escapes the repository root".into());
        }
        for policy in &self.promotion.policies {
            if policy.from == policy.to {
                return Err(format!("self-loop in promotion policy: {}", policy.from));
            }
        }
        detect_promotion_cycle(&self.promotion.policies)?;
        Ok(())
    }
}

/// DFS over the `from -> to` promotion edges with the standard
/// visiting/done coloring: re-entering a node still in `Visiting` means a
/// back edge, i.e. a cycle. Self-loops are rejected earlier in `validate`
/// with a more specific message; this catches cycles of any longer length.
fn detect_promotion_cycle(policies: &[PromotionPolicy]) -> Result<(), String> {
    use std::collections::BTreeMap;

    #[derive(PartialEq)]
    enum State {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a str,
        edges: &BTreeMap<&'a str, Vec<&'a str>>,
        state: &mut BTreeMap<&'a str, State>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), String> {
        if let Some(s) = state.get(node) {
            if *s == State::Visiting {
                path.push(node);
                let start = path.iter().position(|n| *n == node).unwrap();
                return Err(format!("cycle in promotion policy graph: {}", path[start..].join(" -> ")));
            }
            return Ok(());
        }
        state.insert(node, State::Visiting);
        path.push(node);
        if let Some(next) = edges.get(node) {
            for &n in next {
                visit(n, edges, state, path)?;
            }
        }
        path.pop();
        state.insert(node, State::Done);
        Ok(())
    }

    let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for policy in policies {
        edges.entry(policy.from.as_str()).or_default().push(policy.to.as_str());
    }

    let mut state = BTreeMap::new();
    let mut path = Vec::new();
    for &node in edges.keys() {
        if !state.contains_key(node) {
            visit(node, &edges, &mut state, &mut path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_deployment(policies: Vec<PromotionPolicy>) -> GitOpsDeployment {
        GitOpsDeployment {
            id: ResourceId::new(),
            name: "demo".to_string(),
            repository: RepositorySpec { url: "https://example.invalid/repo.git".to_string(), branch: "main".to_string(), tag: None, path: "".to_string(), credentials_ref: None },
            poll_interval: PollInterval::default(),
            engine: GitOpsEngineVariant::SelfManaged,
            drift_detection: DriftDetectionConfig::default(),
            environments: vec![
                EnvironmentSpec { name: "dev".to_string(), branch: "env/dev".to_string(), path: "envs/dev".to_string(), auto_sync: true, gates: vec![] },
                EnvironmentSpec { name: "staging".to_string(), branch: "env/staging".to_string(), path: "envs/staging".to_string(), auto_sync: false, gates: vec![] },
                EnvironmentSpec { name: "prod".to_string(), branch: "env/prod".to_string(), path: "envs/prod".to_string(), auto_sync: false, gates: vec![] },
            ],
            promotion: PromotionConfig { strategy: None, auto_promotion: true, policies },
            status: DeploymentStatus::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn policy(from: &str, to: &str) -> PromotionPolicy {
        PromotionPolicy { from: from.to_string(), to: to.to_string(), required_approvals: 0, auto_promote_after: None }
    }

    #[test]
    fn validate_accepts_a_linear_pipeline() {
        let deployment = base_deployment(vec![policy("dev", "staging"), policy("staging", "prod")]);
        assert!(deployment.validate().is_ok());
    }

    #[test]
    fn validate_rejects_a_self_loop() {
        let deployment = base_deployment(vec![policy("dev", "dev")]);
        let err = deployment.validate().unwrap_err();
        assert!(err.contains("self-loop"));
    }

    #[test]
    fn validate_rejects_a_two_cycle() {
        let deployment = base_deployment(vec![policy("dev", "staging"), policy("staging", "dev")]);
        let err = deployment.validate().unwrap_err();
        assert!(err.contains("cycle"), "expected a cycle error, got: {err}");
    }

    #[test]
    fn validate_rejects_a_longer_cycle() {
        let deployment = base_deployment(vec![policy("dev", "staging"), policy("staging", "prod"), policy("prod", "dev")]);
        let err = deployment.validate().unwrap_err();
        assert!(err.contains("cycle"), "expected a cycle error, got: {err}");
    }

    #[test]
    fn validate_accepts_diamond_shaped_dag() {
        // dev -> staging -> prod and dev -> prod directly: a DAG, not a cycle.
        let deployment = base_deployment(vec![policy("dev", "staging"), policy("staging", "prod"), policy("dev", "prod")]);
        assert!(deployment.validate().is_ok());
    }
}
