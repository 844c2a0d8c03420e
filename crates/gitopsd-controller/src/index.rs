//! In-process index of `GitOpsDeployment`s, keyed by [`ResourceId`] and name.
//!
//! A production controller backs `GitOpsDeployment` with a CRD and keeps this
//! same shape of cache populated by a `kube::runtime::reflector::Store` watch.
//! This index has no watch loop of its own — callers (the reconcile workers,
//! the ambient status server) read and write through it directly — but it
//! is the seam a reflector would feed.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use gitopsd_core::ResourceId;
use gitopsd_core::deployment::GitOpsDeployment;

use crate::worker::DeploymentRepository;

#[derive(Default)]
pub struct DeploymentIndex {
    inner: RwLock<HashMap<ResourceId, GitOpsDeployment>>,
}

impl DeploymentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, deployment: GitOpsDeployment) {
        self.inner.write().unwrap().insert(deployment.id, deployment);
    }

    pub fn get(&self, id: ResourceId) -> Option<GitOpsDeployment> {
        self.inner.read().unwrap().get(&id).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<GitOpsDeployment> {
        self.inner.read().unwrap().values().find(|d| d.name == name).cloned()
    }

    pub fn list(&self) -> Vec<GitOpsDeployment> {
        let mut all: Vec<_> = self.inner.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn remove(&self, id: ResourceId) {
        self.inner.write().unwrap().remove(&id);
    }
}

#[async_trait]
impl DeploymentRepository for DeploymentIndex {
    async fn get(&self, id: ResourceId) -> Option<GitOpsDeployment> {
        DeploymentIndex::get(self, id)
    }

    async fn save_status(&self, deployment: &GitOpsDeployment) {
        self.upsert(deployment.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitopsd_core::deployment::{DriftDetectionConfig, GitOpsEngineVariant, PollInterval, PromotionConfig, RepositorySpec};

    fn sample(name: &str) -> GitOpsDeployment {
        GitOpsDeployment {
            id: ResourceId::new(),
            name: name.to_string(),
            repository: RepositorySpec {
                url: "https://example.invalid/repo.git".to_string(),
                branch: "main".to_string(),
                tag: None,
                path: String::new(),
                credentials_ref: None,
            },
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

    #[test]
    fn upsert_then_get_round_trips() {
        let index = DeploymentIndex::new();
        let deployment = sample("dev");
        let id = deployment.id;
        index.upsert(deployment);
        assert_eq!(index.get(id).unwrap().name, "dev");
    }

    #[test]
    fn list_is_sorted_by_name() {
        let index = DeploymentIndex::new();
        index.upsert(sample("staging"));
        index.upsert(sample("dev"));
        let names: Vec<_> = index.list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["dev".to_string(), "staging".to_string()]);
    }

    #[test]
    fn by_name_finds_matching_deployment() {
        let index = DeploymentIndex::new();
        index.upsert(sample("prod"));
        assert!(index.by_name("prod").is_some());
        assert!(index.by_name("missing").is_none());
    }

    #[test]
    fn remove_drops_entry() {
        let index = DeploymentIndex::new();
        let deployment = sample("dev");
        let id = deployment.id;
        index.upsert(deployment);
        index.remove(id);
        assert!(index.get(id).is_none());
    }
}
