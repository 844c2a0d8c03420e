//! Per-deployment concurrency primitives.
//!
//! Each `GitOpsDeployment` gets exactly one working-tree mutex (serializing
//! concurrent operations against the same tree) and one "wake" channel (an
//! externally triggered sync that coalesces with any tick already pending,
//! rather than queuing a second one). Promotion targets get their own
//! advisory lock keyed by `(deployment, to_env)` so two promotions into the
//! same environment can never interleave their commit phases.
//!
//! Modeled as a `HashMap` guarded by an outer `RwLock` holding per-resource
//! `Arc`s, rather than pulling in a concurrent-map crate for what amounts to
//! a handful of locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use gitopsd_core::ResourceId;
use tokio::sync::{Mutex, mpsc};

/// A coalescing wake signal: a bounded channel of capacity 1 where a full
/// channel means a wake is already pending, so a second `try_send` is
/// dropped rather than queued — a second trigger while a tick is running
/// coalesces into a single pending trigger.
#[derive(Clone)]
pub struct WakeSender(mpsc::Sender<()>);

impl WakeSender {
    /// Request a tick. No-op if one is already pending.
    pub fn wake(&self) {
        let _ = self.0.try_send(());
    }
}

pub fn wake_channel() -> (WakeSender, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (WakeSender(tx), rx)
}

/// Registry of per-deployment working-tree mutexes and per-promotion-target
/// advisory locks, keyed by `ResourceId`.
#[derive(Default)]
pub struct DeploymentRegistry {
    working_trees: RwLock<HashMap<ResourceId, Arc<Mutex<()>>>>,
    promotion_targets: RwLock<HashMap<(ResourceId, String), Arc<Mutex<()>>>>,
}

impl DeploymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `deployment`'s working tree. Created on first use,
    /// reused thereafter.
    pub fn working_tree_lock(&self, deployment: ResourceId) -> Arc<Mutex<()>> {
        if let Some(lock) = self.working_trees.read().unwrap().get(&deployment) {
            return lock.clone();
        }
        let mut write = self.working_trees.write().unwrap();
        write.entry(deployment).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// The advisory lock guarding promotions into `(deployment, to_env)`.
    pub fn promotion_target_lock(&self, deployment: ResourceId, to_env: &str) -> Arc<Mutex<()>> {
        let key = (deployment, to_env.to_string());
        if let Some(lock) = self.promotion_targets.read().unwrap().get(&key) {
            return lock.clone();
        }
        let mut write = self.promotion_targets.write().unwrap();
        write.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drops a deployment's working-tree lock entry, e.g. on deployment deletion.
    pub fn forget(&self, deployment: ResourceId) {
        self.working_trees.write().unwrap().remove(&deployment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_deployment_returns_same_lock() {
        let registry = DeploymentRegistry::new();
        let id = ResourceId::new();
        let a = registry.working_tree_lock(id);
        let b = registry.working_tree_lock(id);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_deployments_get_different_locks() {
        let registry = DeploymentRegistry::new();
        let a = registry.working_tree_lock(ResourceId::new());
        let b = registry.working_tree_lock(ResourceId::new());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn second_wake_while_pending_is_dropped_not_queued() {
        let (tx, mut rx) = wake_channel();
        tx.wake();
        tx.wake();
        tx.wake();
        // Exactly one permit should be available, not three.
        rx.recv().await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
