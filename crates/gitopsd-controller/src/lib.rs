//! Reconciler and Promotion Manager for the GitOps controller.
//!
//! Per-deployment control loops, drift remediation dispatch, and gated,
//! revision-pinned promotions: the orchestration layer that drives
//! `gitopsd-git` and `gitopsd-k8s` against the state held in `gitopsd-db`.

pub mod backoff;
pub mod check;
pub mod gate;
pub mod index;
pub mod promotion;
pub mod reconcile;
pub mod registry;
pub mod transform;
pub mod worker;

pub use backoff::ReconcileBackoff;
pub use check::{MetricCheckProvider, TestCheckProvider, UnconfiguredChecks};
pub use gate::{GateContext, GateEvaluator};
pub use index::DeploymentIndex;
pub use promotion::PromotionManager;
pub use reconcile::{DesiredStateCache, Reconciler, TickOutcome};
pub use registry::{wake_channel, DeploymentRegistry, WakeSender};
pub use worker::{DeploymentRepository, PromotionWorker, ReconcileLoop};
