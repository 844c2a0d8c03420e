//! Ambient HTTP surface for the GitOps controller daemon.
//!
//! This is deliberately small: `/healthz`/`/readyz` plus read-only status and
//! promotion-history endpoints — the equivalent of a controller's
//! `/metrics`+`/healthz` sidecar, not a web UI. Nothing here mutates a
//! `GitOpsDeployment`, a promotion, or an approval; those are owned by the
//! Reconciler, the Promotion Manager, and the (external) cluster-declarative
//! API respectively.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
