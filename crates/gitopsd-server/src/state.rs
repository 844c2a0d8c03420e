//! Shared application state for the ambient HTTP surface.

use std::sync::Arc;

use sqlx::PgPool;

use gitopsd_controller::DeploymentIndex;
use gitopsd_db::{ApprovalStore, HistoryStore, PgApprovalStore, PgHistoryStore, PgPromotionStore, PromotionStore};

/// Read model backing `/deployments`, `/deployments/:id`, and the promotion
/// history/approval endpoints. `deployments` is the in-process cache a
/// `kube::runtime::reflector` would otherwise populate (see
/// `gitopsd_controller::DeploymentIndex`); the three stores read straight
/// through to Postgres.
#[derive(Clone)]
pub struct AppState {
    pub deployments: Arc<DeploymentIndex>,
    pub history: Arc<dyn HistoryStore>,
    pub promotions: Arc<dyn PromotionStore>,
    pub approvals: Arc<dyn ApprovalStore>,
    pub pool: PgPool,
}

impl AppState {
    pub fn new(pool: PgPool, deployments: Arc<DeploymentIndex>) -> Self {
        Self {
            deployments,
            history: Arc::new(PgHistoryStore::new(pool.clone())),
            promotions: Arc::new(PgPromotionStore::new(pool.clone())),
            approvals: Arc::new(PgApprovalStore::new(pool.clone())),
            pool,
        }
    }
}
