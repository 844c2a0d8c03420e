//! Read-only views over `GitOpsDeployment`s.
//!
//! Deployments themselves are cluster-declarative resources owned by the
//! Reconciler; this router never creates, mutates, or deletes one — it only
//! serves the in-process index the reconcile workers keep current.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use gitopsd_core::ResourceId;
use gitopsd_core::deployment::{DeploymentPhase, GitOpsDeployment};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list)).route("/{id}", get(get_one))
}

#[derive(Debug, Serialize)]
struct DeploymentSummary {
    id: String,
    name: String,
    phase: DeploymentPhase,
    last_synced_commit: Option<String>,
    drift_detected: bool,
}

impl From<&GitOpsDeployment> for DeploymentSummary {
    fn from(d: &GitOpsDeployment) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
            phase: d.status.phase,
            last_synced_commit: d.status.last_synced_commit.clone(),
            drift_detected: d.status.drift_status.detected,
        }
    }
}

async fn list(State(state): State<AppState>) -> Json<Vec<DeploymentSummary>> {
    let summaries = state.deployments.list().iter().map(DeploymentSummary::from).collect();
    Json(summaries)
}

async fn get_one(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<GitOpsDeployment>, ApiError> {
    state
        .deployments
        .get(ResourceId::from_uuid(id))
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("deployment {id} not found")))
}
