//! Read-only views over promotion history, in-flight requests, and the
//! approval requests backing `Manual` gates.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use gitopsd_core::ResourceId;
use gitopsd_core::approval::ApprovalRequest;
use gitopsd_core::promotion::{PromotionHistoryEntry, PromotionRequest};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/deployments/{id}/promotions/history", get(history_for_edge))
        .route("/deployments/{id}/promotions/requests", get(requests_for_edge))
        .route("/promotions/{id}/approval", get(approval_for_promotion))
}

#[derive(Debug, Deserialize)]
struct EdgeQuery {
    from: String,
    to: String,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn history_for_edge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<EdgeQuery>,
) -> Result<Json<Vec<PromotionHistoryEntry>>, ApiError> {
    let entries = state
        .history
        .list_for_edge(ResourceId::from_uuid(id), &q.from, &q.to, q.limit.min(50))
        .await?;
    Ok(Json(entries))
}

async fn requests_for_edge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<EdgeQuery>,
) -> Result<Json<Vec<PromotionRequest>>, ApiError> {
    let requests = state
        .promotions
        .list_for_edge(ResourceId::from_uuid(id), &q.from, &q.to, q.limit)
        .await?;
    Ok(Json(requests))
}

async fn approval_for_promotion(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalRequest>, ApiError> {
    let request = state.approvals.get_by_promotion(ResourceId::from_uuid(id)).await?;
    request
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no approval request for promotion {id}")))
}
