//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz)).route("/readyz", get(readyz))
}

/// Always returns 200 once the process is up; does not touch the database.
async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Returns 200 only if the database backing the history/promotion/approval
/// stores is reachable, distinguishing "process is alive" from "can serve
/// real reads".
async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "error": err.to_string() })),
        ),
    }
}
