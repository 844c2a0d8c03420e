//! Persists in-flight and historical `PromotionRequest`s.
//!
//! `claim_next` mirrors the job-queue's `FOR UPDATE SKIP LOCKED` claim so that
//! multiple controller replicas never process the same promotion concurrently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitopsd_core::ResourceId;
use gitopsd_core::promotion::{GateResult, PromotionPhase, PromotionRequest, PromotionStrategy};
use sqlx::PgPool;

use crate::convert::{from_text, not_found, to_text};
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct PromotionRow {
    id: uuid::Uuid,
    deployment_id: uuid::Uuid,
    from_env: String,
    to_env: String,
    candidate_revision: Option<String>,
    requester: String,
    auto: bool,
    strategy: String,
    phase: String,
    gate_results: serde_json::Value,
    from_revision: Option<String>,
    to_revision: Option<String>,
    message: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl PromotionRow {
    fn into_domain(self) -> DbResult<PromotionRequest> {
        let gate_results: Vec<GateResult> = serde_json::from_value(self.gate_results)
            .map_err(|e| DbError::Database(sqlx::Error::ColumnDecode { index: "gate_results".into(), source: Box::new(e) }))?;
        Ok(PromotionRequest {
            id: ResourceId::from_uuid(self.id),
            deployment_id: ResourceId::from_uuid(self.deployment_id),
            from_env: self.from_env,
            to_env: self.to_env,
            candidate_revision: self.candidate_revision,
            requester: self.requester,
            auto: self.auto,
            strategy: from_text::<PromotionStrategy>(&self.strategy)?,
            phase: from_text::<PromotionPhase>(&self.phase)?,
            gate_results,
            from_revision: self.from_revision,
            to_revision: self.to_revision,
            message: self.message,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[async_trait]
pub trait PromotionStore: Send + Sync {
    async fn create(&self, request: &PromotionRequest) -> DbResult<()>;
    async fn get(&self, id: ResourceId) -> DbResult<PromotionRequest>;
    /// Persists the mutable fields of an already-created request: phase,
    /// gate results, revisions, message, completion time.
    async fn save(&self, request: &PromotionRequest) -> DbResult<()>;
    async fn list_for_edge(&self, deployment_id: ResourceId, from: &str, to: &str, limit: i64) -> DbResult<Vec<PromotionRequest>>;
    /// Claims the oldest non-terminal, unclaimed (or stale-claimed) request
    /// for processing, marking it claimed by `worker_id`.
    async fn claim_next(&self, worker_id: &str, stale_after: chrono::Duration) -> DbResult<Option<PromotionRequest>>;
    async fn release(&self, id: ResourceId) -> DbResult<()>;
}

pub struct PgPromotionStore {
    pool: PgPool,
}

impl PgPromotionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PromotionStore for PgPromotionStore {
    async fn create(&self, request: &PromotionRequest) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO promotion_requests
                (id, deployment_id, from_env, to_env, candidate_revision, requester, auto,
                 strategy, phase, gate_results, from_revision, to_revision, message, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.deployment_id.as_uuid())
        .bind(&request.from_env)
        .bind(&request.to_env)
        .bind(&request.candidate_revision)
        .bind(&request.requester)
        .bind(request.auto)
        .bind(to_text(&request.strategy)?)
        .bind(to_text(&request.phase)?)
        .bind(serde_json::to_value(&request.gate_results).unwrap_or_default())
        .bind(&request.from_revision)
        .bind(&request.to_revision)
        .bind(&request.message)
        .bind(request.created_at)
        .bind(request.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: ResourceId) -> DbResult<PromotionRequest> {
        let row = sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotion_requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(format!("promotion {id}")))?;
        row.into_domain()
    }

    async fn save(&self, request: &PromotionRequest) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE promotion_requests
            SET phase = $2, gate_results = $3, from_revision = $4, to_revision = $5,
                message = $6, completed_at = $7, claimed_by = NULL, claimed_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(to_text(&request.phase)?)
        .bind(serde_json::to_value(&request.gate_results).unwrap_or_default())
        .bind(&request.from_revision)
        .bind(&request.to_revision)
        .bind(&request.message)
        .bind(request.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_edge(&self, deployment_id: ResourceId, from: &str, to: &str, limit: i64) -> DbResult<Vec<PromotionRequest>> {
        let rows = sqlx::query_as::<_, PromotionRow>(
            "SELECT * FROM promotion_requests WHERE deployment_id = $1 AND from_env = $2 AND to_env = $3 ORDER BY created_at DESC LIMIT $4",
        )
        .bind(deployment_id.as_uuid())
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PromotionRow::into_domain).collect()
    }

    async fn claim_next(&self, worker_id: &str, stale_after: chrono::Duration) -> DbResult<Option<PromotionRequest>> {
        let stale_before = Utc::now() - stale_after;
        let row = sqlx::query_as::<_, PromotionRow>(
            r#"
            UPDATE promotion_requests
            SET claimed_by = $1, claimed_at = NOW()
            WHERE id = (
                SELECT id FROM promotion_requests
                WHERE phase NOT IN ('completed', 'failed', 'cancelled')
                  AND (claimed_by IS NULL OR claimed_at < $2)
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PromotionRow::into_domain).transpose()
    }

    async fn release(&self, id: ResourceId) -> DbResult<()> {
        sqlx::query("UPDATE promotion_requests SET claimed_by = NULL, claimed_at = NULL WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
