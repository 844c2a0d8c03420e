//! Approval requests backing `Manual` promotion gates.
//!
//! Decisions are recorded under a row-level `FOR UPDATE` lock so two
//! concurrent approvals from different approvers can never both observe a
//! stale `distinct_approval_count()` and double-cross the threshold.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gitopsd_core::ResourceId;
use gitopsd_core::approval::ApprovalRequest;
use sqlx::PgPool;

use crate::convert::not_found;
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ApprovalRow {
    id: uuid::Uuid,
    promotion_id: uuid::Uuid,
    description: String,
    required_approvers: Vec<String>,
    min_approvals: i32,
    timeout_seconds: Option<i64>,
    approvers: Vec<String>,
    approved: bool,
    rejected: bool,
    decision_at: Option<DateTime<Utc>>,
    decision_reason: Option<String>,
    created_at: DateTime<Utc>,
}

impl ApprovalRow {
    fn into_domain(self) -> ApprovalRequest {
        ApprovalRequest {
            id: ResourceId::from_uuid(self.id),
            promotion_id: ResourceId::from_uuid(self.promotion_id),
            description: self.description,
            required_approvers: self.required_approvers,
            min_approvals: self.min_approvals as u32,
            timeout: self.timeout_seconds.map(Duration::seconds),
            approvers: self.approvers,
            approved: self.approved,
            rejected: self.rejected,
            decision_at: self.decision_at,
            decision_reason: self.decision_reason,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn create(&self, request: &ApprovalRequest) -> DbResult<()>;
    async fn get(&self, id: ResourceId) -> DbResult<ApprovalRequest>;
    /// The approval request backing a given promotion, if one has been
    /// created yet (a `Manual` gate creates one lazily on first evaluation).
    async fn get_by_promotion(&self, promotion_id: ResourceId) -> DbResult<Option<ApprovalRequest>>;
    /// Applies `mutate` to the current row state under a row lock and
    /// persists the result, returning the updated request. Boxed rather than
    /// generic so the trait stays object-safe behind `Arc<dyn ApprovalStore>`.
    async fn with_lock(
        &self,
        id: ResourceId,
        mutate: Box<dyn FnOnce(&mut ApprovalRequest) -> Result<(), String> + Send>,
    ) -> DbResult<ApprovalRequest>;
}

pub struct PgApprovalStore {
    pool: PgPool,
}

impl PgApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    async fn create(&self, request: &ApprovalRequest) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO approval_requests
                (id, promotion_id, description, required_approvers, min_approvals, timeout_seconds,
                 approvers, approved, rejected, decision_at, decision_reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.promotion_id.as_uuid())
        .bind(&request.description)
        .bind(&request.required_approvers)
        .bind(request.min_approvals as i32)
        .bind(request.timeout.map(|d| d.num_seconds()))
        .bind(&request.approvers)
        .bind(request.approved)
        .bind(request.rejected)
        .bind(request.decision_at)
        .bind(&request.decision_reason)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: ResourceId) -> DbResult<ApprovalRequest> {
        let row = sqlx::query_as::<_, ApprovalRow>("SELECT * FROM approval_requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(format!("approval request {id}")))?;
        Ok(row.into_domain())
    }

    async fn get_by_promotion(&self, promotion_id: ResourceId) -> DbResult<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            "SELECT * FROM approval_requests WHERE promotion_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(promotion_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ApprovalRow::into_domain))
    }

    async fn with_lock(
        &self,
        id: ResourceId,
        mutate: Box<dyn FnOnce(&mut ApprovalRequest) -> Result<(), String> + Send>,
    ) -> DbResult<ApprovalRequest> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ApprovalRow>("SELECT * FROM approval_requests WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found(format!("approval request {id}")))?;

        let mut request = row.into_domain();
        mutate(&mut request).map_err(DbError::Duplicate)?;

        sqlx::query(
            r#"
            UPDATE approval_requests
            SET approvers = $2, approved = $3, rejected = $4, decision_at = $5, decision_reason = $6
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(&request.approvers)
        .bind(request.approved)
        .bind(request.rejected)
        .bind(request.decision_at)
        .bind(&request.decision_reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(request)
    }
}
