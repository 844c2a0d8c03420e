//! Promotion history, capped at [`HISTORY_RETENTION_PER_EDGE`] entries per
//! `(deployment, from, to)` edge — oldest by timestamp evicted, not by
//! insertion order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gitopsd_core::ResourceId;
use gitopsd_core::promotion::{GateResult, PromotionHistoryEntry, HISTORY_RETENTION_PER_EDGE};
use sqlx::PgPool;

use crate::DbResult;

#[derive(Debug, Clone, sqlx::FromRow)]
struct HistoryRow {
    from_env: String,
    to_env: String,
    from_revision: String,
    to_revision: String,
    actor: String,
    success: bool,
    message: String,
    gate_results: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_domain(self) -> DbResult<PromotionHistoryEntry> {
        let gate_results: Vec<GateResult> = serde_json::from_value(self.gate_results)?;
        Ok(PromotionHistoryEntry {
            timestamp: self.created_at,
            from: self.from_env,
            to: self.to_env,
            from_revision: self.from_revision,
            to_revision: self.to_revision,
            user: self.actor,
            success: self.success,
            message: self.message,
            gate_results,
        })
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, deployment_id: ResourceId, entry: &PromotionHistoryEntry) -> DbResult<()>;
    async fn list_for_edge(&self, deployment_id: ResourceId, from: &str, to: &str, limit: i64) -> DbResult<Vec<PromotionHistoryEntry>>;
}

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, deployment_id: ResourceId, entry: &PromotionHistoryEntry) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO promotion_history
                (id, deployment_id, from_env, to_env, from_revision, to_revision, actor, success, message, gate_results, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(deployment_id.as_uuid())
        .bind(&entry.from)
        .bind(&entry.to)
        .bind(&entry.from_revision)
        .bind(&entry.to_revision)
        .bind(&entry.user)
        .bind(entry.success)
        .bind(&entry.message)
        .bind(serde_json::to_value(&entry.gate_results).unwrap_or_default())
        .bind(entry.timestamp)
        .execute(&mut *tx)
        .await?;

        // Evict everything on this edge beyond the newest HISTORY_RETENTION_PER_EDGE rows.
        sqlx::query(
            r#"
            DELETE FROM promotion_history
            WHERE id IN (
                SELECT id FROM promotion_history
                WHERE deployment_id = $1 AND from_env = $2 AND to_env = $3
                ORDER BY created_at DESC
                OFFSET $4
            )
            "#,
        )
        .bind(deployment_id.as_uuid())
        .bind(&entry.from)
        .bind(&entry.to)
        .bind(HISTORY_RETENTION_PER_EDGE as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_edge(&self, deployment_id: ResourceId, from: &str, to: &str, limit: i64) -> DbResult<Vec<PromotionHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT from_env, to_env, from_revision, to_revision, actor, success, message, gate_results, created_at \
             FROM promotion_history WHERE deployment_id = $1 AND from_env = $2 AND to_env = $3 ORDER BY created_at DESC LIMIT $4",
        )
        .bind(deployment_id.as_uuid())
        .bind(from)
        .bind(to)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HistoryRow::into_domain).collect()
    }
}
