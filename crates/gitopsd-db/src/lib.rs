//! Persistence for promotion requests, promotion history, and approval
//! requests backing `Manual` gates.
//!
//! The history store and promotion store must be safe for concurrent readers
//! and a single writer per key; both rely on Postgres row locks (`FOR UPDATE`,
//! `FOR UPDATE SKIP LOCKED`) rather than an in-process mutex so multiple
//! controller replicas can share one database.

pub mod approval_store;
pub mod convert;
pub mod error;
pub mod history_store;
pub mod promotion_store;

pub use approval_store::{ApprovalStore, PgApprovalStore};
pub use error::{DbError, DbResult};
pub use history_store::{HistoryStore, PgHistoryStore};
pub use promotion_store::{PgPromotionStore, PromotionStore};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> DbResult<PgPool> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
