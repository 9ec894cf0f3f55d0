//! PostgreSQL persistence for the job queue and result store.
//!
//! Repositories hold the SQL; [`PgJobQueue`], [`PgResultStore`], and
//! [`PgCompletionNotifier`] adapt them to the traits the worker and API
//! program against.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod notify;
pub mod queue;
pub mod repositories;
pub mod store;

pub use notify::{forward_completions, PgCompletionNotifier, RESULT_READY_CHANNEL};
pub use queue::PgJobQueue;
pub use store::PgResultStore;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
