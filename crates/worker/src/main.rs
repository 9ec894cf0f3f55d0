use std::sync::Arc;

use imgq_core::config::env_required;
use imgq_db::{PgCompletionNotifier, PgJobQueue, PgResultStore};
use imgq_fal::{FalClient, FalConfig};
use imgq_worker::shutdown::shutdown_signal;
use imgq_worker::telemetry::init_tracing;
use imgq_worker::{GenerationExecutor, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing("imgq_worker=debug");

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    let fal = FalConfig::from_env()?;
    tracing::info!(
        concurrency = config.concurrency,
        deadline_secs = config.job_deadline.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = env_required("DATABASE_URL")?;
    let pool = imgq_db::create_pool(&database_url).await?;
    imgq_db::health_check(&pool).await?;
    imgq_db::run_migrations(&pool).await?;
    tracing::info!("Database ready");

    // --- Executor ---
    let generator = Arc::new(FalClient::new(fal)?);
    let executor = GenerationExecutor::new(
        generator,
        Arc::new(PgResultStore::new(pool.clone())),
        Arc::new(PgCompletionNotifier::new(pool.clone())),
    )
    .with_deadline(config.job_deadline)
    .with_result_ttl(config.result_ttl);

    // --- Pool ---
    let queue = Arc::new(PgJobQueue::with_lease(pool, config.lease));
    let worker_pool = WorkerPool::new(queue, Arc::new(executor))
        .with_concurrency(config.concurrency)
        .with_poll_interval(config.poll_interval)
        .with_reap_interval(config.reap_interval);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(worker_pool.run(cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();
    tracing::info!("Waiting for in-flight jobs to finish");
    handle.await?;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
