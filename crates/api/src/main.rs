use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use imgq_api::background::result_retention;
use imgq_api::config::{Backend, ServerConfig};
use imgq_api::notifications::Notifier;
use imgq_api::router::build_app_router;
use imgq_api::state::AppState;
use imgq_core::config::ConfigError;
use imgq_core::queue::{JobQueue, MemoryJobQueue};
use imgq_core::store::{MemoryResultStore, ResultStore};
use imgq_db::{PgJobQueue, PgResultStore};
use imgq_events::CompletionBus;
use imgq_fal::{FalClient, FalConfig};
use imgq_worker::shutdown::shutdown_signal;
use imgq_worker::telemetry::init_tracing;
use imgq_worker::{GenerationExecutor, WorkerConfig, WorkerPool};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing("imgq_api=debug,imgq_worker=debug,tower_http=debug");

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        backend = config.backend.as_str(),
        "Loaded server configuration",
    );

    let cancel = CancellationToken::new();
    let bus = Arc::new(CompletionBus::default());
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    // --- Queue and result store ---
    let (queue, results): (Arc<dyn JobQueue>, Arc<dyn ResultStore>) = match config.backend {
        Backend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or(ConfigError::Missing { key: "DATABASE_URL" })?;

            let pool = imgq_db::create_pool(database_url).await?;
            tracing::info!("Database connection pool created");
            imgq_db::health_check(&pool).await?;
            imgq_db::run_migrations(&pool).await?;
            tracing::info!("Database migrations applied");

            // Workers run out of process; their completions arrive via NOTIFY.
            let listener_pool = pool.clone();
            let listener_bus = Arc::clone(&bus);
            let listener_cancel = cancel.clone();
            background.push(tokio::spawn(async move {
                if let Err(e) =
                    imgq_db::forward_completions(listener_pool, listener_bus, listener_cancel)
                        .await
                {
                    tracing::error!(error = %e, "Completion listener failed, push relies on polling");
                }
            }));

            let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool.clone()));
            let results: Arc<dyn ResultStore> = Arc::new(PgResultStore::new(pool));
            (queue, results)
        }
        Backend::Memory => {
            let queue = Arc::new(MemoryJobQueue::new());
            let results = Arc::new(MemoryResultStore::new());

            if config.inprocess_workers > 0 {
                let worker_config = WorkerConfig::from_env()?;
                let generator = Arc::new(FalClient::new(FalConfig::from_env()?)?);
                let executor = GenerationExecutor::new(generator, results.clone(), bus.clone())
                    .with_deadline(worker_config.job_deadline)
                    .with_result_ttl(config.result_ttl);
                let pool = WorkerPool::new(queue.clone(), Arc::new(executor))
                    .with_concurrency(config.inprocess_workers)
                    .with_poll_interval(worker_config.poll_interval);
                background.push(tokio::spawn(pool.run(cancel.clone())));
            } else {
                tracing::warn!("Memory backend without in-process workers: jobs will never run");
            }

            let queue: Arc<dyn JobQueue> = queue;
            let results: Arc<dyn ResultStore> = results;
            (queue, results)
        }
    };

    // --- Notifier ---
    let (notifier, notifier_task) = Notifier::spawn(
        Arc::clone(&results),
        bus.subscribe(),
        config.notifier.clone(),
        cancel.clone(),
    );

    // --- Retention ---
    background.push(tokio::spawn(result_retention::run(
        Arc::clone(&results),
        config.retention_interval,
        cancel.clone(),
    )));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        queue,
        results,
        notifier,
    };

    // --- Router ---
    let app = build_app_router(state, &config)?;

    // --- Start server ---
    let addr = SocketAddr::new(config.host.parse::<IpAddr>()?, config.port);
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Closes live channels so upgraded sockets do not hold the server open.
            shutdown_cancel.cancel();
        })
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();

    let deadline = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(deadline, notifier_task).await.is_err() {
        tracing::warn!("Notifier did not stop in time");
    }
    for handle in background {
        if tokio::time::timeout(deadline, handle).await.is_err() {
            tracing::warn!("Background task did not stop in time");
        }
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}
