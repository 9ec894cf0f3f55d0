//! Cross-process completion signalling over PostgreSQL `NOTIFY`.
//!
//! Workers call [`PgCompletionNotifier::publish`] after writing a result;
//! the API process runs [`forward_completions`] to `LISTEN` on the same
//! channel and republish each notification on its in-process
//! [`CompletionBus`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imgq_core::types::ClientId;
use imgq_events::{CompletionBus, CompletionSink, EventError, ResultReady};
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

use crate::DbPool;

/// Notification channel name. The payload is the bare client id.
pub const RESULT_READY_CHANNEL: &str = "imgq_result_ready";

/// Pause after a listener error before receiving again.
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct PgCompletionNotifier {
    pool: DbPool,
}

impl PgCompletionNotifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CompletionSink for PgCompletionNotifier {
    async fn publish(&self, event: ResultReady) -> Result<(), EventError> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(RESULT_READY_CHANNEL)
            .bind(event.client_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(EventError::publish)?;
        Ok(())
    }
}

/// Relay `NOTIFY` payloads onto `bus` until `cancel` fires.
///
/// Fails only if the initial `LISTEN` cannot be established; later
/// connection drops are logged and the listener reconnects on its next
/// receive.
pub async fn forward_completions(
    pool: DbPool,
    bus: Arc<CompletionBus>,
    cancel: CancellationToken,
) -> Result<(), sqlx::Error> {
    let mut listener = PgListener::connect_with(&pool).await?;
    listener.listen(RESULT_READY_CHANNEL).await?;
    tracing::info!(channel = RESULT_READY_CHANNEL, "Listening for completion notifications");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Completion listener shutting down");
                return Ok(());
            }
            received = listener.recv() => match received {
                Ok(notification) => {
                    let client_id = ClientId::from(notification.payload());
                    tracing::debug!(client_id = %client_id, "Completion notification received");
                    bus.send(ResultReady::new(client_id));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Completion listener error, retrying");
                    tokio::time::sleep(LISTEN_RETRY_DELAY).await;
                }
            }
        }
    }
}
