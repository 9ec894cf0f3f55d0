//! Periodic cleanup of expired result records.
//!
//! Expired records are already unreadable; this only reclaims their
//! storage. Runs on a fixed interval using `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use imgq_core::store::ResultStore;
use tokio_util::sync::CancellationToken;

/// Run the result retention loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn ResultStore>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Result retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Result retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match store.purge_expired().await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Result retention: purged expired records");
                        } else {
                            tracing::debug!("Result retention: nothing to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Result retention: cleanup failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use imgq_core::store::MemoryResultStore;
    use imgq_core::types::ClientId;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn purges_expired_records_each_tick() {
        let store = Arc::new(MemoryResultStore::new());
        store
            .put(&ClientId::from("short"), "x", Duration::from_secs(10))
            .await
            .unwrap();
        store
            .put(&ClientId::from("long"), "y", Duration::from_secs(3600))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(store.clone(), Duration::from_secs(60), cancel.clone()));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len().await, 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
