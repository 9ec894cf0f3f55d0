//! In-process completion bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`CompletionBus`] is the fan-out hub for [`ResultReady`] events. It is
//! designed to be shared via `Arc<CompletionBus>` across the application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imgq_core::types::ClientId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// ResultReady
// ---------------------------------------------------------------------------

/// A result record was written for `client_id`.
///
/// The event carries no payload: consumers read the record from the result
/// store so that what they see is exactly what a pull would return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultReady {
    pub client_id: ClientId,
    pub timestamp: DateTime<Utc>,
}

impl ResultReady {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// CompletionSink
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Completion event could not be published: {0}")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl EventError {
    pub fn publish(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Publish(Box::new(err))
    }
}

/// Where workers announce finished jobs.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn publish(&self, event: ResultReady) -> Result<(), EventError>;
}

// ---------------------------------------------------------------------------
// CompletionBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for completion events.
///
/// When the buffer is full, the oldest un-consumed events are dropped and
/// slow receivers observe `RecvError::Lagged`. Consumers must therefore
/// treat the bus as a latency optimisation, not the only signal.
pub struct CompletionBus {
    sender: broadcast::Sender<ResultReady>,
}

impl CompletionBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when nobody listens.
    pub fn send(&self, event: ResultReady) {
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::trace!(delivered, "Completion event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResultReady> {
        self.sender.subscribe()
    }
}

impl Default for CompletionBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl CompletionSink for CompletionBus {
    async fn publish(&self, event: ResultReady) -> Result<(), EventError> {
        self.send(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
