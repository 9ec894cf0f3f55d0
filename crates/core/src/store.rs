//! Expiring key-value storage for result records.
//!
//! An absent value means "not finished yet" or "already expired"; the store
//! cannot tell the two apart.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::result::result_key;
use crate::types::ClientId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Result store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write `value` under the client's key, replacing any previous value.
    async fn put(&self, client_id: &ClientId, value: &str, ttl: Duration)
        -> Result<(), StoreError>;

    /// Read the last written value if it has not expired.
    async fn get(&self, client_id: &ClientId) -> Result<Option<String>, StoreError>;

    /// Physically drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    /// Cheap reachability check for health reporting.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local [`ResultStore`].
///
/// Expiry is measured on the tokio clock so paused-time tests can step
/// past the TTL deterministically.
#[derive(Default)]
pub struct MemoryResultStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(
        &self,
        client_id: &ClientId,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .await
            .insert(result_key(client_id), entry);
        Ok(())
    }

    async fn get(&self, client_id: &ClientId) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(&result_key(client_id))
            .filter(|e| now < e.expires_at)
            .map(|e| e.value.clone()))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| now < e.expires_at);
        Ok((before - entries.len()) as u64)
    }
}
