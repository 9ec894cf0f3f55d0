//! [`ResultStore`] backed by the `generation_results` table.

use std::time::Duration;

use async_trait::async_trait;
use imgq_core::result::result_key;
use imgq_core::store::{ResultStore, StoreError};
use imgq_core::types::ClientId;

use crate::repositories::ResultRepo;
use crate::DbPool;

pub struct PgResultStore {
    pool: DbPool,
}

impl PgResultStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn put(
        &self,
        client_id: &ClientId,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        ResultRepo::upsert(&self.pool, &result_key(client_id), value, ttl)
            .await
            .map_err(StoreError::backend)
    }

    async fn get(&self, client_id: &ClientId) -> Result<Option<String>, StoreError> {
        ResultRepo::find_live(&self.pool, &result_key(client_id))
            .await
            .map_err(StoreError::backend)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        ResultRepo::delete_expired(&self.pool)
            .await
            .map_err(StoreError::backend)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool)
            .await
            .map_err(StoreError::backend)
    }
}
