//! Repository for the `generation_results` table.
//!
//! Rows are keyed by the full `result:<client id>` string. Expired rows are
//! invisible to reads immediately and physically removed by
//! [`ResultRepo::delete_expired`].

use std::time::Duration;

use sqlx::PgPool;

pub struct ResultRepo;

impl ResultRepo {
    /// Insert or replace a record, restarting its TTL.
    pub async fn upsert(
        pool: &PgPool,
        key: &str,
        payload: &str,
        ttl: Duration,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO generation_results (key, payload, expires_at) \
             VALUES ($1, $2, NOW() + make_interval(secs => $3::float8 / 1000)) \
             ON CONFLICT (key) DO UPDATE \
             SET payload = EXCLUDED.payload, \
                 expires_at = EXCLUDED.expires_at, \
                 written_at = NOW()",
        )
        .bind(key)
        .bind(payload)
        .bind(ttl.as_millis() as i64)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fetch a record that has not yet expired.
    pub async fn find_live(pool: &PgPool, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT payload FROM generation_results WHERE key = $1 AND expires_at > NOW()",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    /// Delete expired rows. Returns the number removed.
    pub async fn delete_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM generation_results WHERE expires_at <= NOW()")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
