//! Upstream response cache
//!
//! Key → JSON rows with an explicit expiry. Expired rows are invisible to
//! reads and removed by `purge_expired`.

use chrono::{Duration, SecondsFormat, Utc};
use finlens_common::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::utils::retry_on_lock;

#[derive(Clone)]
pub struct ResponseCache {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ResponseCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: 5000,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    /// Unexpired value for `key`
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM response_cache WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(now_text())
                .fetch_optional(&self.pool)
                .await?;

        raw.map(|text| {
            serde_json::from_str(&text)
                .map_err(|e| Error::Internal(format!("Corrupt cache entry {}: {}", key, e)))
        })
        .transpose()
    }

    /// Store `value` under `key` for `ttl`, replacing any previous entry
    pub async fn put(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|e| Error::Internal(format!("Failed to serialize cache entry: {}", e)))?;
        let now = Utc::now();
        let created_at = now.to_rfc3339_opts(SecondsFormat::Micros, true);
        let expires_at = (now + ttl).to_rfc3339_opts(SecondsFormat::Micros, true);

        retry_on_lock("cache_put", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO response_cache (key, value, created_at, expires_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at
                "#,
            )
            .bind(key)
            .bind(&text)
            .bind(&created_at)
            .bind(&expires_at)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        debug!(key, ttl_secs = ttl.num_seconds(), "Cached response");
        Ok(())
    }

    /// Unexpired value for `key`, or `default` stored and returned
    pub async fn get_or_create(&self, key: &str, ttl: Duration, default: Value) -> Result<Value> {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }
        self.put(key, &default, ttl).await?;
        Ok(default)
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        let now = now_text();
        let result = retry_on_lock("cache_purge", self.max_lock_wait_ms, || async {
            sqlx::query("DELETE FROM response_cache WHERE expires_at <= ?")
                .bind(&now)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)
        })
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "Purged expired cache entries");
        }
        Ok(purged)
    }
}
