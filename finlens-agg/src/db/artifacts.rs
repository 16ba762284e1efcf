//! Bounded capacity artifact store
//!
//! Saved reports and predictions are kept per `(owner, kind)` with a hard cap.
//! A save is one SQLite transaction run under a per-owner advisory lock:
//!
//! 1. a row for the same `(owner, kind, symbol)` is updated in place;
//! 2. otherwise the oldest rows (by `created_at`) are evicted until one slot
//!    is free, then the new row is inserted.
//!
//! Any failure rolls the whole transaction back.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use finlens_common::events::{EventBus, FinlensEvent};
use finlens_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::utils::retry_on_lock;

/// Default per-owner, per-kind row limit
pub const DEFAULT_CAPACITY: usize = 20;

/// Default lifetime of a saved artifact
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Report,
    Prediction,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Report => "report",
            ArtifactKind::Prediction => "prediction",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "report" | "reports" => Ok(ArtifactKind::Report),
            "prediction" | "predictions" => Ok(ArtifactKind::Prediction),
            other => Err(Error::InvalidInput(format!("Unknown artifact kind: {}", other))),
        }
    }
}

/// One persisted artifact
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedArtifact {
    pub artifact_id: Uuid,
    pub owner_id: String,
    pub kind: ArtifactKind,
    pub symbol: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a save
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveOutcome {
    pub artifact_id: Uuid,
    /// True when an existing row for the same symbol was updated in place
    pub updated: bool,
    /// Rows removed to make room, oldest first
    pub evicted: Vec<Uuid>,
}

type OwnerKey = (String, ArtifactKind);

#[derive(Clone)]
pub struct ArtifactStore {
    pool: SqlitePool,
    capacity: usize,
    retention: Duration,
    max_lock_wait_ms: u64,
    owner_locks: Arc<Mutex<HashMap<OwnerKey, Arc<tokio::sync::Mutex<()>>>>>,
    events: Option<EventBus>,
}

fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Internal(format!("Invalid artifact id {}: {}", raw, e)))
}

fn row_to_artifact(row: &SqliteRow) -> Result<SavedArtifact> {
    let artifact_id: String = row.get("artifact_id");
    let kind: String = row.get("kind");
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    let expires_at: String = row.get("expires_at");

    Ok(SavedArtifact {
        artifact_id: parse_id(&artifact_id)?,
        owner_id: row.get("owner_id"),
        kind: kind.parse()?,
        symbol: row.get("symbol"),
        payload: serde_json::from_str(&payload)
            .map_err(|e| Error::Internal(format!("Failed to deserialize payload: {}", e)))?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        expires_at: parse_timestamp("expires_at", &expires_at)?,
    })
}

impl ArtifactStore {
    /// `capacity` is clamped to at least one row
    pub fn new(pool: SqlitePool, capacity: usize, retention_days: i64) -> Self {
        Self {
            pool,
            capacity: capacity.max(1),
            retention: Duration::days(retention_days.max(1)),
            max_lock_wait_ms: 5000,
            owner_locks: Arc::new(Mutex::new(HashMap::new())),
            events: None,
        }
    }

    pub fn with_max_lock_wait_ms(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn owner_lock(&self, key: &OwnerKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .owner_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other save holds or waits on it
    fn release_owner_lock(&self, key: &OwnerKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .owner_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if locks.get(key).is_some_and(|entry| Arc::strong_count(entry) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn owner_lock_count(&self) -> usize {
        self.owner_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Insert or update the artifact for `(owner_id, kind, symbol)`
    ///
    /// Returns the artifact id (unchanged on update) and any evicted ids.
    pub async fn save(
        &self,
        owner_id: &str,
        kind: ArtifactKind,
        symbol: &str,
        payload: &Value,
    ) -> Result<SaveOutcome> {
        if owner_id.trim().is_empty() {
            return Err(Error::InvalidInput("owner_id must not be empty".to_string()));
        }
        if symbol.trim().is_empty() {
            return Err(Error::InvalidInput("symbol must not be empty".to_string()));
        }

        let payload_text = serde_json::to_string(payload)
            .map_err(|e| Error::Internal(format!("Failed to serialize payload: {}", e)))?;

        let key = (owner_id.to_string(), kind);
        let lock = self.owner_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            retry_on_lock("save_artifact", self.max_lock_wait_ms, || {
                self.save_in_transaction(owner_id, kind, symbol, &payload_text)
            })
            .await
        };
        self.release_owner_lock(&key, lock);
        let outcome = result?;

        info!(
            owner_id,
            kind = %kind,
            symbol,
            artifact_id = %outcome.artifact_id,
            updated = outcome.updated,
            evicted = outcome.evicted.len(),
            "Artifact saved"
        );

        if let Some(events) = &self.events {
            events.emit_lossy(FinlensEvent::ArtifactSaved {
                owner_id: owner_id.to_string(),
                kind: kind.to_string(),
                symbol: symbol.to_string(),
                artifact_id: outcome.artifact_id,
                evicted: outcome.evicted.len() as u64,
                timestamp: Utc::now(),
            });
        }

        Ok(outcome)
    }

    async fn save_in_transaction(
        &self,
        owner_id: &str,
        kind: ArtifactKind,
        symbol: &str,
        payload: &str,
    ) -> Result<SaveOutcome> {
        let now = Utc::now();
        let now_text = timestamp(now);
        let expires_text = timestamp(now + self.retention);

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT artifact_id FROM saved_artifacts WHERE owner_id = ? AND kind = ? AND symbol = ?",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(symbol)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing_id) = existing {
            sqlx::query(
                "UPDATE saved_artifacts SET payload = ?, updated_at = ?, expires_at = ? WHERE artifact_id = ?",
            )
            .bind(payload)
            .bind(&now_text)
            .bind(&expires_text)
            .bind(&existing_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            return Ok(SaveOutcome {
                artifact_id: parse_id(&existing_id)?,
                updated: true,
                evicted: Vec::new(),
            });
        }

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM saved_artifacts WHERE owner_id = ? AND kind = ?",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let capacity = self.capacity as i64;
        let mut evicted = Vec::new();

        if count >= capacity {
            let excess = count - capacity + 1;
            let oldest: Vec<String> = sqlx::query_scalar(
                r#"
                SELECT artifact_id FROM saved_artifacts
                WHERE owner_id = ? AND kind = ?
                ORDER BY created_at ASC, rowid ASC
                LIMIT ?
                "#,
            )
            .bind(owner_id)
            .bind(kind.as_str())
            .bind(excess)
            .fetch_all(&mut *tx)
            .await?;

            for id in &oldest {
                sqlx::query("DELETE FROM saved_artifacts WHERE artifact_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                evicted.push(parse_id(id)?);
            }

            debug!(owner_id, kind = %kind, count, evicted = evicted.len(), "Evicted oldest artifacts");
        }

        let artifact_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO saved_artifacts (
                artifact_id, owner_id, kind, symbol, payload,
                created_at, updated_at, expires_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(artifact_id.to_string())
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(symbol)
        .bind(payload)
        .bind(&now_text)
        .bind(&now_text)
        .bind(&expires_text)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SaveOutcome {
            artifact_id,
            updated: false,
            evicted,
        })
    }

    /// Remove an artifact; false if it did not exist
    pub async fn delete(&self, artifact_id: Uuid) -> Result<bool> {
        let id = artifact_id.to_string();
        let result = retry_on_lock("delete_artifact", self.max_lock_wait_ms, || async {
            sqlx::query("DELETE FROM saved_artifacts WHERE artifact_id = ?")
                .bind(&id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)
        })
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(artifact_id = %artifact_id, "Artifact deleted");
            if let Some(events) = &self.events {
                events.emit_lossy(FinlensEvent::ArtifactDeleted {
                    artifact_id,
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(deleted)
    }

    pub async fn get(&self, artifact_id: Uuid) -> Result<Option<SavedArtifact>> {
        let row = sqlx::query(
            r#"
            SELECT artifact_id, owner_id, kind, symbol, payload, created_at, updated_at, expires_at
            FROM saved_artifacts
            WHERE artifact_id = ?
            "#,
        )
        .bind(artifact_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_artifact).transpose()
    }

    /// Artifacts of one owner and kind, newest first by `created_at`
    pub async fn list(&self, owner_id: &str, kind: ArtifactKind) -> Result<Vec<SavedArtifact>> {
        let rows = sqlx::query(
            r#"
            SELECT artifact_id, owner_id, kind, symbol, payload, created_at, updated_at, expires_at
            FROM saved_artifacts
            WHERE owner_id = ? AND kind = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_artifact).collect()
    }

    pub async fn count(&self, owner_id: &str, kind: ArtifactKind) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM saved_artifacts WHERE owner_id = ? AND kind = ?",
        )
        .bind(owner_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Delete every artifact whose `expires_at` has passed
    pub async fn purge_expired(&self) -> Result<u64> {
        let now_text = timestamp(Utc::now());
        let result = retry_on_lock("purge_expired_artifacts", self.max_lock_wait_ms, || async {
            sqlx::query("DELETE FROM saved_artifacts WHERE expires_at <= ?")
                .bind(&now_text)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)
        })
        .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "Purged expired artifacts");
        }
        Ok(purged)
    }
}
