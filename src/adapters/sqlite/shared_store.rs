//! SQLite implementation of the SharedStore port.
//!
//! All keys live in the `kv_store` table. Blobs are stored as BLOB values,
//! counters as INTEGER values. Every conditional operation is a single
//! statement (or one transaction), so processes sharing the database file
//! observe the same atomicity guarantees as a networked key/value store.
//! Expired rows read as absent and are purged by writes at most once per
//! purge interval.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::DomainResult;
use crate::domain::ports::SharedStore;

const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct SqliteSharedStore {
    pool: SqlitePool,
    purge_interval_ms: i64,
    /// Unix milliseconds at which the next write purges
    next_purge_ms: AtomicI64,
}

impl SqliteSharedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_purge_interval(pool, DEFAULT_PURGE_INTERVAL)
    }

    pub fn with_purge_interval(pool: SqlitePool, purge_interval: Duration) -> Self {
        let purge_interval_ms = i64::try_from(purge_interval.as_millis()).unwrap_or(i64::MAX);
        Self {
            pool,
            purge_interval_ms,
            next_purge_ms: AtomicI64::new(now_ms().saturating_add(purge_interval_ms)),
        }
    }

    /// Purge expired rows if the interval has passed. Only one caller per
    /// interval wins the purge; failures are logged.
    async fn purge_if_due(&self) {
        let now = now_ms();
        let due = self.next_purge_ms.load(Ordering::Relaxed);
        if now < due {
            return;
        }
        let next = now.saturating_add(self.purge_interval_ms);
        if self
            .next_purge_ms
            .compare_exchange(due, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        match self.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "purged expired keys"),
            Err(e) => warn!(error = %e, "failed to purge expired keys"),
        }
    }

    /// Delete rows whose time-to-live has passed.
    pub async fn purge_expired(&self) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expires_at(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms().saturating_add(ttl_ms)
}

const INCREMENT_COUNTER: &str = r#"INSERT INTO kv_store (key, value, expires_at) VALUES (?, 1, NULL)
   ON CONFLICT(key) DO UPDATE SET value = CAST(kv_store.value AS INTEGER) + 1, expires_at = NULL
   RETURNING CAST(value AS INTEGER)"#;

const UPSERT_BLOB: &str = r#"INSERT INTO kv_store (key, value, expires_at) VALUES (?, ?, ?)
   ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at"#;

#[async_trait]
impl SharedStore for SqliteSharedStore {
    async fn get(&self, key: &str) -> DomainResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT CAST(value AS BLOB) FROM kv_store WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> DomainResult<()> {
        self.purge_if_due().await;
        sqlx::query(UPSERT_BLOB)
            .bind(key)
            .bind(value)
            .bind(ttl.map(expires_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> DomainResult<bool> {
        self.purge_if_due().await;
        // The conflict branch only fires for an expired row, which counts as absent.
        let result = sqlx::query(
            r#"INSERT INTO kv_store (key, value, expires_at) VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
               WHERE kv_store.expires_at IS NOT NULL AND kv_store.expires_at <= ?"#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at(ttl))
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> DomainResult<bool> {
        let result = sqlx::query(
            "DELETE FROM kv_store WHERE key = ? AND value = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(expected)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, keys: &[&str]) -> DomainResult<u64> {
        let now = now_ms();
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for key in keys {
            let live: Option<(bool,)> = sqlx::query_as(
                "DELETE FROM kv_store WHERE key = ? RETURNING (expires_at IS NULL OR expires_at > ?)",
            )
            .bind(*key)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
            if matches!(live, Some((true,))) {
                removed += 1;
            }
        }
        tx.commit().await?;
        Ok(removed)
    }

    async fn get_counter(&self, key: &str) -> DomainResult<Option<u64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT CAST(value AS INTEGER) FROM kv_store WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value.max(0).unsigned_abs()))
    }

    async fn commit_versioned(&self, counter_key: &str, key: &str, value: &[u8]) -> DomainResult<u64> {
        let mut tx = self.pool.begin().await?;

        let (version,): (i64,) = sqlx::query_as(INCREMENT_COUNTER)
            .bind(counter_key)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(UPSERT_BLOB)
            .bind(key)
            .bind(value)
            .bind(None::<i64>)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(version.max(0).unsigned_abs())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"SELECT key FROM kv_store
               WHERE substr(key, 1, length(?1)) = ?1 AND (expires_at IS NULL OR expires_at > ?2)
               ORDER BY key"#,
        )
        .bind(prefix)
        .bind(now_ms())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn ping(&self) -> DomainResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
