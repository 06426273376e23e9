//! SQLite counter store.
//!
//! One table of `(key, hit_at)` rows, `hit_at` in unix milliseconds. Every
//! check runs prune, count and insert inside one transaction, so processes
//! sharing the database file share the same counters.

use crate::store::{CounterStore, StoreError, WindowSnapshot, window_start};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub struct SqliteCounterStore {
    pool: SqlitePool,
}

impl SqliteCounterStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite counter store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limit_hits (
                key     TEXT NOT NULL,
                hit_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("rate_limit_hits table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_rate_limit_hits_key_time ON rate_limit_hits(key, hit_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("rate_limit_hits index: {e}")))?;

        Ok(())
    }
}

fn query_err(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn hit(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<WindowSnapshot, StoreError> {
        let now_ms = now.timestamp_millis();
        let cutoff_ms = window_start(now, window).timestamp_millis();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        sqlx::query("DELETE FROM rate_limit_hits WHERE key = ?1 AND hit_at <= ?2")
            .bind(key)
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        let (count, oldest_ms): (i64, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), MIN(hit_at) FROM rate_limit_hits WHERE key = ?1")
                .bind(key)
                .fetch_one(&mut *tx)
                .await
                .map_err(query_err)?;

        let admitted = count < i64::from(limit);
        let (count, oldest_ms) = if admitted {
            sqlx::query("INSERT INTO rate_limit_hits (key, hit_at) VALUES (?1, ?2)")
                .bind(key)
                .bind(now_ms)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            (count + 1, Some(oldest_ms.unwrap_or(now_ms)))
        } else {
            (count, oldest_ms)
        };

        tx.commit().await.map_err(query_err)?;

        Ok(WindowSnapshot {
            admitted,
            count: u32::try_from(count).unwrap_or(u32::MAX),
            oldest: oldest_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
        })
    }

    async fn purge(&self, now: DateTime<Utc>, max_window: Duration) -> Result<u64, StoreError> {
        let cutoff_ms = window_start(now, max_window).timestamp_millis();
        let result = sqlx::query("DELETE FROM rate_limit_hits WHERE hit_at <= ?1")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await
            .map_err(query_err)?;
        Ok(result.rows_affected())
    }
}
