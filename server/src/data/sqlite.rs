//! SQLite metric store
//!
//! Durable backend for single-node deployments that need aggregates to
//! survive a restart. Records are stored as JSON payloads keyed by
//! (record type, record key); the granularity and time bucket columns
//! exist so retention sweeps stay a single indexed DELETE.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Row};
use tracing::log::LevelFilter;

use crate::core::constants::{
    SQLITE_BUSY_TIMEOUT_SECS, SQLITE_CACHE_SIZE, SQLITE_DB_FILENAME, SQLITE_MAX_CONNECTIONS,
    SQLITE_WAL_AUTOCHECKPOINT,
};
use crate::metrics::{Granularity, MetricRecord};

use super::error::DataError;
use super::MetricStore;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the metrics database under `data_dir`.
    pub async fn init(data_dir: &Path) -> Result<Self, DataError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(SQLITE_DB_FILENAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS))
            .pragma("cache_size", SQLITE_CACHE_SIZE)
            .pragma("temp_store", "MEMORY")
            .pragma("wal_autocheckpoint", SQLITE_WAL_AUTOCHECKPOINT)
            .log_statements(LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(DataError::from_sqlite)?;

        init_schema(&pool).await?;

        tracing::debug!(path = %db_path.display(), "SqliteStore initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("SQLite pool closed");
    }
}

async fn init_schema(pool: &SqlitePool) -> Result<(), DataError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS metrics (
            record_type TEXT NOT NULL,
            key TEXT NOT NULL,
            granularity TEXT NOT NULL,
            time_bucket INTEGER NOT NULL,
            payload TEXT NOT NULL,
            PRIMARY KEY (record_type, key)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(DataError::from_sqlite)?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_metrics_retention
        ON metrics (record_type, granularity, time_bucket)
        "#,
    )
    .execute(pool)
    .await
    .map_err(DataError::from_sqlite)?;

    Ok(())
}

#[async_trait]
impl MetricStore for SqliteStore {
    async fn get(&self, record_type: &str, key: &str) -> Result<Option<MetricRecord>, DataError> {
        let row = sqlx::query("SELECT payload FROM metrics WHERE record_type = ? AND key = ?")
            .bind(record_type)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::from_sqlite)?;

        match row {
            Some(row) => {
                let payload: String = row.get("payload");
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert(
        &self,
        record_type: &str,
        key: &str,
        record: &MetricRecord,
    ) -> Result<(), DataError> {
        let payload = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO metrics (record_type, key, granularity, time_bucket, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (record_type, key) DO UPDATE SET
                granularity = excluded.granularity,
                time_bucket = excluded.time_bucket,
                payload = excluded.payload
            "#,
        )
        .bind(record_type)
        .bind(key)
        .bind(record.granularity().as_str())
        .bind(record.time_bucket())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(DataError::from_sqlite)?;
        Ok(())
    }

    async fn delete_older_than(
        &self,
        record_type: &str,
        granularity: Granularity,
        cutoff: i64,
    ) -> Result<u64, DataError> {
        let result = sqlx::query(
            "DELETE FROM metrics WHERE record_type = ? AND granularity = ? AND time_bucket < ?",
        )
        .bind(record_type)
        .bind(granularity.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DataError::from_sqlite)?;
        Ok(result.rows_affected())
    }
}
