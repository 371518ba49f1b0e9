//! Metric storage layer
//!
//! Provides the persistent side of aggregation:
//! - `memory` - In-memory store (default, embedded)
//! - `sqlite` - Durable store backed by SQLite
//! - `error` - Unified error type for all backends
//!
//! Shard workers hold hot accumulators; the persistence timer flushes them
//! here through the `MetricStore` trait. Both backends implement the same
//! read-merge-write contract, so the timer never cares which one is live.

pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::DataError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::MetricStoreBackend;
use crate::metrics::{Granularity, MetricRecord};

/// Keyed storage of merged metric records.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Fetch one record by (type, key). `None` means the key was never
    /// flushed at this granularity.
    async fn get(&self, record_type: &str, key: &str) -> Result<Option<MetricRecord>, DataError>;

    /// Insert or replace one record. Callers merge before writing; the
    /// store never merges.
    async fn upsert(
        &self,
        record_type: &str,
        key: &str,
        record: &MetricRecord,
    ) -> Result<(), DataError>;

    /// Delete all records of a type and granularity with a time bucket
    /// strictly below the cutoff. Returns how many rows went away.
    async fn delete_older_than(
        &self,
        record_type: &str,
        granularity: Granularity,
        cutoff: i64,
    ) -> Result<u64, DataError>;
}

/// Metric store service enum
///
/// Wraps the underlying backend-specific store. Services are stored as Arc
/// to enable safe extraction.
pub enum StorageService {
    /// In-memory backend (default, embedded)
    Memory(Arc<MemoryStore>),
    /// SQLite backend (durable single-node deployments)
    Sqlite(Arc<SqliteStore>),
}

impl StorageService {
    /// Initialize the store based on configuration.
    pub async fn init(backend: MetricStoreBackend, data_dir: &Path) -> Result<Self, DataError> {
        match backend {
            MetricStoreBackend::Memory => Ok(Self::Memory(Arc::new(MemoryStore::new()))),
            MetricStoreBackend::Sqlite => {
                let store = SqliteStore::init(data_dir).await?;
                Ok(Self::Sqlite(Arc::new(store)))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Sqlite(_) => "sqlite",
        }
    }

    /// Close the backend gracefully. Memory has nothing to release.
    pub async fn close(&self) {
        match self {
            Self::Memory(_) => {}
            Self::Sqlite(s) => s.close().await,
        }
    }
}

#[async_trait]
impl MetricStore for StorageService {
    async fn get(&self, record_type: &str, key: &str) -> Result<Option<MetricRecord>, DataError> {
        match self {
            Self::Memory(s) => s.get(record_type, key).await,
            Self::Sqlite(s) => s.get(record_type, key).await,
        }
    }

    async fn upsert(
        &self,
        record_type: &str,
        key: &str,
        record: &MetricRecord,
    ) -> Result<(), DataError> {
        match self {
            Self::Memory(s) => s.upsert(record_type, key, record).await,
            Self::Sqlite(s) => s.upsert(record_type, key, record).await,
        }
    }

    async fn delete_older_than(
        &self,
        record_type: &str,
        granularity: Granularity,
        cutoff: i64,
    ) -> Result<u64, DataError> {
        match self {
            Self::Memory(s) => s.delete_older_than(record_type, granularity, cutoff).await,
            Self::Sqlite(s) => s.delete_older_than(record_type, granularity, cutoff).await,
        }
    }
}
