//! In-memory metric store
//!
//! Default backend for single-node and test deployments. Records live in a
//! concurrent map keyed by (record type, record key) and vanish on restart.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::metrics::{Granularity, MetricRecord};

use super::error::DataError;
use super::MetricStore;

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<(String, String), MetricRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn get(&self, record_type: &str, key: &str) -> Result<Option<MetricRecord>, DataError> {
        Ok(self
            .records
            .get(&(record_type.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn upsert(
        &self,
        record_type: &str,
        key: &str,
        record: &MetricRecord,
    ) -> Result<(), DataError> {
        self.records
            .insert((record_type.to_string(), key.to_string()), record.clone());
        Ok(())
    }

    async fn delete_older_than(
        &self,
        record_type: &str,
        granularity: Granularity,
        cutoff: i64,
    ) -> Result<u64, DataError> {
        let before = self.records.len();
        self.records.retain(|(rtype, _), record| {
            rtype != record_type
                || Granularity::of_bucket(record.time_bucket()) != granularity
                || record.time_bucket() >= cutoff
        });
        Ok((before - self.records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::TraceAssociationRecord;

    fn record(trace_id: &str, bucket: i64) -> MetricRecord {
        MetricRecord::TraceAssociation(TraceAssociationRecord {
            time_bucket: bucket,
            trace_id: trace_id.to_string(),
            segments: 1,
            service_id: 1,
        })
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = MemoryStore::new();
        let r = record("t1", 202401011234);
        store
            .upsert(r.record_type(), &r.key(), &r)
            .await
            .unwrap();

        let loaded = store.get(r.record_type(), &r.key()).await.unwrap();
        assert_eq!(loaded, Some(r));
        assert!(store
            .get("trace_association", "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_older_than_respects_granularity() {
        let store = MemoryStore::new();
        let old_minute = record("t1", 202401011234);
        let new_minute = record("t2", 202401021234);
        let old_hour = old_minute.rollup(Granularity::Hour);
        for r in [&old_minute, &new_minute, &old_hour] {
            store.upsert(r.record_type(), &r.key(), r).await.unwrap();
        }

        let deleted = store
            .delete_older_than("trace_association", Granularity::Minute, 202401020000)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.len(), 2);
        assert!(store
            .get(old_hour.record_type(), &old_hour.key())
            .await
            .unwrap()
            .is_some());
    }
}
