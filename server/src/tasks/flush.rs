//! Persistence timer
//!
//! Drains every shard on a fixed period and read-merge-writes each drained
//! record into the store, then rolls it up hour, day, and month. Workers
//! keep merging new records while the timer writes the drained snapshot, so
//! ingestion never waits on storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cluster::ShardPool;
use crate::core::constants::{FLUSH_WRITE_BASE_DELAY_MS, FLUSH_WRITE_MAX_ATTEMPTS};
use crate::data::{DataError, MetricStore, StorageService};
use crate::metrics::{Granularity, MetricRecord};
use crate::utils::retry::retry_with_backoff_async;

pub struct PersistenceTimer {
    shards: Arc<ShardPool>,
    store: Arc<StorageService>,
    period: Duration,
    consecutive_failures: AtomicU64,
    dropped_records: AtomicU64,
}

impl PersistenceTimer {
    pub fn new(shards: Arc<ShardPool>, store: Arc<StorageService>, period: Duration) -> Self {
        Self {
            shards,
            store,
            period,
            consecutive_failures: AtomicU64::new(0),
            dropped_records: AtomicU64::new(0),
        }
    }

    /// Consecutive write failures since the last successful persist.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Records lost outright: permanently unwritable, or the requeue after
    /// a transient failure failed too.
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records.load(Ordering::Relaxed)
    }

    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Persistence timer shutting down, final flush");
                            self.flush_once().await;
                            break;
                        }
                    }

                    _ = interval.tick() => {
                        self.flush_once().await;
                    }
                }
            }
        })
    }

    /// One flush cycle: drain, persist, roll minute records up. A record
    /// whose write keeps failing goes back into its shard so the next cycle
    /// retries it; requeued rollup rows re-arrive as hour/day/month records
    /// and skip further rollup.
    pub async fn flush_once(&self) {
        let drained = match self.shards.drain_all().await {
            Ok(drained) => drained,
            Err(err) => {
                warn!(error = %err, "Shard drain failed, skipping flush cycle");
                return;
            }
        };
        if drained.is_empty() {
            return;
        }

        let mut persisted = 0usize;
        for record in drained {
            let is_minute = record.granularity() == Granularity::Minute;
            match self.persist(&record).await {
                Ok(()) => {
                    persisted += 1;
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    if is_minute {
                        self.rollup(&record).await;
                    }
                }
                Err(err) => {
                    let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if err.is_transient() {
                        warn!(
                            key = record.key(),
                            error = %err,
                            consecutive_failures = failures,
                            "Flush write failed, requeueing record"
                        );
                        self.requeue(record).await;
                    } else {
                        // A permanent error never clears; requeueing would
                        // pin the record in its shard.
                        self.dropped_records.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            key = record.key(),
                            error = %err,
                            "Flush write failed permanently, dropping record"
                        );
                    }
                }
            }
        }
        debug!(persisted, "Flush cycle complete");
    }

    /// Read-merge-write one record under its own key, with bounded retry.
    async fn persist(&self, record: &MetricRecord) -> Result<(), DataError> {
        retry_with_backoff_async(FLUSH_WRITE_MAX_ATTEMPTS, FLUSH_WRITE_BASE_DELAY_MS, || {
            write_merged(self.store.as_ref(), record)
        })
        .await
        .map(|_| ())
        .map_err(|(err, _)| err)
    }

    async fn rollup(&self, record: &MetricRecord) {
        for granularity in [Granularity::Hour, Granularity::Day, Granularity::Month] {
            let rolled = record.rollup(granularity);
            if let Err(err) = self.persist(&rolled).await {
                if err.is_transient() {
                    warn!(
                        key = rolled.key(),
                        granularity = %granularity,
                        error = %err,
                        "Rollup write failed, requeueing record"
                    );
                    self.requeue(rolled).await;
                } else {
                    self.dropped_records.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        key = rolled.key(),
                        granularity = %granularity,
                        error = %err,
                        "Rollup write failed permanently, dropping record"
                    );
                }
            }
        }
    }

    async fn requeue(&self, record: MetricRecord) {
        if let Err(err) = self.shards.merge(record).await {
            self.dropped_records.fetch_add(1, Ordering::Relaxed);
            warn!(error = %err, "Requeue failed, record lost");
        }
    }
}

async fn write_merged(store: &StorageService, record: &MetricRecord) -> Result<(), DataError> {
    let record_type = record.record_type();
    let key = record.key();
    let merged = match store.get(record_type, &key).await? {
        Some(mut existing) => match existing.merge(record) {
            Ok(()) => existing,
            Err(err) => {
                // Same key, different shape. The stored row is stale or
                // corrupt; the incoming record wins.
                warn!(key, error = %err, "Stored record unmergeable, overwriting");
                record.clone()
            }
        },
        None => record.clone(),
    };
    store.upsert(record_type, &key, &merged).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MemoryStore, SqliteStore};
    use crate::metrics::EndpointRecord;

    fn record(calls: i64) -> MetricRecord {
        MetricRecord::Endpoint(EndpointRecord {
            time_bucket: 202401011234,
            service_id: 1,
            endpoint: "/api/orders".to_string(),
            calls,
            errors: 0,
            duration_sum: calls * 100,
            duration_max: 100,
            duration_min: 100,
        })
    }

    fn timer() -> (
        PersistenceTimer,
        Arc<StorageService>,
        Arc<ShardPool>,
        watch::Sender<bool>,
    ) {
        let store = Arc::new(StorageService::Memory(Arc::new(MemoryStore::new())));
        let (timer, shards, shutdown_tx) = timer_with(Arc::clone(&store));
        (timer, store, shards, shutdown_tx)
    }

    fn timer_with(
        store: Arc<StorageService>,
    ) -> (PersistenceTimer, Arc<ShardPool>, watch::Sender<bool>) {
        let (shutdown_tx, rx) = watch::channel(false);
        let (pool, _handles) = ShardPool::start(2, 64, rx);
        let shards = Arc::new(pool);
        let timer = PersistenceTimer::new(
            Arc::clone(&shards),
            Arc::clone(&store),
            Duration::from_secs(3),
        );
        (timer, shards, shutdown_tx)
    }

    fn endpoint_calls(record: &MetricRecord) -> i64 {
        match record {
            MetricRecord::Endpoint(e) => e.calls,
            _ => panic!("expected endpoint record"),
        }
    }

    #[tokio::test]
    async fn test_flush_persists_minute_and_rollups() {
        let (timer, store, shards, _shutdown_tx) = timer();
        shards.merge(record(2)).await.unwrap();
        shards.merge(record(3)).await.unwrap();

        timer.flush_once().await;
        assert_eq!(timer.consecutive_failures(), 0);
        assert_eq!(timer.dropped_records(), 0);

        let minute = store
            .get("endpoint", &record(0).key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint_calls(&minute), 5);

        let hourly_key = record(0).rollup(Granularity::Hour).key();
        let hourly = store.get("endpoint", &hourly_key).await.unwrap().unwrap();
        assert_eq!(endpoint_calls(&hourly), 5);
        assert_eq!(hourly.time_bucket(), 2024010112);
    }

    #[tokio::test]
    async fn test_second_flush_merges_into_stored_totals() {
        let (timer, store, shards, _shutdown_tx) = timer();

        shards.merge(record(2)).await.unwrap();
        timer.flush_once().await;

        shards.merge(record(4)).await.unwrap();
        timer.flush_once().await;

        let minute = store
            .get("endpoint", &record(0).key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint_calls(&minute), 6);

        let monthly_key = record(0).rollup(Granularity::Month).key();
        let monthly = store.get("endpoint", &monthly_key).await.unwrap().unwrap();
        assert_eq!(endpoint_calls(&monthly), 6);
        assert_eq!(monthly.time_bucket(), 202401);
    }

    #[tokio::test]
    async fn test_empty_drain_writes_nothing() {
        let (timer, store, _shards, _shutdown_tx) = timer();
        timer.flush_once().await;
        assert!(store
            .get("endpoint", &record(0).key())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_drained_hour_record_is_not_rolled_up_again() {
        let (timer, store, shards, _shutdown_tx) = timer();
        // A requeued rollup row arrives at hour granularity.
        let hourly = record(3).rollup(Granularity::Hour);
        shards.merge(hourly.clone()).await.unwrap();

        timer.flush_once().await;

        let stored = store
            .get("endpoint", &hourly.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(endpoint_calls(&stored), 3);
        // Rolling an hour bucket through the minute truncation would land
        // on these keys; none may exist.
        for granularity in [Granularity::Hour, Granularity::Day, Granularity::Month] {
            let key = hourly.rollup(granularity).key();
            if key != hourly.key() {
                assert!(store.get("endpoint", &key).await.unwrap().is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_failed_write_requeues_into_shards() {
        // A closed pool makes every write fail.
        let dir = tempfile::tempdir().unwrap();
        let sqlite = SqliteStore::init(dir.path()).await.unwrap();
        sqlite.close().await;
        let store = Arc::new(StorageService::Sqlite(Arc::new(sqlite)));

        let (timer, shards, _shutdown_tx) = timer_with(store);
        shards.merge(record(2)).await.unwrap();

        timer.flush_once().await;
        assert_eq!(timer.consecutive_failures(), 1);
        assert_eq!(timer.dropped_records(), 0);

        let requeued = shards.drain_all().await.unwrap();
        assert_eq!(requeued.len(), 1);
        assert_eq!(endpoint_calls(&requeued[0]), 2);
    }
}
