//! Retention reaper
//!
//! Slow-period sweep deleting aggregates older than each granularity's
//! configured retention. Only the elected node (smallest address in the
//! membership view) deletes, so a shared store sees one deleter at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cluster::ClusterState;
use crate::core::config::RetentionConfig;
use crate::data::{MetricStore, StorageService};
use crate::metrics::{minute_bucket, Granularity, MetricRecord};

pub struct TtlReaper {
    cluster: Arc<ClusterState>,
    store: Arc<StorageService>,
    retention: RetentionConfig,
    period: Duration,
}

/// Oldest bucket to keep for a granularity, as a bucket value at that
/// granularity. Everything strictly below it is reaped.
fn cutoff_bucket(now: DateTime<Utc>, granularity: Granularity, retention: &RetentionConfig) -> i64 {
    let horizon = match granularity {
        Granularity::Minute => now - chrono::Duration::minutes(retention.minute_minutes as i64),
        Granularity::Hour => now - chrono::Duration::hours(retention.hour_hours as i64),
        Granularity::Day => now - chrono::Duration::days(retention.day_days as i64),
        Granularity::Month => now - chrono::Duration::days(retention.month_months as i64 * 30),
    };
    granularity.truncate_minute(minute_bucket(horizon.timestamp_millis()))
}

impl TtlReaper {
    pub fn new(
        cluster: Arc<ClusterState>,
        store: Arc<StorageService>,
        retention: RetentionConfig,
        period: Duration,
    ) -> Self {
        Self {
            cluster,
            store,
            retention,
            period,
        }
    }

    pub fn spawn(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.period);
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("TTL reaper shutting down");
                            break;
                        }
                    }

                    _ = interval.tick() => {
                        if self.cluster.is_leader() {
                            self.sweep_once(Utc::now()).await;
                        } else {
                            debug!("Not the retention leader, skipping sweep");
                        }
                    }
                }
            }
        })
    }

    /// One sweep over every record type and granularity. A failed delete
    /// is logged and the sweep moves on.
    pub async fn sweep_once(&self, now: DateTime<Utc>) {
        let mut deleted: u64 = 0;
        for record_type in MetricRecord::TYPES {
            for granularity in Granularity::ALL {
                let cutoff = cutoff_bucket(now, granularity, &self.retention);
                match self
                    .store
                    .delete_older_than(record_type, granularity, cutoff)
                    .await
                {
                    Ok(count) => deleted += count,
                    Err(err) => {
                        warn!(
                            record_type,
                            granularity = %granularity,
                            error = %err,
                            "Retention delete failed"
                        );
                    }
                }
            }
        }
        debug!(deleted, "Retention sweep complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{NodeAddr, StaticClusterProvider};
    use crate::data::MemoryStore;
    use crate::metrics::TraceAssociationRecord;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff_bucket_per_granularity() {
        let retention = RetentionConfig {
            minute_minutes: 90,
            hour_hours: 36,
            day_days: 45,
            month_months: 18,
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

        assert_eq!(
            cutoff_bucket(now, Granularity::Minute, &retention),
            202403151030
        );
        assert_eq!(cutoff_bucket(now, Granularity::Hour, &retention), 2024031400);
        assert_eq!(cutoff_bucket(now, Granularity::Day, &retention), 20240130);
    }

    async fn reaper_with(nodes: Vec<NodeAddr>, local: NodeAddr) -> (TtlReaper, Arc<StorageService>) {
        let provider = Arc::new(StaticClusterProvider::new(nodes));
        let cluster = Arc::new(ClusterState::init(provider, local).await);
        let store = Arc::new(StorageService::Memory(Arc::new(MemoryStore::new())));
        let retention = RetentionConfig {
            minute_minutes: 90,
            hour_hours: 36,
            day_days: 45,
            month_months: 18,
        };
        let reaper = TtlReaper::new(
            cluster,
            Arc::clone(&store),
            retention,
            Duration::from_secs(300),
        );
        (reaper, store)
    }

    #[tokio::test]
    async fn test_sweep_deletes_expired_minute_records() {
        let local: NodeAddr = "127.0.0.1:11800".parse().unwrap();
        let (reaper, store) = reaper_with(vec![local.clone()], local).await;

        let stale = MetricRecord::TraceAssociation(TraceAssociationRecord {
            time_bucket: 202403150900,
            trace_id: "old".to_string(),
            segments: 1,
            service_id: 1,
        });
        let fresh = MetricRecord::TraceAssociation(TraceAssociationRecord {
            time_bucket: 202403151130,
            trace_id: "new".to_string(),
            segments: 1,
            service_id: 1,
        });
        for r in [&stale, &fresh] {
            store.upsert(r.record_type(), &r.key(), r).await.unwrap();
        }

        let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();
        reaper.sweep_once(now).await;

        assert!(store
            .get(stale.record_type(), &stale.key())
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get(fresh.record_type(), &fresh.key())
            .await
            .unwrap()
            .is_some());
    }
}
