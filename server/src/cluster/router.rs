//! Routing of metric records to their owning node
//!
//! Every record key has exactly one owner under the current membership view.
//! Locally owned records go straight into the shard workers; remote records
//! are forwarded over HTTP. A failed forward refreshes the view once and
//! reroutes, so a node leaving between samples costs one extra round trip.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::metrics::MetricRecord;

use super::forward::Forwarder;
use super::membership::{ClusterState, MembershipView, NodeAddr};
use super::ring::HashRing;
use super::shard::ShardPool;
use super::ClusterError;

struct CachedRing {
    epoch: u64,
    ring: HashRing,
}

pub struct MetricRouter {
    cluster: Arc<ClusterState>,
    shards: Arc<ShardPool>,
    forwarder: Forwarder,
    cache: RwLock<CachedRing>,
}

impl MetricRouter {
    pub fn new(cluster: Arc<ClusterState>, shards: Arc<ShardPool>, forwarder: Forwarder) -> Self {
        let view = cluster.view();
        let cache = RwLock::new(CachedRing {
            epoch: view.epoch,
            ring: HashRing::new(&view.nodes),
        });
        Self {
            cluster,
            shards,
            forwarder,
            cache,
        }
    }

    /// Candidate owners for a key under the given view, ring order. The
    /// ring is rebuilt only when the view's epoch moves.
    fn candidates_for(&self, view: &MembershipView, key: &str) -> Vec<NodeAddr> {
        {
            let cached = self.cache.read();
            if cached.epoch == view.epoch {
                return cached.ring.successors(key);
            }
        }
        let ring = HashRing::new(&view.nodes);
        let candidates = ring.successors(key);
        let mut cached = self.cache.write();
        if cached.epoch != view.epoch {
            debug!(epoch = view.epoch, nodes = view.nodes.len(), "Rebuilt hash ring");
            *cached = CachedRing {
                epoch: view.epoch,
                ring,
            };
        }
        candidates
    }

    /// Routes one record. Local ownership merges into a shard; remote
    /// ownership forwards. A transient forward failure triggers one view
    /// refresh and reroute before the record is given up on.
    pub async fn route(&self, record: MetricRecord) -> Result<(), ClusterError> {
        let key = record.key();
        let view = self.cluster.view();
        let candidates = self.candidates_for(&view, &key);

        match candidates.first() {
            None => Err(ClusterError::NoAvailableOwner { key }),
            Some(owner) if owner == self.cluster.local() => self.shards.merge(record).await,
            Some(_) => match self.forwarder.forward(&candidates, &record).await {
                Ok(_) => Ok(()),
                Err(err) if err.is_transient() => {
                    warn!(key, error = %err, "Forward failed, refreshing membership");
                    let fresh = self.cluster.refresh().await;
                    let candidates = self.candidates_for(&fresh, &key);
                    match candidates.first() {
                        None => Err(ClusterError::NoAvailableOwner { key }),
                        Some(owner) if owner == self.cluster.local() => {
                            self.shards.merge(record).await
                        }
                        Some(_) => self
                            .forwarder
                            .forward(&candidates, &record)
                            .await
                            .map(|_| ()),
                    }
                }
                Err(err) => Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::membership::StaticClusterProvider;
    use crate::metrics::TraceAssociationRecord;
    use std::time::Duration;
    use tokio::sync::watch;

    fn node(host: &str) -> NodeAddr {
        NodeAddr {
            host: host.to_string(),
            port: 11800,
        }
    }

    fn record(trace_id: &str) -> MetricRecord {
        MetricRecord::TraceAssociation(TraceAssociationRecord {
            time_bucket: 202401011234,
            trace_id: trace_id.to_string(),
            segments: 1,
            service_id: 1,
        })
    }

    async fn single_node_router() -> (MetricRouter, Arc<ShardPool>, watch::Sender<bool>) {
        let local = node("127.0.0.1");
        let provider = Arc::new(StaticClusterProvider::new(vec![local.clone()]));
        let cluster = Arc::new(ClusterState::init(provider, local).await);
        let (shutdown_tx, rx) = watch::channel(false);
        let (pool, _handles) = ShardPool::start(2, 64, rx);
        let shards = Arc::new(pool);
        let forwarder = Forwarder::new(Duration::from_millis(100)).unwrap();
        (
            MetricRouter::new(cluster, Arc::clone(&shards), forwarder),
            shards,
            shutdown_tx,
        )
    }

    #[tokio::test]
    async fn test_single_node_routes_everything_locally() {
        let (router, shards, _shutdown_tx) = single_node_router().await;
        for i in 0..10 {
            router.route(record(&format!("trace-{i}"))).await.unwrap();
        }
        assert_eq!(shards.drain_all().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_empty_view_reports_no_owner() {
        let local = node("127.0.0.1");
        let provider = Arc::new(StaticClusterProvider::new(vec![]));
        let cluster = Arc::new(ClusterState::init(provider, local).await);
        let (_tx, rx) = watch::channel(false);
        let (pool, _handles) = ShardPool::start(1, 64, rx);
        let forwarder = Forwarder::new(Duration::from_millis(100)).unwrap();
        let router = MetricRouter::new(cluster, Arc::new(pool), forwarder);

        let err = router.route(record("t1")).await.unwrap_err();
        assert!(matches!(err, ClusterError::NoAvailableOwner { .. }));
    }
}
