//! Cluster membership, consistent-hash routing, and remote forwarding

pub mod forward;
pub mod membership;
pub mod ring;
pub mod router;
pub mod shard;

use thiserror::Error;

pub use forward::Forwarder;
pub use membership::{ClusterProvider, ClusterState, MembershipView, NodeAddr, StaticClusterProvider};
pub use ring::HashRing;
pub use router::MetricRouter;
pub use shard::{ShardCommand, ShardPool};

#[derive(Error, Debug)]
pub enum ClusterError {
    /// The membership view routes this key to no reachable node.
    #[error("no available owner for record key {key}")]
    NoAvailableOwner { key: String },

    /// Remote delivery failed after every candidate and retry.
    #[error("forwarding record to {node} failed after {attempts} attempts: {source}")]
    Forward {
        node: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// A remote node accepted the connection but refused the record.
    #[error("node {node} rejected forwarded record: {status}")]
    Rejected {
        node: String,
        status: reqwest::StatusCode,
    },

    /// Shard channel is at capacity; the caller should shed load upstream.
    #[error("aggregation shard {shard} is at capacity")]
    ShardBusy { shard: usize },

    /// Shard workers have shut down.
    #[error("aggregation workers stopped")]
    WorkersStopped,
}

impl ClusterError {
    /// Whether the failure may clear up on a later attempt. Routing a record
    /// again only makes sense for transport trouble and remote backpressure.
    pub fn is_transient(&self) -> bool {
        match self {
            ClusterError::Forward { .. } => true,
            ClusterError::ShardBusy { .. } => true,
            ClusterError::Rejected { status, .. } => {
                *status == reqwest::StatusCode::SERVICE_UNAVAILABLE
                    || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            ClusterError::NoAvailableOwner { .. } => false,
            ClusterError::WorkersStopped => false,
        }
    }
}
