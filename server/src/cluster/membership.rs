//! Cluster membership view

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Collector node address, ordered so the cluster has a deterministic
/// leader (the smallest address in the view).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("invalid node address '{s}', expected host:port"))?;
        if host.is_empty() {
            return Err(format!("invalid node address '{s}', empty host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port in node address '{s}'"))?;
        Ok(NodeAddr {
            host: host.to_string(),
            port,
        })
    }
}

/// Snapshot of cluster membership. The epoch increments whenever the node
/// set changes; routers compare epochs to know when to rebuild their ring.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MembershipView {
    pub nodes: Vec<NodeAddr>,
    pub epoch: u64,
}

impl MembershipView {
    pub fn contains(&self, node: &NodeAddr) -> bool {
        self.nodes.contains(node)
    }

    /// Deterministic single-deleter election: smallest address wins.
    pub fn leader(&self) -> Option<&NodeAddr> {
        self.nodes.iter().min()
    }
}

/// Source of membership views. Static configuration here; an external
/// coordinator would implement the same trait.
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    async fn current(&self) -> MembershipView;
}

/// Fixed node set from configuration. The epoch never changes.
pub struct StaticClusterProvider {
    view: MembershipView,
}

impl StaticClusterProvider {
    pub fn new(mut nodes: Vec<NodeAddr>) -> Self {
        nodes.sort();
        nodes.dedup();
        Self {
            view: MembershipView { nodes, epoch: 1 },
        }
    }
}

#[async_trait]
impl ClusterProvider for StaticClusterProvider {
    async fn current(&self) -> MembershipView {
        self.view.clone()
    }
}

/// Cached membership with the local node identity attached.
pub struct ClusterState {
    provider: Arc<dyn ClusterProvider>,
    local: NodeAddr,
    view: RwLock<MembershipView>,
}

impl ClusterState {
    pub async fn init(provider: Arc<dyn ClusterProvider>, local: NodeAddr) -> Self {
        let view = provider.current().await;
        Self {
            provider,
            local,
            view: RwLock::new(view),
        }
    }

    pub fn local(&self) -> &NodeAddr {
        &self.local
    }

    pub fn view(&self) -> MembershipView {
        self.view.read().clone()
    }

    /// Re-read the provider. Returns the fresh view.
    pub async fn refresh(&self) -> MembershipView {
        let fresh = self.provider.current().await;
        let mut guard = self.view.write();
        if fresh.epoch != guard.epoch {
            tracing::debug!(
                epoch = fresh.epoch,
                nodes = fresh.nodes.len(),
                "Membership view changed"
            );
        }
        *guard = fresh.clone();
        fresh
    }

    pub fn is_leader(&self) -> bool {
        self.view.read().leader() == Some(&self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> NodeAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_node_addr_parse() {
        let n = addr("10.0.0.1:11800");
        assert_eq!(n.host, "10.0.0.1");
        assert_eq!(n.port, 11800);
        assert_eq!(n.to_string(), "10.0.0.1:11800");
    }

    #[test]
    fn test_node_addr_parse_rejects_garbage() {
        assert!("10.0.0.1".parse::<NodeAddr>().is_err());
        assert!(":11800".parse::<NodeAddr>().is_err());
        assert!("host:notaport".parse::<NodeAddr>().is_err());
    }

    #[test]
    fn test_leader_is_smallest_address() {
        let view = MembershipView {
            nodes: vec![addr("b:1"), addr("a:2"), addr("a:1")],
            epoch: 1,
        };
        assert_eq!(view.leader(), Some(&addr("a:1")));
    }

    #[tokio::test]
    async fn test_cluster_state_leader() {
        let provider = Arc::new(StaticClusterProvider::new(vec![addr("a:1"), addr("b:1")]));
        let state = ClusterState::init(provider.clone(), addr("a:1")).await;
        assert!(state.is_leader());

        let state = ClusterState::init(provider, addr("b:1")).await;
        assert!(!state.is_leader());
    }
}
