//! Consistent-hash ring over the membership view
//!
//! Each member contributes a fixed number of virtual points so that adding
//! or removing one node remaps only its share of keys. Ownership is a pure
//! function of (key, node set); every node computes the same owner for the
//! same view.

use std::collections::BTreeMap;
use std::hash::Hasher;

use rustc_hash::FxHasher;

use super::membership::NodeAddr;

/// Virtual points per member.
pub const VIRTUAL_NODES: u32 = 128;

pub struct HashRing {
    points: BTreeMap<u64, NodeAddr>,
}

fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

impl HashRing {
    pub fn new(nodes: &[NodeAddr]) -> Self {
        let mut points = BTreeMap::new();
        for node in nodes {
            for replica in 0..VIRTUAL_NODES {
                let point = hash_bytes(format!("{node}#{replica}").as_bytes());
                points.insert(point, node.clone());
            }
        }
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Owner of a key: the first virtual point at or after the key's hash,
    /// wrapping around.
    pub fn owner(&self, key: &str) -> Option<&NodeAddr> {
        if self.points.is_empty() {
            return None;
        }
        let h = hash_bytes(key.as_bytes());
        self.points
            .range(h..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, node)| node)
    }

    /// Distinct nodes in ring order starting at the key's owner. Used by
    /// the forwarder to pick fallback candidates.
    pub fn successors(&self, key: &str) -> Vec<NodeAddr> {
        if self.points.is_empty() {
            return Vec::new();
        }
        let h = hash_bytes(key.as_bytes());
        let mut out: Vec<NodeAddr> = Vec::new();
        for (_, node) in self.points.range(h..).chain(self.points.range(..h)) {
            if !out.contains(node) {
                out.push(node.clone());
            }
        }
        out
    }
}
