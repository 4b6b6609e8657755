//! Published cluster topology
//!
//! A [`TopologySnapshot`] is immutable once built. Refreshes publish a new
//! `Arc` into the [`TopologyRegistry`]; readers holding the old one keep a
//! consistent view.

use crate::types::{NodeAddress, NodesInfo};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One member of a discovered cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    /// Child name in the coordination service
    pub name: String,
    pub address: NodeAddress,
}

/// Immutable view of one cluster's members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    cluster: String,
    /// Publish counter, starts at 1 for the first snapshot of a cluster
    version: u64,
    /// Ordered by address, then name
    members: Vec<ClusterMember>,
}

impl TopologySnapshot {
    pub fn new(cluster: impl Into<String>, version: u64, nodes: &NodesInfo) -> Self {
        let mut members: Vec<ClusterMember> = nodes
            .iter()
            .map(|(name, info)| ClusterMember {
                name: name.clone(),
                address: info.address.clone(),
            })
            .collect();
        members.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));

        Self {
            cluster: cluster.into(),
            version,
            members,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn members(&self) -> &[ClusterMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member addresses as `host:port`, in snapshot order
    pub fn addresses(&self) -> Vec<String> {
        self.members.iter().map(|m| m.address.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.iter().any(|m| m.name == name)
    }
}

/// Latest snapshot of every discovered cluster
#[derive(Debug, Default)]
pub struct TopologyRegistry {
    snapshots: DashMap<String, Arc<TopologySnapshot>>,
}

impl TopologyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot of a cluster, if one was published
    pub fn get(&self, cluster: &str) -> Option<Arc<TopologySnapshot>> {
        self.snapshots.get(cluster).map(|s| s.value().clone())
    }

    /// Replace the published snapshot of `cluster` with one built from `nodes`
    pub fn publish(&self, cluster: &str, nodes: &NodesInfo) -> Arc<TopologySnapshot> {
        let mut entry = self
            .snapshots
            .entry(cluster.to_string())
            .or_insert_with(|| Arc::new(TopologySnapshot::new(cluster, 0, &NodesInfo::new())));
        let snapshot = Arc::new(TopologySnapshot::new(cluster, entry.version + 1, nodes));
        *entry = snapshot.clone();
        snapshot
    }

    /// Names of clusters with a published snapshot, sorted
    pub fn cluster_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshots.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeInfo;

    fn nodes(entries: &[(&str, &str)]) -> NodesInfo {
        entries
            .iter()
            .map(|(name, addr)| (name.to_string(), NodeInfo::new(addr.parse().unwrap())))
            .collect()
    }

    #[test]
    fn test_snapshot_ordering() {
        let snapshot = TopologySnapshot::new(
            "c1",
            1,
            &nodes(&[("n3", "h2:9000"), ("n1", "h1:9001"), ("n2", "h1:9000")]),
        );
        assert_eq!(snapshot.addresses(), vec!["h1:9000", "h1:9001", "h2:9000"]);
        assert!(snapshot.contains("n3"));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_publish_replaces_snapshot() {
        let registry = TopologyRegistry::new();
        assert!(registry.get("c1").is_none());

        let first = registry.publish("c1", &nodes(&[("n1", "h1:9000")]));
        assert_eq!(first.version(), 1);
        let held = registry.get("c1").unwrap();
        assert!(Arc::ptr_eq(&first, &held));

        let second = registry.publish("c1", &nodes(&[("n1", "h1:9000"), ("n2", "h2:9000")]));
        assert_eq!(second.version(), 2);
        // readers of the old snapshot are unaffected
        assert_eq!(held.len(), 1);
        assert_eq!(registry.get("c1").unwrap().len(), 2);

        registry.publish("a0", &NodesInfo::new());
        assert_eq!(registry.cluster_names(), vec!["a0", "c1"]);
    }
}
