//! Static resource partitioning.

use crate::{NodeId, ResourceId};
use serde::{Deserialize, Serialize};

/// Static mapping of resources to owner nodes.
///
/// Resource `r` (1-based) is owned by node `(r - 1) / resources_per_node + 1`.
/// The partition is fixed for the lifetime of the cluster; dynamic membership
/// is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePartition {
    /// Number of nodes in the cluster.
    pub num_nodes: u32,
    /// Number of resources owned by each node.
    pub resources_per_node: u64,
}

impl ResourcePartition {
    /// Create a partition map.
    pub fn new(num_nodes: u32, resources_per_node: u64) -> Self {
        ResourcePartition {
            num_nodes,
            resources_per_node,
        }
    }

    /// The node that owns a resource.
    pub fn owner_of(&self, resource: ResourceId) -> NodeId {
        NodeId(((resource.0 - 1) / self.resources_per_node) as u32 + 1)
    }

    /// Whether `node` owns `resource`.
    pub fn is_local(&self, node: NodeId, resource: ResourceId) -> bool {
        self.owner_of(resource) == node
    }

    /// Total number of resources across the cluster.
    pub fn total_resources(&self) -> u64 {
        self.num_nodes as u64 * self.resources_per_node
    }

    /// The inclusive resource id range owned by a node.
    pub fn local_range(&self, node: NodeId) -> std::ops::RangeInclusive<u64> {
        let start = (node.0 as u64 - 1) * self.resources_per_node + 1;
        start..=start + self.resources_per_node - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_follows_static_partition() {
        let p = ResourcePartition::new(3, 1000);
        assert_eq!(p.owner_of(ResourceId(1)), NodeId(1));
        assert_eq!(p.owner_of(ResourceId(1000)), NodeId(1));
        assert_eq!(p.owner_of(ResourceId(1001)), NodeId(2));
        assert_eq!(p.owner_of(ResourceId(2001)), NodeId(3));
        assert_eq!(p.total_resources(), 3000);
    }

    #[test]
    fn local_range_matches_ownership() {
        let p = ResourcePartition::new(4, 10);
        assert_eq!(p.local_range(NodeId(2)), 11..=20);
        for r in p.local_range(NodeId(2)) {
            assert!(p.is_local(NodeId(2), ResourceId(r)));
        }
    }
}
