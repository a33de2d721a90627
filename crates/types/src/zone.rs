//! Detection zone configuration.

use crate::NodeId;
use serde::{Deserialize, Serialize};

/// A partition of the node universe into detection zones.
///
/// `zones` and `leaders` are parallel vectors: `leaders[i]` is the leader of
/// `zones[i]` and is always a member of it (the numerically smallest id when
/// produced by the SCC cut). Installed atomically by reconfiguration
/// messages; a node hearing a new configuration always replaces, never
/// merges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Zone member lists.
    pub zones: Vec<Vec<NodeId>>,
    /// Leader of each zone, parallel to `zones`.
    pub leaders: Vec<NodeId>,
}

impl ZoneConfig {
    /// A configuration of singleton zones, one per node, each self-led.
    pub fn singletons(num_nodes: u32) -> Self {
        let nodes: Vec<NodeId> = (1..=num_nodes).map(NodeId).collect();
        ZoneConfig {
            zones: nodes.iter().map(|n| vec![*n]).collect(),
            leaders: nodes,
        }
    }

    /// Find the zone containing `node`, returning `(leader, members)`.
    pub fn zone_of(&self, node: NodeId) -> Option<(NodeId, &[NodeId])> {
        self.zones
            .iter()
            .zip(&self.leaders)
            .find(|(zone, _)| zone.contains(&node))
            .map(|(zone, leader)| (*leader, zone.as_slice()))
    }

    /// Number of zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Whether there are no zones at all.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Check that zones are non-empty, leaders are members of their zones,
    /// and no node appears in two zones.
    pub fn is_well_formed(&self) -> bool {
        if self.zones.len() != self.leaders.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        for (zone, leader) in self.zones.iter().zip(&self.leaders) {
            if zone.is_empty() || !zone.contains(leader) {
                return false;
            }
            for member in zone {
                if !seen.insert(*member) {
                    return false;
                }
            }
        }
        true
    }
}
