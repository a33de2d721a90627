//! Per-node zone membership state.

use hawklock_types::{NodeId, ZoneConfig};
use tracing::{debug, warn};

/// This node's view of the current detection-zone partition.
///
/// Initial state is a singleton zone led by self. Reconfiguration replaces
/// the whole view atomically; a node hearing a new configuration always
/// replaces, never merges. Access is serialized by the node state machine.
#[derive(Debug, Clone)]
pub struct ZoneManager {
    node: NodeId,
    leader: NodeId,
    members: Vec<NodeId>,
}

impl ZoneManager {
    /// Create the initial singleton-zone state for `node`.
    pub fn new(node: NodeId) -> Self {
        ZoneManager {
            node,
            leader: node,
            members: vec![node],
        }
    }

    /// Install a new zone configuration, replacing the current view.
    ///
    /// If the configuration does not mention this node (a phantom
    /// reconfiguration), the node falls back to a singleton zone so it
    /// always belongs to exactly one zone from its own point of view.
    pub fn install(&mut self, config: &ZoneConfig) {
        match config.zone_of(self.node) {
            Some((leader, members)) => {
                self.leader = leader;
                self.members = members.to_vec();
            }
            None => {
                warn!(node = %self.node, "zone reconfiguration omits this node; using singleton");
                self.leader = self.node;
                self.members = vec![self.node];
            }
        }
        debug!(
            node = %self.node,
            leader = %self.leader,
            members = self.members.len(),
            "zone configuration installed"
        );
    }

    /// This node's current zone leader.
    pub fn leader(&self) -> NodeId {
        self.leader
    }

    /// Whether this node leads its zone.
    pub fn is_leader(&self) -> bool {
        self.leader == self.node
    }

    /// The members of this node's zone (including itself).
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }
}
