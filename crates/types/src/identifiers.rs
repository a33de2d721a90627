//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node in the cluster.
///
/// Node ids are 1-based. `NodeId(0)` is reserved: in message envelopes it
/// denotes broadcast, and it is the sender id used by operator clients.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The broadcast / client pseudo-node.
    pub const BROADCAST: NodeId = NodeId(0);

    /// Whether this id denotes broadcast rather than a concrete node.
    pub fn is_broadcast(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Identifies a transaction.
///
/// The home node is packed into the high 32 bits and a per-node monotonic
/// sequence number into the low 32 bits. Each node mints ids from its own
/// counter, yet ids are globally unambiguous: the home node of any
/// transaction can be recovered without a lookup, and wait-for graphs merged
/// from many nodes never conflate distinct transactions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Build an id from a home node and that node's sequence counter.
    pub fn new(home: NodeId, seq: u32) -> Self {
        TransactionId(((home.0 as u64) << 32) | seq as u64)
    }

    /// The node this transaction lives on.
    pub fn home_node(&self) -> NodeId {
        NodeId((self.0 >> 32) as u32)
    }

    /// The per-node sequence number.
    pub fn seq(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}.{}", self.home_node().0, self.seq())
    }
}

/// Identifies a lockable resource.
///
/// Resources are 1-based and statically partitioned across nodes; see
/// [`crate::ResourcePartition`] for the ownership mapping.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_packs_home_and_seq() {
        let id = TransactionId::new(NodeId(7), 42);
        assert_eq!(id.home_node(), NodeId(7));
        assert_eq!(id.seq(), 42);
    }

    #[test]
    fn transaction_id_orders_by_home_then_seq() {
        let a = TransactionId::new(NodeId(1), 99);
        let b = TransactionId::new(NodeId(2), 1);
        assert!(a < b);

        let c = TransactionId::new(NodeId(1), 1);
        let d = TransactionId::new(NodeId(1), 2);
        assert!(c < d);
    }
}
