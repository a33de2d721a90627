//! Transaction registry: the per-node arena of active transactions.

use hawklock_types::{
    LockMode, LockStep, NodeId, ResourceId, TransactionId, TransactionStatus,
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

/// A transaction homed on this node.
///
/// The operation script is a flat sequence of (resource, mode) acquisitions
/// with a progress cursor; the core never inspects any richer workload
/// shape.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Stable id; the home node is recoverable from it.
    pub id: TransactionId,
    /// Lifecycle state.
    pub status: TransactionStatus,
    /// State-machine time at begin, for latency accounting.
    pub started_at: Duration,
    /// Locks acquired so far (local and remote), by resource.
    pub locks: HashMap<ResourceId, LockMode>,
    /// Remaining work: the full operation script.
    pub ops: Vec<LockStep>,
    /// Index of the next operation to attempt.
    pub cursor: usize,
    /// The resource currently blocked on; `Some` iff status is Blocked.
    pub waiting_for: Option<ResourceId>,
}

impl Transaction {
    /// The next operation, if the script is unfinished.
    pub fn current_op(&self) -> Option<LockStep> {
        self.ops.get(self.cursor).copied()
    }

    /// Whether every operation has completed.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.ops.len()
    }
}

/// Per-node transaction arena.
///
/// Transactions live here from `begin` until commit or abort, at which point
/// they are removed; a transaction is in the registry of exactly its home
/// node. Ids come from a per-node monotonic counter packed with the node id.
#[derive(Debug)]
pub struct TransactionRegistry {
    node: NodeId,
    next_seq: u32,
    active: HashMap<TransactionId, Transaction>,
    /// Latencies of finished transactions, drained by the runner.
    latencies: Vec<(TransactionId, bool, Duration)>,
    committed: u64,
    aborted: u64,
}

impl TransactionRegistry {
    /// Create an empty registry for `node`.
    pub fn new(node: NodeId) -> Self {
        TransactionRegistry {
            node,
            next_seq: 1,
            active: HashMap::new(),
            latencies: Vec::new(),
            committed: 0,
            aborted: 0,
        }
    }

    /// Begin a transaction with the given operation script.
    pub fn begin(&mut self, ops: Vec<LockStep>, now: Duration) -> TransactionId {
        let id = TransactionId::new(self.node, self.next_seq);
        self.next_seq += 1;
        self.active.insert(
            id,
            Transaction {
                id,
                status: TransactionStatus::Running,
                started_at: now,
                locks: HashMap::new(),
                ops,
                cursor: 0,
                waiting_for: None,
            },
        );
        debug!(node = %self.node, txn = %id, "transaction begun");
        id
    }

    /// Look up an active transaction.
    pub fn get(&self, txn: TransactionId) -> Option<&Transaction> {
        self.active.get(&txn)
    }

    /// Look up an active transaction mutably.
    pub fn get_mut(&mut self, txn: TransactionId) -> Option<&mut Transaction> {
        self.active.get_mut(&txn)
    }

    /// Whether the transaction is still active here.
    pub fn is_active(&self, txn: TransactionId) -> bool {
        self.active.contains_key(&txn)
    }

    /// The set of active transaction ids.
    pub fn active_set(&self) -> HashSet<TransactionId> {
        self.active.keys().copied().collect()
    }

    /// Ids of active transactions currently Blocked, in id order.
    pub fn blocked(&self) -> Vec<TransactionId> {
        let mut out: Vec<TransactionId> = self
            .active
            .values()
            .filter(|t| t.status == TransactionStatus::Blocked)
            .map(|t| t.id)
            .collect();
        out.sort_unstable();
        out
    }

    /// The resource a transaction is waiting for, if it is blocked.
    pub fn waiting_for(&self, txn: TransactionId) -> Option<ResourceId> {
        self.active.get(&txn).and_then(|t| t.waiting_for)
    }

    /// Number of active transactions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Mark `txn` blocked on `resource`.
    pub fn mark_blocked(&mut self, txn: TransactionId, resource: ResourceId) {
        if let Some(t) = self.active.get_mut(&txn) {
            t.status = TransactionStatus::Blocked;
            t.waiting_for = Some(resource);
        }
    }

    /// Record a granted lock and advance the script: the transaction leaves
    /// Blocked (if it was), remembers the lock, and moves its cursor past
    /// the operation that requested it.
    pub fn record_grant(&mut self, txn: TransactionId, resource: ResourceId, mode: LockMode) {
        let Some(t) = self.active.get_mut(&txn) else {
            warn!(node = %self.node, %txn, %resource, "grant for unknown transaction");
            return;
        };
        t.status = TransactionStatus::Running;
        t.waiting_for = None;
        t.locks.insert(resource, mode);
        t.cursor += 1;
    }

    /// Finish a transaction: record latency, bump counters, and remove it
    /// from the arena. Returns the removed record (locks and waiting state
    /// intact, so the caller can drive releases), or `None` if it was
    /// already gone (duplicate abort signals are a no-op).
    pub fn finish(
        &mut self,
        txn: TransactionId,
        committed: bool,
        now: Duration,
    ) -> Option<Transaction> {
        let mut t = self.active.remove(&txn)?;
        t.status = if committed {
            TransactionStatus::Committed
        } else {
            TransactionStatus::Aborted
        };
        let latency = now.saturating_sub(t.started_at);
        self.latencies.push((txn, committed, latency));
        if committed {
            self.committed += 1;
        } else {
            self.aborted += 1;
        }
        debug!(node = %self.node, %txn, committed, ?latency, "transaction finished");
        Some(t)
    }

    /// Drain recorded (txn, committed, latency) triples.
    pub fn drain_latencies(&mut self) -> Vec<(TransactionId, bool, Duration)> {
        std::mem::take(&mut self.latencies)
    }

    /// Transactions committed since boot.
    pub fn committed_count(&self) -> u64 {
        self.committed
    }

    /// Transactions aborted since boot.
    pub fn aborted_count(&self) -> u64 {
        self.aborted
    }

    /// The node this registry belongs to.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_assigns_monotonic_ids_with_home_node() {
        let mut reg = TransactionRegistry::new(NodeId(3));
        let a = reg.begin(vec![], Duration::ZERO);
        let b = reg.begin(vec![], Duration::ZERO);
        assert_eq!(a.home_node(), NodeId(3));
        assert!(a < b);
    }

    #[test]
    fn grant_advances_cursor_and_unblocks() {
        let mut reg = TransactionRegistry::new(NodeId(1));
        let ops = vec![LockStep::exclusive(ResourceId(1))];
        let id = reg.begin(ops, Duration::ZERO);
        reg.mark_blocked(id, ResourceId(1));
        assert_eq!(reg.waiting_for(id), Some(ResourceId(1)));

        reg.record_grant(id, ResourceId(1), LockMode::Exclusive);
        let t = reg.get(id).unwrap();
        assert_eq!(t.status, TransactionStatus::Running);
        assert_eq!(t.waiting_for, None);
        assert!(t.is_complete());
    }

    #[test]
    fn finish_is_idempotent() {
        let mut reg = TransactionRegistry::new(NodeId(1));
        let id = reg.begin(vec![], Duration::from_millis(10));
        assert!(reg.finish(id, false, Duration::from_millis(30)).is_some());
        assert!(reg.finish(id, false, Duration::from_millis(40)).is_none());
        assert_eq!(reg.aborted_count(), 1);

        let drained = reg.drain_latencies();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].2, Duration::from_millis(20));
    }

    #[test]
    fn no_commit_after_abort() {
        let mut reg = TransactionRegistry::new(NodeId(1));
        let id = reg.begin(vec![], Duration::ZERO);
        reg.finish(id, false, Duration::ZERO);
        // A later commit attempt finds nothing to finish.
        assert!(reg.finish(id, true, Duration::ZERO).is_none());
        assert_eq!(reg.committed_count(), 0);
        assert_eq!(reg.aborted_count(), 1);
    }
}
