//! Resource manager: holders and wait queues for locally-owned resources.

use hawklock_types::{LockMode, NodeId, ResourceId, ResourcePartition, TransactionId};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock was granted immediately.
    Granted,
    /// The request was appended to the resource's wait queue.
    Queued,
    /// The resource is not owned by this node; the caller must route the
    /// request to the owner instead.
    NotOwned,
}

/// Owns this node's resources: who holds which locks and who is waiting.
///
/// Admission is strictly no-barging: while the wait queue of a resource is
/// non-empty, new arrivals queue behind it regardless of compatibility, so
/// arrival order is preserved. Wait queue entries carry the requested mode
/// so promotion after a release does not consult the registry.
///
/// Access is serialized by the node state machine; the maps need no
/// internal locking.
#[derive(Debug)]
pub struct ResourceManager {
    node: NodeId,
    partition: ResourcePartition,
    /// holders[r] maps each holding transaction to its granted mode.
    holders: HashMap<ResourceId, HashMap<TransactionId, LockMode>>,
    /// FIFO wait queue per resource.
    wait_queues: HashMap<ResourceId, VecDeque<(TransactionId, LockMode)>>,
}

impl ResourceManager {
    /// Create a resource manager for `node`.
    pub fn new(node: NodeId, partition: ResourcePartition) -> Self {
        ResourceManager {
            node,
            partition,
            holders: HashMap::new(),
            wait_queues: HashMap::new(),
        }
    }

    /// Attempt to lock `resource` for `txn` in `mode`.
    ///
    /// Grants iff the resource is local, the wait queue is empty, and every
    /// current holder is compatible with `mode`. Re-requests by a current
    /// holder are granted idempotently (upgrading the recorded mode if the
    /// new request is stronger and no other holder conflicts).
    pub fn acquire(
        &mut self,
        txn: TransactionId,
        resource: ResourceId,
        mode: LockMode,
    ) -> AcquireOutcome {
        if !self.partition.is_local(self.node, resource) {
            return AcquireOutcome::NotOwned;
        }

        let holders = self.holders.entry(resource).or_default();
        let queue_busy = self
            .wait_queues
            .get(&resource)
            .is_some_and(|q| !q.is_empty());

        let conflict = queue_busy
            || holders
                .iter()
                .any(|(holder, held)| *holder != txn && !held.compatible_with(mode));

        if holders.contains_key(&txn) && !conflict {
            // Re-request by a current holder: grant in place.
            let held = holders.get_mut(&txn).expect("holder present");
            if *held == LockMode::Shared && mode == LockMode::Exclusive {
                *held = LockMode::Exclusive;
            }
            return AcquireOutcome::Granted;
        }

        if conflict {
            let queue = self.wait_queues.entry(resource).or_default();
            if !queue.iter().any(|(t, _)| *t == txn) {
                queue.push_back((txn, mode));
            }
            debug!(node = %self.node, %txn, %resource, %mode, "lock blocked, queued");
            AcquireOutcome::Queued
        } else {
            holders.insert(txn, mode);
            trace!(node = %self.node, %txn, %resource, %mode, "lock granted");
            AcquireOutcome::Granted
        }
    }

    /// Release `txn`'s hold on `resource`. Returns whether a lock was
    /// actually held; releasing a lock that is not held logs and returns.
    pub fn release(&mut self, txn: TransactionId, resource: ResourceId) -> bool {
        match self.holders.get_mut(&resource) {
            Some(holders) => {
                if holders.remove(&txn).is_some() {
                    if holders.is_empty() {
                        self.holders.remove(&resource);
                    }
                    trace!(node = %self.node, %txn, %resource, "lock released");
                    true
                } else {
                    warn!(node = %self.node, %txn, %resource, "release of lock not held");
                    false
                }
            }
            None => {
                warn!(node = %self.node, %txn, %resource, "release of lock not held");
                false
            }
        }
    }

    /// Release every lock `txn` holds locally, returning the affected
    /// resources (so the caller can promote waiters on each).
    pub fn release_all(&mut self, txn: TransactionId) -> Vec<ResourceId> {
        let mut released = Vec::new();
        self.holders.retain(|resource, holders| {
            if holders.remove(&txn).is_some() {
                released.push(*resource);
            }
            !holders.is_empty()
        });
        if !released.is_empty() {
            debug!(node = %self.node, %txn, count = released.len(), "released all locks");
        }
        released.sort_unstable();
        released
    }

    /// Remove `txn` from `resource`'s wait queue (abort path). Returns
    /// whether an entry was removed.
    pub fn remove_from_wait_queue(&mut self, txn: TransactionId, resource: ResourceId) -> bool {
        let Some(queue) = self.wait_queues.get_mut(&resource) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|(t, _)| *t != txn);
        let removed = queue.len() != before;
        if queue.is_empty() {
            self.wait_queues.remove(&resource);
        }
        if removed {
            debug!(node = %self.node, %txn, %resource, "removed from wait queue");
        }
        removed
    }

    /// Promote eligible waiters at the head of `resource`'s queue.
    ///
    /// Pops and grants successive heads while every current holder is
    /// compatible with the head's requested mode, so a run of compatible
    /// Shared waiters wakes on a single release. Returns the promoted
    /// requests in grant order; the caller notifies each waiter.
    pub fn promote_waiters(&mut self, resource: ResourceId) -> Vec<(TransactionId, LockMode)> {
        let mut promoted = Vec::new();
        loop {
            let Some(queue) = self.wait_queues.get_mut(&resource) else {
                break;
            };
            let Some(&(head, mode)) = queue.front() else {
                self.wait_queues.remove(&resource);
                break;
            };
            let eligible = self
                .holders
                .get(&resource)
                .map_or(true, |hs| hs.values().all(|held| held.compatible_with(mode)));
            if !eligible {
                break;
            }
            queue.pop_front();
            if queue.is_empty() {
                self.wait_queues.remove(&resource);
            }
            self.holders.entry(resource).or_default().insert(head, mode);
            trace!(node = %self.node, txn = %head, %resource, %mode, "waiter promoted");
            promoted.push((head, mode));
        }
        promoted
    }

    /// Current holders of a resource.
    pub fn holders_of(&self, resource: ResourceId) -> Option<&HashMap<TransactionId, LockMode>> {
        self.holders.get(&resource)
    }

    /// Head of a resource's wait queue.
    pub fn wait_queue_head(&self, resource: ResourceId) -> Option<(TransactionId, LockMode)> {
        self.wait_queues
            .get(&resource)
            .and_then(|q| q.front().copied())
    }

    /// Whether `txn` is queued on `resource`.
    pub fn is_queued(&self, txn: TransactionId, resource: ResourceId) -> bool {
        self.wait_queues
            .get(&resource)
            .is_some_and(|q| q.iter().any(|(t, _)| *t == txn))
    }

    /// Snapshot of contended resources: those with both holders and a
    /// non-empty wait queue, ordered by resource id. This is the raw
    /// material of the wait-for graph.
    pub fn contended(
        &self,
    ) -> BTreeMap<ResourceId, (&HashMap<TransactionId, LockMode>, TransactionId)> {
        let mut out = BTreeMap::new();
        for (resource, holders) in &self.holders {
            if holders.is_empty() {
                continue;
            }
            if let Some((head, _)) = self.wait_queue_head(*resource) {
                out.insert(*resource, (holders, head));
            }
        }
        out
    }

    /// The node this manager belongs to.
    pub fn node(&self) -> NodeId {
        self.node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgr() -> ResourceManager {
        ResourceManager::new(NodeId(1), ResourcePartition::new(2, 100))
    }

    fn txn(seq: u32) -> TransactionId {
        TransactionId::new(NodeId(1), seq)
    }

    #[test]
    fn shared_holders_coexist() {
        let mut rm = mgr();
        assert_eq!(
            rm.acquire(txn(1), ResourceId(1), LockMode::Shared),
            AcquireOutcome::Granted
        );
        assert_eq!(
            rm.acquire(txn(2), ResourceId(1), LockMode::Shared),
            AcquireOutcome::Granted
        );
        assert_eq!(rm.holders_of(ResourceId(1)).unwrap().len(), 2);
    }

    #[test]
    fn exclusive_conflicts_queue() {
        let mut rm = mgr();
        rm.acquire(txn(1), ResourceId(1), LockMode::Exclusive);
        assert_eq!(
            rm.acquire(txn(2), ResourceId(1), LockMode::Shared),
            AcquireOutcome::Queued
        );
        assert_eq!(rm.wait_queue_head(ResourceId(1)).unwrap().0, txn(2));
    }

    #[test]
    fn no_barging_while_queue_non_empty() {
        let mut rm = mgr();
        rm.acquire(txn(1), ResourceId(1), LockMode::Shared);
        rm.acquire(txn(2), ResourceId(1), LockMode::Exclusive); // queued
        // A shared request would be compatible with the holder, but must not
        // barge past the queued exclusive waiter.
        assert_eq!(
            rm.acquire(txn(3), ResourceId(1), LockMode::Shared),
            AcquireOutcome::Queued
        );
    }

    #[test]
    fn remote_resource_is_rejected() {
        let mut rm = mgr();
        assert_eq!(
            rm.acquire(txn(1), ResourceId(150), LockMode::Shared),
            AcquireOutcome::NotOwned
        );
    }

    #[test]
    fn promotion_grants_successive_shared_heads() {
        let mut rm = mgr();
        rm.acquire(txn(1), ResourceId(1), LockMode::Exclusive);
        rm.acquire(txn(2), ResourceId(1), LockMode::Shared);
        rm.acquire(txn(3), ResourceId(1), LockMode::Shared);
        rm.acquire(txn(4), ResourceId(1), LockMode::Exclusive);

        rm.release(txn(1), ResourceId(1));
        let promoted = rm.promote_waiters(ResourceId(1));
        assert_eq!(
            promoted,
            vec![(txn(2), LockMode::Shared), (txn(3), LockMode::Shared)]
        );
        // The exclusive waiter stays queued behind the shared holders.
        assert_eq!(rm.wait_queue_head(ResourceId(1)).unwrap().0, txn(4));
    }

    #[test]
    fn release_all_reports_affected_resources() {
        let mut rm = mgr();
        rm.acquire(txn(1), ResourceId(1), LockMode::Exclusive);
        rm.acquire(txn(1), ResourceId(2), LockMode::Shared);
        rm.acquire(txn(2), ResourceId(3), LockMode::Shared);

        let released = rm.release_all(txn(1));
        assert_eq!(released, vec![ResourceId(1), ResourceId(2)]);
        assert!(rm.holders_of(ResourceId(3)).is_some());
    }

    #[test]
    fn release_of_unheld_lock_is_tolerated() {
        let mut rm = mgr();
        assert!(!rm.release(txn(1), ResourceId(1)));
    }

    #[test]
    fn abort_removes_queued_waiter() {
        let mut rm = mgr();
        rm.acquire(txn(1), ResourceId(1), LockMode::Exclusive);
        rm.acquire(txn(2), ResourceId(1), LockMode::Exclusive);
        assert!(rm.remove_from_wait_queue(txn(2), ResourceId(1)));
        assert!(rm.wait_queue_head(ResourceId(1)).is_none());
    }

    #[test]
    fn re_request_by_holder_is_idempotent() {
        let mut rm = mgr();
        rm.acquire(txn(1), ResourceId(1), LockMode::Shared);
        assert_eq!(
            rm.acquire(txn(1), ResourceId(1), LockMode::Exclusive),
            AcquireOutcome::Granted
        );
        assert_eq!(
            rm.holders_of(ResourceId(1)).unwrap()[&txn(1)],
            LockMode::Exclusive
        );
    }
}
