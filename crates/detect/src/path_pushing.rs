//! Path-pushing detection engine.
//!
//! Every detection period each node seeds a probe per blocked local
//! transaction, with path `[t]`. A probe is processed where the information
//! lives: the waiter's home node checks its status and awaited resource;
//! if that resource is remote the probe hops to the owner (carrying the
//! resource id) for the holder lookup. The lowest-id holder is "the"
//! blocker. A blocker already on the path closes a cycle; otherwise the
//! probe is extended and forwarded to the blocker's home node.
//!
//! Probes that make no progress (waiter no longer blocked, resource
//! released, stale queue entry) are dropped; the next period reseeds.
//! Duplicate cycle discoveries are harmless because aborts are idempotent.

use crate::victim::select_victim;
use hawklock_core::{Action, TimerId};
use hawklock_messages::Message;
use hawklock_types::{NodeId, ResourceId, TransactionId};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

/// The local lock/registry context a probe needs, implemented by the node.
pub trait LockView {
    /// The resource a *locally homed* blocked transaction waits for.
    fn waiting_for(&self, txn: TransactionId) -> Option<ResourceId>;
    /// Holders of a locally-owned resource, in id order.
    fn holders_of(&self, resource: ResourceId) -> Vec<TransactionId>;
    /// Whether `txn` sits in the wait queue of locally-owned `resource`.
    fn is_queued(&self, txn: TransactionId, resource: ResourceId) -> bool;
    /// The owner of any resource.
    fn owner_of(&self, resource: ResourceId) -> NodeId;
}

/// Per-node state of the path-pushing engine.
#[derive(Debug)]
pub struct PathPushingState {
    node: NodeId,
    is_coordinator: bool,
    detection_interval: Duration,
    probes_seeded: u64,
    cycles_found: u64,
    deadlock_count: u64,
}

impl PathPushingState {
    /// Create the engine state for `node`.
    pub fn new(node: NodeId, coordinator: NodeId, detection_interval: Duration) -> Self {
        PathPushingState {
            node,
            is_coordinator: node == coordinator,
            detection_interval,
            probes_seeded: 0,
            cycles_found: 0,
            deadlock_count: 0,
        }
    }

    /// Actions to start the engine: arm the detection timer.
    pub fn startup(&self) -> Vec<Action> {
        vec![Action::SetTimer {
            id: TimerId::Detection,
            duration: self.detection_interval,
        }]
    }

    /// Detection period elapsed: seed one probe per blocked local
    /// transaction, processed through the node's own router.
    pub fn on_detection_timer(&mut self, blocked: &[TransactionId]) -> Vec<Action> {
        let mut actions = vec![Action::SetTimer {
            id: TimerId::Detection,
            duration: self.detection_interval,
        }];
        for &txn in blocked {
            self.probes_seeded += 1;
            actions.push(Action::Send {
                to: self.node,
                message: Message::PathPushingProbe {
                    path: vec![txn],
                    resource: None,
                },
            });
        }
        if !blocked.is_empty() {
            trace!(node = %self.node, probes = blocked.len(), "seeded path-pushing probes");
        }
        actions
    }

    /// Process a probe.
    pub fn on_probe(
        &mut self,
        path: &[TransactionId],
        resource: Option<ResourceId>,
        view: &impl LockView,
    ) -> Vec<Action> {
        let Some(&last) = path.last() else {
            return vec![];
        };

        // Resolve the awaited resource: either carried by a hop to the
        // owner, or looked up in the local registry at the waiter's home.
        let awaited = match resource {
            Some(r) => {
                // Hop to the resource owner. The waiter's queue entry here
                // is the staleness guard.
                if !view.is_queued(last, r) {
                    trace!(node = %self.node, txn = %last, res = %r, "probe stale, waiter dequeued");
                    return vec![];
                }
                r
            }
            None => {
                let Some(r) = view.waiting_for(last) else {
                    trace!(node = %self.node, txn = %last, "probe dropped, waiter not blocked");
                    return vec![];
                };
                let owner = view.owner_of(r);
                if owner != self.node {
                    // Holder lookup happens at the owner.
                    return vec![Action::Send {
                        to: owner,
                        message: Message::PathPushingProbe {
                            path: path.to_vec(),
                            resource: Some(r),
                        },
                    }];
                }
                r
            }
        };

        let holders = view.holders_of(awaited);
        let Some(&blocker) = holders.first() else {
            trace!(node = %self.node, res = %awaited, "probe dropped, resource released");
            return vec![];
        };

        if let Some(pos) = path.iter().position(|&t| t == blocker) {
            return self.close_cycle(path, pos, blocker);
        }

        let mut extended = path.to_vec();
        extended.push(blocker);
        vec![Action::Send {
            to: blocker.home_node(),
            message: Message::PathPushingProbe {
                path: extended,
                resource: None,
            },
        }]
    }

    /// The blocker already appears in the path: the suffix from its first
    /// occurrence is a cycle. Select a victim (empty frequency map, so
    /// lowest id) and signal its home node.
    fn close_cycle(
        &mut self,
        path: &[TransactionId],
        pos: usize,
        blocker: TransactionId,
    ) -> Vec<Action> {
        let cycle: Vec<TransactionId> = path[pos..].to_vec();
        self.cycles_found += 1;
        self.deadlock_count += 1;
        debug!(
            node = %self.node,
            %blocker,
            cycle_len = cycle.len(),
            "path-pushing probe closed a cycle"
        );

        let mut actions = Vec::new();
        if let Some(victim) = select_victim(&cycle, &HashMap::new()) {
            actions.push(Action::Send {
                to: victim.home_node(),
                message: Message::AbortTransaction {
                    txns: vec![victim],
                },
            });
        }
        if self.is_coordinator {
            actions.push(Action::EmitDeadlockReport {
                cycles: vec![cycle],
                deadlock_count: self.deadlock_count,
            });
        }
        actions
    }

    /// Probes seeded since boot.
    pub fn probes_seeded(&self) -> u64 {
        self.probes_seeded
    }

    /// Cycles discovered since boot (duplicates included).
    pub fn cycles_found(&self) -> u64 {
        self.cycles_found
    }
}
