//! Wait-for graph construction from resource and registry state.
//!
//! Both operations are snapshot-style reads over the resource manager's
//! contended resources: for each locally-owned resource with holders and a
//! non-empty wait queue, the queue head waits on every holder.
//!
//! Staleness guards:
//!
//! - For a waiter homed on this node, the registry must still report it as
//!   waiting for exactly this resource; otherwise the queue entry is stale
//!   and the edge is skipped.
//! - Activity pruning is *home-aware*: an endpoint is dropped only when it
//!   is homed here and no longer active locally. Remote endpoints pass
//!   through — the holders/queue maps are the freshest information this
//!   node has for them, and their owners retract the entries on abort
//!   within one detection period.

use crate::{ResourceManager, TransactionRegistry};
use hawklock_types::{TransactionId, WaitForGraph, WfdEdge};

/// Whether `txn` survives the home-aware activity prune.
fn endpoint_live(txn: TransactionId, registry: &TransactionRegistry) -> bool {
    txn.home_node() != registry.node() || registry.is_active(txn)
}

/// Whether the queue-head waiter `w` on `resource` is genuinely still
/// waiting there.
fn waiter_fresh(
    waiter: TransactionId,
    resource: hawklock_types::ResourceId,
    registry: &TransactionRegistry,
) -> bool {
    if waiter.home_node() == registry.node() {
        registry.waiting_for(waiter) == Some(resource)
    } else {
        // Remote waiter: its presence in the local wait queue is the
        // authority; the entry is removed when the wait ends.
        true
    }
}

/// Build this node's local wait-for graph, pruned to active transactions.
pub fn build_pruned_local_wfg(
    resources: &ResourceManager,
    registry: &TransactionRegistry,
) -> WaitForGraph {
    let mut wfg = WaitForGraph::new();
    for (resource, (holders, waiter)) in resources.contended() {
        if !waiter_fresh(waiter, resource, registry) || !endpoint_live(waiter, registry) {
            continue;
        }
        let mut held: Vec<TransactionId> = holders.keys().copied().collect();
        held.sort_unstable();
        for holder in held {
            if holder != waiter && endpoint_live(holder, registry) {
                wfg.add_edge(waiter, holder);
            }
        }
    }
    wfg
}

/// Enumerate this node's cross-node wait edges, annotated with the home
/// nodes of both endpoints. Only edges whose endpoints live on different
/// nodes are emitted.
pub fn collect_cross_node_edges(
    resources: &ResourceManager,
    registry: &TransactionRegistry,
) -> Vec<WfdEdge> {
    let mut edges = Vec::new();
    for (resource, (holders, waiter)) in resources.contended() {
        if !waiter_fresh(waiter, resource, registry) || !endpoint_live(waiter, registry) {
            continue;
        }
        let mut held: Vec<TransactionId> = holders.keys().copied().collect();
        held.sort_unstable();
        for holder in held {
            if holder == waiter || !endpoint_live(holder, registry) {
                continue;
            }
            let waiting_node = waiter.home_node();
            let holding_node = holder.home_node();
            if waiting_node != holding_node {
                edges.push(WfdEdge {
                    waiting_txn: waiter,
                    holding_txn: holder,
                    waiting_node,
                    holding_node,
                });
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawklock_types::{LockMode, LockStep, NodeId, ResourceId, ResourcePartition};
    use std::time::Duration;

    fn setup() -> (ResourceManager, TransactionRegistry) {
        let partition = ResourcePartition::new(2, 100);
        (
            ResourceManager::new(NodeId(1), partition),
            TransactionRegistry::new(NodeId(1)),
        )
    }

    #[test]
    fn local_wait_produces_edge() {
        let (mut rm, mut reg) = setup();
        let r = ResourceId(1);
        let holder = reg.begin(vec![LockStep::exclusive(r)], Duration::ZERO);
        let waiter = reg.begin(vec![LockStep::exclusive(r)], Duration::ZERO);

        rm.acquire(holder, r, LockMode::Exclusive);
        reg.record_grant(holder, r, LockMode::Exclusive);
        rm.acquire(waiter, r, LockMode::Exclusive);
        reg.mark_blocked(waiter, r);

        let wfg = build_pruned_local_wfg(&rm, &reg);
        assert!(wfg.contains_edge(waiter, holder));
        assert_eq!(wfg.len(), 1);
    }

    #[test]
    fn stale_queue_entry_is_skipped() {
        let (mut rm, mut reg) = setup();
        let r = ResourceId(1);
        let holder = reg.begin(vec![], Duration::ZERO);
        let waiter = reg.begin(vec![], Duration::ZERO);

        rm.acquire(holder, r, LockMode::Exclusive);
        rm.acquire(waiter, r, LockMode::Exclusive);
        // The registry never marked the waiter blocked: the queue entry is
        // stale from the builder's point of view.
        let wfg = build_pruned_local_wfg(&rm, &reg);
        assert!(wfg.is_empty());
    }

    #[test]
    fn finished_local_endpoint_is_pruned() {
        let (mut rm, mut reg) = setup();
        let r = ResourceId(1);
        let holder = reg.begin(vec![], Duration::ZERO);
        let waiter = reg.begin(vec![], Duration::ZERO);

        rm.acquire(holder, r, LockMode::Exclusive);
        rm.acquire(waiter, r, LockMode::Exclusive);
        reg.mark_blocked(waiter, r);
        reg.finish(holder, true, Duration::ZERO);

        let wfg = build_pruned_local_wfg(&rm, &reg);
        assert!(wfg.is_empty());
    }

    #[test]
    fn remote_endpoints_pass_the_prune_and_annotate_homes() {
        let (mut rm, mut reg) = setup();
        let r = ResourceId(1);
        // Both endpoints homed elsewhere; their queue/holder entries at the
        // owner are authoritative.
        let remote_holder = TransactionId::new(NodeId(2), 1);
        let remote_waiter = TransactionId::new(NodeId(2), 2);
        rm.acquire(remote_holder, r, LockMode::Exclusive);
        rm.acquire(remote_waiter, r, LockMode::Exclusive);

        let wfg = build_pruned_local_wfg(&rm, &reg);
        assert!(wfg.contains_edge(remote_waiter, remote_holder));

        // Same-home endpoints yield no cross-node edge.
        assert!(collect_cross_node_edges(&rm, &reg).is_empty());

        // A locally-homed waiter against the remote holder does.
        let local = reg.begin(vec![], Duration::ZERO);
        rm.remove_from_wait_queue(remote_waiter, r);
        rm.acquire(local, r, LockMode::Exclusive);
        reg.mark_blocked(local, r);

        let edges = collect_cross_node_edges(&rm, &reg);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].waiting_node, NodeId(1));
        assert_eq!(edges[0].holding_node, NodeId(2));
    }
}
