//! Shared detection-round resolution: prune, find cycles, pick victims.

use crate::cycle::{self, CycleReport};
use crate::victim::select_victim;
use hawklock_core::Action;
use hawklock_messages::Message;
use hawklock_types::{NodeId, TransactionId, WaitForGraph};
use std::collections::HashSet;
use tracing::info;

/// Outcome of resolving one aggregated graph.
pub(crate) struct Resolution {
    /// The graph after the home-aware activity prune.
    pub pruned: WaitForGraph,
    /// Cycles found in the pruned graph.
    pub report: CycleReport,
    /// One abort signal per detected cycle, addressed to the victim's home
    /// node. Duplicate victims across rotations of the same cycle produce
    /// duplicate signals; aborts are idempotent.
    pub aborts: Vec<Action>,
}

/// Prune `graph` with the home-aware activity rule, enumerate cycles, and
/// select a victim per cycle.
///
/// `node` is the resolving node and `local_active` its registry's active
/// set: an endpoint is pruned only when it is homed on `node` and absent
/// from `local_active`; remote endpoints pass through.
pub(crate) fn resolve(
    node: NodeId,
    graph: &WaitForGraph,
    local_active: &HashSet<TransactionId>,
) -> Resolution {
    let pruned = graph.pruned(|t| t.home_node() != node || local_active.contains(&t));

    let report = cycle::find_cycles(&pruned);
    let mut aborts = Vec::new();

    for cycle in &report.cycles {
        if let Some(victim) = select_victim(cycle, &report.frequency) {
            info!(
                node = %node,
                %victim,
                cycle_len = cycle.len(),
                "deadlock cycle detected, aborting victim"
            );
            aborts.push(Action::Send {
                to: victim.home_node(),
                message: Message::AbortTransaction {
                    txns: vec![victim],
                },
            });
        }
    }

    Resolution {
        pruned,
        report,
        aborts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(node: u32, seq: u32) -> TransactionId {
        TransactionId::new(NodeId(node), seq)
    }

    #[test]
    fn resolution_targets_victim_home_node() {
        let mut g = WaitForGraph::new();
        g.add_edge(txn(1, 1), txn(2, 1));
        g.add_edge(txn(2, 1), txn(1, 1));

        let active = HashSet::from([txn(1, 1)]);
        let res = resolve(NodeId(1), &g, &active);

        assert_eq!(res.report.cycles.len(), 1);
        assert_eq!(res.aborts.len(), 1);
        let Action::Send { to, message } = &res.aborts[0] else {
            panic!("expected send");
        };
        // Victim is the smaller id (tie on frequency), homed on node 1.
        assert_eq!(*to, NodeId(1));
        assert_eq!(
            *message,
            Message::AbortTransaction {
                txns: vec![txn(1, 1)]
            }
        );
    }

    #[test]
    fn finished_local_transactions_are_pruned_before_detection() {
        let mut g = WaitForGraph::new();
        g.add_edge(txn(1, 1), txn(1, 2));
        g.add_edge(txn(1, 2), txn(1, 1));

        // txn(1,2) is no longer active on the resolving node.
        let active = HashSet::from([txn(1, 1)]);
        let res = resolve(NodeId(1), &g, &active);
        assert!(res.report.is_empty());
        assert!(res.aborts.is_empty());
    }
}
