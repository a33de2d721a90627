//! Centralized detection engine.
//!
//! Every detection period the coordinator clears its aggregate, broadcasts
//! a WFG request to all nodes (merging its own report inline), and closes
//! the round once the expected number of reports has arrived: find cycles
//! on the active-pruned aggregate, abort one victim per cycle, and emit a
//! client report. Reports arriving after a round closed are applied to the
//! next round. Missing reports only delay detection; stale edges disappear
//! on the next round.

use crate::resolution::resolve;
use hawklock_core::{Action, TimerId};
use hawklock_messages::Message;
use hawklock_types::{NodeId, TransactionId, WaitForGraph};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, trace};

/// Coordinator-side state of the centralized engine. Present on every node;
/// only the coordinator's instance ever aggregates.
#[derive(Debug)]
pub struct CentralizedState {
    node: NodeId,
    is_coordinator: bool,
    detection_interval: Duration,
    reports_expected: u32,

    aggregated: WaitForGraph,
    reports_received: u32,

    /// Snapshot of the last completed round, served to client collects.
    last_aggregated: WaitForGraph,
    /// Cycles found since boot, served to client prints.
    detected_cycles: Vec<Vec<TransactionId>>,
    /// Deadlocks found since boot.
    deadlock_count: u64,
    rounds_completed: u64,
}

impl CentralizedState {
    /// Create the engine state for `node`.
    pub fn new(
        node: NodeId,
        coordinator: NodeId,
        num_nodes: u32,
        detection_interval: Duration,
    ) -> Self {
        CentralizedState {
            node,
            is_coordinator: node == coordinator,
            detection_interval,
            reports_expected: num_nodes,
            aggregated: WaitForGraph::new(),
            reports_received: 0,
            last_aggregated: WaitForGraph::new(),
            detected_cycles: Vec::new(),
            deadlock_count: 0,
            rounds_completed: 0,
        }
    }

    /// Actions to start the engine: arm the detection timer.
    pub fn startup(&self) -> Vec<Action> {
        vec![Action::SetTimer {
            id: TimerId::Detection,
            duration: self.detection_interval,
        }]
    }

    /// Detection period elapsed. The coordinator opens a new round:
    /// clears the aggregate, broadcasts the request, and merges its own
    /// pruned local WFG inline. Other nodes just re-arm the timer.
    pub fn on_detection_timer(
        &mut self,
        own_report: WaitForGraph,
        local_active: &HashSet<TransactionId>,
    ) -> Vec<Action> {
        let mut actions = vec![Action::SetTimer {
            id: TimerId::Detection,
            duration: self.detection_interval,
        }];
        if !self.is_coordinator {
            return actions;
        }

        self.aggregated.clear();
        self.reports_received = 0;
        trace!(node = %self.node, "centralized round opened, requesting WFG reports");
        actions.push(Action::Broadcast {
            message: Message::WfgRequest,
        });
        actions.extend(self.merge_report(self.node, &own_report, local_active));
        actions
    }

    /// A node's WFG report arrived at the coordinator.
    pub fn on_wfg_report(
        &mut self,
        from: NodeId,
        wfg: &WaitForGraph,
        local_active: &HashSet<TransactionId>,
    ) -> Vec<Action> {
        if !self.is_coordinator {
            trace!(node = %self.node, %from, "ignoring WFG report on non-coordinator");
            return vec![];
        }
        self.merge_report(from, wfg, local_active)
    }

    fn merge_report(
        &mut self,
        from: NodeId,
        wfg: &WaitForGraph,
        local_active: &HashSet<TransactionId>,
    ) -> Vec<Action> {
        self.aggregated.merge(wfg);
        self.reports_received += 1;
        trace!(
            node = %self.node,
            %from,
            received = self.reports_received,
            expected = self.reports_expected,
            "merged WFG report"
        );

        if self.reports_received < self.reports_expected {
            return vec![];
        }
        self.close_round(local_active)
    }

    fn close_round(&mut self, local_active: &HashSet<TransactionId>) -> Vec<Action> {
        let res = resolve(self.node, &self.aggregated, local_active);
        self.last_aggregated = res.pruned;
        self.aggregated.clear();
        self.reports_received = 0;
        self.rounds_completed += 1;

        let mut actions = res.aborts;
        if !res.report.is_empty() {
            debug!(
                node = %self.node,
                cycles = res.report.cycles.len(),
                "centralized round found deadlocks"
            );
            self.deadlock_count += res.report.cycles.len() as u64;
            self.detected_cycles
                .extend(res.report.cycles.iter().cloned());
            actions.push(Action::EmitDeadlockReport {
                cycles: res.report.cycles,
                deadlock_count: self.deadlock_count,
            });
        }
        actions
    }

    /// Aggregated WFG snapshot from the last completed round (client
    /// collect surface).
    pub fn last_aggregated(&self) -> &WaitForGraph {
        &self.last_aggregated
    }

    /// Cycles found since boot (client print surface).
    pub fn detected_cycles(&self) -> &[Vec<TransactionId>] {
        &self.detected_cycles
    }

    /// Total deadlocks found since boot.
    pub fn deadlock_count(&self) -> u64 {
        self.deadlock_count
    }

    /// Completed aggregation rounds since boot.
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(node: u32, seq: u32) -> TransactionId {
        TransactionId::new(NodeId(node), seq)
    }

    fn coordinator(num_nodes: u32) -> CentralizedState {
        CentralizedState::new(NodeId(1), NodeId(1), num_nodes, Duration::from_millis(50))
    }

    #[test]
    fn timer_on_non_coordinator_only_rearms() {
        let mut state =
            CentralizedState::new(NodeId(2), NodeId(1), 3, Duration::from_millis(50));
        let actions = state.on_detection_timer(WaitForGraph::new(), &HashSet::new());
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], Action::SetTimer { .. }));
    }

    #[test]
    fn round_closes_after_expected_reports() {
        let mut state = coordinator(2);
        let active = HashSet::from([txn(1, 1)]);

        // Own (empty) report opens the round.
        let actions = state.on_detection_timer(WaitForGraph::new(), &active);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Broadcast { .. })));

        // The second node reports a two-cycle.
        let mut wfg = WaitForGraph::new();
        wfg.add_edge(txn(1, 1), txn(2, 1));
        wfg.add_edge(txn(2, 1), txn(1, 1));
        let actions = state.on_wfg_report(NodeId(2), &wfg, &active);

        // One abort and one client report.
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Send {
                message: Message::AbortTransaction { .. },
                ..
            }
        )));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitDeadlockReport { .. })));
        assert_eq!(state.deadlock_count(), 1);
        assert_eq!(state.rounds_completed(), 1);
        assert!(!state.last_aggregated().is_empty());
    }

    #[test]
    fn late_reports_roll_into_next_round() {
        let mut state = coordinator(2);
        let active = HashSet::new();

        state.on_detection_timer(WaitForGraph::new(), &active);
        state.on_wfg_report(NodeId(2), &WaitForGraph::new(), &active);
        assert_eq!(state.rounds_completed(), 1);

        // A straggler from the previous round counts toward the next one.
        let actions = state.on_wfg_report(NodeId(2), &WaitForGraph::new(), &active);
        assert!(actions.is_empty());
        assert_eq!(state.rounds_completed(), 1);
    }

    #[test]
    fn reports_on_non_coordinator_are_dropped() {
        let mut state =
            CentralizedState::new(NodeId(3), NodeId(1), 2, Duration::from_millis(50));
        let actions = state.on_wfg_report(NodeId(2), &WaitForGraph::new(), &HashSet::new());
        assert!(actions.is_empty());
        assert_eq!(state.rounds_completed(), 0);
    }
}
