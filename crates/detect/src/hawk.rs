//! HAWK: hierarchical/adaptive deadlock detection.
//!
//! Three cooperating roles, all hosted in this one state struct:
//!
//! - **Coordinator, PAG sampling**: every sampling period, broadcast
//!   `PagRequest`; once all nodes have answered with their cross-node wait
//!   edges, evaluate the adaptive re-cut condition and, when it fires, cut
//!   the sampled precedence graph into detection zones by SCC and broadcast
//!   `DistributedDetectionInit`.
//! - **Zone leader, detection rounds**: every zone period, collect pruned
//!   local WFGs from zone members (own report merged inline), detect on the
//!   merged graph, abort victims, and escalate graph + results to the
//!   coordinator.
//! - **Coordinator, escalation**: accumulate zone escalations; once reports
//!   from all nodes are in, detect on the union graph, abort residual
//!   victims, report to the client, and clear.
//!
//! The adaptive counters: CZ counts deadlocks detected at zone leaders, CR
//! deadlocks detected at the central aggregator. Over each check window,
//! re-cut fires iff `ΔZ > 0 ∧ ΔR/ΔZ > R_THRESHOLD`, or `ΔZ = 0 ∧ ΔR > 0`:
//! when the central layer catches most deadlocks the current partition is
//! too fine, while zones catching everything means it is adequate.
//!
//! Failure semantics: a dropped message delays at most one period. Phantom
//! zone members are harmless; their reports are merged anyway. A node
//! hearing a new configuration always replaces, never merges.

use crate::pag::cut_zones;
use crate::resolution::resolve;
use hawklock_core::{Action, TimerId};
use hawklock_messages::Message;
use hawklock_types::{
    NodeId, PrecedenceGraph, SystemConfig, TransactionId, WaitForGraph, WfdEdge,
};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Per-node HAWK engine state.
#[derive(Debug)]
pub struct HawkState {
    node: NodeId,
    coordinator: NodeId,
    num_nodes: u32,
    scc_cut_threshold: usize,
    r_threshold: f64,
    check_interval: Duration,
    pag_sample_interval: Duration,
    zone_detection_interval: Duration,

    // ─── Coordinator: PAG sampling ───
    pag_edges: Vec<WfdEdge>,
    pag_responses_received: u32,

    // ─── Coordinator: adaptive re-cut counters ───
    /// CZ: deadlocks detected at zone leaders since boot.
    deadlocks_from_zones: u64,
    /// CR: deadlocks detected at the central aggregator since boot.
    deadlocks_from_central: u64,
    prev_deadlocks_from_zones: u64,
    prev_deadlocks_from_central: u64,
    last_check: Duration,
    recuts: u64,

    // ─── Zone leader: detection round ───
    zone_aggregated: WaitForGraph,
    zone_reports_received: u32,
    zone_reports_expected: u32,

    // ─── Coordinator: escalation ───
    central_aggregated: WaitForGraph,
    central_reports_received: u32,
    central_cycles: Vec<Vec<TransactionId>>,
    central_deadlock_count: u64,

    /// Client surfaces: last completed central union and cycles since boot.
    last_aggregated: WaitForGraph,
    detected_cycles: Vec<Vec<TransactionId>>,
    deadlock_count: u64,

    now: Duration,
}

impl HawkState {
    /// Create the engine state for `node`.
    pub fn new(node: NodeId, config: &SystemConfig) -> Self {
        HawkState {
            node,
            coordinator: config.coordinator,
            num_nodes: config.num_nodes,
            scc_cut_threshold: config.scc_cut_threshold,
            r_threshold: config.r_threshold,
            check_interval: config.check_interval,
            pag_sample_interval: config.pag_sample_interval,
            zone_detection_interval: config.zone_detection_interval,
            pag_edges: Vec::new(),
            pag_responses_received: 0,
            deadlocks_from_zones: 0,
            deadlocks_from_central: 0,
            prev_deadlocks_from_zones: 0,
            prev_deadlocks_from_central: 0,
            last_check: Duration::ZERO,
            recuts: 0,
            zone_aggregated: WaitForGraph::new(),
            zone_reports_received: 0,
            zone_reports_expected: 0,
            central_aggregated: WaitForGraph::new(),
            central_reports_received: 0,
            central_cycles: Vec::new(),
            central_deadlock_count: 0,
            last_aggregated: WaitForGraph::new(),
            detected_cycles: Vec::new(),
            deadlock_count: 0,
            now: Duration::ZERO,
        }
    }

    /// Advance the engine's notion of time.
    pub fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    /// Actions to start the engine: the zone timer runs everywhere (any
    /// node can become a leader); the PAG sampler only matters on the
    /// coordinator but is armed uniformly.
    pub fn startup(&self) -> Vec<Action> {
        vec![
            Action::SetTimer {
                id: TimerId::PagSample,
                duration: self.pag_sample_interval,
            },
            Action::SetTimer {
                id: TimerId::ZoneDetection,
                duration: self.zone_detection_interval,
            },
        ]
    }

    fn is_coordinator(&self) -> bool {
        self.node == self.coordinator
    }

    // ─────────────────────────────────────────────────────────────────────
    // PAG sampling (coordinator)
    // ─────────────────────────────────────────────────────────────────────

    /// Sampling period elapsed. The coordinator opens a sample round,
    /// merging its own cross-node edges inline.
    pub fn on_pag_sample_timer(&mut self, own_edges: Vec<WfdEdge>) -> Vec<Action> {
        let mut actions = vec![Action::SetTimer {
            id: TimerId::PagSample,
            duration: self.pag_sample_interval,
        }];
        if !self.is_coordinator() {
            return actions;
        }

        self.pag_edges.clear();
        self.pag_responses_received = 0;
        trace!(node = %self.node, "PAG sample round opened");
        actions.push(Action::Broadcast {
            message: Message::PagRequest,
        });
        actions.extend(self.merge_pag_response(self.node, own_edges));
        actions
    }

    /// A node's cross-node edge sample arrived at the coordinator.
    pub fn on_pag_response(&mut self, from: NodeId, edges: Vec<WfdEdge>) -> Vec<Action> {
        if !self.is_coordinator() {
            return vec![];
        }
        self.merge_pag_response(from, edges)
    }

    fn merge_pag_response(&mut self, from: NodeId, edges: Vec<WfdEdge>) -> Vec<Action> {
        self.pag_edges.extend(edges);
        self.pag_responses_received += 1;
        trace!(
            node = %self.node,
            %from,
            received = self.pag_responses_received,
            expected = self.num_nodes,
            "merged PAG response"
        );
        if self.pag_responses_received < self.num_nodes {
            return vec![];
        }
        self.close_sample_round()
    }

    /// All samples are in: evaluate the adaptive re-cut gate and, when it
    /// fires, recut zones and broadcast the new configuration. The
    /// coordinator installs the configuration on itself through its own
    /// router (send-to-self).
    fn close_sample_round(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        let elapsed = self.now.saturating_sub(self.last_check);
        if elapsed >= self.check_interval {
            let dz = self.deadlocks_from_zones - self.prev_deadlocks_from_zones;
            let dr = self.deadlocks_from_central - self.prev_deadlocks_from_central;
            self.prev_deadlocks_from_zones = self.deadlocks_from_zones;
            self.prev_deadlocks_from_central = self.deadlocks_from_central;
            self.last_check = self.now;

            let should_recut = if dz > 0 {
                dr as f64 / dz as f64 > self.r_threshold
            } else {
                dr > 0
            };

            if should_recut {
                let pag = PrecedenceGraph::from_edges(&self.pag_edges);
                let zones = cut_zones(&pag, self.num_nodes, self.scc_cut_threshold);
                self.recuts += 1;
                info!(
                    node = %self.node,
                    delta_zone = dz,
                    delta_central = dr,
                    zones = zones.len(),
                    "adaptive re-cut fired, broadcasting new detection zones"
                );
                let message = Message::DistributedDetectionInit { zones };
                actions.push(Action::Broadcast {
                    message: message.clone(),
                });
                actions.push(Action::Send {
                    to: self.node,
                    message,
                });
            } else {
                debug!(
                    node = %self.node,
                    delta_zone = dz,
                    delta_central = dr,
                    "re-cut gate not met, keeping current zones"
                );
            }
        }

        self.pag_edges.clear();
        self.pag_responses_received = 0;
        actions
    }

    // ─────────────────────────────────────────────────────────────────────
    // Zone detection (leader)
    // ─────────────────────────────────────────────────────────────────────

    /// Zone period elapsed. Leaders open a collection round over their
    /// members, merging their own pruned WFG inline; everyone else just
    /// re-arms.
    pub fn on_zone_detection_timer(
        &mut self,
        is_leader: bool,
        members: &[NodeId],
        own_report: WaitForGraph,
        local_active: &HashSet<TransactionId>,
    ) -> Vec<Action> {
        let mut actions = vec![Action::SetTimer {
            id: TimerId::ZoneDetection,
            duration: self.zone_detection_interval,
        }];
        if !is_leader {
            return actions;
        }

        self.zone_aggregated.clear();
        self.zone_reports_received = 0;
        self.zone_reports_expected = members.len() as u32;
        trace!(
            node = %self.node,
            members = members.len(),
            "zone detection round opened"
        );

        for &member in members {
            if member != self.node {
                actions.push(Action::Send {
                    to: member,
                    message: Message::ZoneDetectionRequest {
                        leader: self.node,
                        members: members.to_vec(),
                    },
                });
            }
        }
        actions.extend(self.merge_zone_report(self.node, &own_report, local_active));
        actions
    }

    /// A member's zone WFG report arrived at this (leader) node. Reports
    /// from phantom members of an old configuration are merged anyway.
    pub fn on_zone_wfg_report(
        &mut self,
        from: NodeId,
        wfg: &WaitForGraph,
        is_leader: bool,
        local_active: &HashSet<TransactionId>,
    ) -> Vec<Action> {
        if !is_leader {
            trace!(node = %self.node, %from, "ignoring zone report, not a leader");
            return vec![];
        }
        self.merge_zone_report(from, wfg, local_active)
    }

    fn merge_zone_report(
        &mut self,
        from: NodeId,
        wfg: &WaitForGraph,
        local_active: &HashSet<TransactionId>,
    ) -> Vec<Action> {
        self.zone_aggregated.merge(wfg);
        self.zone_reports_received += 1;
        trace!(
            node = %self.node,
            %from,
            received = self.zone_reports_received,
            expected = self.zone_reports_expected,
            "merged zone WFG report"
        );
        if self.zone_reports_expected == 0
            || self.zone_reports_received < self.zone_reports_expected
        {
            return vec![];
        }
        self.close_zone_round(local_active)
    }

    /// Zone round complete: detect, abort, and escalate to the coordinator.
    fn close_zone_round(&mut self, local_active: &HashSet<TransactionId>) -> Vec<Action> {
        let res = resolve(self.node, &self.zone_aggregated, local_active);
        self.zone_aggregated.clear();
        self.zone_reports_received = 0;

        let cycle_count = res.report.cycles.len() as u64;
        if cycle_count > 0 {
            debug!(
                node = %self.node,
                cycles = cycle_count,
                "zone round found deadlocks"
            );
        }

        let mut actions = res.aborts;
        if self.is_coordinator() {
            // Leader and coordinator in one: apply the escalation locally
            // instead of messaging ourselves across the network.
            actions.extend(self.on_central_report(
                self.node,
                &res.pruned,
                res.report.cycles,
                cycle_count,
                local_active,
            ));
        } else {
            actions.push(Action::Send {
                to: self.coordinator,
                message: Message::CentralWfgReportFromZone {
                    wfg: res.pruned,
                    cycles: res.report.cycles,
                    deadlock_count: cycle_count,
                },
            });
        }
        actions
    }

    // ─────────────────────────────────────────────────────────────────────
    // Coordinator escalation
    // ─────────────────────────────────────────────────────────────────────

    /// A zone leader's escalation arrived at the coordinator.
    pub fn on_central_report(
        &mut self,
        from: NodeId,
        wfg: &WaitForGraph,
        cycles: Vec<Vec<TransactionId>>,
        deadlock_count: u64,
        local_active: &HashSet<TransactionId>,
    ) -> Vec<Action> {
        if !self.is_coordinator() {
            return vec![];
        }

        self.central_aggregated.merge(wfg);
        self.central_reports_received += 1;
        self.deadlocks_from_zones += deadlock_count;
        self.central_deadlock_count += deadlock_count;
        self.central_cycles.extend(cycles);
        trace!(
            node = %self.node,
            %from,
            received = self.central_reports_received,
            expected = self.num_nodes,
            "merged central escalation report"
        );

        if self.central_reports_received < self.num_nodes {
            return vec![];
        }
        self.close_central_round(local_active)
    }

    /// Escalation round complete: detect on the union graph, count residual
    /// cycles as centrally-detected, abort their victims, and report.
    fn close_central_round(&mut self, local_active: &HashSet<TransactionId>) -> Vec<Action> {
        let res = resolve(self.node, &self.central_aggregated, local_active);
        self.last_aggregated = res.pruned;
        self.central_aggregated.clear();
        self.central_reports_received = 0;

        let central_found = res.report.cycles.len() as u64;
        self.deadlocks_from_central += central_found;
        self.central_deadlock_count += central_found;
        self.central_cycles.extend(res.report.cycles);

        let round_total = self.central_deadlock_count;
        let mut actions = res.aborts;
        if round_total > 0 {
            debug!(
                node = %self.node,
                zone_detected = round_total - central_found,
                central_detected = central_found,
                "escalation round complete"
            );
            self.deadlock_count += round_total;
            self.detected_cycles
                .extend(self.central_cycles.iter().cloned());
            actions.push(Action::EmitDeadlockReport {
                cycles: std::mem::take(&mut self.central_cycles),
                deadlock_count: round_total,
            });
        } else {
            self.central_cycles.clear();
        }
        self.central_deadlock_count = 0;
        actions
    }

    // ─────────────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────────────

    /// CZ: deadlocks detected at zone leaders since boot.
    pub fn deadlocks_from_zones(&self) -> u64 {
        self.deadlocks_from_zones
    }

    /// CR: deadlocks detected at the central aggregator since boot.
    pub fn deadlocks_from_central(&self) -> u64 {
        self.deadlocks_from_central
    }

    /// Re-cuts broadcast since boot.
    pub fn recuts(&self) -> u64 {
        self.recuts
    }

    /// Last completed central union (client collect surface).
    pub fn last_aggregated(&self) -> &WaitForGraph {
        &self.last_aggregated
    }

    /// Cycles reported since boot (client print surface).
    pub fn detected_cycles(&self) -> &[Vec<TransactionId>] {
        &self.detected_cycles
    }

    /// Total deadlocks reported since boot.
    pub fn deadlock_count(&self) -> u64 {
        self.deadlock_count
    }
}
