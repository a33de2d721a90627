//! Node state machine.
//!
//! Composes the resource manager, transaction registry, zone manager, and
//! the three detection engines into a single deterministic state machine.
//! The `handle` method is the message router: it dispatches received
//! messages by type, routes timers to the engine that owns them, and drives
//! transactions through internally-enqueued step events.
//!
//! Sends addressed to this node loop back through the router as internal
//! events, so engines can target "whoever is the home node" without casing
//! on self.

use hawklock_core::{Action, Event, StateMachine};
use hawklock_detect::{
    CentralizedState, HawkState, LockView, PathPushingState, ZoneManager,
};
use hawklock_locks::{lock_table, AcquireOutcome, ResourceManager, TransactionRegistry};
use hawklock_messages::Message;
use hawklock_types::{
    DetectionMode, LockMode, LockStep, NodeId, ResourceId, ResourcePartition, SystemConfig,
    TransactionId, TransactionStatus, WaitForGraph,
};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Combined per-node state machine.
pub struct NodeStateMachine {
    node: NodeId,
    config: SystemConfig,
    partition: ResourcePartition,

    resources: ResourceManager,
    registry: TransactionRegistry,
    zones: ZoneManager,

    centralized: CentralizedState,
    path_pushing: PathPushingState,
    hawk: HawkState,

    now: Duration,
}

impl std::fmt::Debug for NodeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateMachine")
            .field("node", &self.node)
            .field("mode", &self.config.mode)
            .field("active_txns", &self.registry.active_count())
            .field("now", &self.now)
            .finish()
    }
}

/// Read-only lock context handed to the path-pushing engine.
struct NodeLockView<'a> {
    resources: &'a ResourceManager,
    registry: &'a TransactionRegistry,
    partition: ResourcePartition,
}

impl LockView for NodeLockView<'_> {
    fn waiting_for(&self, txn: TransactionId) -> Option<ResourceId> {
        self.registry.waiting_for(txn)
    }

    fn holders_of(&self, resource: ResourceId) -> Vec<TransactionId> {
        let mut holders: Vec<TransactionId> = self
            .resources
            .holders_of(resource)
            .map(|hs| hs.keys().copied().collect())
            .unwrap_or_default();
        holders.sort_unstable();
        holders
    }

    fn is_queued(&self, txn: TransactionId, resource: ResourceId) -> bool {
        self.resources.is_queued(txn, resource)
    }

    fn owner_of(&self, resource: ResourceId) -> NodeId {
        self.partition.owner_of(resource)
    }
}

impl NodeStateMachine {
    /// Create a node state machine.
    pub fn new(node: NodeId, config: SystemConfig) -> Self {
        let partition = config.partition();
        NodeStateMachine {
            node,
            resources: ResourceManager::new(node, partition),
            registry: TransactionRegistry::new(node),
            zones: ZoneManager::new(node),
            centralized: CentralizedState::new(
                node,
                config.coordinator,
                config.num_nodes,
                config.detection_interval,
            ),
            path_pushing: PathPushingState::new(
                node,
                config.coordinator,
                config.detection_interval,
            ),
            hawk: HawkState::new(node, &config),
            partition,
            config,
            now: Duration::ZERO,
        }
    }

    /// Startup actions: arm the timers of the configured engine.
    pub fn initialize(&mut self) -> Vec<Action> {
        match self.config.mode {
            DetectionMode::None => vec![],
            DetectionMode::Centralized => self.centralized.startup(),
            DetectionMode::PathPushing => self.path_pushing.startup(),
            DetectionMode::Hawk => self.hawk.startup(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// This node's id.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The system configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// The transaction registry.
    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// The transaction registry, mutably (latency draining).
    pub fn registry_mut(&mut self) -> &mut TransactionRegistry {
        &mut self.registry
    }

    /// The resource manager.
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// The zone manager.
    pub fn zones(&self) -> &ZoneManager {
        &self.zones
    }

    /// The centralized engine state.
    pub fn centralized(&self) -> &CentralizedState {
        &self.centralized
    }

    /// The HAWK engine state.
    pub fn hawk(&self) -> &HawkState {
        &self.hawk
    }

    /// The path-pushing engine state.
    pub fn path_pushing(&self) -> &PathPushingState {
        &self.path_pushing
    }

    /// Begin a transaction with the given operation script. Returns the id
    /// and the actions that start driving it.
    pub fn submit_transaction(&mut self, ops: Vec<LockStep>) -> (TransactionId, Vec<Action>) {
        let txn = self.registry.begin(ops, self.now);
        (
            txn,
            vec![Action::EnqueueInternal {
                event: Event::TransactionStep { txn },
            }],
        )
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────

    fn dispatch(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::DetectionTimer => self.on_detection_timer(),
            Event::PagSampleTimer => {
                let own = lock_table::collect_cross_node_edges(&self.resources, &self.registry);
                self.hawk.on_pag_sample_timer(own)
            }
            Event::ZoneDetectionTimer => {
                let own = lock_table::build_pruned_local_wfg(&self.resources, &self.registry);
                let active = self.registry.active_set();
                let members = self.zones.members().to_vec();
                let is_leader = self.zones.is_leader();
                self.hawk
                    .on_zone_detection_timer(is_leader, &members, own, &active)
            }
            Event::MessageReceived { from, message } => self.on_message(from, message),
            Event::TransactionStep { txn } => self.step_transaction(txn),
            Event::TransactionSubmitted { ops } => self.submit_transaction(ops).1,
        }
    }

    fn on_detection_timer(&mut self) -> Vec<Action> {
        match self.config.mode {
            DetectionMode::Centralized => {
                let own = lock_table::build_pruned_local_wfg(&self.resources, &self.registry);
                let active = self.registry.active_set();
                self.centralized.on_detection_timer(own, &active)
            }
            DetectionMode::PathPushing => {
                let blocked = self.registry.blocked();
                self.path_pushing.on_detection_timer(&blocked)
            }
            _ => vec![],
        }
    }

    /// The message router: dispatch by message type.
    fn on_message(&mut self, from: NodeId, message: Message) -> Vec<Action> {
        trace!(node = %self.node, %from, msg = message.type_name(), "routing message");
        match message {
            Message::LockRequest {
                txn,
                resource,
                mode,
            } => self.on_lock_request(from, txn, resource, mode),

            Message::LockResponse {
                txn,
                resource,
                granted,
            } => self.on_lock_response(txn, resource, granted),

            Message::ReleaseLockRequest { txn, resource } => {
                self.on_release_request(from, txn, resource)
            }

            Message::ReleaseLockResponse { .. } => vec![],

            Message::WfgRequest => {
                let wfg = lock_table::build_pruned_local_wfg(&self.resources, &self.registry);
                vec![Action::Send {
                    to: from,
                    message: Message::WfgReport { wfg },
                }]
            }

            Message::WfgReport { wfg } => {
                let active = self.registry.active_set();
                self.centralized.on_wfg_report(from, &wfg, &active)
            }

            Message::PagRequest => {
                let edges =
                    lock_table::collect_cross_node_edges(&self.resources, &self.registry);
                vec![Action::Send {
                    to: from,
                    message: Message::PagResponse { edges },
                }]
            }

            Message::PagResponse { edges } => self.hawk.on_pag_response(from, edges),

            Message::DeadlockResolution { txns } | Message::AbortTransaction { txns } => {
                let mut actions = Vec::new();
                for txn in txns {
                    actions.extend(self.apply_abort(txn));
                }
                actions
            }

            Message::DistributedDetectionInit { zones } => {
                self.zones.install(&zones);
                vec![]
            }

            Message::ZoneDetectionRequest { leader, .. } => {
                let wfg = lock_table::build_pruned_local_wfg(&self.resources, &self.registry);
                vec![Action::Send {
                    to: leader,
                    message: Message::ZoneWfgReport { wfg },
                }]
            }

            Message::ZoneWfgReport { wfg } => {
                let active = self.registry.active_set();
                let is_leader = self.zones.is_leader();
                self.hawk.on_zone_wfg_report(from, &wfg, is_leader, &active)
            }

            Message::CentralWfgReportFromZone {
                wfg,
                cycles,
                deadlock_count,
            } => {
                let active = self.registry.active_set();
                self.hawk
                    .on_central_report(from, &wfg, cycles, deadlock_count, &active)
            }

            Message::PathPushingProbe { path, resource } => {
                let view = NodeLockView {
                    resources: &self.resources,
                    registry: &self.registry,
                    partition: self.partition,
                };
                self.path_pushing.on_probe(&path, resource, &view)
            }

            Message::ClientCollectWfgRequest => self.on_client_collect(from),
            Message::ClientPrintDeadlockRequest => self.on_client_print(from),
            Message::ClientResolveDeadlockRequest { txn } => self.on_client_resolve(from, txn),

            Message::ClientCollectWfgResponse { .. } | Message::DeadlockReportToClient { .. } => {
                debug!(
                    node = %self.node,
                    %from,
                    "dropping client-bound message delivered to a node"
                );
                vec![]
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lock protocol
    // ─────────────────────────────────────────────────────────────────────

    fn on_lock_request(
        &mut self,
        from: NodeId,
        txn: TransactionId,
        resource: ResourceId,
        mode: LockMode,
    ) -> Vec<Action> {
        match self.resources.acquire(txn, resource, mode) {
            AcquireOutcome::Granted => vec![Action::Send {
                to: txn.home_node(),
                message: Message::LockResponse {
                    txn,
                    resource,
                    granted: true,
                },
            }],
            // The response is deferred until the queued request reaches the
            // head of the wait queue and is promoted.
            AcquireOutcome::Queued => vec![],
            AcquireOutcome::NotOwned => {
                warn!(
                    node = %self.node,
                    %from,
                    %txn,
                    %resource,
                    "lock request for resource this node does not own"
                );
                vec![Action::Send {
                    to: from,
                    message: Message::LockResponse {
                        txn,
                        resource,
                        granted: false,
                    },
                }]
            }
        }
    }

    fn on_lock_response(
        &mut self,
        txn: TransactionId,
        resource: ResourceId,
        granted: bool,
    ) -> Vec<Action> {
        if !self.registry.is_active(txn) {
            debug!(node = %self.node, %txn, %resource, "lock response for finished transaction");
            if granted {
                // The grant is orphaned at the owner; hand it back.
                return vec![Action::Send {
                    to: self.partition.owner_of(resource),
                    message: Message::ReleaseLockRequest { txn, resource },
                }];
            }
            return vec![];
        }

        if granted {
            let mode = self
                .registry
                .get(txn)
                .and_then(|t| t.current_op())
                .map(|op| op.mode)
                .unwrap_or(LockMode::Shared);
            self.registry.record_grant(txn, resource, mode);
            vec![Action::EnqueueInternal {
                event: Event::TransactionStep { txn },
            }]
        } else {
            // Only ownership violations answer with a denial; the request
            // was misrouted, so the transaction cannot make progress.
            warn!(node = %self.node, %txn, %resource, "remote lock request rejected, aborting");
            self.apply_abort(txn)
        }
    }

    fn on_release_request(
        &mut self,
        from: NodeId,
        txn: TransactionId,
        resource: ResourceId,
    ) -> Vec<Action> {
        let held = self.resources.release(txn, resource);
        let dequeued = self.resources.remove_from_wait_queue(txn, resource);
        let mut actions = Vec::new();
        if held || dequeued {
            actions.extend(self.promote_and_notify(resource));
        }
        actions.push(Action::Send {
            to: from,
            message: Message::ReleaseLockResponse { txn, resource },
        });
        actions
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transaction driver
    // ─────────────────────────────────────────────────────────────────────

    fn step_transaction(&mut self, txn: TransactionId) -> Vec<Action> {
        let Some(tx) = self.registry.get(txn) else {
            return vec![];
        };
        if tx.status == TransactionStatus::Blocked {
            return vec![];
        }
        let Some(op) = tx.current_op() else {
            return self.finish_transaction(txn, true);
        };

        let owner = self.partition.owner_of(op.resource);
        if owner == self.node {
            match self.resources.acquire(txn, op.resource, op.mode) {
                AcquireOutcome::Granted => {
                    self.registry.record_grant(txn, op.resource, op.mode);
                    vec![Action::EnqueueInternal {
                        event: Event::TransactionStep { txn },
                    }]
                }
                AcquireOutcome::Queued => {
                    self.registry.mark_blocked(txn, op.resource);
                    vec![]
                }
                AcquireOutcome::NotOwned => {
                    warn!(node = %self.node, %txn, res = %op.resource, "ownership map disagrees");
                    vec![]
                }
            }
        } else {
            // Remote acquisition: suspend until the owner's LockResponse.
            self.registry.mark_blocked(txn, op.resource);
            vec![Action::Send {
                to: owner,
                message: Message::LockRequest {
                    txn,
                    resource: op.resource,
                    mode: op.mode,
                },
            }]
        }
    }

    /// Commit or abort: release everything, wake waiters, notify owners of
    /// remote locks, record the outcome.
    fn finish_transaction(&mut self, txn: TransactionId, committed: bool) -> Vec<Action> {
        let Some(tx) = self.registry.finish(txn, committed, self.now) else {
            return vec![];
        };

        let mut actions = Vec::new();

        let released = self.resources.release_all(txn);
        for resource in released {
            actions.extend(self.promote_and_notify(resource));
        }

        let mut remote: Vec<ResourceId> = tx
            .locks
            .keys()
            .copied()
            .filter(|r| self.partition.owner_of(*r) != self.node)
            .collect();
        remote.sort_unstable();
        for resource in remote {
            actions.push(Action::Send {
                to: self.partition.owner_of(resource),
                message: Message::ReleaseLockRequest { txn, resource },
            });
        }

        if let Some(resource) = tx.waiting_for {
            if self.partition.owner_of(resource) == self.node {
                self.resources.remove_from_wait_queue(txn, resource);
            } else {
                actions.push(Action::Send {
                    to: self.partition.owner_of(resource),
                    message: Message::ReleaseLockRequest { txn, resource },
                });
            }
        }

        actions.push(Action::EmitTransactionOutcome {
            txn,
            committed,
            latency: self.now.saturating_sub(tx.started_at),
        });
        actions
    }

    /// Wake eligible waiters on a freshly released resource: local waiters
    /// re-enter the driver, remote waiters get their deferred LockResponse.
    fn promote_and_notify(&mut self, resource: ResourceId) -> Vec<Action> {
        let mut actions = Vec::new();
        for (waiter, mode) in self.resources.promote_waiters(resource) {
            if waiter.home_node() == self.node {
                self.registry.record_grant(waiter, resource, mode);
                actions.push(Action::EnqueueInternal {
                    event: Event::TransactionStep { txn: waiter },
                });
            } else {
                actions.push(Action::Send {
                    to: waiter.home_node(),
                    message: Message::LockResponse {
                        txn: waiter,
                        resource,
                        granted: true,
                    },
                });
            }
        }
        actions
    }

    // ─────────────────────────────────────────────────────────────────────
    // Abort pipeline
    // ─────────────────────────────────────────────────────────────────────

    /// Apply an incoming abort signal. Unknown or already-finished
    /// transactions are ignored with a log line; repeats are no-ops.
    fn apply_abort(&mut self, txn: TransactionId) -> Vec<Action> {
        if !self.registry.is_active(txn) {
            debug!(node = %self.node, %txn, "ignoring abort for unknown transaction");
            return vec![];
        }
        debug!(node = %self.node, %txn, "aborting transaction");
        self.finish_transaction(txn, false)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Client surface (coordinator only)
    // ─────────────────────────────────────────────────────────────────────

    fn on_client_collect(&mut self, from: NodeId) -> Vec<Action> {
        if !self.config.is_coordinator(self.node) {
            return vec![];
        }
        let wfg: WaitForGraph = match self.config.mode {
            DetectionMode::Hawk => self.hawk.last_aggregated().clone(),
            _ => self.centralized.last_aggregated().clone(),
        };
        vec![Action::Send {
            to: from,
            message: Message::ClientCollectWfgResponse { wfg },
        }]
    }

    fn on_client_print(&mut self, from: NodeId) -> Vec<Action> {
        if !self.config.is_coordinator(self.node) {
            return vec![];
        }
        let (cycles, deadlock_count) = match self.config.mode {
            DetectionMode::Hawk => (
                self.hawk.detected_cycles().to_vec(),
                self.hawk.deadlock_count(),
            ),
            _ => (
                self.centralized.detected_cycles().to_vec(),
                self.centralized.deadlock_count(),
            ),
        };
        vec![Action::Send {
            to: from,
            message: Message::DeadlockReportToClient {
                cycles,
                deadlock_count,
            },
        }]
    }

    fn on_client_resolve(&mut self, from: NodeId, txn: TransactionId) -> Vec<Action> {
        if !self.config.is_coordinator(self.node) {
            return vec![];
        }
        vec![
            Action::Send {
                to: txn.home_node(),
                message: Message::AbortTransaction { txns: vec![txn] },
            },
            Action::Send {
                to: from,
                message: Message::DeadlockReportToClient {
                    cycles: vec![],
                    deadlock_count: 0,
                },
            },
        ]
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loopback
    // ─────────────────────────────────────────────────────────────────────

    /// Convert sends addressed to this node into internal router events, so
    /// self-addressed protocol traffic needs no network round-trip.
    fn loopback(&self, actions: Vec<Action>) -> Vec<Action> {
        actions
            .into_iter()
            .map(|action| match action {
                Action::Send { to, message } if to == self.node => Action::EnqueueInternal {
                    event: Event::MessageReceived {
                        from: self.node,
                        message,
                    },
                },
                other => other,
            })
            .collect()
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        let actions = self.dispatch(event);
        self.loopback(actions)
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.hawk.set_time(now);
    }
}
