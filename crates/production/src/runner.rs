//! Production event loop.
//!
//! Drives the synchronous node state machine from an mpsc event channel fed
//! by the transport and the timer manager. Internal events produced by
//! actions are processed before the next external event, preserving the
//! causality the simulation guarantees through priorities.

use crate::timers::TimerManager;
use crate::transport::Transport;
use hawklock_core::{Action, Event, StateMachine};
use hawklock_node::NodeStateMachine;
use std::collections::VecDeque;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Runs one node against real I/O.
pub struct ProductionRunner {
    node: NodeStateMachine,
    transport: Transport,
    timers: TimerManager,
    events: mpsc::Receiver<Event>,
    started_at: Instant,
}

impl ProductionRunner {
    /// Assemble a runner from an already-started transport. `events` is the
    /// channel the transport feeds; the timer manager shares it.
    pub fn new(
        node: NodeStateMachine,
        transport: Transport,
        event_tx: mpsc::Sender<Event>,
        events: mpsc::Receiver<Event>,
    ) -> Self {
        ProductionRunner {
            node,
            transport,
            timers: TimerManager::new(event_tx),
            events,
            started_at: Instant::now(),
        }
    }

    /// Run until ctrl-c. Arms the engine timers, then processes events.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let startup = self.node.initialize();
        self.execute(startup);
        info!(node = %self.node.node(), mode = ?self.node.config().mode, "node running");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!(node = %self.node.node(), "shutdown signal received");
                    break;
                }
                maybe_event = self.events.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.node.set_time(self.started_at.elapsed());
                    let mut pending = VecDeque::new();
                    pending.push_back(event);
                    while let Some(ev) = pending.pop_front() {
                        let actions = self.node.handle(ev);
                        pending.extend(self.execute(actions));
                    }
                }
            }
        }

        self.timers.cancel_all();
        self.transport.shutdown();
        info!(node = %self.node.node(), "node stopped");
        Ok(())
    }

    /// Execute a batch of actions, returning any internal events for
    /// immediate processing.
    fn execute(&mut self, actions: Vec<Action>) -> Vec<Event> {
        let mut internal = Vec::new();
        for action in actions {
            match action {
                Action::Send { to, message } => {
                    if let Err(e) = self.transport.send(to, message) {
                        warn!(node = %self.node.node(), error = %e, "send failed");
                    }
                }
                Action::Broadcast { message } => self.transport.broadcast(message),
                Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
                Action::CancelTimer { id } => self.timers.cancel_timer(id),
                Action::EnqueueInternal { event } => internal.push(event),
                Action::EmitDeadlockReport {
                    cycles,
                    deadlock_count,
                } => {
                    info!(
                        node = %self.node.node(),
                        cycles = cycles.len(),
                        total = deadlock_count,
                        "deadlock report"
                    );
                }
                Action::EmitTransactionOutcome {
                    txn,
                    committed,
                    latency,
                } => {
                    info!(
                        node = %self.node.node(),
                        %txn,
                        committed,
                        latency_ms = latency.as_millis() as u64,
                        "transaction finished"
                    );
                }
            }
        }
        internal
    }
}
