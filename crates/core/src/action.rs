//! Action types for the deterministic state machine.

use crate::{Event, TimerId};
use hawklock_messages::Message;
use hawklock_types::{NodeId, TransactionId};
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ─── Network ───
    /// Send a message to a single peer. `to` may be [`NodeId::BROADCAST`]
    /// when replying to an operator client.
    Send { to: NodeId, message: Message },

    /// Fan the message out to every peer except the sender.
    Broadcast { message: Message },

    // ─── Timers ───
    /// Set a timer to fire after a duration.
    ///
    /// Timers are one-shot; periodic loops re-arm from their own handler.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ─── Internal ───
    /// Enqueue an internal event for immediate processing.
    ///
    /// Internal events are processed at the same timestamp with higher
    /// priority than external events, preserving causality.
    EnqueueInternal { event: Event },

    // ─── External notifications ───
    /// Emit a deadlock report for external observers (and any attached
    /// operator client). Only the coordinator produces these.
    EmitDeadlockReport {
        cycles: Vec<Vec<TransactionId>>,
        deadlock_count: u64,
    },

    /// Emit the final outcome of a transaction for latency accounting.
    EmitTransactionOutcome {
        txn: TransactionId,
        committed: bool,
        latency: Duration,
    },
}

impl Action {
    /// Check if this action performs network I/O.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::Send { .. } | Action::Broadcast { .. })
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Send { .. } => "Send",
            Action::Broadcast { .. } => "Broadcast",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
            Action::EmitDeadlockReport { .. } => "EmitDeadlockReport",
            Action::EmitTransactionOutcome { .. } => "EmitTransactionOutcome",
        }
    }
}
