//! Event types for the deterministic state machine.

use hawklock_messages::Message;
use hawklock_types::{LockStep, NodeId, TransactionId};

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
///
/// This ensures causality is preserved: internal events (consequences of
/// processing an event) are handled before new external inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    /// Processed first to maintain causality.
    Internal = 0,

    /// Timer events: scheduled by the node itself.
    Timer = 1,

    /// Network events: external inputs from other nodes.
    Network = 2,

    /// Client events: external inputs from users.
    Client = 3,
}

/// All possible events a node can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ─── Timers ───
    /// Centralized / path-pushing detection period elapsed.
    DetectionTimer,

    /// HAWK PAG sampling period elapsed (acted on by the coordinator).
    PagSampleTimer,

    /// HAWK zone detection period elapsed (acted on by zone leaders).
    ZoneDetectionTimer,

    // ─── Network ───
    /// A message arrived from a peer (or from an operator client, in which
    /// case `from` is [`NodeId::BROADCAST`]). The node's router dispatches
    /// on the message type.
    MessageReceived { from: NodeId, message: Message },

    // ─── Internal ───
    /// Advance a transaction by attempting its next operation.
    ///
    /// Enqueued whenever a transaction becomes runnable: on submission,
    /// after a local grant, and after a retry promotion.
    TransactionStep { txn: TransactionId },

    // ─── Client ───
    /// A client submitted a transaction with the given operation script.
    TransactionSubmitted { ops: Vec<LockStep> },
}

impl Event {
    /// Get the priority for this event type.
    ///
    /// Events at the same timestamp are processed in priority order,
    /// ensuring causality is preserved.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::TransactionStep { .. } => EventPriority::Internal,
            Event::DetectionTimer | Event::PagSampleTimer | Event::ZoneDetectionTimer => {
                EventPriority::Timer
            }
            Event::MessageReceived { .. } => EventPriority::Network,
            Event::TransactionSubmitted { .. } => EventPriority::Client,
        }
    }

    /// Check if this is an internal event (consequence of prior processing).
    pub fn is_internal(&self) -> bool {
        self.priority() == EventPriority::Internal
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::DetectionTimer => "DetectionTimer",
            Event::PagSampleTimer => "PagSampleTimer",
            Event::ZoneDetectionTimer => "ZoneDetectionTimer",
            Event::MessageReceived { .. } => "MessageReceived",
            Event::TransactionStep { .. } => "TransactionStep",
            Event::TransactionSubmitted { .. } => "TransactionSubmitted",
        }
    }
}
