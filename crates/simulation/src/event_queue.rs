//! Deterministic ordering key for the global event queue.

use hawklock_core::EventPriority;
use hawklock_types::NodeId;
use std::time::Duration;

/// Total order over scheduled events: virtual time first, then event
/// priority (internal before timer before network before client), then a
/// global insertion sequence as the unique tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    /// Virtual delivery time.
    pub time: Duration,
    /// Priority class of the event.
    pub priority: EventPriority,
    /// Unique insertion sequence; makes the order total.
    pub sequence: u64,
    /// The node this event is delivered to.
    pub node: NodeId,
}
