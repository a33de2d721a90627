//! State machine trait.

use crate::{Action, Event};
use std::time::Duration;

/// A deterministic, synchronous state machine.
///
/// Implementations mutate themselves in response to events and return the
/// actions the runner should execute. They never perform I/O and never read
/// the wall clock: time only advances through [`StateMachine::set_time`].
pub trait StateMachine {
    /// Process one event, returning the resulting actions.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Advance the machine's notion of "now". Called by the runner before
    /// each `handle`.
    fn set_time(&mut self, now: Duration);
}
