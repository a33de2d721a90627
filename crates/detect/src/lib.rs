//! Deadlock detection for the hawklock distributed lock manager.
//!
//! This crate implements the three interoperable detection engines and the
//! graph machinery they share:
//!
//! - [`cycle::find_cycles`] - DFS cycle enumeration over a wait-for graph
//! - [`victim::select_victim`] - frequency-then-id victim policy
//! - [`pag`] - node-level precedence graph SCCs and zone cutting
//! - [`ZoneManager`] - this node's current zone membership
//! - [`CentralizedState`] - coordinator-aggregated detection
//! - [`PathPushingState`] - probe forwarding along wait chains
//! - [`HawkState`] - hierarchical/adaptive zone detection with coordinator
//!   escalation and adaptive re-cut
//!
//! Engines are synchronous sub-state machines: the node routes events to
//! them together with the local lock/registry context they need, and they
//! answer with actions.

pub mod cycle;
pub mod pag;
pub mod victim;

mod centralized;
mod hawk;
mod path_pushing;
mod resolution;
mod zone_manager;

pub use centralized::CentralizedState;
pub use hawk::HawkState;
pub use path_pushing::{LockView, PathPushingState};
pub use zone_manager::ZoneManager;
