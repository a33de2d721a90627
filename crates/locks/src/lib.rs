//! Local lock and transaction infrastructure.
//!
//! Three pieces, owned by every node:
//!
//! - [`ResourceManager`]: holders and FIFO wait queues for locally-owned
//!   resources, with no-barging admission and waiter promotion on release.
//! - [`TransactionRegistry`]: the arena of transactions homed on this node,
//!   with their operation scripts, acquired locks, and lifecycle.
//! - [`lock_table`]: snapshot-style construction of the local wait-for
//!   graph and the cross-node wait edges that feed the detection engines.

mod registry;
mod resource;

pub mod lock_table;

pub use registry::{Transaction, TransactionRegistry};
pub use resource::{AcquireOutcome, ResourceManager};
