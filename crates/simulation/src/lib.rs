//! Deterministic simulation of a hawklock cluster.
//!
//! All nodes run in one process against a global, deterministically-ordered
//! event queue and a simulated network with configurable latency, jitter,
//! packet loss, and partitions. Given the same seed, a simulation produces
//! identical results every run.

mod event_queue;
mod network;
mod runner;

pub use event_queue::EventKey;
pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationRunner, SimulationStats, TransactionOutcome};
