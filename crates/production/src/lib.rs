//! Production shell for a hawklock node.
//!
//! The deterministic node state machine stays synchronous; this crate
//! supplies the I/O around it: a TCP mesh transport with a length-delimited
//! bincode codec (ordered point-to-point delivery per peer pair), a
//! tokio-task timer manager, the event loop that drives the state machine,
//! and the operator client.

pub mod client;
pub mod codec;
pub mod config;
pub mod runner;
pub mod timers;
pub mod transport;

pub use config::{NetworkConfig, ProductionConfig};
pub use runner::ProductionRunner;
pub use timers::TimerManager;
pub use transport::{Transport, TransportError};

use tracing_subscriber::EnvFilter;

/// Initialize logging from `RUST_LOG`, falling back to the given level.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,hawklock={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
