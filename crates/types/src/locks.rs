//! Lock modes and transaction lifecycle types.

use crate::ResourceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lock compatibility modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Multiple transactions may hold concurrently.
    Shared,
    /// No concurrent access permitted.
    Exclusive,
}

impl LockMode {
    /// Shared/Shared is the only compatible pairing.
    pub fn compatible_with(&self, other: LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => write!(f, "SH"),
            LockMode::Exclusive => write!(f, "EX"),
        }
    }
}

/// Transaction lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Actively executing its operation script.
    Running,
    /// Queued on a resource (local or remote) and suspended.
    Blocked,
    /// Finished successfully; all locks released.
    Committed,
    /// Killed (deadlock victim or operator abort); all locks released.
    Aborted,
}

/// One step of a transaction's operation script: acquire a resource in a
/// given mode. The core never inspects any richer workload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStep {
    /// Resource to acquire.
    pub resource: ResourceId,
    /// Requested lock mode.
    pub mode: LockMode,
}

impl LockStep {
    /// Convenience constructor for a shared acquisition.
    pub fn shared(resource: ResourceId) -> Self {
        LockStep {
            resource,
            mode: LockMode::Shared,
        }
    }

    /// Convenience constructor for an exclusive acquisition.
    pub fn exclusive(resource: ResourceId) -> Self {
        LockStep {
            resource,
            mode: LockMode::Exclusive,
        }
    }
}
