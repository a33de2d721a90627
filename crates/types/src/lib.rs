//! Core types for the hawklock distributed lock manager.
//!
//! This crate provides the foundational types used throughout the
//! implementation:
//!
//! - **Identifiers**: [`NodeId`], [`TransactionId`], [`ResourceId`]
//! - **Locking**: [`LockMode`], [`TransactionStatus`], [`LockStep`]
//! - **Graphs**: [`WaitForGraph`], [`WfdEdge`], [`PrecedenceGraph`]
//! - **Zones**: [`ZoneConfig`]
//! - **Configuration**: [`SystemConfig`], [`DetectionMode`], [`ResourcePartition`]
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod config;
mod identifiers;
mod locks;
mod partition;
mod wfg;
mod zone;

pub use config::{DetectionMode, SystemConfig};
pub use identifiers::{NodeId, ResourceId, TransactionId};
pub use locks::{LockMode, LockStep, TransactionStatus};
pub use partition::ResourcePartition;
pub use wfg::{PrecedenceGraph, WaitForGraph, WfdEdge};
pub use zone::ZoneConfig;
