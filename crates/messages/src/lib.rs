//! Network messages for the hawklock protocol.
//!
//! A single tagged union carries every inter-node and client-facing message.
//! The transport wraps it in an [`Envelope`] bearing sender and receiver
//! node ids; receiver [`NodeId::BROADCAST`] denotes fan-out to all peers.

use hawklock_types::{
    LockMode, NodeId, ResourceId, TransactionId, WaitForGraph, WfdEdge, ZoneConfig,
};
use serde::{Deserialize, Serialize};

/// All messages exchanged between nodes (and between operator clients and
/// the coordinator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    // ─── Transaction / lock management ───
    /// Ask the owner of `resource` to lock it for `txn`.
    ///
    /// The owner answers with `LockResponse { granted: true }` either
    /// immediately or later, when the queued request reaches the head of the
    /// wait queue and becomes compatible. `granted: false` is only sent for
    /// ownership violations.
    LockRequest {
        txn: TransactionId,
        resource: ResourceId,
        mode: LockMode,
    },

    /// Owner's answer to a `LockRequest`.
    LockResponse {
        txn: TransactionId,
        resource: ResourceId,
        granted: bool,
    },

    /// Release `txn`'s hold on `resource`, and drop any wait-queue entry it
    /// still has there (the abort path uses the same message).
    ReleaseLockRequest {
        txn: TransactionId,
        resource: ResourceId,
    },

    /// Acknowledgement of a `ReleaseLockRequest`.
    ReleaseLockResponse {
        txn: TransactionId,
        resource: ResourceId,
    },

    // ─── WFG / PAG collection ───
    /// Coordinator asks a node for its pruned local wait-for graph.
    WfgRequest,

    /// A node's pruned local wait-for graph.
    WfgReport { wfg: WaitForGraph },

    /// HAWK coordinator asks a node for its cross-node wait edges.
    PagRequest,

    /// A node's sampled cross-node wait edges.
    PagResponse { edges: Vec<WfdEdge> },

    // ─── Deadlock resolution ───
    /// Abort the listed transactions (resolution decision).
    DeadlockResolution { txns: Vec<TransactionId> },

    /// Abort the listed transactions (victim signal).
    AbortTransaction { txns: Vec<TransactionId> },

    // ─── HAWK zone protocol ───
    /// Atomically replace every node's zone configuration.
    DistributedDetectionInit { zones: ZoneConfig },

    /// Zone leader asks a member for its pruned local WFG.
    ZoneDetectionRequest {
        leader: NodeId,
        members: Vec<NodeId>,
    },

    /// Member's reply to a `ZoneDetectionRequest`.
    ZoneWfgReport { wfg: WaitForGraph },

    /// Leader escalates its merged zone WFG plus round results to the
    /// coordinator.
    CentralWfgReportFromZone {
        wfg: WaitForGraph,
        cycles: Vec<Vec<TransactionId>>,
        deadlock_count: u64,
    },

    // ─── Path-pushing ───
    /// A probe walking the wait chain. `path` is the ordered list of
    /// transactions visited so far. When the last transaction's awaited
    /// resource is remote, the probe hops to the resource owner with
    /// `resource` set so the owner can find the holders.
    PathPushingProbe {
        path: Vec<TransactionId>,
        resource: Option<ResourceId>,
    },

    // ─── Client surface (coordinator only) ───
    /// Client asks for the coordinator's aggregated WFG.
    ClientCollectWfgRequest,

    /// Aggregated WFG snapshot from the last completed round.
    ClientCollectWfgResponse { wfg: WaitForGraph },

    /// Client asks for the cycles found so far.
    ClientPrintDeadlockRequest,

    /// Client asks the coordinator to abort a transaction.
    ClientResolveDeadlockRequest { txn: TransactionId },

    /// Cycle report pushed to clients after a detection round (and as the
    /// reply to print/resolve commands).
    DeadlockReportToClient {
        cycles: Vec<Vec<TransactionId>>,
        deadlock_count: u64,
    },
}

impl Message {
    /// Message type name for logging and telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::LockRequest { .. } => "LockRequest",
            Message::LockResponse { .. } => "LockResponse",
            Message::ReleaseLockRequest { .. } => "ReleaseLockRequest",
            Message::ReleaseLockResponse { .. } => "ReleaseLockResponse",
            Message::WfgRequest => "WfgRequest",
            Message::WfgReport { .. } => "WfgReport",
            Message::PagRequest => "PagRequest",
            Message::PagResponse { .. } => "PagResponse",
            Message::DeadlockResolution { .. } => "DeadlockResolution",
            Message::AbortTransaction { .. } => "AbortTransaction",
            Message::DistributedDetectionInit { .. } => "DistributedDetectionInit",
            Message::ZoneDetectionRequest { .. } => "ZoneDetectionRequest",
            Message::ZoneWfgReport { .. } => "ZoneWfgReport",
            Message::CentralWfgReportFromZone { .. } => "CentralWfgReportFromZone",
            Message::PathPushingProbe { .. } => "PathPushingProbe",
            Message::ClientCollectWfgRequest => "ClientCollectWfgRequest",
            Message::ClientCollectWfgResponse { .. } => "ClientCollectWfgResponse",
            Message::ClientPrintDeadlockRequest => "ClientPrintDeadlockRequest",
            Message::ClientResolveDeadlockRequest { .. } => "ClientResolveDeadlockRequest",
            Message::DeadlockReportToClient { .. } => "DeadlockReportToClient",
        }
    }

    /// Whether this message originates from the operator client surface.
    pub fn is_client(&self) -> bool {
        matches!(
            self,
            Message::ClientCollectWfgRequest
                | Message::ClientCollectWfgResponse { .. }
                | Message::ClientPrintDeadlockRequest
                | Message::ClientResolveDeadlockRequest { .. }
                | Message::DeadlockReportToClient { .. }
        )
    }
}

/// Wire envelope: every message carries its sender and receiver.
/// Receiver [`NodeId::BROADCAST`] means fan-out over all peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Originating node (0 for operator clients).
    pub sender: NodeId,
    /// Destination node, or 0 for broadcast.
    pub receiver: NodeId,
    /// The payload.
    pub message: Message,
}
