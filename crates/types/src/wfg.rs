//! Wait-for graph and node-level precedence graph types.

use crate::{NodeId, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Directed wait-for graph over transactions.
///
/// An edge `w → h` means `w` is waiting for a resource held by `h`.
/// Duplicate edges are tolerated; consumers dedupe implicitly through cycle
/// finding. A `BTreeMap` keeps iteration deterministic, which matters for
/// reproducible detection rounds in simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitForGraph {
    edges: BTreeMap<TransactionId, Vec<TransactionId>>,
}

impl WaitForGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge `waiter → holder`.
    pub fn add_edge(&mut self, waiter: TransactionId, holder: TransactionId) {
        self.edges.entry(waiter).or_default().push(holder);
    }

    /// Merge another graph's adjacency lists into this one, appending
    /// duplicates rather than deduplicating.
    pub fn merge(&mut self, other: &WaitForGraph) {
        for (waiter, holders) in &other.edges {
            self.edges
                .entry(*waiter)
                .or_default()
                .extend(holders.iter().copied());
        }
    }

    /// Restrict the graph to edges whose endpoints survive `keep`.
    ///
    /// The predicate sees every endpoint; an edge is kept only when both the
    /// waiter and the holder pass.
    pub fn pruned<F>(&self, mut keep: F) -> WaitForGraph
    where
        F: FnMut(TransactionId) -> bool,
    {
        let mut out = WaitForGraph::new();
        for (waiter, holders) in &self.edges {
            if !keep(*waiter) {
                continue;
            }
            for holder in holders {
                if keep(*holder) {
                    out.add_edge(*waiter, *holder);
                }
            }
        }
        out
    }

    /// Whether the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of waiter entries (not edges).
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Iterate adjacency lists.
    pub fn iter(&self) -> impl Iterator<Item = (&TransactionId, &Vec<TransactionId>)> {
        self.edges.iter()
    }

    /// The holders a waiter points at, if any.
    pub fn holders_of(&self, waiter: TransactionId) -> Option<&[TransactionId]> {
        self.edges.get(&waiter).map(|v| v.as_slice())
    }

    /// All vertices mentioned by any edge, deduplicated and ordered.
    pub fn vertices(&self) -> BTreeSet<TransactionId> {
        let mut all = BTreeSet::new();
        for (waiter, holders) in &self.edges {
            all.insert(*waiter);
            all.extend(holders.iter().copied());
        }
        all
    }

    /// Whether the graph contains the edge `waiter → holder`.
    pub fn contains_edge(&self, waiter: TransactionId, holder: TransactionId) -> bool {
        self.edges
            .get(&waiter)
            .is_some_and(|hs| hs.contains(&holder))
    }

    /// Drop all edges.
    pub fn clear(&mut self) {
        self.edges.clear();
    }
}

/// A local wait-for edge annotated with the home nodes of both endpoints.
/// Only emitted when the endpoints live on different nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WfdEdge {
    /// The waiting transaction.
    pub waiting_txn: TransactionId,
    /// The holding transaction.
    pub holding_txn: TransactionId,
    /// Home node of the waiter.
    pub waiting_node: NodeId,
    /// Home node of the holder.
    pub holding_node: NodeId,
}

/// Directed precedence graph over nodes, summarising cross-node wait
/// dependencies. Multi-edges are collapsed at insertion.
#[derive(Debug, Clone, Default)]
pub struct PrecedenceGraph {
    edges: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl PrecedenceGraph {
    /// Build a precedence graph from sampled cross-node wait edges.
    /// Self-edges are skipped.
    pub fn from_edges(sampled: &[WfdEdge]) -> Self {
        let mut pag = PrecedenceGraph::default();
        let mut seen = HashSet::new();
        for edge in sampled {
            if edge.waiting_node == edge.holding_node {
                continue;
            }
            if seen.insert((edge.waiting_node, edge.holding_node)) {
                pag.edges
                    .entry(edge.waiting_node)
                    .or_default()
                    .insert(edge.holding_node);
            }
        }
        pag
    }

    /// Iterate adjacency sets.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &BTreeSet<NodeId>)> {
        self.edges.iter()
    }

    /// Successors of a node, if it has outgoing edges.
    pub fn successors(&self, node: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.edges.get(&node)
    }

    /// All nodes mentioned by any edge, ordered.
    pub fn vertices(&self) -> BTreeSet<NodeId> {
        let mut all = BTreeSet::new();
        for (from, tos) in &self.edges {
            all.insert(*from);
            all.extend(tos.iter().copied());
        }
        all
    }

    /// Whether no edge was sampled.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
