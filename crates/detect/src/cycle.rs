//! Cycle enumeration over a wait-for graph.
//!
//! Depth-first traversal with a recursion-stack flag and a parent pointer
//! per vertex. When a neighbor already on the recursion stack is reached,
//! the cycle is reconstructed by walking parents back from the current
//! vertex. Vertices may be traversed more than once to find multiple cycles
//! sharing prefixes; a per-vertex visit budget of `|out-deg − in-deg| + 1`
//! governs re-traversal. The budget decrements on entry, and traversal does
//! not descend into exhausted vertices except to detect a back-edge.
//!
//! The output is informative rather than minimal: the same underlying cycle
//! may be reported under different rotations, and the frequency map counts
//! how many reported cycles each vertex appears in. Worst-case cost is
//! exponential in adversarial graphs; callers keep inputs small by pruning
//! to active transactions and partitioning into zones.

use hawklock_types::{TransactionId, WaitForGraph};
use std::collections::{HashMap, HashSet};

/// Result of cycle enumeration.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Detected cycles as vertex sequences.
    pub cycles: Vec<Vec<TransactionId>>,
    /// Per-vertex participation count across the reported cycles. Contains
    /// an entry (possibly zero) for every vertex of the input graph.
    pub frequency: HashMap<TransactionId, u32>,
}

impl CycleReport {
    /// Whether no cycle was found.
    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// Enumerate directed cycles in `graph`.
pub fn find_cycles(graph: &WaitForGraph) -> CycleReport {
    let vertices = graph.vertices();

    let mut out_deg: HashMap<TransactionId, i64> = HashMap::new();
    let mut in_deg: HashMap<TransactionId, i64> = HashMap::new();
    for (waiter, holders) in graph.iter() {
        *out_deg.entry(*waiter).or_default() += holders.len() as i64;
        for holder in holders {
            *in_deg.entry(*holder).or_default() += 1;
        }
    }

    let mut budgets: HashMap<TransactionId, i64> = HashMap::new();
    let mut frequency: HashMap<TransactionId, u32> = HashMap::new();
    for &v in &vertices {
        let out = out_deg.get(&v).copied().unwrap_or(0);
        let inn = in_deg.get(&v).copied().unwrap_or(0);
        budgets.insert(v, (out - inn).abs() + 1);
        frequency.insert(v, 0);
    }

    let mut dfs = Dfs {
        graph,
        budgets,
        rec_stack: HashSet::new(),
        parent: HashMap::new(),
        cycles: Vec::new(),
        frequency,
    };

    // Keys iterate in id order (BTreeMap), so enumeration is deterministic.
    let roots: Vec<TransactionId> = graph.iter().map(|(w, _)| *w).collect();
    for root in roots {
        dfs.visit(root);
    }

    CycleReport {
        cycles: dfs.cycles,
        frequency: dfs.frequency,
    }
}

struct Dfs<'a> {
    graph: &'a WaitForGraph,
    budgets: HashMap<TransactionId, i64>,
    rec_stack: HashSet<TransactionId>,
    parent: HashMap<TransactionId, TransactionId>,
    cycles: Vec<Vec<TransactionId>>,
    frequency: HashMap<TransactionId, u32>,
}

impl Dfs<'_> {
    fn visit(&mut self, u: TransactionId) {
        if let Some(budget) = self.budgets.get_mut(&u) {
            *budget -= 1;
        }
        self.rec_stack.insert(u);

        if let Some(holders) = self.graph.holders_of(u) {
            for &v in holders {
                if self.budgets.get(&v).copied().unwrap_or(0) > 0 {
                    self.parent.insert(v, u);
                    self.visit(v);
                } else if self.rec_stack.contains(&v) {
                    self.record_cycle(u, v);
                }
            }
        }

        self.rec_stack.remove(&u);
    }

    /// Reconstruct the cycle closed by the back-edge `u → v` by walking
    /// parents from `u` until `v`. Both are on the current recursion stack,
    /// so the parent chain between them is intact.
    fn record_cycle(&mut self, u: TransactionId, v: TransactionId) {
        let mut cycle = Vec::new();
        let mut curr = u;
        while curr != v {
            cycle.push(curr);
            *self.frequency.entry(curr).or_default() += 1;
            curr = self.parent[&curr];
        }
        cycle.push(v);
        *self.frequency.entry(v).or_default() += 1;
        cycle.reverse();
        self.cycles.push(cycle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hawklock_types::NodeId;

    fn txn(seq: u32) -> TransactionId {
        TransactionId::new(NodeId(1), seq)
    }

    fn graph(edges: &[(u32, u32)]) -> WaitForGraph {
        let mut g = WaitForGraph::new();
        for &(w, h) in edges {
            g.add_edge(txn(w), txn(h));
        }
        g
    }

    /// Every edge of every reported cycle must exist in the input graph.
    fn assert_cycles_sound(g: &WaitForGraph, report: &CycleReport) {
        for cycle in &report.cycles {
            for i in 0..cycle.len() {
                let from = cycle[i];
                let to = cycle[(i + 1) % cycle.len()];
                assert!(
                    g.contains_edge(from, to),
                    "cycle {:?} uses edge {} -> {} not present in graph",
                    cycle,
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn two_cycle_is_found_once() {
        let g = graph(&[(1, 2), (2, 1)]);
        let report = find_cycles(&g);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0], vec![txn(1), txn(2)]);
        assert_eq!(report.frequency[&txn(1)], 1);
        assert_eq!(report.frequency[&txn(2)], 1);
        assert_cycles_sound(&g, &report);
    }

    #[test]
    fn three_cycle_is_found() {
        let g = graph(&[(1, 2), (2, 3), (3, 1)]);
        let report = find_cycles(&g);
        assert!(!report.is_empty());
        assert_cycles_sound(&g, &report);
        assert!(report.cycles.iter().any(|c| c.len() == 3));
    }

    #[test]
    fn acyclic_graph_reports_nothing() {
        let g = graph(&[(1, 2), (2, 3), (1, 3)]);
        let report = find_cycles(&g);
        assert!(report.is_empty());
        assert!(report.frequency.values().all(|&f| f == 0));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let g = graph(&[(1, 1)]);
        let report = find_cycles(&g);
        assert_eq!(report.cycles.len(), 1);
        assert_eq!(report.cycles[0], vec![txn(1)]);
    }

    #[test]
    fn overlapping_cycles_raise_shared_vertex_frequency() {
        // 1→2→1 and 1→3→1 share vertex 1.
        let g = graph(&[(1, 2), (2, 1), (1, 3), (3, 1)]);
        let report = find_cycles(&g);
        assert!(report.cycles.len() >= 2);
        assert_cycles_sound(&g, &report);
        let f1 = report.frequency[&txn(1)];
        let f2 = report.frequency[&txn(2)];
        assert!(f1 > f2, "shared vertex should appear in more cycles");
    }

    #[test]
    fn empty_graph_reports_nothing() {
        let report = find_cycles(&WaitForGraph::new());
        assert!(report.is_empty());
        assert!(report.frequency.is_empty());
    }
}
