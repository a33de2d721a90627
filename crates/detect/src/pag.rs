//! Precedence-graph SCCs and detection-zone cutting.
//!
//! Strongly connected components are computed with iterative Tarjan
//! (discovery index / low-link with an explicit frame stack). SCCs of at
//! least the cut threshold become multi-node zones led by their minimum
//! node id; every other configured node forms a singleton zone, so the
//! result always partitions the node universe.

use hawklock_types::{NodeId, PrecedenceGraph, ZoneConfig};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Compute the strongly connected components of `pag`.
///
/// Components are returned with their members sorted; component order
/// follows completion order of the traversal, which is deterministic for a
/// given graph.
pub fn tarjan_sccs(pag: &PrecedenceGraph) -> Vec<Vec<NodeId>> {
    // Materialize a stable adjacency view for index-based iteration.
    let mut adj: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for (from, tos) in pag.iter() {
        adj.insert(*from, tos.iter().copied().collect());
    }
    let vertices = pag.vertices();

    let mut index: HashMap<NodeId, u32> = HashMap::new();
    let mut low: HashMap<NodeId, u32> = HashMap::new();
    let mut on_stack: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut next_index: u32 = 0;
    let mut sccs: Vec<Vec<NodeId>> = Vec::new();

    for &root in &vertices {
        if index.contains_key(&root) {
            continue;
        }

        // Explicit DFS frames: (vertex, next successor position).
        let mut frames: Vec<(NodeId, usize)> = vec![(root, 0)];
        while let Some(frame) = frames.last_mut() {
            let (v, pos) = (frame.0, frame.1);

            if pos == 0 {
                index.insert(v, next_index);
                low.insert(v, next_index);
                next_index += 1;
                stack.push(v);
                on_stack.insert(v);
            }

            let succs = adj.get(&v).map(|s| s.as_slice()).unwrap_or(&[]);
            if pos < succs.len() {
                frame.1 += 1;
                let w = succs[pos];
                if !index.contains_key(&w) {
                    frames.push((w, 0));
                } else if on_stack.contains(&w) {
                    let lw = index[&w];
                    let lv = low.get_mut(&v).unwrap();
                    *lv = (*lv).min(lw);
                }
            } else {
                frames.pop();
                if low[&v] == index[&v] {
                    let mut scc = Vec::new();
                    loop {
                        let w = stack.pop().unwrap();
                        on_stack.remove(&w);
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    scc.sort_unstable();
                    sccs.push(scc);
                }
                if let Some(parent) = frames.last() {
                    let lv = low[&v];
                    let lp = low.get_mut(&parent.0).unwrap();
                    *lp = (*lp).min(lv);
                }
            }
        }
    }

    sccs
}

/// Cut the precedence graph into detection zones.
///
/// SCCs of size ≥ `threshold` become zones led by their minimum member;
/// every node in `1..=num_nodes` not covered by such an SCC forms a
/// singleton zone led by itself.
pub fn cut_zones(pag: &PrecedenceGraph, num_nodes: u32, threshold: usize) -> ZoneConfig {
    let sccs = tarjan_sccs(pag);
    debug!(sccs = sccs.len(), "computed PAG SCCs before cutting");

    let mut zones = Vec::new();
    let mut leaders = Vec::new();
    let mut covered: HashSet<NodeId> = HashSet::new();

    for scc in sccs {
        if scc.len() >= threshold {
            let leader = *scc.iter().min().unwrap();
            covered.extend(scc.iter().copied());
            debug!(%leader, members = scc.len(), "SCC kept as detection zone");
            zones.push(scc);
            leaders.push(leader);
        }
    }

    for id in 1..=num_nodes {
        let node = NodeId(id);
        if !covered.contains(&node) {
            zones.push(vec![node]);
            leaders.push(node);
        }
    }

    debug!(zones = zones.len(), "zone cut complete");
    ZoneConfig { zones, leaders }
}
