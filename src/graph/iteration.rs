//! petgraph-style iterators for inspecting graph structure.

use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};

use crate::types::NodeKind;

/// Iterator over registered (non-virtual) node kinds.
pub struct NodesIter<'a> {
    inner: std::collections::hash_map::Keys<'a, NodeKind, std::sync::Arc<dyn crate::node::Node>>,
}

impl<'a> NodesIter<'a> {
    pub(super) fn new(
        inner: std::collections::hash_map::Keys<'a, NodeKind, std::sync::Arc<dyn crate::node::Node>>,
    ) -> Self {
        Self { inner }
    }
}

impl<'a> Iterator for NodesIter<'a> {
    type Item = &'a NodeKind;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Iterator over unconditional edges as `(from, to)` pairs.
pub struct EdgesIter<'a> {
    edges: Vec<(&'a NodeKind, &'a NodeKind)>,
    pos: usize,
}

impl<'a> EdgesIter<'a> {
    pub(super) fn new(edges: &'a FxHashMap<NodeKind, Vec<NodeKind>>) -> Self {
        let mut flat = Vec::new();
        for (from, tos) in edges {
            for to in tos {
                flat.push((from, to));
            }
        }
        Self { edges: flat, pos: 0 }
    }
}

impl<'a> Iterator for EdgesIter<'a> {
    type Item = (&'a NodeKind, &'a NodeKind);
    fn next(&mut self) -> Option<Self::Item> {
        let item = self.edges.get(self.pos)?;
        self.pos += 1;
        Some(*item)
    }
}

/// Deterministic topological ordering of `Start`, registered nodes, and
/// `End`, via Kahn's algorithm with lexicographic tie-breaking.
///
/// Assumes the graph is acyclic (workflow graphs are not in general — cyclic
/// graphs are explicitly supported per `spec.md` §9 — so this is a
/// best-effort structural view for visualization/debugging, not something
/// the runner relies on).
#[must_use]
pub fn topological_sort(edges: &FxHashMap<NodeKind, Vec<NodeKind>>) -> Vec<NodeKind> {
    let mut all_nodes: BTreeSet<String> = BTreeSet::new();
    let mut successors: FxHashMap<String, Vec<String>> = FxHashMap::default();
    let mut in_degree: FxHashMap<String, usize> = FxHashMap::default();

    for (from, tos) in edges {
        all_nodes.insert(from.encode());
        for to in tos {
            all_nodes.insert(to.encode());
            successors.entry(from.encode()).or_default().push(to.encode());
            *in_degree.entry(to.encode()).or_insert(0) += 1;
        }
        in_degree.entry(from.encode()).or_insert(0);
    }

    let mut ready: BTreeSet<String> = all_nodes
        .iter()
        .filter(|n| in_degree.get(*n).copied().unwrap_or(0) == 0)
        .cloned()
        .collect();
    let mut queue: VecDeque<String> = ready.iter().cloned().collect();
    let mut sorted = Vec::new();

    while let Some(node) = pop_lexicographically_first(&mut queue, &mut ready) {
        sorted.push(NodeKind::decode(&node));
        if let Some(succs) = successors.get(&node) {
            let mut succs = succs.clone();
            succs.sort();
            for succ in succs {
                if let Some(deg) = in_degree.get_mut(&succ) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(succ.clone());
                        queue.push_back(succ);
                    }
                }
            }
        }
    }

    sorted
}

fn pop_lexicographically_first(queue: &mut VecDeque<String>, ready: &mut BTreeSet<String>) -> Option<String> {
    let next = ready.iter().next().cloned()?;
    ready.remove(&next);
    queue.retain(|n| n != &next);
    Some(next)
}
