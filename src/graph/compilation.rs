//! The compiled, executable form of a [`super::GraphBuilder`].

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::edges::ConditionalEdge;
use crate::channel::ChannelMap;
use crate::control::{FrontierCommand, NodeRoute};
use crate::node::Node;
use crate::reducers::ReducerRegistry;
use crate::types::NodeKind;

/// An executable workflow graph: nodes, their static and conditional
/// successor edges, and the channel reducer registry.
///
/// Produced by [`super::GraphBuilder::compile`]; consumed by
/// [`crate::runner::run`].
pub struct Graph {
    pub(super) nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    pub(super) edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    pub(super) conditional_edges: Vec<ConditionalEdge>,
    pub(super) reducer_registry: ReducerRegistry,
}

impl Graph {
    #[must_use]
    pub fn node(&self, kind: &NodeKind) -> Option<&Arc<dyn Node>> {
        self.nodes.get(kind)
    }

    #[must_use]
    pub fn reducer_registry(&self) -> &ReducerRegistry {
        &self.reducer_registry
    }

    /// The graph's statically and dynamically declared successors of `from`
    /// given the current state, deduplicated and in emission order
    /// (unconditional edges first, then conditional predicates in
    /// registration order) — the graph's own routing, before any per-node
    /// [`FrontierCommand`] override is applied.
    #[must_use]
    pub fn default_successors(&self, from: &NodeKind, state: &ChannelMap) -> Vec<NodeKind> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();

        if let Some(targets) = self.edges.get(from) {
            for target in targets {
                if seen.insert(target.encode()) {
                    out.push(target.clone());
                }
            }
        }

        for conditional in &self.conditional_edges {
            if &conditional.from != from {
                continue;
            }
            for name in (conditional.predicate)(state) {
                let target = NodeKind::from(name.as_str());
                if seen.insert(target.encode()) {
                    out.push(target);
                }
            }
        }

        out
    }

    /// Reconcile a node's [`FrontierCommand`] (if any) with the graph's
    /// default successors, yielding the final list of nodes to route to.
    #[must_use]
    pub fn resolve_frontier(
        &self,
        from: &NodeKind,
        state: &ChannelMap,
        command: Option<&FrontierCommand>,
    ) -> Vec<NodeKind> {
        match command {
            None => self.default_successors(from, state),
            Some(FrontierCommand::Append(routes)) => {
                let mut out = self.default_successors(from, state);
                let mut seen: BTreeSet<String> = out.iter().map(NodeKind::encode).collect();
                for route in routes {
                    let kind = route_kind(route);
                    if seen.insert(kind.encode()) {
                        out.push(kind);
                    }
                }
                out
            }
            Some(FrontierCommand::Replace(routes)) => {
                let mut seen = BTreeSet::new();
                let mut out = Vec::new();
                for route in routes {
                    let kind = route_kind(route);
                    if seen.insert(kind.encode()) {
                        out.push(kind);
                    }
                }
                out
            }
        }
    }

    /// The graph's entry nodes given the run's initial params
    /// (`default_successors` from the virtual `Start` node), used to seed
    /// the baseline checkpoint's pending writes (`spec.md` §4.4 step 1).
    #[must_use]
    pub fn entry_nodes(&self, initial_state: &ChannelMap) -> Vec<NodeKind> {
        self.default_successors(&NodeKind::Start, initial_state)
    }
}

fn route_kind(route: &NodeRoute) -> NodeKind {
    route.to_node_kind()
}
