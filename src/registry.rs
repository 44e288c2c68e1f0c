//! Template resolution: maps a `graph_name` to a compiled [`Graph`].
//!
//! `spec.md` treats the template parser/format as an external collaborator
//! ("a given graph structure") — this crate never reads `.wirl` files or
//! any other on-disk format. [`GraphRegistry`] is the seam: callers compile
//! their own templates into [`Graph`]s (however they're authored) and hand
//! them to [`InMemoryGraphRegistry`], which the Worker Pool and Scheduler
//! consult by name.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::graph::Graph;

/// Resolves a `graph_name` to the compiled graph the Worker Pool should run,
/// or tells the Scheduler whether a trigger's `template_name` still exists.
pub trait GraphRegistry: Send + Sync {
    fn resolve(&self, graph_name: &str) -> Option<Arc<Graph>>;

    fn contains(&self, graph_name: &str) -> bool {
        self.resolve(graph_name).is_some()
    }
}

/// In-process registry backed by a plain map. Sufficient for embedding this
/// crate directly; a host application free to implement [`GraphRegistry`]
/// itself (e.g. backed by hot-reloadable template files) instead.
#[derive(Default, Clone)]
pub struct InMemoryGraphRegistry {
    graphs: FxHashMap<String, Arc<Graph>>,
}

impl InMemoryGraphRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_graph(mut self, name: impl Into<String>, graph: Graph) -> Self {
        self.graphs.insert(name.into(), Arc::new(graph));
        self
    }

    pub fn register(&mut self, name: impl Into<String>, graph: Graph) {
        self.graphs.insert(name.into(), Arc::new(graph));
    }
}

impl GraphRegistry for InMemoryGraphRegistry {
    fn resolve(&self, graph_name: &str) -> Option<Arc<Graph>> {
        self.graphs.get(graph_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::types::NodeKind;

    #[test]
    fn resolves_registered_graphs_by_name() {
        let graph = GraphBuilder::new()
            .add_edge(NodeKind::Start, NodeKind::End)
            .compile();
        let registry = InMemoryGraphRegistry::new().with_graph("greeting", graph);
        assert!(registry.contains("greeting"));
        assert!(registry.resolve("greeting").is_some());
        assert!(!registry.contains("ghost"));
    }
}
