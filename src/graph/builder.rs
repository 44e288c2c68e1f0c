//! `GraphBuilder`: fluent construction of a workflow graph.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::Graph;
use super::edges::{ConditionalEdge, EdgePredicate};
use crate::node::Node;
use crate::reducers::{Reducer, ReducerRegistry};
use crate::types::NodeKind;

/// Builder for constructing workflow graphs with a fluent API.
///
/// Every graph needs at least one node, an edge (unconditional or
/// conditional) from `NodeKind::Start`, and a path to `NodeKind::End`.
/// `Start`/`End` are virtual and must never be registered with
/// [`add_node`](Self::add_node).
///
/// # Example
///
/// ```
/// use durable_flow::graph::GraphBuilder;
/// use durable_flow::types::NodeKind;
/// use durable_flow::node::{Node, NodeContext, NodePartial, NodeError};
/// use durable_flow::channel::ChannelMap;
/// use async_trait::async_trait;
///
/// struct Worker;
/// #[async_trait]
/// impl Node for Worker {
///     async fn run(&self, _s: ChannelMap, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
///         Ok(NodePartial::new())
///     }
/// }
///
/// let graph = GraphBuilder::new()
///     .add_node(NodeKind::Custom("worker".into()), Worker)
///     .add_edge(NodeKind::Start, NodeKind::Custom("worker".into()))
///     .add_edge(NodeKind::Custom("worker".into()), NodeKind::End)
///     .compile();
/// ```
pub struct GraphBuilder {
    nodes: FxHashMap<NodeKind, Arc<dyn Node>>,
    edges: FxHashMap<NodeKind, Vec<NodeKind>>,
    conditional_edges: Vec<ConditionalEdge>,
    reducer_registry: ReducerRegistry,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            conditional_edges: Vec::new(),
            reducer_registry: ReducerRegistry::default(),
        }
    }

    /// Registers a node implementation with the given identifier.
    ///
    /// `NodeKind::Start`/`NodeKind::End` are virtual; passing either here is
    /// ignored (with a warning) rather than stored.
    #[must_use]
    pub fn add_node(mut self, id: NodeKind, node: impl Node + 'static) -> Self {
        match id {
            NodeKind::Start | NodeKind::End => {
                tracing::warn!(?id, "ignoring registration of virtual node kind");
            }
            _ => {
                self.nodes.insert(id, Arc::new(node));
            }
        }
        self
    }

    /// Adds an unconditional edge from `from` to `to`.
    #[must_use]
    pub fn add_edge(mut self, from: NodeKind, to: NodeKind) -> Self {
        self.edges.entry(from).or_default().push(to);
        self
    }

    /// Adds a conditional edge: when execution reaches `from`, `predicate`
    /// is evaluated against the current state to choose successor node
    /// names dynamically.
    #[must_use]
    pub fn add_conditional_edge(mut self, from: NodeKind, predicate: EdgePredicate) -> Self {
        self.conditional_edges.push(ConditionalEdge::new(from, predicate));
        self
    }

    /// Registers a reducer governing how writes to `channel` combine with
    /// the channel's prior value (`spec.md` §9).
    #[must_use]
    pub fn with_reducer(mut self, channel: impl Into<String>, reducer: Arc<dyn Reducer>) -> Self {
        self.reducer_registry.register(channel, reducer);
        self
    }

    /// Replaces the entire reducer registry.
    #[must_use]
    pub fn with_reducer_registry(mut self, registry: ReducerRegistry) -> Self {
        self.reducer_registry = registry;
        self
    }

    // =========================================================================
    // Iterators (petgraph-style API)
    // =========================================================================

    pub fn nodes(&self) -> super::iteration::NodesIter<'_> {
        super::iteration::NodesIter::new(self.nodes.keys())
    }

    pub fn edges(&self) -> super::iteration::EdgesIter<'_> {
        super::iteration::EdgesIter::new(&self.edges)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|v| v.len()).sum()
    }

    #[must_use]
    pub fn topological_sort(&self) -> Vec<NodeKind> {
        super::iteration::topological_sort(&self.edges)
    }

    #[cfg(feature = "petgraph-compat")]
    #[must_use]
    pub fn to_petgraph(&self) -> super::petgraph_compat::PetgraphConversion {
        super::petgraph_compat::to_petgraph(&self.edges)
    }

    #[cfg(feature = "petgraph-compat")]
    #[must_use]
    pub fn to_dot(&self) -> String {
        super::petgraph_compat::to_dot(&self.edges)
    }

    #[cfg(feature = "petgraph-compat")]
    #[must_use]
    pub fn is_cyclic_petgraph(&self) -> bool {
        super::petgraph_compat::is_cyclic(&self.edges)
    }

    /// Compiles the builder into an executable [`Graph`].
    #[must_use]
    pub fn compile(self) -> Graph {
        Graph {
            nodes: self.nodes,
            edges: self.edges,
            conditional_edges: self.conditional_edges,
            reducer_registry: self.reducer_registry,
        }
    }
}
