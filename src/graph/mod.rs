//! Graph definition and compilation for workflow execution.
//!
//! The main entry point is [`GraphBuilder`], a fluent builder that compiles
//! into a [`Graph`] ready for [`crate::runner::run`]. A graph is nodes plus
//! their unconditional and conditional successor edges; `Start` and `End`
//! are virtual endpoints used only for topology.
//!
//! # Example
//!
//! ```
//! use durable_flow::graph::{GraphBuilder, EdgePredicate};
//! use durable_flow::types::NodeKind;
//! use durable_flow::node::{Node, NodeContext, NodePartial, NodeError};
//! use durable_flow::channel::ChannelMap;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Process;
//! #[async_trait]
//! impl Node for Process {
//!     async fn run(&self, _s: ChannelMap, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
//!         Ok(NodePartial::new())
//!     }
//! }
//!
//! let route: EdgePredicate = Arc::new(|state| {
//!     if state.get("flagged").is_some() {
//!         vec!["review".to_string()]
//!     } else {
//!         vec!["process".to_string()]
//!     }
//! });
//!
//! let graph = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("process".into()), Process)
//!     .add_node(NodeKind::Custom("review".into()), Process)
//!     .add_conditional_edge(NodeKind::Start, route)
//!     .add_edge(NodeKind::Custom("process".into()), NodeKind::End)
//!     .add_edge(NodeKind::Custom("review".into()), NodeKind::End)
//!     .compile();
//! ```

mod builder;
mod compilation;
mod edges;
mod iteration;

#[cfg(feature = "petgraph-compat")]
mod petgraph_compat;

pub use builder::GraphBuilder;
pub use compilation::Graph;
pub use edges::{ConditionalEdge, EdgePredicate};
pub use iteration::{EdgesIter, NodesIter};

#[cfg(feature = "petgraph-compat")]
pub use petgraph_compat::{NodeIndexMap, PetgraphConversion, WeaveDiGraph, is_cyclic};
