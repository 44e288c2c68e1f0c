//! # durable-flow: a durable orchestrator for checkpointed workflow graphs
//!
//! `durable-flow` runs long-lived, resumable workflow graphs over a
//! transactional datastore. A graph is a set of [`node::Node`]s wired
//! together with [`graph::GraphBuilder`]; the [`runner`] steps it one
//! Pregel-style superstep at a time, persisting a [`checkpoint::Checkpoint`]
//! after every step so a run can suspend (for human-in-the-loop input, a
//! process restart, or a crash) and resume exactly where it stopped.
//!
//! A [`store::Store`] holds `runs` and `triggers` with at-most-one-running
//! claim semantics; a [`worker::WorkerPool`] polls it, drives the runner, and
//! finalizes results; a [`scheduler::Scheduler`] turns cron [`store::Trigger`]s
//! into queued runs, coalescing any firings missed while it was down; and
//! [`reader`] reconstructs per-step provenance from a run's checkpoint
//! history for a UI or API to display.
//!
//! Deliberately out of scope: this crate has no HTTP surface, no
//! authentication, and no template/DSL parser — host applications compile
//! their own graphs and hand them to a [`registry::GraphRegistry`] by name.
//!
//! ## Quick Start
//!
//! ### Building a graph
//!
//! ```
//! use durable_flow::{
//!     channel::ChannelMap,
//!     graph::GraphBuilder,
//!     node::{Node, NodeContext, NodeError, NodePartial},
//!     types::NodeKind,
//! };
//! use async_trait::async_trait;
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Node for Greet {
//!     async fn run(&self, state: ChannelMap, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
//!         let name = state.get("name").and_then(|v| v.as_str()).unwrap_or("friend");
//!         Ok(NodePartial::new().with_write("greeting", serde_json::json!(format!("Hello, {name}!"))))
//!     }
//! }
//!
//! let graph = GraphBuilder::new()
//!     .add_node(NodeKind::Custom("greet".into()), Greet)
//!     .add_edge(NodeKind::Start, NodeKind::Custom("greet".into()))
//!     .add_edge(NodeKind::Custom("greet".into()), NodeKind::End)
//!     .compile();
//! ```
//!
//! ### Running it to completion
//!
//! ```
//! # use durable_flow::{
//! #     channel::ChannelMap, checkpoint::InMemoryCheckpointer, graph::GraphBuilder,
//! #     node::{Node, NodeContext, NodeError, NodePartial}, types::NodeKind,
//! # };
//! # use async_trait::async_trait;
//! # struct Greet;
//! # #[async_trait]
//! # impl Node for Greet {
//! #     async fn run(&self, _s: ChannelMap, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
//! #         Ok(NodePartial::new().with_write("greeting", serde_json::json!("hi")))
//! #     }
//! # }
//! # let graph = GraphBuilder::new()
//! #     .add_node(NodeKind::Custom("greet".into()), Greet)
//! #     .add_edge(NodeKind::Start, NodeKind::Custom("greet".into()))
//! #     .add_edge(NodeKind::Custom("greet".into()), NodeKind::End)
//! #     .compile();
//! use durable_flow::checkpoint::Checkpointer;
//! use durable_flow::runner::{self, RunnerOutcome};
//! use std::sync::Arc;
//!
//! # async fn run_it(graph: durable_flow::graph::Graph) {
//! let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
//! let mut params = ChannelMap::new();
//! params.insert("name".into(), serde_json::json!("Ada"));
//!
//! let outcome = runner::run(&graph, &checkpointer, "thread-1", Some(params), None)
//!     .await
//!     .unwrap();
//! match outcome {
//!     RunnerOutcome::Completed { state } => {
//!         assert_eq!(state.get("greeting"), Some(&serde_json::json!("Hello, Ada!")));
//!     }
//!     RunnerOutcome::Interrupted { .. } => unreachable!(),
//! }
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`types`] - `NodeKind` and the `Start`/`End`/`Custom` node vocabulary
//! - [`control`] - routing primitives a node returns to steer the frontier
//! - [`channel`] - channel naming convention and write application
//! - [`reducers`] - per-channel merge strategies (append, map-merge, overwrite)
//! - [`node`] - the `Node` trait and its execution context
//! - [`graph`] - graph construction and compilation
//! - [`checkpoint`] - the checkpoint tuple and its SQLite/Postgres/in-memory backends
//! - [`runner`] - the Pregel superstep loop: execute, checkpoint, interrupt, resume
//! - [`registry`] - the seam host applications use to supply compiled graphs by name
//! - [`store`] - run/trigger persistence with at-most-one-running claim semantics
//! - [`worker`] - the worker pool that claims, executes, and finalizes runs
//! - [`scheduler`] - the cron scheduler that turns triggers into queued runs
//! - [`reader`] - reconstructs per-step provenance from a run's checkpoints
//! - [`cron`] - timezone-aware cron expression parsing and firing calculation
//! - [`error`] - [`DurableFlowError`], an umbrella over every component error

pub mod channel;
pub mod checkpoint;
pub mod control;
pub mod cron;
pub mod error;
pub mod graph;
pub mod node;
pub mod reader;
pub mod reducers;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod utils;
pub mod worker;

pub use error::DurableFlowError;
