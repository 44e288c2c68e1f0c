//! Node execution framework: the `Node` trait, its context, and the partial
//! state update a node hands back to the Pregel Runner.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::channel::ChannelMap;
use crate::control::{FrontierCommand, NodeRoute};
use crate::types::NodeKind;

// ============================================================================
// Core Trait
// ============================================================================

/// A single unit of computation within a workflow graph.
///
/// A node receives the channel values it declared as inputs (in practice,
/// the full projected state — declaring a narrower input set is a
/// responsibility of the graph author, not enforced here) and an optional
/// resume value if this invocation is resuming a prior interrupt. It returns
/// a [`NodePartial`] describing channel writes, routing, and any errors.
///
/// # Interrupts
///
/// A node that needs external input calls [`NodeError::interrupt`] (or
/// returns `Err(NodeError::Interrupt(prompt))` directly) instead of
/// returning `Ok`. This is not a fatal error: the runner recognizes it and
/// suspends the run as `needs_input` (`spec.md` §4.4 step 5).
///
/// # Examples
///
/// ```rust,no_run
/// use durable_flow::node::{Node, NodeContext, NodePartial, NodeError};
/// use durable_flow::channel::ChannelMap;
/// use async_trait::async_trait;
///
/// struct Greet;
///
/// #[async_trait]
/// impl Node for Greet {
///     async fn run(&self, _state: ChannelMap, ctx: NodeContext) -> Result<NodePartial, NodeError> {
///         tracing::info!(node = %ctx.node_id, step = ctx.step, "greeting");
///         Ok(NodePartial::new().with_write("greeting", serde_json::json!("hello")))
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node with the given channel snapshot and context.
    async fn run(&self, state: ChannelMap, ctx: NodeContext) -> Result<NodePartial, NodeError>;
}

// ============================================================================
// Execution Context
// ============================================================================

/// Execution context passed to nodes during a superstep.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// The run this invocation belongs to (== checkpointer `thread_id`).
    pub thread_id: String,
    /// Name of the node being invoked, as it appears in branch channels.
    pub node_id: String,
    /// The superstep number this invocation runs in.
    pub step: i64,
    /// Fresh identifier for this node invocation; shared by all writes it
    /// produces so the Run-Details Reader can group them into one step.
    pub task_id: String,
    /// Present when this invocation is resuming a previously recorded
    /// interrupt (`spec.md` §4.4 "Resume semantics").
    pub resume: Option<serde_json::Value>,
}

// ============================================================================
// State Updates
// ============================================================================

/// Partial state update returned by a node invocation.
///
/// All fields are optional; the runner merges only what is present. Writes
/// are channel-name keyed so a node may touch any number of state channels
/// in one invocation, not just a fixed built-in set.
#[derive(Clone, Debug, Default)]
pub struct NodePartial {
    /// Channel writes produced by this invocation.
    pub writes: FxHashMap<String, serde_json::Value>,
    /// Routing directive overriding or extending the graph's default edges.
    pub frontier: Option<FrontierCommand>,
}

impl NodePartial {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single channel write.
    #[must_use]
    pub fn with_write(mut self, channel: impl Into<String>, value: serde_json::Value) -> Self {
        self.writes.insert(channel.into(), value);
        self
    }

    /// Add several channel writes at once.
    #[must_use]
    pub fn with_writes(mut self, writes: FxHashMap<String, serde_json::Value>) -> Self {
        self.writes.extend(writes);
        self
    }

    /// Replace the default frontier with the given targets.
    #[must_use]
    pub fn with_frontier_replace<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = NodeKind>,
    {
        let routes = targets.into_iter().map(NodeRoute::from).collect();
        self.frontier = Some(FrontierCommand::Replace(routes));
        self
    }

    /// Append additional targets alongside the graph's default edges.
    #[must_use]
    pub fn with_frontier_append<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = NodeKind>,
    {
        let routes = targets.into_iter().map(NodeRoute::from).collect();
        self.frontier = Some(FrontierCommand::Append(routes));
        self
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during node execution.
///
/// `Interrupt` is not a fatal condition: the runner catches it and suspends
/// the run as `needs_input` rather than failing it (`spec.md` §4.4, §7).
/// Every other variant propagates as `ExecutionFailed` and fails the run.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// The node requests external input before it can continue.
    #[error("interrupt requested: {0}")]
    #[diagnostic(
        code(durable_flow::node::interrupt),
        help("Not a failure — the run suspends as needs_input until continue() provides a resume value.")
    )]
    Interrupt(String),

    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(durable_flow::node::missing_input),
        help("Check that the declared producer node ran and wrote to this channel.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(durable_flow::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(code(durable_flow::node::validation))]
    ValidationFailed(String),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(durable_flow::node::serde_json))]
    Serde(#[from] serde_json::Error),
}

impl NodeError {
    #[must_use]
    pub fn interrupt(prompt: impl Into<String>) -> Self {
        NodeError::Interrupt(prompt.into())
    }

    #[must_use]
    pub fn as_interrupt_prompt(&self) -> Option<&str> {
        match self {
            NodeError::Interrupt(prompt) => Some(prompt),
            _ => None,
        }
    }
}
