//! Edge types and routing predicates for conditional graph flow.

use crate::channel::ChannelMap;
use crate::types::NodeKind;
use std::sync::Arc;

/// Predicate function for conditional edge routing.
///
/// Takes the current projected state and returns the names of nodes that
/// should run next. Used with [`super::GraphBuilder::add_conditional_edge`].
pub type EdgePredicate = Arc<dyn Fn(&ChannelMap) -> Vec<String> + Send + Sync + 'static>;

/// A conditional edge that routes based on a predicate function.
#[derive(Clone)]
pub struct ConditionalEdge {
    /// The source node for this conditional edge.
    pub from: NodeKind,
    /// The predicate function that determines target node names.
    pub predicate: EdgePredicate,
}

impl ConditionalEdge {
    #[must_use]
    pub fn new(from: NodeKind, predicate: EdgePredicate) -> Self {
        Self { from, predicate }
    }
}
