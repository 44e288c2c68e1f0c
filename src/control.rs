//! Control-flow primitives emitted by nodes to influence subsequent scheduling.
//!
//! Frontier commands are kept separate from channel writes so nodes can
//! express routing intent without the runner treating it as application
//! state. The runner reconciles these directives with the graph's
//! unconditional / conditional edges and lowers the result into
//! `branch:to:<Node>` pending writes (`spec.md` §4.4 step 3, §9).

use crate::types::NodeKind;

/// Route identifier used by frontier commands.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeRoute {
    Node(NodeKind),
}

impl NodeRoute {
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        match self {
            NodeRoute::Node(kind) => kind,
        }
    }

    #[must_use]
    pub fn to_node_kind(&self) -> NodeKind {
        self.kind().clone()
    }
}

impl From<NodeKind> for NodeRoute {
    fn from(kind: NodeKind) -> Self {
        NodeRoute::Node(kind)
    }
}

/// Command emitted by a node to manipulate the next frontier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrontierCommand {
    /// Append additional routes alongside the graph's default edges.
    Append(Vec<NodeRoute>),
    /// Replace the default routes emitted for the node entirely.
    Replace(Vec<NodeRoute>),
}
