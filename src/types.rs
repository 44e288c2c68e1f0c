//! Core node-identity type shared by the graph model, runner, and reader.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within a workflow graph.
///
/// `Start` and `End` are virtual: they are never registered with
/// [`crate::graph::GraphBuilder::add_node`] and never executed, but they
/// anchor the graph's entry/exit edges. `Custom` names are user-supplied and
/// double as the node name embedded in branch channels (`branch:to:<name>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Virtual entry point; the runner schedules its successors at step -1.
    Start,
    /// Virtual exit point; reaching it ends a branch of execution.
    End,
    /// A user-defined, named node.
    Custom(String),
}

impl NodeKind {
    /// Encode into the persisted string form used for branch channel names
    /// and checkpoint metadata (`Start`, `End`, `Custom:<name>`).
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeKind::Start => "Start".to_string(),
            NodeKind::End => "End".to_string(),
            NodeKind::Custom(s) => format!("Custom:{s}"),
        }
    }

    /// Decode the persisted string form, falling back to `Custom` for
    /// anything unrecognized (forward compatibility).
    #[must_use]
    pub fn decode(s: &str) -> Self {
        if s == "Start" {
            NodeKind::Start
        } else if s == "End" {
            NodeKind::End
        } else if let Some(rest) = s.strip_prefix("Custom:") {
            NodeKind::Custom(rest.to_string())
        } else {
            NodeKind::Custom(s.to_string())
        }
    }

    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// The bare node name as it appears in a `branch:to:<name>` channel, or
    /// `None` for the virtual endpoints (which are never branch targets).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKind::Custom(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::End => write!(f, "End"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        match s {
            "Start" => NodeKind::Start,
            "End" => NodeKind::End,
            other => NodeKind::Custom(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        for kind in [
            NodeKind::Start,
            NodeKind::End,
            NodeKind::Custom("Ask".to_string()),
        ] {
            assert_eq!(NodeKind::decode(&kind.encode()), kind);
        }
    }
}
