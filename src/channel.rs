//! Channel naming and classification.
//!
//! A channel is a named slot in a run's state, holding an arbitrary JSON
//! value. Three categories share one namespace, distinguished purely by
//! name prefix (there is no separate "kind" field persisted anywhere):
//!
//! - **State channels** — plain names (`"summary"`, `"draft"`). Hold
//!   application data a node reads or writes.
//! - **Branch channels** — `branch:to:<NodeName>`. Control-flow edges: their
//!   presence in a superstep's pending writes schedules `<NodeName>` to run
//!   next. They never appear in a run's public, projected state.
//! - **System channels** — `__`-prefixed (e.g. `__interrupt__`). Reserved for
//!   runner bookkeeping, also excluded from the public projection.
//!
//! [`classify`] is the single source of truth for this distinction; every
//! other module (checkpointer, runner, run-details reader) calls into it
//! rather than re-deriving prefix rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Map of channel name to its current value.
///
/// A `BTreeMap` keeps serialized checkpoints byte-stable across runs with
/// the same writes, which matters for the round-trip tests in `tests/`.
pub type ChannelMap = BTreeMap<String, serde_json::Value>;

/// Prefix identifying a branch (control-flow) channel.
pub const BRANCH_PREFIX: &str = "branch:to:";

/// The reserved system channel an interrupt is recorded under.
pub const INTERRUPT_CHANNEL: &str = "__interrupt__";

/// Classification of a channel name, derived purely from its prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    /// A plain state channel holding application data.
    State,
    /// A control-flow edge to the named node.
    Branch(String),
    /// A runner-reserved channel.
    System,
}

/// Classify a channel name by the naming convention in the module docs.
#[must_use]
pub fn classify(name: &str) -> ChannelKind {
    if let Some(target) = name.strip_prefix(BRANCH_PREFIX) {
        ChannelKind::Branch(target.to_string())
    } else if name.starts_with("__") {
        ChannelKind::System
    } else {
        ChannelKind::State
    }
}

/// Build the branch-channel name that schedules `node` to run next.
#[must_use]
pub fn branch_to(node: &str) -> String {
    format!("{BRANCH_PREFIX}{node}")
}

/// Project a full channel map down to the public state view, dropping
/// `branch:*` and `__*` channels per `spec.md` §4.4 step 6 / §4.7.
#[must_use]
pub fn project_state(channels: &ChannelMap) -> ChannelMap {
    channels
        .iter()
        .filter(|(name, _)| matches!(classify(name), ChannelKind::State))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A single write emitted by a node invocation during a superstep.
///
/// `task_id` identifies the node invocation that produced the write (fresh
/// per invocation); several writes from the same invocation share a
/// `task_id`, which is how the Run-Details Reader groups pending writes back
/// into steps (`spec.md` §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingWrite {
    pub task_id: String,
    pub channel: String,
    pub value: serde_json::Value,
}

impl PendingWrite {
    #[must_use]
    pub fn new(task_id: impl Into<String>, channel: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            task_id: task_id.into(),
            channel: channel.into(),
            value,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        classify(&self.channel)
    }
}

/// Fold `writes` onto `base` through `registry`, in emission order.
///
/// For branch and system channels, which never have a registered reducer,
/// this is a plain overwrite — only state channels pick up reducer
/// semantics (append, merge, ...).
#[must_use]
pub fn apply_writes(
    base: &ChannelMap,
    writes: &[PendingWrite],
    registry: &crate::reducers::ReducerRegistry,
) -> ChannelMap {
    let mut out = base.clone();
    for write in writes {
        let merged = match out.get(&write.channel) {
            Some(prior) => registry.merge(&write.channel, Some(prior), &write.value),
            None => registry.merge(&write.channel, None, &write.value),
        };
        out.insert(write.channel.clone(), merged);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_state_branch_system() {
        assert_eq!(classify("summary"), ChannelKind::State);
        assert_eq!(classify("branch:to:Ask"), ChannelKind::Branch("Ask".into()));
        assert_eq!(classify("__interrupt__"), ChannelKind::System);
    }

    #[test]
    fn project_state_drops_branch_and_system() {
        let mut channels = ChannelMap::new();
        channels.insert("summary".into(), serde_json::json!("hi"));
        channels.insert(branch_to("Ask"), serde_json::json!(true));
        channels.insert(INTERRUPT_CHANNEL.into(), serde_json::json!("why?"));
        let projected = project_state(&channels);
        assert_eq!(projected.len(), 1);
        assert!(projected.contains_key("summary"));
    }

    #[test]
    fn apply_writes_overwrites_without_reducer() {
        let mut base = ChannelMap::new();
        base.insert("summary".into(), serde_json::json!("old"));
        let writes = vec![PendingWrite::new("t1", "summary", serde_json::json!("new"))];
        let registry = crate::reducers::ReducerRegistry::new();
        let out = apply_writes(&base, &writes, &registry);
        assert_eq!(out.get("summary"), Some(&serde_json::json!("new")));
    }

    #[test]
    fn apply_writes_uses_registered_reducer() {
        use std::sync::Arc;
        let mut base = ChannelMap::new();
        base.insert("log".into(), serde_json::json!(["a"]));
        let writes = vec![PendingWrite::new("t1", "log", serde_json::json!(["b"]))];
        let registry = crate::reducers::ReducerRegistry::new()
            .with_reducer("log", Arc::new(crate::reducers::Append));
        let out = apply_writes(&base, &writes, &registry);
        assert_eq!(out.get("log"), Some(&serde_json::json!(["a", "b"])));
    }
}
