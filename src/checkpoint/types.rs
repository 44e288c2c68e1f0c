use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelMap, PendingWrite};

/// Metadata attached to a checkpoint tuple. `step = -1` marks the
/// pre-execution baseline (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckpointMetadata {
    pub step: i64,
    #[serde(default)]
    pub source: CheckpointSource,
}

/// Origin of a checkpoint, mirroring the step that produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// The pre-execution baseline written at `step = -1`.
    Input,
    /// Written by a normal superstep.
    #[default]
    Loop,
}

/// One entry in a thread's ordered checkpoint sequence
/// (`spec.md` §3 "Checkpoint tuple", §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub ts: DateTime<Utc>,
    pub channel_values: ChannelMap,
    pub metadata: CheckpointMetadata,
    pub pending_writes: Vec<PendingWrite>,
}

impl Checkpoint {
    /// Branch targets recorded in this checkpoint's pending writes, in
    /// emission order — the pending-node queue for the *next* superstep
    /// (`spec.md` §4.4 step 2).
    #[must_use]
    pub fn pending_node_targets(&self) -> Vec<String> {
        self.pending_writes
            .iter()
            .filter_map(|w| {
                use crate::channel::{ChannelKind, classify};
                match classify(&w.channel) {
                    ChannelKind::Branch(target) => Some(target),
                    _ => None,
                }
            })
            .collect()
    }

    /// Whether this checkpoint recorded an interrupt (`__interrupt__`
    /// system channel write).
    #[must_use]
    pub fn interrupt_prompt(&self) -> Option<&serde_json::Value> {
        self.pending_writes
            .iter()
            .find(|w| w.channel == crate::channel::INTERRUPT_CHANNEL)
            .map(|w| &w.value)
    }

    /// The name of the node whose interrupt was recorded in this checkpoint,
    /// if any (`spec.md` §4.4 "Resume semantics": "the single node whose
    /// interrupt was recorded in the last checkpoint's pending_writes").
    #[must_use]
    pub fn interrupt_node(&self) -> Option<String> {
        self.interrupt_prompt()?.get("node")?.as_str().map(str::to_string)
    }
}
