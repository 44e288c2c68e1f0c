//! Run-Details Reader: reconstructs per-step provenance (node, input state,
//! writes, branches taken) from a run's persisted checkpoints, for a UI/API
//! (`spec.md` §4.7).

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{ChannelKind, ChannelMap, classify, project_state};
use crate::checkpoint::{Checkpoint, CheckpointError, Checkpointer};

#[derive(Debug, Error, Diagnostic)]
pub enum ReaderError {
    #[error("run {0} has no checkpoints")]
    #[diagnostic(code(durable_flow::reader::no_checkpoints))]
    NoCheckpoints(String),

    #[error("run {0}'s checkpoint history is missing its baseline (step < 0)")]
    #[diagnostic(code(durable_flow::reader::missing_baseline))]
    MissingBaseline(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Classification of a recorded write, mirroring [`crate::channel::ChannelKind`]
/// without the branch target payload (the channel name already carries it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    State,
    Branch,
    System,
}

impl From<&ChannelKind> for WriteKind {
    fn from(kind: &ChannelKind) -> Self {
        match kind {
            ChannelKind::State => WriteKind::State,
            ChannelKind::Branch(_) => WriteKind::Branch,
            ChannelKind::System => WriteKind::System,
        }
    }
}

/// One recorded write within a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRecord {
    pub channel: String,
    pub kind: WriteKind,
    pub value: serde_json::Value,
}

/// One node invocation's provenance, derived from a group of pending writes
/// sharing a `task_id` (`spec.md` §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDetail {
    pub step: i64,
    pub checkpoint_id: String,
    pub timestamp: DateTime<Utc>,
    pub node: String,
    pub task_id: String,
    pub input_state: ChannelMap,
    /// Only the state keys this step changed.
    pub output_state: ChannelMap,
    pub branches: Vec<String>,
    pub writes: Vec<WriteRecord>,
}

/// Full per-step provenance for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetails {
    pub run_id: String,
    pub initial_state: ChannelMap,
    pub steps: Vec<StepDetail>,
}

/// Loads `thread_id`'s checkpoint history and synthesizes [`RunDetails`] for
/// `run_id` (the two are the same value by convention — see `spec.md` §3 —
/// but kept distinct here since the Reader only needs the thread).
pub async fn run_details(
    checkpointer: &Arc<dyn Checkpointer>,
    run_id: &str,
    thread_id: &str,
) -> Result<RunDetails, ReaderError> {
    let checkpoints = checkpointer.list(thread_id).await?;
    build_run_details(run_id, checkpoints)
}

/// Pure replay logic, separated from storage I/O for testability.
pub fn build_run_details(run_id: &str, checkpoints_newest_first: Vec<Checkpoint>) -> Result<RunDetails, ReaderError> {
    let mut checkpoints = checkpoints_newest_first;
    checkpoints.sort_by_key(|c| c.metadata.step);

    let mut iter = checkpoints.into_iter();
    let baseline = iter.next().ok_or_else(|| ReaderError::NoCheckpoints(run_id.to_string()))?;
    if baseline.metadata.step >= 0 {
        return Err(ReaderError::MissingBaseline(run_id.to_string()));
    }

    let mut current_state = project_state(&baseline.channel_values);
    let initial_state = current_state.clone();
    let mut pending_node_queue: VecDeque<String> = baseline.pending_node_targets().into_iter().collect();

    let mut steps = Vec::new();

    for checkpoint in iter {
        if checkpoint.pending_writes.is_empty() {
            // A refresh with no writes to apply; fold in whatever state the
            // checkpoint itself carries and move on without emitting a step.
            for (channel, value) in project_state(&checkpoint.channel_values) {
                current_state.insert(channel, value);
            }
            continue;
        }

        let mut order: Vec<String> = Vec::new();
        let mut groups: FxHashMap<String, Vec<crate::channel::PendingWrite>> = FxHashMap::default();
        for write in &checkpoint.pending_writes {
            groups.entry(write.task_id.clone()).or_insert_with(|| {
                order.push(write.task_id.clone());
                Vec::new()
            });
            groups.get_mut(&write.task_id).unwrap().push(write.clone());
        }

        for task_id in order {
            let writes = groups.remove(&task_id).unwrap_or_default();
            let node = pending_node_queue
                .pop_front()
                .unwrap_or_else(|| infer_node_name(&writes));

            let input_state = current_state.clone();
            let mut branches = Vec::new();
            let mut write_records = Vec::with_capacity(writes.len());

            for write in &writes {
                let kind = classify(&write.channel);
                match &kind {
                    ChannelKind::State => {
                        current_state.insert(write.channel.clone(), write.value.clone());
                    }
                    ChannelKind::Branch(target) => {
                        branches.push(target.clone());
                        pending_node_queue.push_back(target.clone());
                    }
                    ChannelKind::System => {}
                }
                write_records.push(WriteRecord {
                    channel: write.channel.clone(),
                    kind: WriteKind::from(&kind),
                    value: write.value.clone(),
                });
            }

            let output_state: ChannelMap = current_state
                .iter()
                .filter(|(k, v)| input_state.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();

            steps.push(StepDetail {
                step: checkpoint.metadata.step,
                checkpoint_id: checkpoint.id.clone(),
                timestamp: checkpoint.ts,
                node,
                task_id,
                input_state,
                output_state,
                branches,
                writes: write_records,
            });
        }
    }

    Ok(RunDetails {
        run_id: run_id.to_string(),
        initial_state,
        steps,
    })
}

/// Recovers a node name from a write group when the pending-node queue is
/// exhausted, using the `<Node>.<field>` state-channel naming convention
/// (`spec.md` §4.4 "Node naming recovery").
fn infer_node_name(writes: &[crate::channel::PendingWrite]) -> String {
    for write in writes {
        if matches!(classify(&write.channel), ChannelKind::State) {
            if let Some((prefix, _)) = write.channel.split_once('.') {
                return prefix.to_string();
            }
        }
    }
    "unknown".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointMetadata, CheckpointSource};
    use crate::channel::{PendingWrite, branch_to};

    fn checkpoint(step: i64, channel_values: ChannelMap, pending_writes: Vec<PendingWrite>) -> Checkpoint {
        Checkpoint {
            id: format!("ckpt-{step}"),
            thread_id: "t1".into(),
            ts: Utc::now(),
            channel_values,
            metadata: CheckpointMetadata { step, source: CheckpointSource::Loop },
            pending_writes,
        }
    }

    #[test]
    fn replays_linear_run_into_steps() {
        let baseline = checkpoint(-1, ChannelMap::new(), vec![PendingWrite::new("seed", branch_to("a"), serde_json::json!(true))]);
        let step0 = checkpoint(
            0,
            ChannelMap::new(),
            vec![
                PendingWrite::new("task-a", "a.out", serde_json::json!("hello")),
                PendingWrite::new("task-a", branch_to("b"), serde_json::json!(true)),
            ],
        );
        let step1 = checkpoint(
            1,
            [("a.out".to_string(), serde_json::json!("hello"))].into_iter().collect(),
            vec![PendingWrite::new("task-b", "b.out", serde_json::json!("world"))],
        );

        let details = build_run_details("run-1", vec![step1, step0, baseline]).unwrap();
        assert_eq!(details.steps.len(), 2);
        assert_eq!(details.steps[0].node, "a");
        assert_eq!(details.steps[0].branches, vec!["b".to_string()]);
        assert_eq!(details.steps[1].node, "b");
        assert_eq!(details.steps[1].input_state.get("a.out"), Some(&serde_json::json!("hello")));
        assert_eq!(details.steps[1].output_state.get("b.out"), Some(&serde_json::json!("world")));
    }

    #[test]
    fn missing_baseline_is_an_error() {
        let step0 = checkpoint(0, ChannelMap::new(), vec![]);
        let err = build_run_details("run-2", vec![step0]).unwrap_err();
        assert!(matches!(err, ReaderError::MissingBaseline(_)));
    }

    #[test]
    fn groups_parallel_writes_by_task_id_into_separate_steps() {
        let baseline = checkpoint(
            -1,
            ChannelMap::new(),
            vec![
                PendingWrite::new("seed", branch_to("a"), serde_json::json!(true)),
                PendingWrite::new("seed", branch_to("b"), serde_json::json!(true)),
            ],
        );
        let step0 = checkpoint(
            0,
            ChannelMap::new(),
            vec![
                PendingWrite::new("task-a", "a.out", serde_json::json!(1)),
                PendingWrite::new("task-b", "b.out", serde_json::json!(2)),
            ],
        );

        let details = build_run_details("run-3", vec![step0, baseline]).unwrap();
        assert_eq!(details.steps.len(), 2);
        assert_eq!(details.steps[0].node, "a");
        assert_eq!(details.steps[1].node, "b");
    }
}
