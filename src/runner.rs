//! Pregel Runner: steps a compiled [`crate::graph::Graph`] one superstep at a
//! time against a [`Checkpointer`], persisting enough to suspend and resume
//! a run exactly where it stopped (`spec.md` §4.4).
//!
//! This is the load-time checkpoint convention (`spec.md` §9 Open Question
//! (a), documented in [`crate::checkpoint`]): a checkpoint's `channel_values`
//! is the state *entering* that step, and its `pending_writes` are folded
//! forward the next time the thread is loaded or advanced.

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::channel::{ChannelKind, ChannelMap, INTERRUPT_CHANNEL, PendingWrite, apply_writes, branch_to, classify};
use crate::checkpoint::{CheckpointError, CheckpointSource, Checkpointer};
use crate::graph::Graph;
use crate::node::{NodeContext, NodeError};
use crate::types::NodeKind;
use crate::utils::id_generator::new_id;

#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("node {node} is reachable but not registered with the graph")]
    #[diagnostic(code(durable_flow::runner::unknown_node))]
    UnknownNode { node: String },

    #[error("node {node} failed: {source}")]
    #[diagnostic(code(durable_flow::runner::execution_failed))]
    ExecutionFailed { node: String, #[source] source: NodeError },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Result of one [`run`] invocation: either the graph ran to completion
/// (no pending nodes and no new branch writes, `spec.md` §4.4 step 6) or a
/// node suspended the run pending external input (step 5).
#[derive(Debug, Clone)]
pub enum RunnerOutcome {
    /// Final public state, with `branch:*`/`__*` channels filtered out.
    Completed { state: ChannelMap },
    /// A node called [`NodeError::interrupt`]; the run should become
    /// `needs_input` until `continue()` supplies a resume value.
    Interrupted { prompt: serde_json::Value },
}

impl RunnerOutcome {
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunnerOutcome::Interrupted { .. })
    }
}

/// Drive `graph` against `checkpointer` for `thread_id` until it completes,
/// interrupts, or hits an unrecoverable node error.
///
/// `params` seeds the baseline checkpoint's state when `thread_id` has no
/// prior history; it is ignored on resume (state comes from checkpoints
/// alone, per `spec.md` §4.5's worker resume rule). `resume` is injected as
/// the input of the specific node whose interrupt was last recorded, if any.
pub async fn run(
    graph: &Graph,
    checkpointer: &Arc<dyn Checkpointer>,
    thread_id: &str,
    params: Option<ChannelMap>,
    resume: Option<serde_json::Value>,
) -> Result<RunnerOutcome, RunnerError> {
    let registry = graph.reducer_registry();

    if checkpointer.latest(thread_id).await?.is_none() {
        let initial_state = params.unwrap_or_default();
        let entry_writes = entry_branch_writes(graph, &initial_state);
        checkpointer
            .put(thread_id, -1, CheckpointSource::Input, initial_state, entry_writes)
            .await?;
    }

    let checkpoint = checkpointer
        .latest(thread_id)
        .await?
        .expect("checkpoint was just created if absent");

    let interrupted_node = checkpoint.interrupt_node();
    let mut resume_value = resume;
    let mut current_state = apply_writes(&checkpoint.channel_values, &checkpoint.pending_writes, registry);
    let mut pending_nodes: Vec<NodeKind> = checkpoint
        .pending_node_targets()
        .into_iter()
        .map(|name| NodeKind::from(name.as_str()))
        .collect();
    let mut step = checkpoint.metadata.step + 1;

    loop {
        let ordered_unique = dedupe_in_order(&pending_nodes);
        if ordered_unique.is_empty() {
            return Ok(RunnerOutcome::Completed {
                state: crate::channel::project_state(&current_state),
            });
        }

        let mut collected_writes: Vec<PendingWrite> = Vec::new();
        let mut branch_seen: BTreeSet<String> = BTreeSet::new();
        let mut interrupt_prompt: Option<serde_json::Value> = None;

        for node_kind in &ordered_unique {
            if node_kind.is_start() || node_kind.is_end() {
                continue;
            }
            let node = graph
                .node(node_kind)
                .ok_or_else(|| RunnerError::UnknownNode { node: node_kind.encode() })?;
            let task_id = new_id();
            let node_resume = if resume_value.is_some() && interrupted_node.as_deref() == node_kind.name() {
                resume_value.take()
            } else {
                None
            };
            let ctx = NodeContext {
                thread_id: thread_id.to_string(),
                node_id: node_kind.name().unwrap_or_default().to_string(),
                step,
                task_id: task_id.clone(),
                resume: node_resume,
            };

            match node.run(current_state.clone(), ctx).await {
                Ok(partial) => {
                    for (channel, value) in partial.writes {
                        collected_writes.push(PendingWrite::new(task_id.clone(), channel, value));
                    }
                    let targets = graph.resolve_frontier(node_kind, &current_state, partial.frontier.as_ref());
                    for target in targets {
                        let Some(name) = target.name() else { continue };
                        let channel = branch_to(name);
                        if branch_seen.insert(channel.clone()) {
                            collected_writes.push(PendingWrite::new(task_id.clone(), channel, serde_json::json!(true)));
                        }
                    }
                }
                Err(NodeError::Interrupt(prompt)) => {
                    let value = serde_json::json!({ "node": node_kind.name(), "prompt": prompt });
                    collected_writes.push(PendingWrite::new(task_id.clone(), INTERRUPT_CHANNEL, value.clone()));
                    // Re-schedule this node and anything after it in the
                    // batch so resume can pick them up (`spec.md` §4.4
                    // step 5: "no further nodes execute in this invocation").
                    collected_writes.push(PendingWrite::new(task_id.clone(), branch_to(node_kind.name().unwrap_or_default()), serde_json::json!(true)));
                    for remaining in ordered_unique.iter().skip_while(|n| *n != node_kind).skip(1) {
                        if let Some(name) = remaining.name() {
                            collected_writes.push(PendingWrite::new(task_id.clone(), branch_to(name), serde_json::json!(true)));
                        }
                    }
                    interrupt_prompt = Some(value);
                    break;
                }
                Err(other) => {
                    return Err(RunnerError::ExecutionFailed {
                        node: node_kind.encode(),
                        source: other,
                    });
                }
            }
        }

        warn_on_unreduced_conflicts(&collected_writes, registry);

        checkpointer
            .put(thread_id, step, CheckpointSource::Loop, current_state.clone(), collected_writes.clone())
            .await?;

        if let Some(value) = interrupt_prompt {
            return Ok(RunnerOutcome::Interrupted {
                prompt: value.get("prompt").cloned().unwrap_or(value),
            });
        }

        current_state = apply_writes(&current_state, &collected_writes, registry);
        pending_nodes = collected_writes
            .iter()
            .filter_map(|w| match classify(&w.channel) {
                ChannelKind::Branch(target) => Some(NodeKind::from(target.as_str())),
                _ => None,
            })
            .collect();
        step += 1;
    }
}

fn entry_branch_writes(graph: &Graph, initial_state: &ChannelMap) -> Vec<PendingWrite> {
    graph
        .entry_nodes(initial_state)
        .into_iter()
        .filter_map(|node| node.name().map(str::to_string))
        .map(|name| PendingWrite::new(new_id(), branch_to(&name), serde_json::json!(true)))
        .collect()
}

fn dedupe_in_order(nodes: &[NodeKind]) -> Vec<NodeKind> {
    let mut seen = BTreeSet::new();
    nodes
        .iter()
        .filter(|n| seen.insert(n.encode()))
        .cloned()
        .collect()
}

/// Logs a warning for each state channel written more than once in a
/// superstep with no registered reducer (`spec.md` §4.4 "Tie-breaks").
fn warn_on_unreduced_conflicts(writes: &[PendingWrite], registry: &crate::reducers::ReducerRegistry) {
    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for write in writes {
        if matches!(classify(&write.channel), ChannelKind::State) {
            *counts.entry(write.channel.as_str()).or_insert(0) += 1;
        }
    }
    for (channel, count) in counts {
        if count > 1 && !registry.has_reducer(channel) {
            tracing::warn!(channel, count, "multiple writes to state channel in one superstep without a reducer; last write in emission order wins");
        }
    }
}
