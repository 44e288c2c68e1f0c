//! Worker Pool: N concurrent workers claiming, executing, heartbeating, and
//! finalizing runs (`spec.md` §4.5).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::channel::ChannelMap;
use crate::checkpoint::Checkpointer;
use crate::registry::GraphRegistry;
use crate::runner::{self, RunnerError, RunnerOutcome};
use crate::store::{Run, RunState, Store};

/// Tunables for the worker pool, mirroring `spec.md` §6's configuration env
/// vars (`WORKERS`, `TASK_TIMEOUT_MINUTES`).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops.
    pub workers: usize,
    /// Per-task timeout before a run is force-failed.
    pub task_timeout: Duration,
    /// How long an empty queue poll sleeps before retrying.
    pub poll_interval: Duration,
    /// How often a running job's `heartbeat_at` is refreshed.
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            task_timeout: Duration::from_secs(20 * 60),
            poll_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// A pool of concurrent workers polling one [`Store`] for queued runs.
pub struct WorkerPool {
    store: Arc<dyn Store>,
    checkpointer: Arc<dyn Checkpointer>,
    graphs: Arc<dyn GraphRegistry>,
    config: WorkerConfig,
}

impl WorkerPool {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        checkpointer: Arc<dyn Checkpointer>,
        graphs: Arc<dyn GraphRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            checkpointer,
            graphs,
            config,
        }
    }

    /// Spawns `config.workers` worker loops. Returns their join handles and
    /// a shutdown sender: setting it to `true` stops every loop cooperatively
    /// once its current poll or job finishes.
    pub fn spawn(self: Arc<Self>) -> (Vec<tokio::task::JoinHandle<()>>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(self.config.workers);
        for index in 0..self.config.workers {
            let pool = Arc::clone(&self);
            let worker_id = format!("worker-{index}");
            let mut shutdown = rx.clone();
            handles.push(tokio::spawn(async move {
                pool.run_loop(worker_id, &mut shutdown).await;
            }));
        }
        (handles, tx)
    }

    async fn run_loop(&self, worker_id: String, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.store.claim_next_queued(&worker_id).await {
                Ok(Some(run)) => {
                    tracing::info!(worker_id, run_id = %run.id, graph = %run.graph_name, "claimed run");
                    self.execute(&worker_id, run).await;
                }
                Ok(None) => {
                    if wait_or_shutdown(self.config.poll_interval, shutdown).await {
                        return;
                    }
                }
                Err(err) => {
                    tracing::error!(worker_id, error = %err, "failed to poll queue");
                    if wait_or_shutdown(self.config.poll_interval, shutdown).await {
                        return;
                    }
                }
            }
        }
    }

    async fn execute(&self, worker_id: &str, run: Run) {
        let run_id = run.id.clone();

        // `Store::continue_run` already refuses to requeue a `failed` run
        // once `attempt >= max_attempts` (spec.md §9 Open Question (b)), but
        // a run can still be claimed with `attempt > max_attempts` if
        // `max_attempts` was lowered after it was last queued. Finalize it
        // as failed without spending a task slot on the runner.
        if run.attempt > run.max_attempts {
            tracing::warn!(
                worker_id,
                run_id = %run_id,
                attempt = run.attempt,
                max_attempts = run.max_attempts,
                "run claimed past its attempt ceiling; failing without invoking the runner"
            );
            let error = format!(
                "exceeded max_attempts ({} of {})",
                run.attempt, run.max_attempts
            );
            if let Err(err) = self.store.finalize_run(&run_id, RunState::Failed, None, Some(error)).await {
                tracing::error!(run_id, error = %err, "failed to finalize run");
            }
            return;
        }

        let heartbeat_store = Arc::clone(&self.store);
        let heartbeat_run_id = run_id.clone();
        let heartbeat_worker_id = worker_id.to_string();
        let heartbeat_interval = self.config.heartbeat_interval;
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if heartbeat_store
                    .heartbeat(&heartbeat_run_id, &heartbeat_worker_id)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let outcome = tokio::time::timeout(
            self.config.task_timeout,
            run_graph(&run, &self.checkpointer, &self.graphs),
        )
        .await;
        heartbeat_task.abort();

        let (new_state, result, error) = match outcome {
            Ok(Ok(RunnerOutcome::Completed { state })) => (
                RunState::Succeeded,
                Some(serde_json::to_value(&state).unwrap_or(serde_json::Value::Null)),
                None,
            ),
            Ok(Ok(RunnerOutcome::Interrupted { .. })) => (RunState::NeedsInput, None, None),
            Ok(Err(err)) => (RunState::Failed, None, Some(err.to_string())),
            Err(_elapsed) => {
                let minutes = self.config.task_timeout.as_secs() / 60;
                (RunState::Failed, None, Some(format!("Task timed out after {minutes} minutes")))
            }
        };

        if let Err(err) = self.store.finalize_run(&run_id, new_state, result, error).await {
            tracing::error!(run_id, error = %err, "failed to finalize run");
        }
    }
}

/// Sleeps for `interval`, but returns early (with `true`) if shutdown fires.
async fn wait_or_shutdown(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
enum WorkerJobError {
    #[error("template {0:?} not found")]
    #[diagnostic(code(durable_flow::worker::template_missing))]
    TemplateMissing(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Runner(#[from] RunnerError),
}

async fn run_graph(
    run: &Run,
    checkpointer: &Arc<dyn Checkpointer>,
    graphs: &Arc<dyn GraphRegistry>,
) -> Result<RunnerOutcome, WorkerJobError> {
    let graph = graphs
        .resolve(&run.graph_name)
        .ok_or_else(|| WorkerJobError::TemplateMissing(run.graph_name.clone()))?;

    // spec.md §4.5 resume rule: a run resuming from `needs_input`, or being
    // retried after a prior attempt, relies entirely on checkpoint state.
    let (params, resume) = if run.resume_payload.is_some() || run.attempt > 1 {
        (None, run.resume_payload.clone())
    } else {
        (Some(inputs_to_channels(run.inputs.clone())), None)
    };

    Ok(runner::run(&graph, checkpointer, &run.thread_id, params, resume).await?)
}

fn inputs_to_channels(inputs: serde_json::Value) -> ChannelMap {
    match inputs {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        serde_json::Value::Null => ChannelMap::new(),
        other => {
            tracing::warn!("run inputs was not a JSON object; wrapping under channel 'input'");
            let mut channels = ChannelMap::new();
            channels.insert("input".to_string(), other);
            channels
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointer;
    use crate::graph::GraphBuilder;
    use crate::node::{Node, NodeContext, NodeError, NodePartial};
    use crate::registry::InMemoryGraphRegistry;
    use crate::store::NewRun;
    use crate::types::NodeKind;
    use async_trait::async_trait;

    struct Double;

    #[async_trait]
    impl Node for Double {
        async fn run(&self, state: ChannelMap, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
            let n = state.get("n").and_then(serde_json::Value::as_i64).unwrap_or(0);
            Ok(NodePartial::new().with_write("n", serde_json::json!(n * 2)))
        }
    }

    async fn sqlite_store() -> Arc<dyn Store> {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = crate::store::SqliteStore::new(pool);
        store.setup().await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn claims_and_completes_a_queued_run() {
        let store = sqlite_store().await;
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
        let graph = GraphBuilder::new()
            .add_node(NodeKind::Custom("double".into()), Double)
            .add_edge(NodeKind::Start, NodeKind::Custom("double".into()))
            .add_edge(NodeKind::Custom("double".into()), NodeKind::End)
            .compile();
        let graphs: Arc<dyn GraphRegistry> = Arc::new(InMemoryGraphRegistry::new().with_graph("doubler", graph));

        let run = store
            .create_run(NewRun {
                id: "run-1".into(),
                graph_name: "doubler".into(),
                thread_id: "run-1".into(),
                inputs: serde_json::json!({"n": 21}),
                max_attempts: 3,
            })
            .await
            .unwrap();

        let pool = WorkerPool::new(Arc::clone(&store), checkpointer, graphs, WorkerConfig::default());
        pool.execute("worker-test", store.claim_next_queued("worker-test").await.unwrap().unwrap())
            .await;

        let updated = store.get_run(&run.id).await.unwrap().unwrap();
        assert_eq!(updated.state, RunState::Succeeded);
        assert_eq!(updated.result.get("n"), Some(&serde_json::json!(42)));
    }

    #[tokio::test]
    async fn missing_template_fails_the_run() {
        let store = sqlite_store().await;
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
        let graphs: Arc<dyn GraphRegistry> = Arc::new(InMemoryGraphRegistry::new());

        store
            .create_run(NewRun {
                id: "run-2".into(),
                graph_name: "ghost".into(),
                thread_id: "run-2".into(),
                inputs: serde_json::json!({}),
                max_attempts: 3,
            })
            .await
            .unwrap();

        let pool = WorkerPool::new(Arc::clone(&store), checkpointer, graphs, WorkerConfig::default());
        let claimed = store.claim_next_queued("worker-test").await.unwrap().unwrap();
        pool.execute("worker-test", claimed).await;

        let updated = store.get_run("run-2").await.unwrap().unwrap();
        assert_eq!(updated.state, RunState::Failed);
        assert!(updated.error.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn a_run_claimed_past_its_attempt_ceiling_fails_without_running() {
        let store = sqlite_store().await;
        let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
        let graphs: Arc<dyn GraphRegistry> = Arc::new(InMemoryGraphRegistry::new());

        store
            .create_run(NewRun {
                id: "run-3".into(),
                graph_name: "doubler".into(),
                thread_id: "run-3".into(),
                inputs: serde_json::json!({}),
                max_attempts: 1,
            })
            .await
            .unwrap();
        let mut claimed = store.claim_next_queued("worker-test").await.unwrap().unwrap();
        // Simulate `max_attempts` having been lowered below the run's
        // current `attempt` after it was queued.
        claimed.attempt = 2;

        let pool = WorkerPool::new(Arc::clone(&store), checkpointer, graphs, WorkerConfig::default());
        pool.execute("worker-test", claimed).await;

        let updated = store.get_run("run-3").await.unwrap().unwrap();
        assert_eq!(updated.state, RunState::Failed);
        assert!(updated.error.unwrap().contains("max_attempts"));
    }
}
