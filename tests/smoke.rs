//! End-to-end smoke test: enqueue a run via the Store, execute it through
//! the Pregel Runner the way the Worker Pool does, finalize it, and confirm
//! the Run-Details Reader's replay agrees with the run's final state
//! (`spec.md` §8, testable property 4).

use std::sync::Arc;

use async_trait::async_trait;
use durable_flow::channel::ChannelMap;
use durable_flow::checkpoint::{Checkpointer, InMemoryCheckpointer};
use durable_flow::graph::GraphBuilder;
use durable_flow::node::{Node, NodeContext, NodeError, NodePartial};
use durable_flow::reader;
use durable_flow::runner::{self, RunnerOutcome};
use durable_flow::store::{NewRun, RunState, SqliteStore, Store};
use durable_flow::types::NodeKind;

struct Uppercase;

#[async_trait]
impl Node for Uppercase {
    async fn run(&self, state: ChannelMap, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
        let text = state.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(NodePartial::new().with_write("text", serde_json::json!(text.to_uppercase())))
    }
}

struct Exclaim;

#[async_trait]
impl Node for Exclaim {
    async fn run(&self, state: ChannelMap, _ctx: NodeContext) -> Result<NodePartial, NodeError> {
        let text = state.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(NodePartial::new().with_write("text", serde_json::json!(format!("{text}!"))))
    }
}

#[tokio::test]
async fn a_queued_run_completes_and_replays_consistently() {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = SqliteStore::new(pool);
    store.setup().await.unwrap();

    let run = store
        .create_run(NewRun {
            id: "run-1".into(),
            graph_name: "shout".into(),
            thread_id: "run-1".into(),
            inputs: serde_json::json!({"text": "hello"}),
            max_attempts: 3,
        })
        .await
        .unwrap();

    let graph = GraphBuilder::new()
        .add_node(NodeKind::Custom("upper".into()), Uppercase)
        .add_node(NodeKind::Custom("exclaim".into()), Exclaim)
        .add_edge(NodeKind::Start, NodeKind::Custom("upper".into()))
        .add_edge(NodeKind::Custom("upper".into()), NodeKind::Custom("exclaim".into()))
        .add_edge(NodeKind::Custom("exclaim".into()), NodeKind::End)
        .compile();
    let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());

    let claimed = store.claim_next_queued("worker-1").await.unwrap().unwrap();
    assert_eq!(claimed.id, run.id);

    let mut params = ChannelMap::new();
    params.insert("text".into(), serde_json::json!("hello"));
    let outcome = runner::run(&graph, &checkpointer, &claimed.thread_id, Some(params), None)
        .await
        .unwrap();

    let final_state = match outcome {
        RunnerOutcome::Completed { state } => state,
        RunnerOutcome::Interrupted { .. } => panic!("expected completion"),
    };
    assert_eq!(final_state.get("text"), Some(&serde_json::json!("HELLO!")));

    let finalized = store
        .finalize_run(
            &claimed.id,
            RunState::Succeeded,
            Some(serde_json::to_value(&final_state).unwrap()),
            None,
        )
        .await
        .unwrap();
    assert_eq!(finalized.state, RunState::Succeeded);

    let history = checkpointer.list(&claimed.thread_id).await.unwrap();
    let details = reader::build_run_details(&claimed.id, history).unwrap();

    let mut replayed_state = details.initial_state.clone();
    for step in &details.steps {
        for (k, v) in &step.output_state {
            replayed_state.insert(k.clone(), v.clone());
        }
    }
    assert_eq!(replayed_state.get("text"), final_state.get("text"));
}
