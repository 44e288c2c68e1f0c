//! Integration tests for the SQLite-backed `Checkpointer`: ordering,
//! round-tripping of `channel_values`/`pending_writes`, and the `latest`
//! default impl (`spec.md` §4.3).

use durable_flow::channel::{ChannelMap, PendingWrite};
use durable_flow::checkpoint::{CheckpointSource, Checkpointer, SqliteCheckpointer};

async fn checkpointer() -> SqliteCheckpointer {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let checkpointer = SqliteCheckpointer::new(pool);
    checkpointer.setup().await.unwrap();
    checkpointer
}

#[tokio::test]
async fn put_and_list_round_trips_in_newest_first_order() {
    let checkpointer = checkpointer().await;
    let mut baseline_state = ChannelMap::new();
    baseline_state.insert("seed".into(), serde_json::json!(1));

    checkpointer
        .put("t1", -1, CheckpointSource::Input, baseline_state.clone(), vec![])
        .await
        .unwrap();
    checkpointer
        .put(
            "t1",
            0,
            CheckpointSource::Loop,
            baseline_state,
            vec![PendingWrite::new("task-1", "out", serde_json::json!("hello"))],
        )
        .await
        .unwrap();

    let history = checkpointer.list("t1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].metadata.step, 0);
    assert_eq!(history[1].metadata.step, -1);
    assert_eq!(history[0].pending_writes[0].value, serde_json::json!("hello"));

    let latest = checkpointer.latest("t1").await.unwrap().unwrap();
    assert_eq!(latest.metadata.step, 0);
}

#[tokio::test]
async fn threads_do_not_see_each_others_history() {
    let checkpointer = checkpointer().await;
    checkpointer
        .put("t1", -1, CheckpointSource::Input, ChannelMap::new(), vec![])
        .await
        .unwrap();

    assert!(checkpointer.latest("t2").await.unwrap().is_none());
    assert_eq!(checkpointer.list("t2").await.unwrap().len(), 0);
}
