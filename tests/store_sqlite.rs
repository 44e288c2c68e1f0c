//! Integration tests for the SQLite-backed `Store`: claim semantics,
//! finalize's COALESCE/absorb-on-canceled behavior, and cancel's state
//! guard (`spec.md` §4.1, §4.2, §8).

use durable_flow::store::{NewRun, NewTrigger, RunState, Store, SqliteStore, StoreError};

async fn store() -> SqliteStore {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let store = SqliteStore::new(pool);
    store.setup().await.unwrap();
    store
}

fn new_run(id: &str) -> NewRun {
    NewRun {
        id: id.to_string(),
        graph_name: "greeter".into(),
        thread_id: id.to_string(),
        inputs: serde_json::json!({}),
        max_attempts: 3,
    }
}

#[tokio::test]
async fn claim_next_queued_is_fifo_and_increments_attempt() {
    let store = store().await;
    store.create_run(new_run("r1")).await.unwrap();
    store.create_run(new_run("r2")).await.unwrap();

    let claimed = store.claim_next_queued("w1").await.unwrap().unwrap();
    assert_eq!(claimed.id, "r1");
    assert_eq!(claimed.state, RunState::Running);
    assert_eq!(claimed.attempt, 1);
    assert_eq!(claimed.worker_id.as_deref(), Some("w1"));

    let claimed2 = store.claim_next_queued("w2").await.unwrap().unwrap();
    assert_eq!(claimed2.id, "r2");

    assert!(store.claim_next_queued("w3").await.unwrap().is_none());
}

#[tokio::test]
async fn finalize_run_coalesces_and_never_overwrites_with_null() {
    let store = store().await;
    store.create_run(new_run("r1")).await.unwrap();
    store.claim_next_queued("w1").await.unwrap();

    let succeeded = store
        .finalize_run("r1", RunState::Succeeded, Some(serde_json::json!({"out": 1})), None)
        .await
        .unwrap();
    assert_eq!(succeeded.state, RunState::Succeeded);
    assert_eq!(succeeded.result, serde_json::json!({"out": 1}));
    assert!(succeeded.finished_at.is_some());

    // A second finalize call with a null result must not clobber the
    // already-persisted one (idempotent retry, spec.md §4.1).
    let retried = store.finalize_run("r1", RunState::Succeeded, None, None).await.unwrap();
    assert_eq!(retried.result, serde_json::json!({"out": 1}));
}

#[tokio::test]
async fn finalize_run_is_a_no_op_once_canceled() {
    let store = store().await;
    store.create_run(new_run("r1")).await.unwrap();
    store.claim_next_queued("w1").await.unwrap();
    let canceled = store.cancel_run("r1").await.unwrap();
    assert_eq!(canceled.state, RunState::Canceled);

    let after = store
        .finalize_run("r1", RunState::Failed, None, Some("too late".into()))
        .await
        .unwrap();
    assert_eq!(after.state, RunState::Canceled);
    assert!(after.error.is_none());
}

#[tokio::test]
async fn cancel_run_only_allowed_from_running() {
    let store = store().await;
    store.create_run(new_run("r1")).await.unwrap();

    let err = store.cancel_run("r1").await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidTransition { .. }));

    let run = store.get_run("r1").await.unwrap().unwrap();
    assert_eq!(run.state, RunState::Queued);
}

#[tokio::test]
async fn continue_run_requeues_needs_input_with_resume_payload() {
    let store = store().await;
    store.create_run(new_run("r1")).await.unwrap();
    store.claim_next_queued("w1").await.unwrap();
    store
        .finalize_run("r1", RunState::NeedsInput, None, None)
        .await
        .unwrap();

    let resumed = store.continue_run("r1", Some(serde_json::json!("42"))).await.unwrap();
    assert_eq!(resumed.state, RunState::Queued);
    assert_eq!(resumed.resume_payload, Some(serde_json::json!("42")));
}

#[tokio::test]
async fn continue_run_from_failed_is_refused_once_max_attempts_reached() {
    let store = store().await;
    store
        .create_run(NewRun {
            max_attempts: 1,
            ..new_run("r1")
        })
        .await
        .unwrap();
    store.claim_next_queued("w1").await.unwrap();
    store
        .finalize_run("r1", RunState::Failed, None, Some("boom".into()))
        .await
        .unwrap();

    let err = store.continue_run("r1", None).await.unwrap_err();
    assert!(matches!(err, StoreError::RetriesExhausted { attempt: 1, max_attempts: 1, .. }));

    let run = store.get_run("r1").await.unwrap().unwrap();
    assert_eq!(run.state, RunState::Failed);
}

#[tokio::test]
async fn lock_due_triggers_respects_next_run_at_and_is_active() {
    let store = store().await;
    let now = chrono::Utc::now();
    store
        .create_trigger(NewTrigger {
            id: "t1".into(),
            name: "due".into(),
            template_name: "greeter".into(),
            cron: "0 * * * *".into(),
            timezone: "UTC".into(),
            inputs: serde_json::json!({}),
            is_active: true,
            next_run_at: Some(now - chrono::Duration::minutes(1)),
        })
        .await
        .unwrap();
    store
        .create_trigger(NewTrigger {
            id: "t2".into(),
            name: "not-due".into(),
            template_name: "greeter".into(),
            cron: "0 * * * *".into(),
            timezone: "UTC".into(),
            inputs: serde_json::json!({}),
            is_active: true,
            next_run_at: Some(now + chrono::Duration::hours(1)),
        })
        .await
        .unwrap();
    store
        .create_trigger(NewTrigger {
            id: "t3".into(),
            name: "inactive".into(),
            template_name: "greeter".into(),
            cron: "0 * * * *".into(),
            timezone: "UTC".into(),
            inputs: serde_json::json!({}),
            is_active: false,
            next_run_at: Some(now - chrono::Duration::minutes(1)),
        })
        .await
        .unwrap();

    let due = store.lock_due_triggers(now).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, "t1");
}

#[tokio::test]
async fn mark_template_missing_disables_without_touching_last_run_at() {
    let store = store().await;
    store
        .create_trigger(NewTrigger {
            id: "t1".into(),
            name: "ghost".into(),
            template_name: "ghost".into(),
            cron: "0 * * * *".into(),
            timezone: "UTC".into(),
            inputs: serde_json::json!({}),
            is_active: true,
            next_run_at: Some(chrono::Utc::now()),
        })
        .await
        .unwrap();

    let updated = store.mark_template_missing("t1", "template not found".into()).await.unwrap();
    assert!(!updated.is_active);
    assert!(updated.next_run_at.is_none());
    assert!(updated.last_run_at.is_none());
    assert_eq!(updated.last_error.as_deref(), Some("template not found"));
}
