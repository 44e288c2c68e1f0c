//! Cron Scheduler: a periodic loop that enqueues runs from due triggers,
//! coalescing missed firings (`spec.md` §4.6).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::watch;

use crate::cron;
use crate::registry::GraphRegistry;
use crate::store::{NewRun, Store, StoreError};
use crate::utils::id_generator::new_id;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub max_attempts_per_run: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            max_attempts_per_run: 3,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Periodically scans due triggers and enqueues one run per firing.
pub struct Scheduler {
    store: Arc<dyn Store>,
    graphs: Arc<dyn GraphRegistry>,
    config: SchedulerConfig,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, graphs: Arc<dyn GraphRegistry>, config: SchedulerConfig) -> Self {
        Self { store, graphs, config }
    }

    /// Runs the scheduler loop forever until `shutdown` fires. Background
    /// errors are logged and never stop the loop (`spec.md` §7).
    pub async fn run(&self, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            match self.tick(Utc::now()).await {
                Ok(enqueued) if enqueued > 0 => {
                    tracing::info!(enqueued, "scheduler tick enqueued runs");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "scheduler tick failed"),
            }
            if wait_or_shutdown(self.config.poll_interval, shutdown).await {
                return;
            }
        }
    }

    /// One scheduler iteration: locks due triggers, enqueues a run for each
    /// resolvable template, and advances `next_run_at` from `now` (not the
    /// stale prior value) so an outage collapses missed firings into one
    /// run. Returns the number of runs enqueued.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let due = self.store.lock_due_triggers(now).await?;
        let mut enqueued = 0;

        for trigger in due {
            if !self.graphs.contains(&trigger.template_name) {
                tracing::warn!(trigger = %trigger.id, template = %trigger.template_name, "template not found, disabling trigger");
                self.store
                    .mark_template_missing(&trigger.id, format!("template {:?} not found", trigger.template_name))
                    .await?;
                continue;
            }

            let run_id = new_id();
            self.store
                .create_run(NewRun {
                    id: run_id.clone(),
                    graph_name: trigger.template_name.clone(),
                    thread_id: run_id.clone(),
                    inputs: trigger.inputs.clone(),
                    max_attempts: self.config.max_attempts_per_run,
                })
                .await?;

            let next = cron::parse_timezone(&trigger.timezone)
                .map_err(|err| err.to_string())
                .and_then(|tz| cron::next_run_after(&trigger.cron, &tz, now).map_err(|err| err.to_string()));

            self.store.record_trigger_run(&trigger.id, next).await?;
            enqueued += 1;
        }

        Ok(enqueued)
    }
}

async fn wait_or_shutdown(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        _ = shutdown.changed() => *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::registry::InMemoryGraphRegistry;
    use crate::store::{NewTrigger, RunState, SqliteStore};
    use crate::types::NodeKind;
    use chrono::TimeZone;

    async fn sqlite_store() -> Arc<dyn Store> {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        let store = SqliteStore::new(pool);
        store.setup().await.unwrap();
        Arc::new(store)
    }

    fn registry_with(name: &str) -> Arc<dyn GraphRegistry> {
        let graph = GraphBuilder::new().add_edge(NodeKind::Start, NodeKind::End).compile();
        Arc::new(InMemoryGraphRegistry::new().with_graph(name, graph))
    }

    #[tokio::test]
    async fn enqueues_one_run_and_advances_next_run_at() {
        let store = sqlite_store().await;
        let graphs = registry_with("greeter");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 11, 30, 0).unwrap();

        store
            .create_trigger(NewTrigger {
                id: "trig-1".into(),
                name: "hourly".into(),
                template_name: "greeter".into(),
                cron: "0 * * * *".into(),
                timezone: "UTC".into(),
                inputs: serde_json::json!({"k": "v"}),
                is_active: true,
                next_run_at: Some(now),
            })
            .await
            .unwrap();

        let scheduler = Scheduler::new(Arc::clone(&store), graphs, SchedulerConfig::default());
        let enqueued = scheduler.tick(now).await.unwrap();
        assert_eq!(enqueued, 1);

        let runs = store.list_runs(10, 0).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].state, RunState::Queued);
        assert_eq!(runs[0].inputs, serde_json::json!({"k": "v"}));

        let trigger = store.get_trigger("trig-1").await.unwrap().unwrap();
        assert!(trigger.next_run_at.unwrap() > now);
        assert!(trigger.last_run_at.is_some());
    }

    #[tokio::test]
    async fn missed_week_of_hourly_firings_collapses_to_one_run() {
        let store = sqlite_store().await;
        let graphs = registry_with("greeter");
        let stale = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let now = stale + chrono::Duration::days(7);

        store
            .create_trigger(NewTrigger {
                id: "trig-2".into(),
                name: "daily".into(),
                template_name: "greeter".into(),
                cron: "0 9 * * *".into(),
                timezone: "UTC".into(),
                inputs: serde_json::json!({}),
                is_active: true,
                next_run_at: Some(stale),
            })
            .await
            .unwrap();

        let scheduler = Scheduler::new(Arc::clone(&store), graphs, SchedulerConfig::default());
        let enqueued = scheduler.tick(now).await.unwrap();
        assert_eq!(enqueued, 1);

        let runs = store.list_runs(10, 0).await.unwrap();
        assert_eq!(runs.len(), 1);

        let trigger = store.get_trigger("trig-2").await.unwrap().unwrap();
        assert!(trigger.next_run_at.unwrap() > now);
    }

    #[tokio::test]
    async fn missing_template_disables_trigger_without_enqueuing() {
        let store = sqlite_store().await;
        let graphs: Arc<dyn GraphRegistry> = Arc::new(InMemoryGraphRegistry::new());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();

        store
            .create_trigger(NewTrigger {
                id: "trig-3".into(),
                name: "ghost-trigger".into(),
                template_name: "ghost".into(),
                cron: "0 9 * * *".into(),
                timezone: "UTC".into(),
                inputs: serde_json::json!({}),
                is_active: true,
                next_run_at: Some(now),
            })
            .await
            .unwrap();

        let scheduler = Scheduler::new(Arc::clone(&store), graphs, SchedulerConfig::default());
        let enqueued = scheduler.tick(now).await.unwrap();
        assert_eq!(enqueued, 0);

        assert!(store.list_runs(10, 0).await.unwrap().is_empty());
        let trigger = store.get_trigger("trig-3").await.unwrap().unwrap();
        assert!(!trigger.is_active);
        assert!(trigger.next_run_at.is_none());
        assert!(trigger.last_error.unwrap().contains("not found"));
    }
}
