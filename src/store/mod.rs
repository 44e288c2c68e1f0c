//! Run and Trigger persistence (`spec.md` §3, §4.1, §4.6).
//!
//! The Store owns the at-most-one-running claim semantics described in
//! `spec.md` §4.1: [`Store::claim_next_queued`] must atomically move exactly
//! one `queued` run to `running` and return it, even under concurrent
//! pollers. The SQLite backend assumes a single writer process (documented
//! on [`sqlite::SqliteStore`]); the Postgres backend uses
//! `FOR UPDATE SKIP LOCKED` so multiple worker processes can poll the same
//! table safely.

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod types;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
pub use types::{NewRun, NewTrigger, Run, RunState, Trigger, TriggerUpdate};

/// Errors raised by a [`Store`] implementation.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("run {0} not found")]
    #[diagnostic(code(durable_flow::store::run_not_found))]
    RunNotFound(String),

    #[error("trigger {0} not found")]
    #[diagnostic(code(durable_flow::store::trigger_not_found))]
    TriggerNotFound(String),

    #[error("run {run_id} cannot transition from {from} to {to}")]
    #[diagnostic(code(durable_flow::store::invalid_transition))]
    InvalidTransition {
        run_id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("store backend unavailable: {0}")]
    #[diagnostic(code(durable_flow::store::unavailable))]
    Unavailable(String),

    #[error("run {run_id} has exhausted its retries ({attempt}/{max_attempts} attempts used)")]
    #[diagnostic(code(durable_flow::store::retries_exhausted))]
    RetriesExhausted {
        run_id: String,
        attempt: i32,
        max_attempts: i32,
    },

    #[error(transparent)]
    #[diagnostic(code(durable_flow::store::serde))]
    Serde(#[from] serde_json::Error),
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Durable persistence for runs and cron triggers.
///
/// Implementations back this with SQLite ([`sqlite::SqliteStore`]) or
/// Postgres ([`postgres::PostgresStore`]); both speak the same state
/// machine so the Worker Pool and Scheduler are backend-agnostic.
#[async_trait]
pub trait Store: Send + Sync {
    /// Creates the backing tables if they don't already exist.
    async fn setup(&self) -> Result<(), StoreError>;

    /// Inserts a new run in the `queued` state.
    async fn create_run(&self, new_run: NewRun) -> Result<Run, StoreError>;

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, StoreError>;

    async fn list_runs(&self, limit: i64, offset: i64) -> Result<Vec<Run>, StoreError>;

    /// Atomically claims one `queued` run for `worker_id`, moving it to
    /// `running` and stamping `started_at`/`heartbeat_at`. Returns `None`
    /// when the queue is empty.
    async fn claim_next_queued(&self, worker_id: &str) -> Result<Option<Run>, StoreError>;

    /// Refreshes `heartbeat_at` for a run still owned by `worker_id`.
    async fn heartbeat(&self, run_id: &str, worker_id: &str) -> Result<(), StoreError>;

    /// Moves a `running` run to `succeeded`, `failed`, or `needs_input`,
    /// per `spec.md` §4.2's transition table. The interrupt prompt itself
    /// lives in the run's checkpoint history under `__interrupt__`, not here.
    async fn finalize_run(
        &self,
        run_id: &str,
        new_state: RunState,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Run, StoreError>;

    /// Re-queues a `needs_input` or `failed` run. For `needs_input`, `answer`
    /// becomes the next run's `resume_payload`; for `failed`, `answer` is
    /// ignored and the prior `resume_payload` (if any) carries forward.
    async fn continue_run(
        &self,
        run_id: &str,
        answer: Option<serde_json::Value>,
    ) -> Result<Run, StoreError>;

    /// Moves a `running` run to `canceled`; fails with `InvalidTransition`
    /// from any other state (`spec.md` §4.2, §8 scenario 6).
    async fn cancel_run(&self, run_id: &str) -> Result<Run, StoreError>;

    async fn create_trigger(&self, new_trigger: NewTrigger) -> Result<Trigger, StoreError>;

    async fn get_trigger(&self, trigger_id: &str) -> Result<Option<Trigger>, StoreError>;

    async fn list_triggers(&self) -> Result<Vec<Trigger>, StoreError>;

    async fn update_trigger(
        &self,
        trigger_id: &str,
        update: TriggerUpdate,
    ) -> Result<Trigger, StoreError>;

    async fn delete_trigger(&self, trigger_id: &str) -> Result<(), StoreError>;

    /// Returns every active trigger whose `next_run_at` is due at or before
    /// `now`, per `spec.md` §4.6's "collapse missed firings" rule: each due
    /// trigger is returned once regardless of how many firings were missed.
    async fn lock_due_triggers(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Trigger>, StoreError>;

    /// Disables a trigger whose template could not be resolved, without
    /// touching `last_run_at` (`spec.md` §4.6 step 2: no run was enqueued,
    /// so the trigger never "ran").
    async fn mark_template_missing(&self, trigger_id: &str, message: String) -> Result<Trigger, StoreError>;

    /// Records the outcome of one scheduler firing that did enqueue a run:
    /// always stamps `last_run_at = now`. `next` being `Ok` sets
    /// `next_run_at` and clears `last_error`; `Err` disables the trigger and
    /// records the message (`spec.md` §4.6 step 2, "compute next firing").
    async fn record_trigger_run(
        &self,
        trigger_id: &str,
        next: Result<chrono::DateTime<chrono::Utc>, String>,
    ) -> Result<Trigger, StoreError>;
}
