//! Checkpointer: save/load an ordered per-`thread_id` sequence of checkpoint
//! tuples (`spec.md` §4.3).
//!
//! The checkpointer is deliberately dumb storage: it does not materialize
//! writes into channel values itself. This crate adopts the **load-time**
//! convention (`spec.md` §9 Open Question (a), `SPEC_FULL.md` §4.4): a
//! checkpoint's `channel_values` reflect state *before* its own
//! `pending_writes` are applied; [`crate::runner::run`] is the sole
//! authority that folds history into a materialized state, both on initial
//! load and incrementally as it advances.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;
mod types;

pub use memory::InMemoryCheckpointer;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCheckpointer;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointer;
pub use types::{Checkpoint, CheckpointMetadata, CheckpointSource};

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::channel::{ChannelMap, PendingWrite};

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    #[error("checkpoint store unavailable: {0}")]
    #[diagnostic(code(durable_flow::checkpoint::unavailable))]
    Unavailable(String),

    #[error("checkpoint serialization error: {0}")]
    #[diagnostic(code(durable_flow::checkpoint::serde))]
    Serde(#[from] serde_json::Error),
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Unavailable(err.to_string())
    }
}

/// Per-`thread_id` ordered checkpoint storage.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Idempotent DDL / schema setup for the persistence backend.
    async fn setup(&self) -> Result<(), CheckpointError>;

    /// Append a new checkpoint for `thread_id`, generating a fresh `id` and
    /// `ts`. `channel_values` must be the state *before* `pending_writes`
    /// are applied (see module docs).
    async fn put(
        &self,
        thread_id: &str,
        step: i64,
        source: CheckpointSource,
        channel_values: ChannelMap,
        pending_writes: Vec<PendingWrite>,
    ) -> Result<Checkpoint, CheckpointError>;

    /// All checkpoints for `thread_id`, newest first.
    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError>;

    /// The most recent checkpoint for `thread_id`, if any.
    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.list(thread_id).await?.into_iter().next())
    }
}
