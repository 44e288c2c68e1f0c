//! Top-level error aggregator for callers that don't need to match on a
//! specific component (`SPEC_FULL.md` §7).
//!
//! Each component module (`store`, `checkpoint`, `runner`, `scheduler`,
//! `cron`, `reader`, `node`) defines its own `miette::Diagnostic` error enum
//! for callers who want to match on it directly; `DurableFlowError` just
//! wraps those via `#[from]` so a binary can propagate any of them with a
//! single `?` and a diagnostic-aware report.

use miette::Diagnostic;
use thiserror::Error;

use crate::checkpoint::CheckpointError;
use crate::cron::CronError;
use crate::node::NodeError;
use crate::reader::ReaderError;
use crate::runner::RunnerError;
use crate::scheduler::SchedulerError;
use crate::store::StoreError;

/// Umbrella error type covering every component this crate ships.
#[derive(Debug, Error, Diagnostic)]
pub enum DurableFlowError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cron(#[from] CronError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Node(#[from] NodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_a_store_error_via_from() {
        let err: DurableFlowError = StoreError::RunNotFound("r1".into()).into();
        assert!(matches!(err, DurableFlowError::Store(StoreError::RunNotFound(id)) if id == "r1"));
    }
}
