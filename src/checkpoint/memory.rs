use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSource, Checkpointer};
use crate::channel::{ChannelMap, PendingWrite};
use crate::utils::id_generator::new_id;

/// In-process checkpointer backed by a mutex-guarded map. Useful for tests
/// and for embedding this crate without a database.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: Mutex<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn setup(&self) -> Result<(), CheckpointError> {
        Ok(())
    }

    async fn put(
        &self,
        thread_id: &str,
        step: i64,
        source: CheckpointSource,
        channel_values: ChannelMap,
        pending_writes: Vec<PendingWrite>,
    ) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint {
            id: new_id(),
            thread_id: thread_id.to_string(),
            ts: Utc::now(),
            channel_values,
            metadata: CheckpointMetadata { step, source },
            pending_writes,
        };
        self.threads
            .lock()
            .entry(thread_id.to_string())
            .or_default()
            .push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut checkpoints = self
            .threads
            .lock()
            .get(thread_id)
            .cloned()
            .unwrap_or_default();
        checkpoints.sort_by_key(|c| std::cmp::Reverse(c.metadata.step));
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_list_returns_newest_first() {
        let checkpointer = InMemoryCheckpointer::new();
        checkpointer
            .put("t1", -1, CheckpointSource::Input, ChannelMap::new(), vec![])
            .await
            .unwrap();
        checkpointer
            .put("t1", 0, CheckpointSource::Loop, ChannelMap::new(), vec![])
            .await
            .unwrap();

        let checkpoints = checkpointer.list("t1").await.unwrap();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[0].metadata.step, 0);
        assert_eq!(checkpoints[1].metadata.step, -1);
    }

    #[tokio::test]
    async fn unknown_thread_returns_empty() {
        let checkpointer = InMemoryCheckpointer::new();
        assert!(checkpointer.list("ghost").await.unwrap().is_empty());
    }
}
