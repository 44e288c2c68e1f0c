use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::{Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSource, Checkpointer};
use crate::channel::{ChannelMap, PendingWrite};
use crate::utils::id_generator::new_id;

/// SQLite-backed checkpointer storing the full ordered history per thread.
pub struct SqliteCheckpointer {
    pool: SqlitePool,
}

impl SqliteCheckpointer {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn setup(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                step INTEGER NOT NULL,
                source TEXT NOT NULL,
                ts TEXT NOT NULL,
                channel_values TEXT NOT NULL,
                pending_writes TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_thread_step ON checkpoints(thread_id, step)",
        )
        .execute(&self.pool)
        .await?;
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

        let source_str = serde_json::to_string(&checkpoint.metadata.source)?;
        let channel_values_json = serde_json::to_string(&checkpoint.channel_values)?;
        let pending_writes_json = serde_json::to_string(&checkpoint.pending_writes)?;

        sqlx::query(
            r#"
            INSERT INTO checkpoints (id, thread_id, step, source, ts, channel_values, pending_writes)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&checkpoint.id)
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.metadata.step)
        .bind(source_str)
        .bind(checkpoint.ts.to_rfc3339())
        .bind(channel_values_json)
        .bind(pending_writes_json)
        .execute(&self.pool)
        .await?;

        Ok(checkpoint)
    }

    async fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        let rows = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT id, thread_id, step, source, ts, channel_values, pending_writes
            FROM checkpoints
            WHERE thread_id = ?
            ORDER BY step DESC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CheckpointRow::into_checkpoint).collect()
    }
}

#[derive(sqlx::FromRow)]
struct CheckpointRow {
    id: String,
    thread_id: String,
    step: i64,
    source: String,
    ts: String,
    channel_values: String,
    pending_writes: String,
}

impl CheckpointRow {
    fn into_checkpoint(self) -> Result<Checkpoint, CheckpointError> {
        Ok(Checkpoint {
            id: self.id,
            thread_id: self.thread_id,
            ts: chrono::DateTime::parse_from_rfc3339(&self.ts)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            channel_values: serde_json::from_str(&self.channel_values)?,
            metadata: CheckpointMetadata {
                step: self.step,
                source: serde_json::from_str(&self.source)?,
            },
            pending_writes: serde_json::from_str(&self.pending_writes)?,
        })
    }
}
