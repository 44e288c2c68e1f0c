use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::types::{NewRun, NewTrigger, Run, RunState, Trigger, TriggerUpdate};
use super::{Store, StoreError};

/// Postgres-backed [`Store`].
///
/// `claim_next_queued` uses `FOR UPDATE SKIP LOCKED` inside a single
/// statement, so multiple worker-pool processes can poll the same `runs`
/// table concurrently without double-claiming a run.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn setup(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                graph_name TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                state TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                max_attempts INTEGER NOT NULL,
                worker_id TEXT,
                started_at TIMESTAMPTZ,
                heartbeat_at TIMESTAMPTZ,
                finished_at TIMESTAMPTZ,
                error TEXT,
                inputs JSONB NOT NULL,
                resume_payload JSONB,
                result JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_state_created ON runs(state, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS triggers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                template_name TEXT NOT NULL,
                cron TEXT NOT NULL,
                timezone TEXT NOT NULL,
                inputs JSONB NOT NULL,
                is_active BOOLEAN NOT NULL,
                next_run_at TIMESTAMPTZ,
                last_run_at TIMESTAMPTZ,
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_triggers_active_next ON triggers(is_active, next_run_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_run(&self, new_run: NewRun) -> Result<Run, StoreError> {
        let now = Utc::now();
        let run = Run {
            id: new_run.id,
            graph_name: new_run.graph_name,
            thread_id: new_run.thread_id,
            state: RunState::Queued,
            attempt: 0,
            max_attempts: new_run.max_attempts,
            worker_id: None,
            started_at: None,
            heartbeat_at: None,
            finished_at: None,
            error: None,
            inputs: new_run.inputs,
            resume_payload: None,
            result: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO runs
                (id, graph_name, thread_id, state, attempt, max_attempts, worker_id,
                 started_at, heartbeat_at, finished_at, error, inputs, resume_payload,
                 result, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(&run.id)
        .bind(&run.graph_name)
        .bind(&run.thread_id)
        .bind(run.state.as_str())
        .bind(run.attempt)
        .bind(run.max_attempts)
        .bind(&run.worker_id)
        .bind(run.started_at)
        .bind(run.heartbeat_at)
        .bind(run.finished_at)
        .bind(&run.error)
        .bind(&run.inputs)
        .bind(&run.resume_payload)
        .bind(&run.result)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query_as::<_, RunRow>("SELECT * FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RunRow::into_run).transpose()
    }

    async fn list_runs(&self, limit: i64, offset: i64) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM runs ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RunRow::into_run).collect()
    }

    async fn claim_next_queued(&self, worker_id: &str) -> Result<Option<Run>, StoreError> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE runs
            SET state = 'running', worker_id = $1, started_at = $2, heartbeat_at = $2, updated_at = $2,
                attempt = attempt + 1
            WHERE id = (
                SELECT id FROM runs
                WHERE state = 'queued'
                ORDER BY id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RunRow::into_run).transpose()
    }

    async fn heartbeat(&self, run_id: &str, worker_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE runs SET heartbeat_at = $1 WHERE id = $2 AND worker_id = $3 AND state = 'running'",
        )
        .bind(Utc::now())
        .bind(run_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_run(
        &self,
        run_id: &str,
        new_state: RunState,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<Run, StoreError> {
        let current = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        // `canceled` is absorbing (spec.md §3): this conditional update is a
        // no-op, not an error, so retries from a worker racing a cancel
        // settle quietly on the canceled row.
        if current.state == RunState::Canceled {
            return Ok(current);
        }
        let now = Utc::now();
        let heartbeat_at = matches!(new_state, RunState::Running).then_some(now);
        let finished_at = new_state.is_terminal().then_some(now);
        // COALESCE semantics: a null/absent result never overwrites the
        // existing one (spec.md §4.1).
        let result = match result {
            Some(r) if !r.is_null() => r,
            _ => current.result.clone(),
        };
        sqlx::query(
            r#"
            UPDATE runs
            SET state = $1, result = $2, error = $3,
                heartbeat_at = COALESCE($4, heartbeat_at),
                finished_at = COALESCE($5, finished_at),
                updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(new_state.as_str())
        .bind(result)
        .bind(&error)
        .bind(heartbeat_at)
        .bind(finished_at)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        self.get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    async fn continue_run(
        &self,
        run_id: &str,
        answer: Option<serde_json::Value>,
    ) -> Result<Run, StoreError> {
        let current = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        let now = Utc::now();
        match current.state {
            RunState::NeedsInput => {
                let resume_payload = answer.unwrap_or(serde_json::Value::Null);
                sqlx::query(
                    "UPDATE runs SET state = 'queued', resume_payload = $1, worker_id = NULL, updated_at = $2 WHERE id = $3",
                )
                .bind(resume_payload)
                .bind(now)
                .bind(run_id)
                .execute(&self.pool)
                .await?;
            }
            RunState::Failed => {
                // spec.md §9 Open Question (b): `attempt` is left as-is on
                // retry; `max_attempts` gates further retries once reached.
                if current.attempt >= current.max_attempts {
                    return Err(StoreError::RetriesExhausted {
                        run_id: run_id.to_string(),
                        attempt: current.attempt,
                        max_attempts: current.max_attempts,
                    });
                }
                sqlx::query(
                    "UPDATE runs SET state = 'queued', worker_id = NULL, error = NULL, updated_at = $1 WHERE id = $2",
                )
                .bind(now)
                .bind(run_id)
                .execute(&self.pool)
                .await?;
            }
            other => {
                return Err(StoreError::InvalidTransition {
                    run_id: run_id.to_string(),
                    from: other.as_str(),
                    to: "queued",
                });
            }
        }
        self.get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    async fn cancel_run(&self, run_id: &str) -> Result<Run, StoreError> {
        let current = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))?;
        if current.state != RunState::Running {
            return Err(StoreError::InvalidTransition {
                run_id: run_id.to_string(),
                from: current.state.as_str(),
                to: "canceled",
            });
        }
        let now = Utc::now();
        sqlx::query(
            "UPDATE runs SET state = 'canceled', finished_at = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(now)
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        self.get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::RunNotFound(run_id.to_string()))
    }

    async fn create_trigger(&self, new_trigger: NewTrigger) -> Result<Trigger, StoreError> {
        let now = Utc::now();
        let trigger = Trigger {
            id: new_trigger.id,
            name: new_trigger.name,
            template_name: new_trigger.template_name,
            cron: new_trigger.cron,
            timezone: new_trigger.timezone,
            inputs: new_trigger.inputs,
            is_active: new_trigger.is_active,
            next_run_at: new_trigger.next_run_at,
            last_run_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO triggers
                (id, name, template_name, cron, timezone, inputs, is_active,
                 next_run_at, last_run_at, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&trigger.id)
        .bind(&trigger.name)
        .bind(&trigger.template_name)
        .bind(&trigger.cron)
        .bind(&trigger.timezone)
        .bind(&trigger.inputs)
        .bind(trigger.is_active)
        .bind(trigger.next_run_at)
        .bind(trigger.last_run_at)
        .bind(&trigger.last_error)
        .bind(trigger.created_at)
        .bind(trigger.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(trigger)
    }

    async fn get_trigger(&self, trigger_id: &str) -> Result<Option<Trigger>, StoreError> {
        let row = sqlx::query_as::<_, TriggerRow>("SELECT * FROM triggers WHERE id = $1")
            .bind(trigger_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TriggerRow::into_trigger).transpose()
    }

    async fn list_triggers(&self) -> Result<Vec<Trigger>, StoreError> {
        let rows = sqlx::query_as::<_, TriggerRow>("SELECT * FROM triggers ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TriggerRow::into_trigger).collect()
    }

    async fn update_trigger(
        &self,
        trigger_id: &str,
        update: TriggerUpdate,
    ) -> Result<Trigger, StoreError> {
        let current = self
            .get_trigger(trigger_id)
            .await?
            .ok_or_else(|| StoreError::TriggerNotFound(trigger_id.to_string()))?;
        let cron = update.cron.unwrap_or(current.cron);
        let timezone = update.timezone.unwrap_or(current.timezone);
        let inputs = update.inputs.unwrap_or(current.inputs);
        let is_active = update.is_active.unwrap_or(current.is_active);
        let next_run_at = update.next_run_at.unwrap_or(current.next_run_at);
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE triggers
            SET cron = $1, timezone = $2, inputs = $3, is_active = $4, next_run_at = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&cron)
        .bind(&timezone)
        .bind(&inputs)
        .bind(is_active)
        .bind(next_run_at)
        .bind(now)
        .bind(trigger_id)
        .execute(&self.pool)
        .await?;
        self.get_trigger(trigger_id)
            .await?
            .ok_or_else(|| StoreError::TriggerNotFound(trigger_id.to_string()))
    }

    async fn delete_trigger(&self, trigger_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM triggers WHERE id = $1")
            .bind(trigger_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lock_due_triggers(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, StoreError> {
        let rows = sqlx::query_as::<_, TriggerRow>(
            r#"
            SELECT * FROM triggers
            WHERE is_active = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1
            ORDER BY next_run_at ASC
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TriggerRow::into_trigger).collect()
    }

    async fn mark_template_missing(&self, trigger_id: &str, message: String) -> Result<Trigger, StoreError> {
        sqlx::query(
            "UPDATE triggers SET is_active = FALSE, next_run_at = NULL, last_error = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(&message)
        .bind(Utc::now())
        .bind(trigger_id)
        .execute(&self.pool)
        .await?;
        self.get_trigger(trigger_id)
            .await?
            .ok_or_else(|| StoreError::TriggerNotFound(trigger_id.to_string()))
    }

    async fn record_trigger_run(
        &self,
        trigger_id: &str,
        next: Result<DateTime<Utc>, String>,
    ) -> Result<Trigger, StoreError> {
        let now = Utc::now();
        match next {
            Ok(next_run_at) => {
                sqlx::query(
                    "UPDATE triggers SET last_run_at = $1, last_error = NULL, next_run_at = $2, updated_at = $3 WHERE id = $4",
                )
                .bind(now)
                .bind(next_run_at)
                .bind(now)
                .bind(trigger_id)
                .execute(&self.pool)
                .await?;
            }
            Err(message) => {
                sqlx::query(
                    "UPDATE triggers SET last_run_at = $1, last_error = $2, next_run_at = NULL, is_active = FALSE, updated_at = $3 WHERE id = $4",
                )
                .bind(now)
                .bind(&message)
                .bind(now)
                .bind(trigger_id)
                .execute(&self.pool)
                .await?;
            }
        }
        self.get_trigger(trigger_id)
            .await?
            .ok_or_else(|| StoreError::TriggerNotFound(trigger_id.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    graph_name: String,
    thread_id: String,
    state: String,
    attempt: i32,
    max_attempts: i32,
    worker_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    heartbeat_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    inputs: serde_json::Value,
    resume_payload: Option<serde_json::Value>,
    result: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RunRow {
    fn into_run(self) -> Result<Run, StoreError> {
        Ok(Run {
            id: self.id,
            graph_name: self.graph_name,
            thread_id: self.thread_id,
            state: RunState::from_str_opt(&self.state)
                .ok_or_else(|| StoreError::Unavailable(format!("unknown run state {}", self.state)))?,
            attempt: self.attempt,
            max_attempts: self.max_attempts,
            worker_id: self.worker_id,
            started_at: self.started_at,
            heartbeat_at: self.heartbeat_at,
            finished_at: self.finished_at,
            error: self.error,
            inputs: self.inputs,
            resume_payload: self.resume_payload,
            result: self.result,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TriggerRow {
    id: String,
    name: String,
    template_name: String,
    cron: String,
    timezone: String,
    inputs: serde_json::Value,
    is_active: bool,
    next_run_at: Option<DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TriggerRow {
    fn into_trigger(self) -> Result<Trigger, StoreError> {
        Ok(Trigger {
            id: self.id,
            name: self.name,
            template_name: self.template_name,
            cron: self.cron,
            timezone: self.timezone,
            inputs: self.inputs,
            is_active: self.is_active,
            next_run_at: self.next_run_at,
            last_run_at: self.last_run_at,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
