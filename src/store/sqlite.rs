use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::types::{NewRun, NewTrigger, Run, RunState, Trigger, TriggerUpdate};
use super::{Store, StoreError};

/// SQLite-backed [`Store`].
///
/// `claim_next_queued` uses a single `UPDATE ... WHERE id = (SELECT ...)`
/// statement rather than `FOR UPDATE SKIP LOCKED` (SQLite has no such
/// clause). This is safe under SQLite's own writer serialization, but
/// assumes a single worker-pool process talks to a given database file —
/// running two pool processes against the same SQLite file can double-claim
/// under contention. Use the Postgres backend for multi-process polling.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for SqliteStore {
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
                started_at TEXT,
                heartbeat_at TEXT,
                finished_at TEXT,
                error TEXT,
                inputs TEXT NOT NULL,
                resume_payload TEXT,
                result TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
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
                inputs TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                next_run_at TEXT,
                last_run_at TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
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
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.graph_name)
        .bind(&run.thread_id)
        .bind(run.state.as_str())
        .bind(run.attempt)
        .bind(run.max_attempts)
        .bind(&run.worker_id)
        .bind(run.started_at.map(|t| t.to_rfc3339()))
        .bind(run.heartbeat_at.map(|t| t.to_rfc3339()))
        .bind(run.finished_at.map(|t| t.to_rfc3339()))
        .bind(&run.error)
        .bind(serde_json::to_string(&run.inputs)?)
        .bind(run.resume_payload.as_ref().map(serde_json::to_string).transpose()?)
        .bind(serde_json::to_string(&run.result)?)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(run)
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query_as::<_, RunRow>("SELECT * FROM runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(RunRow::into_run).transpose()
    }

    async fn list_runs(&self, limit: i64, offset: i64) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM runs ORDER BY created_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RunRow::into_run).collect()
    }

    async fn claim_next_queued(&self, worker_id: &str) -> Result<Option<Run>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE runs
            SET state = 'running', worker_id = ?, started_at = ?, heartbeat_at = ?, updated_at = ?,
                attempt = attempt + 1
            WHERE id = (
                SELECT id FROM runs WHERE state = 'queued' ORDER BY id ASC LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RunRow::into_run).transpose()
    }

    async fn heartbeat(&self, run_id: &str, worker_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE runs SET heartbeat_at = ? WHERE id = ? AND worker_id = ? AND state = 'running'",
        )
        .bind(Utc::now().to_rfc3339())
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
            SET state = ?, result = ?, error = ?,
                heartbeat_at = COALESCE(?, heartbeat_at),
                finished_at = COALESCE(?, finished_at),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(new_state.as_str())
        .bind(serde_json::to_string(&result)?)
        .bind(&error)
        .bind(heartbeat_at.map(|t| t.to_rfc3339()))
        .bind(finished_at.map(|t| t.to_rfc3339()))
        .bind(now.to_rfc3339())
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
                    "UPDATE runs SET state = 'queued', resume_payload = ?, worker_id = NULL, updated_at = ? WHERE id = ?",
                )
                .bind(serde_json::to_string(&resume_payload)?)
                .bind(now.to_rfc3339())
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
                    "UPDATE runs SET state = 'queued', worker_id = NULL, error = NULL, updated_at = ? WHERE id = ?",
                )
                .bind(now.to_rfc3339())
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
            "UPDATE runs SET state = 'canceled', finished_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
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
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&trigger.id)
        .bind(&trigger.name)
        .bind(&trigger.template_name)
        .bind(&trigger.cron)
        .bind(&trigger.timezone)
        .bind(serde_json::to_string(&trigger.inputs)?)
        .bind(trigger.is_active)
        .bind(trigger.next_run_at.map(|t| t.to_rfc3339()))
        .bind(trigger.last_run_at.map(|t| t.to_rfc3339()))
        .bind(&trigger.last_error)
        .bind(trigger.created_at.to_rfc3339())
        .bind(trigger.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(trigger)
    }

    async fn get_trigger(&self, trigger_id: &str) -> Result<Option<Trigger>, StoreError> {
        let row = sqlx::query_as::<_, TriggerRow>("SELECT * FROM triggers WHERE id = ?")
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
            SET cron = ?, timezone = ?, inputs = ?, is_active = ?, next_run_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&cron)
        .bind(&timezone)
        .bind(serde_json::to_string(&inputs)?)
        .bind(is_active)
        .bind(next_run_at.map(|t| t.to_rfc3339()))
        .bind(now.to_rfc3339())
        .bind(trigger_id)
        .execute(&self.pool)
        .await?;
        self.get_trigger(trigger_id)
            .await?
            .ok_or_else(|| StoreError::TriggerNotFound(trigger_id.to_string()))
    }

    async fn delete_trigger(&self, trigger_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM triggers WHERE id = ?")
            .bind(trigger_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lock_due_triggers(&self, now: DateTime<Utc>) -> Result<Vec<Trigger>, StoreError> {
        let rows = sqlx::query_as::<_, TriggerRow>(
            r#"
            SELECT * FROM triggers
            WHERE is_active = 1 AND next_run_at IS NOT NULL AND next_run_at <= ?
            ORDER BY next_run_at ASC
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TriggerRow::into_trigger).collect()
    }

    async fn mark_template_missing(&self, trigger_id: &str, message: String) -> Result<Trigger, StoreError> {
        sqlx::query(
            "UPDATE triggers SET is_active = 0, next_run_at = NULL, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&message)
        .bind(Utc::now().to_rfc3339())
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
                    "UPDATE triggers SET last_run_at = ?, last_error = NULL, next_run_at = ?, updated_at = ? WHERE id = ?",
                )
                .bind(now.to_rfc3339())
                .bind(next_run_at.to_rfc3339())
                .bind(now.to_rfc3339())
                .bind(trigger_id)
                .execute(&self.pool)
                .await?;
            }
            Err(message) => {
                sqlx::query(
                    "UPDATE triggers SET last_run_at = ?, last_error = ?, next_run_at = NULL, is_active = 0, updated_at = ? WHERE id = ?",
                )
                .bind(now.to_rfc3339())
                .bind(&message)
                .bind(now.to_rfc3339())
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
    started_at: Option<String>,
    heartbeat_at: Option<String>,
    finished_at: Option<String>,
    error: Option<String>,
    inputs: String,
    resume_payload: Option<String>,
    result: String,
    created_at: String,
    updated_at: String,
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
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
            started_at: self.started_at.as_deref().map(parse_ts),
            heartbeat_at: self.heartbeat_at.as_deref().map(parse_ts),
            finished_at: self.finished_at.as_deref().map(parse_ts),
            error: self.error,
            inputs: serde_json::from_str(&self.inputs)?,
            resume_payload: self
                .resume_payload
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            result: serde_json::from_str(&self.result)?,
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
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
    inputs: String,
    is_active: bool,
    next_run_at: Option<String>,
    last_run_at: Option<String>,
    last_error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TriggerRow {
    fn into_trigger(self) -> Result<Trigger, StoreError> {
        Ok(Trigger {
            id: self.id,
            name: self.name,
            template_name: self.template_name,
            cron: self.cron,
            timezone: self.timezone,
            inputs: serde_json::from_str(&self.inputs)?,
            is_active: self.is_active,
            next_run_at: self.next_run_at.as_deref().map(parse_ts),
            last_run_at: self.last_run_at.as_deref().map(parse_ts),
            last_error: self.last_error,
            created_at: parse_ts(&self.created_at),
            updated_at: parse_ts(&self.updated_at),
        })
    }
}
