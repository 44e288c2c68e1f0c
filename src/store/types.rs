use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A run's position in the state machine of `spec.md` §4.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Running,
    NeedsInput,
    Failed,
    Succeeded,
    Canceled,
}

impl RunState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Running => "running",
            RunState::NeedsInput => "needs_input",
            RunState::Failed => "failed",
            RunState::Succeeded => "succeeded",
            RunState::Canceled => "canceled",
        }
    }

    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => RunState::Queued,
            "running" => RunState::Running,
            "needs_input" => RunState::NeedsInput,
            "failed" => RunState::Failed,
            "succeeded" => RunState::Succeeded,
            "canceled" => RunState::Canceled,
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed | RunState::Canceled)
    }
}

/// One execution instance of a template (`spec.md` §3 "Run").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub graph_name: String,
    pub thread_id: String,
    pub state: RunState,
    pub attempt: i32,
    pub max_attempts: i32,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub inputs: serde_json::Value,
    pub resume_payload: Option<serde_json::Value>,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to enqueue a new run (`spec.md` §4.6 step 2; the API's
/// `POST /workflows`, out of scope here but the same shape).
#[derive(Debug, Clone)]
pub struct NewRun {
    pub id: String,
    pub graph_name: String,
    pub thread_id: String,
    pub inputs: serde_json::Value,
    pub max_attempts: i32,
}

/// A persisted cron schedule that enqueues runs (`spec.md` §3 "Trigger").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub name: String,
    pub template_name: String,
    pub cron: String,
    pub timezone: String,
    pub inputs: serde_json::Value,
    pub is_active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a trigger.
#[derive(Debug, Clone)]
pub struct NewTrigger {
    pub id: String,
    pub name: String,
    pub template_name: String,
    pub cron: String,
    pub timezone: String,
    pub inputs: serde_json::Value,
    pub is_active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Partial update for a trigger (`PATCH /workflow-triggers/{id}`'s shape,
/// §6 — not an HTTP handler here, just the Store-level operation it needs).
#[derive(Debug, Clone, Default)]
pub struct TriggerUpdate {
    pub cron: Option<String>,
    pub timezone: Option<String>,
    pub inputs: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub next_run_at: Option<Option<DateTime<Utc>>>,
}
