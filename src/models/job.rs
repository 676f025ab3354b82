use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job lifecycle state.
///
/// Transitions form a strict order: pending → claimed → generating →
/// completed, with generating → pending (retry) and generating/claimed →
/// failed as the failure branches. The repository enforces each
/// transition with a conditional update; nothing else mutates job rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Claimed,
    Generating,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Claimed => "claimed",
            JobState::Generating => "generating",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "claimed" => JobState::Claimed,
            "generating" => JobState::Generating,
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            _ => JobState::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// One unit of work tracking a trend through generation.
///
/// Rows are retained after reaching a terminal state for audit and
/// statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub trend_id: i64,
    pub state: JobState,
    pub attempt_count: i64,
    pub last_error: Option<String>,
    /// Backoff deadline; a retried job is not eligible for claim before it.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set once the outcome has been announced (or announcement gave up).
    pub notified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
