//! Job run entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::RunStatus;

/// Identifier of a job run, assigned by the store at creation.
pub type RunId = i64;

/// One scheduled firing of one job, spanning all of its attempts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRun {
    /// Unique run identifier. Never changes, including across recovery.
    pub id: RunId,
    /// Name of the job definition. Not unique across runs.
    pub job_name: String,
    /// Instant the run was due to fire.
    pub scheduled_time: DateTime<Utc>,
    /// Current lifecycle state.
    #[sqlx(try_from = "String")]
    pub status: RunStatus,
    /// Number of failed attempts consumed so far.
    pub retry_count: i32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Wall-clock duration of the attempt that last wrote a terminal-ish status.
    pub duration_seconds: Option<f64>,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl JobRun {
    /// Whether a recovery scan with the given budget would resume this run.
    pub fn is_recoverable(&self, max_retries: i32) -> bool {
        !self.status.is_completed() && self.retry_count < max_retries
    }
}

/// The subset of a run needed to resume it after a crash.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RecoverableRun {
    /// Existing run identifier, reused by the resumed execution.
    pub id: RunId,
    /// Original due time of the run.
    pub scheduled_time: DateTime<Utc>,
    /// Failed attempts already consumed; the resumed attempt starts here.
    pub retry_count: i32,
}

impl From<&JobRun> for RecoverableRun {
    fn from(run: &JobRun) -> Self {
        Self {
            id: run.id,
            scheduled_time: run.scheduled_time,
            retry_count: run.retry_count,
        }
    }
}
