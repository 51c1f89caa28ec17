//! Job entity model and sweep reports for the research queue.

use resq_core::job_outcome::JobOutcome;
use resq_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub task: String,
    pub status_id: StatusId,
    pub retry_count: i32,
    pub result: Option<serde_json::Value>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::from_id(self.status_id)
    }

    /// Typed view of `result`, present only once the job is terminal.
    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.status()? {
            JobStatus::Completed => Some(JobOutcome::from_completed(
                self.result.clone().unwrap_or(serde_json::Value::Null),
            )),
            JobStatus::Failed => Some(JobOutcome::from_failed(self.result.clone())),
            JobStatus::Queued | JobStatus::Processing => None,
        }
    }
}

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// Rows touched by one stale-job sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Stale jobs put back in the queue, with their new retry count.
    pub requeued: Vec<(DbId, i32)>,
    /// Stale jobs that had no retries left, including those whose recovery
    /// would have put them at the bound.
    pub failed_stale: Vec<DbId>,
    /// Queued jobs already at the retry bound.
    pub failed_exhausted: Vec<DbId>,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.requeued.is_empty() && self.failed_stale.is_empty() && self.failed_exhausted.is_empty()
    }
}
