//! Outcome Recorder: persists the result of one dispatch attempt.
//!
//! Each write is its own short statement, fenced on the `retry_count` seen
//! at claim time so a late result cannot overwrite a job the reaper has
//! already handed to someone else.

use resq_core::job_outcome::FailureRecord;
use resq_core::retry::{FailureDisposition, RetryPolicy};
use resq_db::models::job::Job;
use resq_db::repositories::JobRepo;
use resq_db::DbPool;

use crate::dispatcher::DispatchError;

/// What the recorder did with a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedOutcome {
    Completed,
    Requeued { retry_count: i32 },
    Failed { attempts: i32 },
    /// The job was no longer this attempt's to record (stale-recovered).
    Lost,
}

pub struct OutcomeRecorder {
    pool: DbPool,
    policy: RetryPolicy,
}

impl OutcomeRecorder {
    pub fn new(pool: DbPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Record the dispatch result for a claimed job.
    pub async fn record(
        &self,
        job: &Job,
        result: Result<serde_json::Value, DispatchError>,
    ) -> Result<RecordedOutcome, sqlx::Error> {
        match result {
            Ok(payload) => self.record_success(job, &payload).await,
            Err(e) => self.record_failure(job, &e).await,
        }
    }

    async fn record_success(
        &self,
        job: &Job,
        payload: &serde_json::Value,
    ) -> Result<RecordedOutcome, sqlx::Error> {
        if !JobRepo::complete(&self.pool, job.id, job.retry_count, payload).await? {
            return Ok(self.lost(job));
        }
        tracing::info!(job_id = job.id, retry_count = job.retry_count, "Job completed");
        Ok(RecordedOutcome::Completed)
    }

    async fn record_failure(
        &self,
        job: &Job,
        error: &DispatchError,
    ) -> Result<RecordedOutcome, sqlx::Error> {
        match self.policy.on_failure(job.retry_count) {
            FailureDisposition::Requeue { next_retry_count } => {
                if !JobRepo::requeue(&self.pool, job.id, job.retry_count).await? {
                    return Ok(self.lost(job));
                }
                tracing::warn!(
                    job_id = job.id,
                    retry_count = next_retry_count,
                    max_retries = self.policy.max_retries(),
                    error = %error,
                    "Job attempt failed, requeued",
                );
                Ok(RecordedOutcome::Requeued {
                    retry_count: next_retry_count,
                })
            }
            FailureDisposition::Fail { attempts } => {
                let record = FailureRecord::new(error.to_string(), error.detail(), attempts);
                if !JobRepo::fail(&self.pool, job.id, job.retry_count, &record.to_value()).await? {
                    return Ok(self.lost(job));
                }
                tracing::error!(
                    job_id = job.id,
                    attempts,
                    error = %error,
                    "Job failed permanently",
                );
                Ok(RecordedOutcome::Failed { attempts })
            }
        }
    }

    fn lost(&self, job: &Job) -> RecordedOutcome {
        tracing::warn!(
            job_id = job.id,
            retry_count = job.retry_count,
            "Job was reclaimed before this attempt finished; outcome discarded",
        );
        RecordedOutcome::Lost
    }
}
