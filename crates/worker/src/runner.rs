//! Worker Loop: claim, dispatch, record, sleep, repeat.
//!
//! One worker handles one job at a time. Scale-out is more worker
//! processes against the same database, not more tasks in this one.

use std::sync::Arc;
use std::time::Duration;

use resq_core::retry::RetryPolicy;
use resq_core::types::DbId;
use resq_db::repositories::JobRepo;
use resq_db::DbPool;
use resq_engine::ResearchBackend;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::recorder::{OutcomeRecorder, RecordedOutcome};

/// Errors that abort a single cycle. The loop logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of one [`Worker::process_next`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing was eligible (empty queue, or every queued row is locked).
    Idle,
    Processed {
        job_id: DbId,
        outcome: RecordedOutcome,
    },
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Recorded as `claimed_by` on the jobs this worker holds.
    pub name: String,
    pub poll_interval: Duration,
    pub dispatch_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

pub struct Worker {
    pool: DbPool,
    settings: WorkerSettings,
    dispatcher: Dispatcher,
    recorder: OutcomeRecorder,
}

impl Worker {
    pub fn new(pool: DbPool, backend: Arc<dyn ResearchBackend>, settings: WorkerSettings) -> Self {
        let dispatcher = Dispatcher::new(backend, settings.dispatch_timeout);
        let recorder = OutcomeRecorder::new(pool.clone(), settings.retry_policy);
        Self {
            pool,
            settings,
            dispatcher,
            recorder,
        }
    }

    /// One cycle: claim at most one job, dispatch it, record the outcome.
    ///
    /// If recording fails after a dispatch, the job stays in `processing`
    /// and the reaper picks it up once it goes stale.
    pub async fn process_next(&self) -> Result<CycleOutcome, WorkerError> {
        let Some(job) = JobRepo::claim_next(&self.pool, &self.settings.name).await? else {
            tracing::debug!(worker = %self.settings.name, "No queued jobs");
            return Ok(CycleOutcome::Idle);
        };

        tracing::info!(
            job_id = job.id,
            retry_count = job.retry_count,
            worker = %self.settings.name,
            "Job claimed",
        );

        let result = self.dispatcher.dispatch(job.id, &job.task).await;

        let outcome = self.recorder.record(&job, result).await.map_err(|e| {
            tracing::error!(
                job_id = job.id,
                error = %e,
                "Failed to record job outcome; left for stale recovery",
            );
            e
        })?;

        Ok(CycleOutcome::Processed {
            job_id: job.id,
            outcome,
        })
    }

    /// Run cycles until `cancel` is triggered.
    ///
    /// Sleeps `poll_interval` after every cycle whatever its result. A
    /// cycle already in flight when `cancel` fires runs to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            worker = %self.settings.name,
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            dispatch_timeout_secs = self.settings.dispatch_timeout.as_secs(),
            max_retries = self.settings.retry_policy.max_retries(),
            "Worker loop started",
        );

        while !cancel.is_cancelled() {
            if let Err(e) = self.process_next().await {
                tracing::error!(worker = %self.settings.name, error = %e, "Worker cycle failed");
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        tracing::info!(worker = %self.settings.name, "Worker loop stopped");
    }
}
