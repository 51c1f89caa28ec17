//! Repository for the `jobs` table.
//!
//! Uses `JobStatus` from `models::status` for all status transitions.
//! Every statement that changes `status_id` also refreshes `updated_at`,
//! which is what the stale sweep measures against.

use resq_core::job_outcome::{MAX_RETRIES_EXCEEDED, STALE_RETRIES_EXHAUSTED};
use resq_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::job::{Job, QueueStats, ReapReport};
use crate::models::status::{JobStatus, StatusId};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, task, status_id, retry_count, result, \
    claimed_by, claimed_at, completed_at, \
    created_at, updated_at";

/// Provides queue operations for research jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new queued job.
    pub async fn submit(pool: &PgPool, task: &str) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (task, status_id) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(task)
            .bind(JobStatus::Queued.id())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest queued job.
    ///
    /// Selects with `FOR UPDATE SKIP LOCKED` inside a transaction so that
    /// concurrent claimants never pick the same row and never wait on each
    /// other. Returns `None` when the queue is empty or every queued row is
    /// locked by another claimant.
    pub async fn claim_next(pool: &PgPool, worker_name: &str) -> Result<Option<Job>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let candidate: Option<DbId> = sqlx::query_scalar(
            "SELECT id FROM jobs \
             WHERE status_id = $1 \
             ORDER BY created_at ASC, id ASC \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(JobStatus::Queued.id())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job_id) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, claimed_by = $3, claimed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let job = sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobStatus::Processing.id())
            .bind(worker_name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    /// Mark a processing job as completed with its result payload.
    ///
    /// `attempt` is the `retry_count` observed at claim time. Returns
    /// `false` if the job is no longer the caller's attempt (the reaper
    /// reclaimed it), in which case nothing is written.
    pub async fn complete(
        pool: &PgPool,
        job_id: DbId,
        attempt: i32,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $4, result = $5, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 AND retry_count = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.id())
        .bind(attempt)
        .bind(JobStatus::Completed.id())
        .bind(result)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Return a failed processing job to the queue with `retry_count + 1`.
    ///
    /// Guarded the same way as [`JobRepo::complete`].
    pub async fn requeue(pool: &PgPool, job_id: DbId, attempt: i32) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $4, retry_count = retry_count + 1, \
                 claimed_by = NULL, claimed_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 AND retry_count = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.id())
        .bind(attempt)
        .bind(JobStatus::Queued.id())
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Permanently fail a processing job, storing the error payload.
    ///
    /// Also counts the failed attempt in `retry_count`. Guarded the same way
    /// as [`JobRepo::complete`].
    pub async fn fail(
        pool: &PgPool,
        job_id: DbId,
        attempt: i32,
        error: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status_id = $4, retry_count = retry_count + 1, result = $5, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $2 AND retry_count = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Processing.id())
        .bind(attempt)
        .bind(JobStatus::Failed.id())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Fail every queued job whose `retry_count` has reached `max_retries`.
    ///
    /// Idempotent: already-failed rows are outside the filter.
    pub async fn fail_exhausted(pool: &PgPool, max_retries: i32) -> Result<Vec<DbId>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::fail_exhausted_on(&mut *conn, max_retries).await
    }

    /// Recover jobs stuck in `processing` since before `stale_before`.
    ///
    /// Runs in one transaction:
    /// 1. stale jobs under the retry bound go back to `queued` with
    ///    `retry_count + 1`;
    /// 2. stale jobs at or over the bound are failed;
    /// 3. queued jobs at or over the bound (including any pushed there by
    ///    step 1) are failed, so they are never claimed again.
    pub async fn reap(
        pool: &PgPool,
        stale_before: Timestamp,
        max_retries: i32,
    ) -> Result<ReapReport, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let requeued: Vec<(DbId, i32)> = sqlx::query_as(
            "UPDATE jobs \
             SET status_id = $4, retry_count = retry_count + 1, \
                 claimed_by = NULL, claimed_at = NULL, updated_at = NOW() \
             WHERE status_id = $1 AND updated_at < $2 AND retry_count < $3 \
             RETURNING id, retry_count",
        )
        .bind(JobStatus::Processing.id())
        .bind(stale_before)
        .bind(max_retries)
        .bind(JobStatus::Queued.id())
        .fetch_all(&mut *tx)
        .await?;

        let failed_stale: Vec<DbId> = sqlx::query_scalar(
            "UPDATE jobs \
             SET status_id = $4, retry_count = retry_count + 1, \
                 result = jsonb_build_object('error', $5::text, 'attempts', retry_count + 1), \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE status_id = $1 AND updated_at < $2 AND retry_count >= $3 \
             RETURNING id",
        )
        .bind(JobStatus::Processing.id())
        .bind(stale_before)
        .bind(max_retries)
        .bind(JobStatus::Failed.id())
        .bind(STALE_RETRIES_EXHAUSTED)
        .fetch_all(&mut *tx)
        .await?;

        let mut failed_exhausted = Self::fail_exhausted_on(&mut *tx, max_retries).await?;

        tx.commit().await?;

        // A stale row requeued onto the bound by step 1 is failed by step 3 in
        // the same pass; report it once, as a stale failure.
        let mut requeued = requeued;
        let mut failed_stale = failed_stale;
        requeued.retain(|(id, _)| {
            if failed_exhausted.contains(id) {
                failed_stale.push(*id);
                false
            } else {
                true
            }
        });
        failed_exhausted.retain(|id| !failed_stale.contains(id));

        Ok(ReapReport {
            requeued,
            failed_stale,
            failed_exhausted,
        })
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count jobs in each status.
    pub async fn queue_stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> =
            sqlx::query_as("SELECT status_id, COUNT(*) FROM jobs GROUP BY status_id")
                .fetch_all(pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status_id, count) in rows {
            match JobStatus::from_id(status_id) {
                Some(JobStatus::Queued) => stats.queued = count,
                Some(JobStatus::Processing) => stats.processing = count,
                Some(JobStatus::Completed) => stats.completed = count,
                Some(JobStatus::Failed) => stats.failed = count,
                None => tracing::warn!(status_id, count, "Jobs with unknown status"),
            }
        }
        Ok(stats)
    }

    // ---- private helpers ----

    async fn fail_exhausted_on(
        conn: &mut PgConnection,
        max_retries: i32,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE jobs \
             SET status_id = $3, \
                 result = jsonb_build_object('error', $4::text, 'attempts', retry_count), \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE status_id = $1 AND retry_count >= $2 \
             RETURNING id",
        )
        .bind(JobStatus::Queued.id())
        .bind(max_retries)
        .bind(JobStatus::Failed.id())
        .bind(MAX_RETRIES_EXCEEDED)
        .fetch_all(conn)
        .await
    }
}
