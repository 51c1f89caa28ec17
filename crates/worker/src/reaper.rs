//! Stale-job reaper.
//!
//! Recovers jobs left in `processing` by a worker that died mid-dispatch,
//! and finalizes queued jobs that have used up their retries. Runs once at
//! startup and then on its own interval, independent of the claim loop.

use std::time::Duration;

use chrono::Utc;
use resq_core::retry::RetryPolicy;
use resq_core::types::Timestamp;
use resq_db::models::job::ReapReport;
use resq_db::repositories::JobRepo;
use resq_db::DbPool;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Errors that abort one sweep. The background loop logs them and carries on.
#[derive(Debug, thiserror::Error)]
pub enum ReaperError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stale timeout of {secs}s does not yield a valid cutoff time")]
    CutoffOutOfRange { secs: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct ReaperSettings {
    /// Age of `updated_at` past which a processing job counts as stale.
    pub stale_timeout: Duration,
    /// Period of the background sweep.
    pub interval: Duration,
    pub retry_policy: RetryPolicy,
}

/// Startup cleanup: exhausted-job sweep, then one stale-job sweep.
pub async fn run_startup_sweeps(
    pool: &DbPool,
    settings: &ReaperSettings,
) -> Result<ReapReport, ReaperError> {
    let exhausted =
        JobRepo::fail_exhausted(pool, settings.retry_policy.max_retries()).await?;
    if !exhausted.is_empty() {
        tracing::warn!(
            count = exhausted.len(),
            job_ids = ?exhausted,
            "Startup: failed jobs that had exhausted their retries",
        );
    }

    let mut report = sweep(pool, settings).await?;
    report.failed_exhausted.splice(0..0, exhausted);
    Ok(report)
}

/// One stale-job sweep.
pub async fn sweep(pool: &DbPool, settings: &ReaperSettings) -> Result<ReapReport, ReaperError> {
    let stale_before = stale_cutoff(settings.stale_timeout)?;

    let report =
        JobRepo::reap(pool, stale_before, settings.retry_policy.max_retries()).await?;

    for (job_id, retry_count) in &report.requeued {
        tracing::warn!(job_id, retry_count, "Reaper requeued stale job");
    }
    for job_id in &report.failed_stale {
        tracing::warn!(job_id, "Reaper failed stale job with no retries left");
    }
    for job_id in &report.failed_exhausted {
        tracing::warn!(job_id, "Reaper failed job that exceeded max retries");
    }

    if report.is_empty() {
        tracing::debug!("Reaper: nothing to recover");
    } else {
        match JobRepo::queue_stats(pool).await {
            Ok(stats) => tracing::info!(
                queued = stats.queued,
                processing = stats.processing,
                completed = stats.completed,
                failed = stats.failed,
                "Reaper sweep finished",
            ),
            Err(e) => tracing::debug!(error = %e, "Reaper: could not read queue stats"),
        }
    }

    Ok(report)
}

/// `now - stale_timeout`, or an error when that falls outside chrono's range.
fn stale_cutoff(stale_timeout: Duration) -> Result<Timestamp, ReaperError> {
    let out_of_range = || ReaperError::CutoffOutOfRange {
        secs: stale_timeout.as_secs(),
    };
    let delta = chrono::Duration::from_std(stale_timeout).map_err(|_| out_of_range())?;
    Utc::now().checked_sub_signed(delta).ok_or_else(out_of_range)
}

/// Run the periodic sweep until `cancel` is triggered.
///
/// The first sweep happens one `interval` after start; startup cleanup is
/// the caller's job via [`run_startup_sweeps`].
pub async fn run(pool: DbPool, settings: ReaperSettings, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = settings.interval.as_secs(),
        stale_timeout_secs = settings.stale_timeout.as_secs(),
        "Stale-job reaper started",
    );

    let Some(first_tick) = Instant::now().checked_add(settings.interval) else {
        tracing::error!(
            interval_secs = settings.interval.as_secs(),
            "Reaper interval is out of range; stale-job reaper not started",
        );
        return;
    };
    let mut interval = tokio::time::interval_at(first_tick, settings.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stale-job reaper stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = sweep(&pool, &settings).await {
                    tracing::error!(error = %e, "Stale-job sweep failed");
                }
            }
        }
    }
}
