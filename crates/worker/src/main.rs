//! `resq-worker` -- research job worker process.
//!
//! Claims queued research jobs from Postgres, runs each through the AI
//! research engine, and records the outcome. Run as many of these as
//! needed against one database. See [`WorkerConfig`] for the environment
//! variables it reads.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use resq_engine::ResearchEngineApi;
use resq_worker::config::LogFormat;
use resq_worker::{reaper, Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for the reaper task after the worker loop stops.
const REAPER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(
        worker = %config.worker_name,
        engine_url = %config.engine_url,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = resq_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    resq_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    resq_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Research engine ---
    let engine = ResearchEngineApi::new(&config.engine_url, config.dispatch_timeout)
        .context("Failed to build research engine client")?;
    if let Err(e) = engine.health().await {
        tracing::warn!(
            engine_url = %config.engine_url,
            error = %e,
            "Research engine health check failed; continuing, jobs will retry",
        );
    }

    // --- Startup recovery ---
    let reaper_settings = config.reaper_settings();
    if let Err(e) = reaper::run_startup_sweeps(&pool, &reaper_settings).await {
        tracing::error!(error = %e, "Startup recovery sweep failed");
    }

    // --- Background reaper ---
    let cancel = CancellationToken::new();
    let mut reaper_handle =
        tokio::spawn(reaper::run(pool.clone(), reaper_settings, cancel.clone()));

    // --- Shutdown signal ---
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    // --- Worker loop ---
    // Without the reaper, orphaned jobs would never come back, so its exit
    // before shutdown stops the worker too.
    let worker = Worker::new(pool.clone(), Arc::new(engine), config.worker_settings());
    let worker_run = worker.run(cancel.clone());
    tokio::pin!(worker_run);

    let mut reaper_failed = false;
    let reaper_joined = tokio::select! {
        () = &mut worker_run => false,
        joined = &mut reaper_handle => {
            if !cancel.is_cancelled() {
                match joined {
                    Ok(()) => tracing::error!("Stale-job reaper exited early; shutting down"),
                    Err(e) => tracing::error!(error = %e, "Stale-job reaper task failed; shutting down"),
                }
                reaper_failed = true;
                cancel.cancel();
            }
            worker_run.await;
            true
        }
    };

    cancel.cancel();
    if !reaper_joined {
        match tokio::time::timeout(REAPER_SHUTDOWN_TIMEOUT, reaper_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Stale-job reaper task failed"),
            Err(_) => tracing::warn!("Stale-job reaper did not stop in time"),
        }
    }
    pool.close().await;
    tracing::info!("Worker shut down");

    if reaper_failed {
        anyhow::bail!("Stale-job reaper stopped before shutdown");
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "resq_worker=info,resq_db=info,resq_engine=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), finishing current cycle");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, finishing current cycle");
        }
    }
}
