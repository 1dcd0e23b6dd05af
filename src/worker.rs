//! Worker pull loop.
//!
//! Pulls batches of jobs from the edge queue, runs the audit pipeline
//! for each, and acknowledges them `done` or `failed`. The remote
//! queue's visibility timeout guarantees at-most-one-worker-per-job; the
//! loop itself processes jobs sequentially.
//!
//! Shutdown is cooperative: SIGINT/SIGTERM stop the loop after the
//! current job finishes, so leased jobs are always acknowledged.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::models::RunState;
use crate::pipeline::Pipeline;
use crate::queue::{AckStatus, JobClient};
use crate::server::run_health_server;

/// Run the worker: health server plus the job pull loop, until a
/// shutdown signal arrives.
pub async fn run_worker(config: Config) -> Result<()> {
    let pipeline = Pipeline::new(&config)?;
    let job_client = JobClient::new(&config.edge)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    let bind = config.worker.bind.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&bind).await {
            error!(error = %e, "health server exited");
        }
    });

    pull_loop(&config, &pipeline, &job_client, shutdown_rx).await;
    info!("worker shutdown complete");
    Ok(())
}

/// Main pull loop. Sleeps between pulls, interruptible by shutdown.
async fn pull_loop(
    config: &Config,
    pipeline: &Pipeline,
    job_client: &JobClient,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("starting job pull loop");

    while !*shutdown.borrow() {
        let jobs = match job_client
            .pull(
                config.worker.batch_size,
                config.worker.visibility_timeout_secs,
            )
            .await
        {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "pull failed");
                if sleep_or_shutdown(config.worker.idle_backoff_secs, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        if jobs.is_empty() {
            if sleep_or_shutdown(config.worker.poll_interval_secs, &mut shutdown).await {
                break;
            }
            continue;
        }

        info!(count = jobs.len(), "pulled jobs");

        for job in &jobs {
            if *shutdown.borrow() {
                break;
            }

            info!(
                job_id = %job.id,
                run_id = %job.run_id,
                tenant_id = %job.tenant_id,
                key = %job.r2_key,
                attempts = job.attempts,
                "processing job"
            );

            let final_state = pipeline.run(RunState::from_job(job)).await;
            let status = if final_state.error.is_none() {
                AckStatus::Done
            } else {
                // Terminal failure: the pipeline already persisted the
                // error status, so don't requeue.
                warn!(job_id = %job.id, error = ?final_state.error, "job failed");
                AckStatus::Failed
            };

            if let Err(e) = job_client.ack(&[job.id.clone()], status).await {
                error!(job_id = %job.id, error = %e, "failed to ack job");
            }
        }

        // Pause after a batch to avoid rapid polling.
        if sleep_or_shutdown(config.worker.idle_backoff_secs, &mut shutdown).await {
            break;
        }
    }

    info!("pull loop stopped");
}

/// Sleep for `secs`, returning early (and `true`) if shutdown fires.
async fn sleep_or_shutdown(secs: u64, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(secs)) => *shutdown.borrow(),
        _ = shutdown.changed() => true,
    }
}

/// Flip the shutdown flag on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "failed to install SIGTERM handler");
                        let _ = ctrl_c.await;
                        let _ = shutdown_tx.send(true);
                        return;
                    }
                };
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received interrupt, shutting down");
        }

        let _ = shutdown_tx.send(true);
    });
}
