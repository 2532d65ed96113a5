use crate::infrastructure::queue::CONVERSION_QUEUE;
use crate::infrastructure::redis::client::{job_lease_key, lease_renew_interval};
use crate::modules::conversion::events::ConversionJob;
use crate::state::AppState;
use anyhow::anyhow;
use futures_util::StreamExt;
use lapin::options::BasicAckOptions;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

pub async fn start_conversion_worker(state: AppState) -> anyhow::Result<()> {
    info!("🎥 Starting Conversion Worker...");

    let mut consumer = state
        .queue
        .consume(CONVERSION_QUEUE, "conversion_worker")
        .await?;

    info!("🎥 Conversion Worker listening on '{}'", CONVERSION_QUEUE);

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!("❌ Failed to receive delivery: {}", e);
                continue;
            }
        };

        // Conversions can outlast the broker's delivery timeout, so the
        // message is settled up front and the document carries the state.
        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!("Failed to ack message: {}", e);
        }

        match parse_job(&delivery.data) {
            Ok(job) => {
                info!(job_id = %job.job_id, "📦 Received conversion job");
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_job(&state, &job.job_id).await {
                        error!(job_id = %job.job_id, "❌ Conversion job failed: {:#}", e);
                    }
                });
            }
            Err(e) => error!("❌ Failed to parse job: {}", e),
        }
    }

    warn!("Conversion consumer stream ended");
    Ok(())
}

/// Upper bound on back-to-back runs for formats queued while a run was going.
const MAX_PASSES: usize = 5;

/// Runs one job under its lease, then again while formats submitted during
/// the run are still queued. Those submissions were dispatched while the
/// lease was held, so nobody else picks them up.
pub async fn run_job(state: &AppState, job_id: &str) -> anyhow::Result<()> {
    for pass in 1..=MAX_PASSES {
        if !run_pass(state, job_id).await? {
            return Ok(());
        }
        let queued = state
            .orchestrator
            .has_queued(job_id)
            .await
            .map_err(|e| anyhow!("[{}] {}", e.code(), e))?;
        if !queued {
            return Ok(());
        }
        info!(job_id, pass, "Formats queued during the run, running again");
    }
    warn!(job_id, passes = MAX_PASSES, "Formats still queued, leaving them for the next trigger");
    Ok(())
}

/// One run of the job. A job whose lease is held elsewhere is left alone and
/// yields `false`; a lease that cannot be checked at all does not block it.
async fn run_pass(state: &AppState, job_id: &str) -> anyhow::Result<bool> {
    let ttl = state.config.video.job_lease_ttl;
    if ttl.is_zero() {
        run_unleased(state, job_id).await?;
        return Ok(true);
    }

    let key = job_lease_key(job_id);
    let holder = Uuid::new_v4().to_string();
    match state.redis.try_acquire_lease(&key, &holder, ttl).await {
        Ok(true) => {}
        Ok(false) => {
            info!(job_id, "Job already running elsewhere, skipping");
            return Ok(false);
        }
        Err(e) => {
            warn!(job_id, error = %e, "Lease unavailable, running without it");
            run_unleased(state, job_id).await?;
            return Ok(true);
        }
    }

    let result = run_renewing(state, job_id, &key, &holder, ttl).await;

    if let Err(e) = state.redis.release_lease(&key, &holder).await {
        warn!(job_id, error = %e, "Failed to release job lease");
    }
    result.map(|_| true)
}

/// Runs the job while extending its lease every third of the TTL.
async fn run_renewing(
    state: &AppState,
    job_id: &str,
    key: &str,
    holder: &str,
    ttl: Duration,
) -> anyhow::Result<()> {
    let every = lease_renew_interval(ttl);
    let mut renew = time::interval_at(time::Instant::now() + every, every);
    let work = run_unleased(state, job_id);
    tokio::pin!(work);

    loop {
        tokio::select! {
            result = &mut work => return result,
            _ = renew.tick() => match state.redis.renew_lease(key, holder, ttl).await {
                Ok(true) => {}
                Ok(false) => warn!(job_id, "Job lease lost, another run may start"),
                Err(e) => warn!(job_id, error = %e, "Failed to renew job lease"),
            },
        }
    }
}

async fn run_unleased(state: &AppState, job_id: &str) -> anyhow::Result<()> {
    let report = state
        .orchestrator
        .run(job_id)
        .await
        .map_err(|e| anyhow!("[{}] {}", e.code(), e))?;
    info!(job_id, progress = report.status.progress, "✅ Job completed successfully");
    Ok(())
}

fn parse_job(payload: &[u8]) -> anyhow::Result<ConversionJob> {
    let job: ConversionJob = serde_json::from_slice(payload)?;
    if job.job_id.trim().is_empty() {
        return Err(anyhow!("jobId is empty"));
    }
    Ok(job)
}
