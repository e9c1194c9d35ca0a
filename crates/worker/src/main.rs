mod observability;

use std::time::{Duration, Instant};

use duet_domain::jobs::{NotificationJobPayload, backoff_ms, now_ms};
use duet_domain::ports::jobs::{JobEnvelope, JobQueue};
use duet_infra::jobs::RedisJobQueue;
use duet_infra::{config::AppConfig, logging::init_tracing};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config)?;
    observability::init_metrics()?;

    let queue = RedisJobQueue::connect_with_prefix(
        &config.redis_url,
        config.notification_queue_prefix.as_str(),
    )
    .await
    .map_err(|err| anyhow::anyhow!("job queue connect failed: {err}"))?;

    // Jobs stranded in the processing list by a previous crash go back to
    // ready before the loop starts.
    let recovered = queue
        .requeue_processing(config.worker_promote_batch)
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, "processing-list recovery failed");
            0
        });
    if recovered > 0 {
        info!(recovered, "requeued stranded jobs");
    }

    info!("worker starting");
    let poll_timeout = Duration::from_millis(config.worker_poll_interval_ms.max(100));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = run_once(&config, &queue, poll_timeout) => {}
        }
    }
    info!("worker shutdown");

    Ok(())
}

async fn run_once(config: &AppConfig, queue: &RedisJobQueue, poll_timeout: Duration) {
    let now = now_ms();
    if let Err(err) = queue.promote_due(now, config.worker_promote_batch).await {
        warn!(error = %err, "promote-due failed");
    }

    match queue.metrics_snapshot().await {
        Ok(snapshot) => {
            observability::set_queue_depth_gauge(
                snapshot.ready,
                snapshot.delayed,
                snapshot.processing,
            );
            observability::set_queue_lag_ms(
                snapshot
                    .oldest_delayed_ms
                    .map(|oldest| now - oldest)
                    .unwrap_or(0),
            );
        }
        Err(err) => warn!(error = %err, "queue metrics snapshot failed"),
    }

    let job = match queue.dequeue(poll_timeout).await {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(err) => {
            warn!(error = %err, "dequeue failed");
            tokio::time::sleep(poll_timeout).await;
            return;
        }
    };

    let job_type = job.job_type.as_str();
    let started = Instant::now();
    match handle_notification_job(&job) {
        Ok(()) => {
            observability::register_job_processed(
                job_type,
                "success",
                started.elapsed().as_millis() as f64,
            );
            if let Err(err) = queue.ack(&job.job_id).await {
                warn!(error = %err, job_id = %job.job_id, "ack failed");
            }
        }
        Err(reason) => {
            observability::register_job_processed(
                job_type,
                "failure",
                started.elapsed().as_millis() as f64,
            );
            match next_retry(
                &job,
                config.worker_backoff_base_ms,
                config.worker_backoff_max_ms,
            ) {
                Some(retry) => {
                    warn!(
                        job_id = %job.job_id,
                        attempt = retry.attempt,
                        reason,
                        "notification job failed; retrying"
                    );
                    if let Err(err) = queue.restore_processing_with_retry_delay(&retry).await {
                        warn!(error = %err, job_id = %job.job_id, "retry restore failed");
                    }
                }
                None => {
                    tracing::error!(
                        job_id = %job.job_id,
                        attempts = job.attempt,
                        reason,
                        "notification job exhausted retries; dropping"
                    );
                    if let Err(err) = queue.ack(&job.job_id).await {
                        warn!(error = %err, job_id = %job.job_id, "ack of dead job failed");
                    }
                }
            }
        }
    }
}

/// Hands the job to the delivery boundary. Actual email/push delivery is
/// owned by a downstream consumer; this side validates and records the
/// dispatch.
fn handle_notification_job(job: &JobEnvelope) -> Result<(), String> {
    let payload: NotificationJobPayload = serde_json::from_value(job.payload.clone())
        .map_err(|err| format!("malformed notification payload: {err}"))?;
    info!(
        job_id = %job.job_id,
        notification_type = %payload.notification_type,
        user_id = %payload.user_id,
        correlation_id = %payload.correlation_id,
        "notification dispatched"
    );
    Ok(())
}

/// Builds the next attempt with exponential backoff, or `None` once the
/// attempt budget is spent.
fn next_retry(job: &JobEnvelope, base_ms: u64, max_ms: u64) -> Option<JobEnvelope> {
    if job.attempt >= job.max_attempts {
        return None;
    }
    let attempt = job.next_attempt();
    let delay = backoff_ms(base_ms, attempt, max_ms);
    let mut retry = job.clone();
    retry.attempt = attempt;
    retry.run_at_ms = now_ms() + delay as i64;
    Some(retry)
}
