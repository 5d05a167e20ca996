//! Background worker: claims queued jobs and runs them through the engine.
//!
//! Outcome handling:
//! - success → job completed.
//! - transient failure → job requeued until it runs out of attempts. The next
//!   delivery resumes the same execution, so finished nodes are not re-run.
//! - graph or configuration failure → dead-lettered at once; retrying a
//!   broken workflow cannot succeed.
//!
//! While a run is in flight the worker renews the job's lease every
//! `heartbeat_interval`, which must stay well below the queue's lease.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use engine::{ErrorTier, WorkflowExecutor};

use crate::{Job, JobQueue, JobStatus, QueueError};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls while the queue is empty.
    pub poll_interval: Duration,
    /// Lease renewal period for the job in flight.
    pub heartbeat_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(60),
        }
    }
}

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    executor: Arc<WorkflowExecutor>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>, executor: Arc<WorkflowExecutor>, config: WorkerConfig) -> Self {
        Self {
            queue,
            executor,
            config,
        }
    }

    /// Poll until `shutdown` is cancelled. A job already in flight finishes
    /// before the loop exits.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("worker started (poll every {:?})", self.config.poll_interval);

        while !shutdown.is_cancelled() {
            match self.tick().await {
                // Drain without sleeping while there is work.
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!("queue error: {e}"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("worker stopped");
    }

    /// Claim and process at most one job. Returns whether a job was claimed.
    ///
    /// # Errors
    /// Only queue failures; a failing run is recorded on the job instead.
    pub async fn tick(&self) -> Result<bool, QueueError> {
        let Some(job) = self.queue.next().await? else {
            return Ok(false);
        };
        self.process(job).await?;
        Ok(true)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, execution_id = %job.execution_id, attempt = job.attempts))]
    async fn process(&self, job: Job) -> Result<(), QueueError> {
        let run = self.executor.run(job.trigger.clone());
        tokio::pin!(run);

        let period = self.config.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                _ = heartbeat.tick() => {
                    if let Err(e) = self.queue.extend_lease(job.id).await {
                        warn!("failed to renew job lease: {e}");
                    }
                }
            }
        };

        match outcome {
            Ok(result) => {
                info!("job completed ({} nodes)", result.order.len());
                self.queue.complete(job.id).await
            }

            Err(err) if err.tier() == ErrorTier::Transient => {
                match self.queue.retry_or_dead_letter(job.id).await? {
                    JobStatus::DeadLettered => {
                        error!("job dead-lettered after {} attempts: {err}", job.attempts)
                    }
                    _ => warn!(
                        "job failed (attempt {}/{}), requeued: {err}",
                        job.attempts, job.max_attempts
                    ),
                }
                Ok(())
            }

            Err(err) => {
                error!("job dead-lettered ({} error): {err}", err.tier());
                self.queue.dead_letter(job.id).await
            }
        }
    }
}
