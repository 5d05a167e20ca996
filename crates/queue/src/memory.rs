//! In-process job queue for tests and single-process runs.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use engine::TriggerEvent;

use crate::{Job, JobQueue, JobStatus, QueueConfig, QueueError};

#[derive(Debug)]
struct Entry {
    job: Job,
    /// Set while the job is `processing`.
    leased_until: Option<Instant>,
}

impl Entry {
    fn lease_expired(&self, now: Instant) -> bool {
        self.job.status == JobStatus::Processing && self.leased_until.is_some_and(|t| t <= now)
    }
}

/// Jobs kept in enqueue order behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    config: QueueConfig,
    entries: Mutex<Vec<Entry>>,
}

impl MemoryJobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            entries: Mutex::default(),
        }
    }

    /// Snapshot of one job.
    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.lock()
            .iter()
            .find(|e| e.job.id == job_id)
            .map(|e| e.job.clone())
    }

    /// Snapshot of every job, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().iter().map(|e| e.job.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<T>(&self, job_id: Uuid, f: impl FnOnce(&mut Entry) -> T) -> Result<T, QueueError> {
        let mut entries = self.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.job.id == job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        Ok(f(entry))
    }

    fn settle(&self, job_id: Uuid, status: JobStatus) -> Result<(), QueueError> {
        self.update(job_id, |entry| {
            entry.job.status = status;
            entry.leased_until = None;
        })
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, trigger: TriggerEvent) -> Result<Job, QueueError> {
        let job = Job::pending(trigger, self.config.max_attempts);
        debug!(job_id = %job.id, execution_id = %job.execution_id, "enqueued job");
        self.lock().push(Entry {
            job: job.clone(),
            leased_until: None,
        });
        Ok(job)
    }

    async fn next(&self) -> Result<Option<Job>, QueueError> {
        let now = Instant::now();
        let mut entries = self.lock();

        for entry in entries.iter_mut() {
            let abandoned = entry.lease_expired(now);
            if abandoned && !entry.job.has_attempts_left() {
                warn!(job_id = %entry.job.id, "abandoned job out of attempts, dead-lettering");
                entry.job.status = JobStatus::DeadLettered;
                entry.leased_until = None;
                continue;
            }
            if entry.job.status != JobStatus::Pending && !abandoned {
                continue;
            }
            if abandoned {
                warn!(job_id = %entry.job.id, "lease expired, redelivering job");
            }

            entry.job.status = JobStatus::Processing;
            entry.job.attempts += 1;
            entry.leased_until = Some(now + self.config.lease);
            return Ok(Some(entry.job.clone()));
        }

        Ok(None)
    }

    async fn extend_lease(&self, job_id: Uuid) -> Result<(), QueueError> {
        let lease = self.config.lease;
        let renewed = self.update(job_id, |entry| {
            if entry.job.status != JobStatus::Processing {
                return false;
            }
            entry.leased_until = Some(Instant::now() + lease);
            true
        })?;
        if renewed {
            Ok(())
        } else {
            Err(QueueError::JobNotFound(job_id))
        }
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.settle(job_id, JobStatus::Completed)
    }

    async fn retry_or_dead_letter(&self, job_id: Uuid) -> Result<JobStatus, QueueError> {
        self.update(job_id, |entry| {
            entry.job.status = if entry.job.has_attempts_left() {
                JobStatus::Pending
            } else {
                JobStatus::DeadLettered
            };
            entry.leased_until = None;
            entry.job.status
        })
    }

    async fn dead_letter(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.settle(job_id, JobStatus::DeadLettered)
    }
}
