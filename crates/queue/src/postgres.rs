//! Job queue backed by the `job_queue` table.

use async_trait::async_trait;
use tracing::instrument;
use uuid::Uuid;

use db::models::JobRow;
use db::repository::jobs;
use db::{DbError, DbPool};
use engine::TriggerEvent;

use crate::{Job, JobQueue, JobStatus, QueueConfig, QueueError};

#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: DbPool,
    config: QueueConfig,
}

impl PgJobQueue {
    pub fn new(pool: DbPool, config: QueueConfig) -> Self {
        Self { pool, config }
    }
}

fn attempts(value: i32, column: &str) -> Result<u32, QueueError> {
    u32::try_from(value).map_err(|_| QueueError::Corrupt(format!("negative {column}: {value}")))
}

fn job_from_row(row: JobRow) -> Result<Job, QueueError> {
    let trigger: TriggerEvent = serde_json::from_value(row.payload)?;
    Ok(Job {
        id: row.id,
        execution_id: row.execution_id,
        workflow_id: row.workflow_id,
        status: row.status.parse().map_err(QueueError::Corrupt)?,
        attempts: attempts(row.attempts, "attempts")?,
        max_attempts: attempts(row.max_attempts, "max_attempts")?,
        // The row's execution id is authoritative.
        trigger: trigger.resuming(row.execution_id),
    })
}

fn not_found(job_id: Uuid) -> impl FnOnce(DbError) -> QueueError {
    move |e| match e {
        DbError::NotFound => QueueError::JobNotFound(job_id),
        other => QueueError::Database(other),
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    #[instrument(skip(self, trigger), fields(workflow_id = %trigger.workflow_id))]
    async fn enqueue(&self, trigger: TriggerEvent) -> Result<Job, QueueError> {
        let job = Job::pending(trigger, self.config.max_attempts);
        let max_attempts = i32::try_from(job.max_attempts).unwrap_or(i32::MAX);
        let payload = serde_json::to_value(&job.trigger)?;

        let row = jobs::enqueue_job(
            &self.pool,
            job.execution_id,
            &job.workflow_id,
            max_attempts,
            payload,
        )
        .await?;
        job_from_row(row)
    }

    async fn next(&self) -> Result<Option<Job>, QueueError> {
        jobs::fetch_next_job(&self.pool, self.config.lease)
            .await?
            .map(job_from_row)
            .transpose()
    }

    async fn extend_lease(&self, job_id: Uuid) -> Result<(), QueueError> {
        jobs::touch_job(&self.pool, job_id)
            .await
            .map_err(not_found(job_id))
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        jobs::complete_job(&self.pool, job_id)
            .await
            .map_err(not_found(job_id))
    }

    async fn retry_or_dead_letter(&self, job_id: Uuid) -> Result<JobStatus, QueueError> {
        let status = jobs::fail_job(&self.pool, job_id)
            .await
            .map_err(not_found(job_id))?;
        status.parse().map_err(QueueError::Corrupt)
    }

    async fn dead_letter(&self, job_id: Uuid) -> Result<(), QueueError> {
        jobs::dead_letter_job(&self.pool, job_id)
            .await
            .map_err(not_found(job_id))
    }
}
