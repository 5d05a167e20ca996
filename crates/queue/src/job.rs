//! The job model and the [`JobQueue`] seam.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use engine::TriggerEvent;

pub use db::models::JobStatus;

use crate::QueueError;

/// Queue-wide settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Deliveries a job gets before it is dead-lettered.
    pub max_attempts: u32,
    /// How long a claimed job stays invisible without a lease renewal. A
    /// job whose worker stops renewing is delivered again once this elapses.
    pub lease: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lease: Duration::from_secs(5 * 60),
        }
    }
}

/// One queued workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    /// Fixed at enqueue time; every delivery of this job resumes the same run.
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub status: JobStatus,
    /// Deliveries so far, including the current one.
    pub attempts: u32,
    pub max_attempts: u32,
    pub trigger: TriggerEvent,
}

impl Job {
    /// A pending job for `trigger`, pinning its execution id.
    pub fn pending(trigger: TriggerEvent, max_attempts: u32) -> Self {
        let execution_id = trigger.execution_id.unwrap_or_else(Uuid::new_v4);
        Self {
            id: Uuid::new_v4(),
            execution_id,
            workflow_id: trigger.workflow_id.clone(),
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            trigger: trigger.resuming(execution_id),
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// Storage for queued jobs.
///
/// `next` claims the oldest pending job, marks it `processing` and counts the
/// delivery. A claimed job is leased: it stays invisible to other workers
/// while its lease is renewed through `extend_lease`. Once the lease runs out
/// the job is claimable again, so a run abandoned by a crashed worker resumes
/// elsewhere. An abandoned job with no attempts left is dead-lettered.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a run of `trigger`.
    async fn enqueue(&self, trigger: TriggerEvent) -> Result<Job, QueueError>;

    /// Claim the next pending or abandoned job, if any.
    async fn next(&self) -> Result<Option<Job>, QueueError>;

    /// Renew the lease on a job this worker is still processing.
    async fn extend_lease(&self, job_id: Uuid) -> Result<(), QueueError>;

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Requeue a failed job, or dead-letter it once it is out of attempts.
    /// Returns the status the job ended up in.
    async fn retry_or_dead_letter(&self, job_id: Uuid) -> Result<JobStatus, QueueError>;

    /// Dead-letter a job regardless of its remaining attempts.
    async fn dead_letter(&self, job_id: Uuid) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pending_job_pins_the_execution_id_into_its_trigger() {
        let job = Job::pending(TriggerEvent::new("wf"), 3);

        assert_eq!(job.trigger.execution_id, Some(job.execution_id));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.has_attempts_left());
    }

    #[test]
    fn pending_job_keeps_a_caller_supplied_execution_id() {
        let execution_id = Uuid::new_v4();
        let job = Job::pending(TriggerEvent::new("wf").resuming(execution_id), 0);

        assert_eq!(job.execution_id, execution_id);
        assert_eq!(job.max_attempts, 1);
    }

    #[test]
    fn job_serialises_status_in_snake_case() {
        let job = Job::pending(TriggerEvent::new("wf"), 3);
        let value = serde_json::to_value(&job).unwrap();

        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["workflowId"], json!("wf"));
        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
