//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models and carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows / nodes / connections
// ---------------------------------------------------------------------------

/// A persisted workflow header row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted node row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeRow {
    pub id: String,
    pub workflow_id: String,
    pub node_type: String,
    pub data: serde_json::Value,
    pub position: Option<serde_json::Value>,
}

/// A persisted connection row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectionRow {
    pub id: String,
    pub workflow_id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    pub from_output: String,
    pub to_input: String,
}

/// A workflow header together with its graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraphRows {
    pub workflow: WorkflowRow,
    pub nodes: Vec<NodeRow>,
    pub connections: Vec<ConnectionRow>,
}

// ---------------------------------------------------------------------------
// workflow_executions
// ---------------------------------------------------------------------------

/// A persisted workflow execution row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecutionRow {
    pub id: Uuid,
    pub workflow_id: String,
    pub status: String,
    pub current_node: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// step_checkpoints
// ---------------------------------------------------------------------------

/// A memoized durable step result.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepCheckpointRow {
    pub execution_id: Uuid,
    pub step_id: String,
    pub output: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// job_queue
// ---------------------------------------------------------------------------

/// Possible statuses for a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    DeadLettered,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending      => "pending",
            Self::Processing   => "processing",
            Self::Completed    => "completed",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"       => Ok(Self::Pending),
            "processing"    => Ok(Self::Processing),
            "completed"     => Ok(Self::Completed),
            "dead_lettered" => Ok(Self::DeadLettered),
            other           => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A job row fetched from the queue table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub workflow_id: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_its_column_text() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::DeadLettered,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
        assert!("bogus".parse::<JobStatus>().is_err());
    }
}
