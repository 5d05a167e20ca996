use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use engine::{ExecutionResult, TriggerEvent};
use nodes::Context;
use queue::Job;

use super::AppState;
use crate::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteWorkflowDto {
    /// Seeds the run's context.
    #[serde(default)]
    pub input: Option<Context>,
}

fn trigger(workflow_id: String, payload: ExecuteWorkflowDto) -> TriggerEvent {
    let trigger = TriggerEvent::new(workflow_id);
    match payload.input {
        Some(input) => trigger.with_initial_data(input),
        None => trigger,
    }
}

/// Queue a run for the background worker.
pub async fn execute(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let job = state.queue.enqueue(trigger(id, payload)).await?;
    info!(job_id = %job.id, execution_id = %job.execution_id, "queued workflow run");
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Run the workflow on the request path and return its final context.
pub async fn run(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let result = state.executor.run(trigger(id, payload)).await?;
    Ok(Json(result))
}
