use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Map, Value};
use tracing::info;

use engine::TriggerEvent;

use super::AppState;
use crate::ApiError;

/// Seed context for a webhook delivery. Object bodies are used as-is; any
/// other JSON value is kept under `body`.
fn initial_data(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("body".to_owned(), other);
            map
        }
    }
}

pub async fn handle_webhook(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let trigger = TriggerEvent::new(id).with_initial_data(initial_data(payload));
    let job = state.queue.enqueue(trigger).await?;

    info!(job_id = %job.id, workflow_id = %job.workflow_id, "webhook accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "webhook accepted",
            "jobId": job.id,
            "executionId": job.execution_id,
        })),
    ))
}
