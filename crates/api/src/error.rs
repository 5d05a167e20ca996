use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use engine::{EngineError, StatusError};
use queue::QueueError;

/// Handler error; rendered as `{ "error": …, … }` with a matching status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Status(#[from] StatusError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();

        let (status, body) = match &self {
            Self::Engine(EngineError::WorkflowNotFound(_)) => (
                StatusCode::NOT_FOUND,
                json!({ "error": message, "tier": "graph" }),
            ),
            Self::Engine(EngineError::Store(_)) => {
                error!("store failure: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": message, "tier": "transient" }),
                )
            }
            Self::Engine(EngineError::NodeFailed(failure)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({
                    "error": message,
                    "tier": failure.tier,
                    "nodeId": failure.node_id,
                    "executionId": failure.execution_id,
                    "partial": failure.partial,
                }),
            ),
            Self::Engine(other) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "tier": other.tier() }),
            ),
            Self::Queue(_) => {
                error!("queue failure: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": message }))
            }
            Self::Status(_) => (StatusCode::UNAUTHORIZED, json!({ "error": message })),
        };

        (status, Json(body)).into_response()
    }
}
