use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("job payload is not a trigger event: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("corrupt job row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}
