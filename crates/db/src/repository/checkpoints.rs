//! Durable step checkpoints.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::StepCheckpointRow};

/// Load the memoized output of a step, if it completed before.
pub async fn load_checkpoint(
    pool: &PgPool,
    execution_id: Uuid,
    step_id: &str,
) -> Result<Option<StepCheckpointRow>, DbError> {
    let row = sqlx::query_as::<_, StepCheckpointRow>(
        r#"
        SELECT execution_id, step_id, output, completed_at
        FROM step_checkpoints
        WHERE execution_id = $1 AND step_id = $2
        "#,
    )
    .bind(execution_id)
    .bind(step_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Text bound for a checkpoint's `json` column, keys in insertion order.
fn encode_output(output: &serde_json::Value) -> String {
    output.to_string()
}

/// Persist a step's output. A step that already has a checkpoint keeps the
/// first one written.
///
/// The output is bound as text and cast to `json` so its key order survives.
pub async fn save_checkpoint(
    pool: &PgPool,
    execution_id: Uuid,
    step_id: &str,
    output: &serde_json::Value,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO step_checkpoints (execution_id, step_id, output, completed_at)
        VALUES ($1, $2, $3::json, $4)
        ON CONFLICT (execution_id, step_id) DO NOTHING
        "#,
    )
    .bind(execution_id)
    .bind(step_id)
    .bind(encode_output(output))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}
