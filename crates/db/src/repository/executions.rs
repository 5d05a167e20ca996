//! Workflow execution repository functions.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::WorkflowExecutionRow};

/// Create the execution record for a run, or reset an existing one to
/// `status` when the run is being resumed.
pub async fn upsert_execution(
    pool: &PgPool,
    execution_id: Uuid,
    workflow_id: &str,
    status: &str,
) -> Result<WorkflowExecutionRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"
        INSERT INTO workflow_executions (id, workflow_id, status, started_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status, error = NULL, finished_at = NULL
        RETURNING id, workflow_id, status, current_node, error, started_at, finished_at
        "#,
    )
    .bind(execution_id)
    .bind(workflow_id)
    .bind(status)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Record the node a running execution is currently dispatching.
pub async fn update_execution_progress(
    pool: &PgPool,
    execution_id: Uuid,
    status: &str,
    current_node: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"UPDATE workflow_executions SET status = $1, current_node = $2 WHERE id = $3"#,
    )
    .bind(status)
    .bind(current_node)
    .bind(execution_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark an execution as finished with a terminal `status`.
pub async fn finish_execution(
    pool: &PgPool,
    execution_id: Uuid,
    status: &str,
    error: Option<&str>,
) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $1, error = $2, finished_at = $3
        WHERE id = $4
        "#,
    )
    .bind(status)
    .bind(error)
    .bind(Utc::now())
    .bind(execution_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}
