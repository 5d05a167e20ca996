//! Workflow graph reads.
//!
//! Authoring (insert/update/delete) belongs to the editor surface; the engine
//! only ever loads a coherent snapshot of one workflow's graph.

use sqlx::PgPool;

use crate::{
    DbError,
    models::{ConnectionRow, NodeRow, WorkflowGraphRows, WorkflowRow},
};

/// Fetch a workflow with all of its nodes and connections.
///
/// The three reads share one transaction so a concurrent edit can never be
/// observed half-applied. Nodes and connections come back in creation order.
///
/// Returns `DbError::NotFound` if no workflow has this id.
pub async fn get_workflow_graph(pool: &PgPool, id: &str) -> Result<WorkflowGraphRows, DbError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
        .execute(&mut *tx)
        .await?;

    let workflow = sqlx::query_as::<_, WorkflowRow>(
        r#"SELECT id, name, created_at FROM workflows WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    let nodes = sqlx::query_as::<_, NodeRow>(
        r#"
        SELECT id, workflow_id, node_type, data, position
        FROM nodes
        WHERE workflow_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    let connections = sqlx::query_as::<_, ConnectionRow>(
        r#"
        SELECT id, workflow_id, from_node_id, to_node_id, from_output, to_input
        FROM connections
        WHERE workflow_id = $1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(WorkflowGraphRows {
        workflow,
        nodes,
        connections,
    })
}
