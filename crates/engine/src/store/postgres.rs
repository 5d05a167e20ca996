use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::instrument;
use uuid::Uuid;

use db::models::{ConnectionRow, NodeRow, WorkflowGraphRows};
use db::repository::{checkpoints, executions, workflows};
use db::DbPool;

use super::{ExecutionStore, WorkflowStore};
use crate::executor::RunPhase;
use crate::models::{Connection, Node, Workflow};
use crate::StoreError;

/// Postgres-backed store over the `db` repository functions.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn node_from_row(row: NodeRow) -> Result<Node, StoreError> {
    let data = match row.data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(StoreError::Corrupt(format!(
                "node '{}' has non-object data: {other}",
                row.id
            )))
        }
    };
    Ok(Node {
        id: row.id,
        node_type: row.node_type,
        data,
        position: row.position,
    })
}

fn connection_from_row(row: ConnectionRow) -> Connection {
    Connection {
        id: row.id,
        from_node_id: row.from_node_id,
        to_node_id: row.to_node_id,
        from_output: row.from_output,
        to_input: row.to_input,
    }
}

fn workflow_from_rows(rows: WorkflowGraphRows) -> Result<Workflow, StoreError> {
    Ok(Workflow {
        id: rows.workflow.id,
        name: rows.workflow.name,
        nodes: rows
            .nodes
            .into_iter()
            .map(node_from_row)
            .collect::<Result<_, _>>()?,
        connections: rows.connections.into_iter().map(connection_from_row).collect(),
    })
}

#[async_trait]
impl WorkflowStore for PgStore {
    #[instrument(skip(self))]
    async fn get_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
        let rows = workflows::get_workflow_graph(&self.pool, id)
            .await
            .map_err(StoreError::from_db)?;
        workflow_from_rows(rows)
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn begin(&self, execution_id: Uuid, workflow_id: &str) -> Result<(), StoreError> {
        executions::upsert_execution(&self.pool, execution_id, workflow_id, RunPhase::Loading.as_str())
            .await
            .map_err(StoreError::from_db)?;
        Ok(())
    }

    async fn set_phase(&self, execution_id: Uuid, phase: &RunPhase) -> Result<(), StoreError> {
        let result = match phase {
            RunPhase::Loading => {
                executions::update_execution_progress(&self.pool, execution_id, phase.as_str(), None)
                    .await
            }
            RunPhase::Running { node_id, .. } => {
                executions::update_execution_progress(
                    &self.pool,
                    execution_id,
                    phase.as_str(),
                    Some(node_id.as_str()),
                )
                .await
            }
            RunPhase::Completed => {
                executions::finish_execution(&self.pool, execution_id, phase.as_str(), None).await
            }
            RunPhase::Failed { error } => {
                executions::finish_execution(&self.pool, execution_id, phase.as_str(), Some(error.as_str()))
                    .await
            }
        };
        result.map_err(StoreError::from_db)
    }

    async fn load_checkpoint(
        &self,
        execution_id: Uuid,
        step_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        let row = checkpoints::load_checkpoint(&self.pool, execution_id, step_id)
            .await
            .map_err(StoreError::from_db)?;
        Ok(row.map(|r| r.output))
    }

    async fn save_checkpoint(
        &self,
        execution_id: Uuid,
        step_id: &str,
        output: &Value,
    ) -> Result<(), StoreError> {
        checkpoints::save_checkpoint(&self.pool, execution_id, step_id, output)
            .await
            .map_err(StoreError::from_db)
    }
}
