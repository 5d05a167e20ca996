//! Persistence collaborators the orchestrator depends on.
//!
//! - [`WorkflowStore`] yields a coherent snapshot of one workflow's graph.
//! - [`ExecutionStore`] records run phases and memoizes durable step results.
//!
//! [`MemoryStore`] implements both for tests and local runs; [`PgStore`]
//! implements both over the `db` crate.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::executor::RunPhase;
use crate::models::Workflow;
use crate::StoreError;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Load a workflow's nodes and connections.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if there is no workflow with this id.
    async fn get_workflow(&self, id: &str) -> Result<Workflow, StoreError>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create the record for a run, or reopen it when a run resumes.
    async fn begin(&self, execution_id: Uuid, workflow_id: &str) -> Result<(), StoreError>;

    /// Record a phase transition.
    async fn set_phase(&self, execution_id: Uuid, phase: &RunPhase) -> Result<(), StoreError>;

    /// Memoized output of a completed step.
    async fn load_checkpoint(
        &self,
        execution_id: Uuid,
        step_id: &str,
    ) -> Result<Option<Value>, StoreError>;

    /// Memoize a step's output. The first checkpoint written for a step wins.
    async fn save_checkpoint(
        &self,
        execution_id: Uuid,
        step_id: &str,
        output: &Value,
    ) -> Result<(), StoreError>;
}
