use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::{ExecutionStore, WorkflowStore};
use crate::executor::RunPhase;
use crate::models::Workflow;
use crate::StoreError;

/// In-process store. Nothing survives the process, but checkpoints survive
/// across runs that share the store, which is enough to exercise resume.
#[derive(Debug, Default)]
pub struct MemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    phases: Mutex<HashMap<Uuid, Vec<RunPhase>>>,
    checkpoints: Mutex<HashMap<(Uuid, String), Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `workflows` preloaded.
    pub fn with_workflows(workflows: impl IntoIterator<Item = Workflow>) -> Self {
        let store = Self::default();
        for wf in workflows {
            store.insert_workflow(wf);
        }
        store
    }

    /// Add or replace a workflow.
    pub fn insert_workflow(&self, workflow: Workflow) {
        self.workflows
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(workflow.id.clone(), workflow);
    }

    /// Every phase recorded for an execution, oldest first.
    pub fn phases(&self, execution_id: Uuid) -> Vec<RunPhase> {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&execution_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The latest recorded phase of an execution.
    pub fn phase(&self, execution_id: Uuid) -> Option<RunPhase> {
        self.phases(execution_id).pop()
    }

    /// Step ids checkpointed for an execution, sorted.
    pub fn checkpointed_steps(&self, execution_id: Uuid) -> Vec<String> {
        let mut steps: Vec<String> = self
            .checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .filter(|(id, _)| *id == execution_id)
            .map(|(_, step)| step.clone())
            .collect();
        steps.sort();
        steps
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn get_workflow(&self, id: &str) -> Result<Workflow, StoreError> {
        self.workflows
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn begin(&self, execution_id: Uuid, _workflow_id: &str) -> Result<(), StoreError> {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(execution_id)
            .or_default()
            .push(RunPhase::Loading);
        Ok(())
    }

    async fn set_phase(&self, execution_id: Uuid, phase: &RunPhase) -> Result<(), StoreError> {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(execution_id)
            .or_default()
            .push(phase.clone());
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        execution_id: Uuid,
        step_id: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self
            .checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(execution_id, step_id.to_owned()))
            .cloned())
    }

    async fn save_checkpoint(
        &self,
        execution_id: Uuid,
        step_id: &str,
        output: &Value,
    ) -> Result<(), StoreError> {
        self.checkpoints
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((execution_id, step_id.to_owned()))
            .or_insert_with(|| output.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_workflow_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get_workflow("nope").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn first_checkpoint_wins() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();

        store.save_checkpoint(id, "s", &json!(1)).await.unwrap();
        store.save_checkpoint(id, "s", &json!(2)).await.unwrap();

        assert_eq!(store.load_checkpoint(id, "s").await.unwrap(), Some(json!(1)));
        assert_eq!(store.checkpointed_steps(id), vec!["s"]);
    }
}
