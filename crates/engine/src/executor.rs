//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the durable driver for one run:
//! 1. Loads the workflow graph from the [`WorkflowStore`].
//! 2. Computes the execution order once, up front, and checks that every node
//!    type has an executor. Nothing runs if either fails.
//! 3. Dispatches nodes strictly sequentially. Each dispatch is one durable
//!    step (`node:<id>`) whose memoized output is the post-node context, so a
//!    resumed run skips every node that already completed.
//! 4. Merges each node's returned context over the running context.
//! 5. Records `Loading → Running → Completed | Failed` on the [`ExecutionStore`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use nodes::{
    node_step_id, step_fn, Context, NodeError, NodeExecutor, NodeInvocation, NullPublisher,
    ScopedSteps, StatusPublisher, StepRunner,
};

use crate::dag::execution_order;
use crate::error::{ErrorTier, NodeFailure};
use crate::models::{ExecutionResult, Node, TriggerEvent};
use crate::registry::ExecutorRegistry;
use crate::step::{DurableStepRunner, RetryPolicy};
use crate::store::{ExecutionStore, WorkflowStore};
use crate::{EngineError, StoreError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Back-off applied to transient failures inside every durable step.
    pub retry: RetryPolicy,
}

// ---------------------------------------------------------------------------
// Run phases
// ---------------------------------------------------------------------------

/// Where a run is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    Loading,
    Running { index: usize, node_id: String },
    Completed,
    Failed { error: String },
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Running { .. } => "running",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Stateless orchestrator; one instance serves any number of concurrent runs.
pub struct WorkflowExecutor {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: Arc<ExecutorRegistry>,
    publisher: Arc<dyn StatusPublisher>,
    config: ExecutorConfig,
}

impl WorkflowExecutor {
    /// Create a new executor. Status events are dropped until
    /// [`with_publisher`](Self::with_publisher) is called.
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: Arc<ExecutorRegistry>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            workflows,
            executions,
            registry,
            publisher: Arc::new(NullPublisher),
            config,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn StatusPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    /// Run the workflow named by `trigger` and return the final context.
    ///
    /// Passing a trigger that carries an `execution_id` resumes that
    /// execution: completed nodes replay from their checkpoints.
    ///
    /// # Errors
    /// Graph errors before any node runs, [`EngineError::NodeFailed`] when a
    /// node fails, or store errors.
    #[instrument(skip(self, trigger), fields(workflow_id = %trigger.workflow_id, execution_id))]
    pub async fn run(&self, trigger: TriggerEvent) -> Result<ExecutionResult, EngineError> {
        let TriggerEvent {
            workflow_id,
            initial_data,
            execution_id,
        } = trigger;
        let execution_id = execution_id.unwrap_or_else(Uuid::new_v4);
        tracing::Span::current().record("execution_id", tracing::field::display(execution_id));

        // ------------------------------------------------------------------
        // Loading
        // ------------------------------------------------------------------
        let workflow = match self.workflows.get_workflow(&workflow_id).await {
            Ok(wf) => wf,
            Err(StoreError::NotFound) => return Err(EngineError::WorkflowNotFound(workflow_id)),
            Err(e) => return Err(e.into()),
        };

        self.executions.begin(execution_id, &workflow.id).await?;

        let order = match execution_order(&workflow.nodes, &workflow.connections) {
            Ok(order) => order,
            Err(e) => return Err(self.fail_before_start(execution_id, e).await),
        };
        if let Err(e) = self.registry.ensure_covers(order.iter().copied()) {
            return Err(self.fail_before_start(execution_id, e).await);
        }

        let order_ids: Vec<String> = order.iter().map(|n| n.id.clone()).collect();
        info!("executing {} nodes in order: {:?}", order_ids.len(), order_ids);

        // ------------------------------------------------------------------
        // Running
        // ------------------------------------------------------------------
        let steps = DurableStepRunner::new(
            execution_id,
            self.executions.clone(),
            self.config.retry.clone(),
        );
        let mut context = initial_data.unwrap_or_default();
        let mut completed: Vec<String> = Vec::with_capacity(order.len());

        for (index, node) in order.iter().enumerate() {
            let running = RunPhase::Running {
                index,
                node_id: node.id.clone(),
            };
            if let Err(e) = self.executions.set_phase(execution_id, &running).await {
                let err = EngineError::from(e);
                error!(node_id = %node.id, "cannot record running phase: {}", err);
                self.record_failure(execution_id, &err).await;
                return Err(err);
            }

            let executor = self.registry.resolve(&node.node_type).ok_or_else(|| {
                EngineError::UnregisteredNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                }
            })?;

            match self.dispatch(&steps, node, executor.as_ref(), &context).await {
                Ok(updated) => {
                    for (key, value) in updated {
                        context.insert(key, value);
                    }
                    completed.push(node.id.clone());
                    info!(node_id = %node.id, "node succeeded");
                }

                Err(node_err) => {
                    error!(node_id = %node.id, "node failed: {}", node_err);

                    let failure = EngineError::NodeFailed(Box::new(NodeFailure {
                        workflow_id: workflow.id.clone(),
                        execution_id,
                        node_id: node.id.clone(),
                        node_type: node.node_type.clone(),
                        tier: ErrorTier::from(&node_err),
                        message: node_err.to_string(),
                        partial: context,
                        completed,
                    }));
                    self.record_failure(execution_id, &failure).await;
                    return Err(failure);
                }
            }
        }

        // ------------------------------------------------------------------
        // Completed
        // ------------------------------------------------------------------
        self.executions
            .set_phase(execution_id, &RunPhase::Completed)
            .await?;

        info!("workflow '{}' execution {} succeeded", workflow.id, execution_id);

        Ok(ExecutionResult {
            workflow_id: workflow.id,
            execution_id,
            result: context,
            order: order_ids,
        })
    }

    /// Run one node inside its checkpointed `node:<id>` step.
    async fn dispatch(
        &self,
        steps: &DurableStepRunner,
        node: &Node,
        executor: &dyn NodeExecutor,
        context: &Context,
    ) -> Result<Context, NodeError> {
        let step_id = node_step_id(&node.id);
        let scoped = ScopedSteps::new(steps, step_id.clone());
        let scoped = &scoped;
        let publisher: &dyn StatusPublisher = self.publisher.as_ref();

        let output = steps
            .run(&step_id, step_fn(move || async move {
                let updated = executor
                    .execute(NodeInvocation {
                        node_id: &node.id,
                        data: &node.data,
                        context: context.clone(),
                        steps: scoped,
                        publisher,
                    })
                    .await?;
                Ok(Value::Object(updated))
            }))
            .await?;

        match output {
            Value::Object(map) => Ok(map),
            other => Err(NodeError::transient(format!(
                "checkpoint for node '{}' is not an object: {other}",
                node.id
            ))),
        }
    }

    async fn fail_before_start(&self, execution_id: Uuid, err: EngineError) -> EngineError {
        error!("workflow cannot run: {}", err);
        self.record_failure(execution_id, &err).await;
        err
    }

    async fn record_failure(&self, execution_id: Uuid, err: &EngineError) {
        let phase = RunPhase::Failed {
            error: err.to_string(),
        };
        if let Err(e) = self.executions.set_phase(execution_id, &phase).await {
            warn!("failed to record failed phase: {e}");
        }
    }
}
