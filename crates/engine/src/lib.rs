//! `engine` crate: domain models, graph ordering, the executor registry,
//! durable steps, the status channel and the execution engine itself.

pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod registry;
pub mod status;
pub mod step;
pub mod store;

pub use dag::{execution_order, validate_dag};
pub use error::{EngineError, ErrorTier, NodeFailure, RegistryError, StoreError};
pub use executor::{ExecutorConfig, RunPhase, WorkflowExecutor};
pub use models::{Connection, ExecutionResult, Node, TriggerEvent, Workflow};
pub use registry::{ExecutorRegistry, RegistryBuilder};
pub use status::{RealtimeConfig, StatusChannel, StatusError, Subscription, SubscriptionToken};
pub use step::{DurableStepRunner, RetryPolicy};
pub use store::{ExecutionStore, MemoryStore, PgStore, WorkflowStore};

#[cfg(test)]
mod executor_tests;
