//! Durable step contract.
//!
//! A step is a named, idempotent unit of work whose JSON result is memoized by
//! the runner. Re-running a workflow after a crash replays memoized steps
//! instead of executing them again. The engine supplies the real runner; this
//! crate only defines the seam executors call through.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use crate::NodeError;

/// Boxed future produced by one attempt of a step.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, NodeError>> + Send + 'a>>;

/// Factory for step attempts. Called once per attempt, so retries get a fresh future.
pub type StepWork<'a> = Box<dyn FnMut() -> StepFuture<'a> + Send + 'a>;

/// Runs named units of work with checkpoint/replay semantics.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `work` under `step_id`, or return the memoized result if this step
    /// already completed for the current execution.
    ///
    /// Step ids must be unique within one execution.
    async fn run<'a>(&self, step_id: &str, work: StepWork<'a>) -> Result<Value, NodeError>;
}

/// Box a closure producing futures into a [`StepWork`].
pub fn step_fn<'a, F, Fut>(mut f: F) -> StepWork<'a>
where
    F: FnMut() -> Fut + Send + 'a,
    Fut: Future<Output = Result<Value, NodeError>> + Send + 'a,
{
    Box::new(move || -> StepFuture<'a> { Box::pin(f()) })
}

/// Step id under which the engine checkpoints a whole node dispatch.
///
/// Node ids are opaque, so `%` and `:` are percent-encoded. The result holds a
/// single `:` and can never be mistaken for a scoped id.
pub fn node_step_id(node_id: &str) -> String {
    let mut id = String::with_capacity(node_id.len() + 5);
    id.push_str("node:");
    for c in node_id.chars() {
        match c {
            '%' => id.push_str("%25"),
            ':' => id.push_str("%3A"),
            c => id.push(c),
        }
    }
    id
}

/// A [`StepRunner`] view that namespaces every step id under a prefix.
///
/// The engine hands each executor a runner scoped to its node step id so two
/// nodes using the same internal step name never share a checkpoint. Scoped
/// ids are `<prefix>::<step>`; with a prefix from [`node_step_id`] the first
/// `::` always ends the prefix.
pub struct ScopedSteps<'r> {
    inner: &'r dyn StepRunner,
    prefix: String,
}

impl<'r> ScopedSteps<'r> {
    pub fn new(inner: &'r dyn StepRunner, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    /// Fully-qualified id for a step name in this scope.
    pub fn qualify(&self, step_id: &str) -> String {
        format!("{}::{}", self.prefix, step_id)
    }
}

#[async_trait]
impl StepRunner for ScopedSteps<'_> {
    async fn run<'a>(&self, step_id: &str, work: StepWork<'a>) -> Result<Value, NodeError> {
        let qualified = self.qualify(step_id);
        self.inner.run(&qualified, work).await
    }
}

/// Runner with no memoization and no retries: every call executes `work` once.
///
/// Handy for exercising executors in isolation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateSteps;

#[async_trait]
impl StepRunner for ImmediateSteps {
    async fn run<'a>(&self, _step_id: &str, mut work: StepWork<'a>) -> Result<Value, NodeError> {
        work().await
    }
}
