//! The `NodeExecutor` trait: the contract every node type must fulfil.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{NodeError, StatusPublisher, StepRunner};

/// The accumulating key → value map threaded through one run.
///
/// Insertion-ordered. Later writes to an existing key replace it in place.
pub type Context = Map<String, Value>;

/// Everything an executor receives for one dispatch.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
pub struct NodeInvocation<'a> {
    /// Id of the node being executed.
    pub node_id: &'a str,
    /// The node's user-authored configuration.
    pub data: &'a Map<String, Value>,
    /// Context accumulated by every node that ran before this one.
    pub context: Context,
    /// Checkpoint boundary for the executor's internal work.
    pub steps: &'a dyn StepRunner,
    /// Live status side-channel.
    pub publisher: &'a dyn StatusPublisher,
}

impl<'a> NodeInvocation<'a> {
    /// Required string field from the node data.
    ///
    /// # Errors
    /// [`NodeError::Configuration`] when the field is absent, empty or not a string.
    pub fn require_str(&self, node_label: &str, field: &str) -> Result<&'a str, NodeError> {
        match self.data.get(field).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(NodeError::config(format!(
                "{node_label} node: no {field} configured"
            ))),
        }
    }

    /// Optional string field from the node data.
    pub fn optional_str(&self, field: &str) -> Option<&'a str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// The core node trait.
///
/// Implementations read `invocation.data`, may run durable sub-steps and
/// publish status events, and return the updated context. The returned map
/// is merged over the incoming context by the engine, so returning only the
/// new keys and returning the full union are both valid.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, invocation: NodeInvocation<'_>) -> Result<Context, NodeError>;
}
