//! Engine-level error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use nodes::{Context, NodeError};

/// Which of the three failure classes an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTier {
    /// The graph itself cannot run (cycle, unknown executor, missing workflow).
    /// Detected before any node executes; never retried.
    Graph,
    /// A node's data is missing or invalid; never retried.
    Configuration,
    /// A step failed and its retry budget ran out (or infrastructure failed).
    Transient,
}

impl std::fmt::Display for ErrorTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Graph => write!(f, "graph"),
            Self::Configuration => write!(f, "configuration"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

impl From<&NodeError> for ErrorTier {
    fn from(err: &NodeError) -> Self {
        match err {
            NodeError::Configuration(_) => Self::Configuration,
            NodeError::Transient(_) | NodeError::RetriesExhausted { .. } => Self::Transient,
        }
    }
}

/// Failure report for a run that stopped at a specific node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailure {
    pub workflow_id: String,
    pub execution_id: Uuid,
    pub node_id: String,
    pub node_type: String,
    pub tier: ErrorTier,
    pub message: String,
    /// Context contributed by the nodes that completed before the failure.
    pub partial: Context,
    /// Ids of the nodes that completed, in order.
    pub completed: Vec<String>,
}

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Graph errors ------

    /// The persistence collaborator has no workflow with this id.
    #[error("workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A connection references a node ID that doesn't exist in the workflow.
    #[error("connection references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// Topological sort detected a cycle.
    #[error("workflow contains a cycle (involving nodes: {})", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    /// No executor is registered for a node's type.
    #[error("node '{node_id}' has type '{node_type}' with no registered executor")]
    UnregisteredNodeType { node_id: String, node_type: String },

    // ------ Execution errors ------

    /// A node failed; the run is aborted and nothing after it executes.
    #[error("node '{}' failed ({} error): {}", .0.node_id, .0.tier, .0.message)]
    NodeFailed(Box<NodeFailure>),

    /// The persistence collaborator failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// The failure class of this error.
    pub fn tier(&self) -> ErrorTier {
        match self {
            Self::WorkflowNotFound(_)
            | Self::DuplicateNodeId(_)
            | Self::UnknownNodeReference { .. }
            | Self::CycleDetected { .. }
            | Self::UnregisteredNodeType { .. } => ErrorTier::Graph,
            Self::NodeFailed(failure) => failure.tier,
            Self::Store(_) => ErrorTier::Transient,
        }
    }

    /// The failing node's report, when the run got as far as dispatching one.
    pub fn node_failure(&self) -> Option<&NodeFailure> {
        match self {
            Self::NodeFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Errors from the persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    /// A stored value could not be mapped onto a domain type.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] db::DbError),
}

impl StoreError {
    pub(crate) fn from_db(err: db::DbError) -> Self {
        match err {
            db::DbError::NotFound => Self::NotFound,
            other => Self::Database(other),
        }
    }
}

/// Errors raised while building the executor registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("an executor is already registered for node type '{0}'")]
    DuplicateNodeType(String),

    #[error("no executor registered for built-in node type(s): {}", .0.join(", "))]
    MissingExecutors(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_names_the_cycle() {
        let err = EngineError::CycleDetected {
            nodes: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "workflow contains a cycle (involving nodes: a, b)");
        assert_eq!(err.tier(), ErrorTier::Graph);
    }

    #[test]
    fn node_errors_map_onto_tiers() {
        assert_eq!(ErrorTier::from(&NodeError::config("x")), ErrorTier::Configuration);
        assert_eq!(ErrorTier::from(&NodeError::transient("x")), ErrorTier::Transient);
        assert_eq!(
            ErrorTier::from(&NodeError::RetriesExhausted {
                step: "s".into(),
                attempts: 3,
                message: "x".into()
            }),
            ErrorTier::Transient
        );
    }
}
