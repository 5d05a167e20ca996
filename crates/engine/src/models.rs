//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like in
//! memory. They serialise to the same JSON shape the graph editor produces,
//! so a workflow exported from the editor can be fed to `cli validate`/`run`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use nodes::Context;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single typed unit of work in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by connections).
    pub id: String,
    /// Selects the registered `NodeExecutor`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// User-authored configuration handed to the executor.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Editor canvas position. Ignored by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data,
            position: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

fn default_port() -> String {
    "main".to_owned()
}

/// Directed dependency: `to_node_id` must not execute before `from_node_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default = "default_port")]
    pub from_output: String,
    #[serde(default = "default_port")]
    pub to_input: String,
}

impl Connection {
    /// Connection between the default ports of two nodes.
    pub fn between(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: format!("{from}->{to}"),
            from_node_id: from,
            to_node_id: to,
            from_output: default_port(),
            to_input: default_port(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A complete workflow graph: the unit of execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(id: impl Into<String>, nodes: Vec<Node>, connections: Vec<Connection>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            nodes,
            connections,
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger / result
// ---------------------------------------------------------------------------

/// Starts exactly one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub workflow_id: String,
    /// Seeds the execution context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_data: Option<Context>,
    /// Set when a run is redelivered and must resume from its checkpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
}

impl TriggerEvent {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            initial_data: None,
            execution_id: None,
        }
    }

    pub fn with_initial_data(mut self, data: Context) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn resuming(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }
}

/// The result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub workflow_id: String,
    pub execution_id: Uuid,
    /// The final context after the last node.
    pub result: Context,
    /// Node ids in the order they were dispatched.
    pub order: Vec<String>,
}
