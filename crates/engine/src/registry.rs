//! Executor registry: node type tag → `NodeExecutor`.
//!
//! Built once at startup through [`RegistryBuilder`] and never mutated
//! afterwards, so one `Arc<ExecutorRegistry>` can be shared by every
//! concurrent run. `build` refuses to produce a registry that leaves a
//! built-in node type without an executor.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::http::{HttpClient, HttpRequestExecutor};
use nodes::node_types;
use nodes::trigger::TriggerExecutor;
use nodes::NodeExecutor;

use crate::models::Node;
use crate::{EngineError, RegistryError};

/// Immutable lookup table from node type to executor.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.executors.keys().collect();
        types.sort();
        f.debug_struct("ExecutorRegistry").field("node_types", &types).finish()
    }
}

impl ExecutorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry with every built-in executor wired to `http_client`.
    ///
    /// # Errors
    /// Only if the built-in wiring itself is inconsistent.
    pub fn with_builtins(http_client: Arc<dyn HttpClient>) -> Result<Self, RegistryError> {
        Self::builder()
            .register(node_types::INITIAL, Arc::new(TriggerExecutor::initial()))?
            .register(node_types::MANUAL_TRIGGER, Arc::new(TriggerExecutor::manual()))?
            .register(node_types::WEBHOOK_TRIGGER, Arc::new(TriggerExecutor::webhook()))?
            .register(
                node_types::HTTP_REQUEST,
                Arc::new(HttpRequestExecutor::new(http_client)),
            )?
            .build()
    }

    /// Executor registered for `node_type`, if any.
    pub fn resolve(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).cloned()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    /// Check that every node in `nodes` can be dispatched.
    ///
    /// # Errors
    /// [`EngineError::UnregisteredNodeType`] for the first node without an executor.
    pub fn ensure_covers<'a>(&self, nodes: impl IntoIterator<Item = &'a Node>) -> Result<(), EngineError> {
        for node in nodes {
            if !self.contains(&node.node_type) {
                return Err(EngineError::UnregisteredNodeType {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Collects executors before freezing them into an [`ExecutorRegistry`].
#[derive(Default)]
pub struct RegistryBuilder {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
    allow_missing_builtins: bool,
}

impl RegistryBuilder {
    /// Register `executor` under a unique type tag.
    ///
    /// # Errors
    /// [`RegistryError::DuplicateNodeType`] if the tag is taken.
    pub fn register(
        mut self,
        node_type: impl Into<String>,
        executor: Arc<dyn NodeExecutor>,
    ) -> Result<Self, RegistryError> {
        let node_type = node_type.into();
        if self.executors.contains_key(&node_type) {
            return Err(RegistryError::DuplicateNodeType(node_type));
        }
        self.executors.insert(node_type, executor);
        Ok(self)
    }

    /// Skip the built-in coverage check. For registries holding only test doubles.
    pub fn allow_missing_builtins(mut self) -> Self {
        self.allow_missing_builtins = true;
        self
    }

    /// Freeze the registry.
    ///
    /// # Errors
    /// [`RegistryError::MissingExecutors`] listing every built-in node type
    /// with no executor.
    pub fn build(self) -> Result<ExecutorRegistry, RegistryError> {
        if !self.allow_missing_builtins {
            let missing: Vec<String> = node_types::BUILTIN
                .iter()
                .filter(|t| !self.executors.contains_key(**t))
                .map(|t| (*t).to_owned())
                .collect();
            if !missing.is_empty() {
                return Err(RegistryError::MissingExecutors(missing));
            }
        }

        Ok(ExecutorRegistry {
            executors: self.executors,
        })
    }
}
