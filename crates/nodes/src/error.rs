//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's `execute` method or by a durable step.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Configuration`   : the node's data is missing or malformed; never retried.
/// - `Transient`       : the step is re-run with exponential back-off.
/// - `RetriesExhausted`: a transient step ran out of attempts; never retried again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Required node data is absent or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Failure that may succeed on a later attempt (network, 5xx, …).
    #[error("transient error: {0}")]
    Transient(String),

    /// A transient step failed on every attempt its retry policy allowed.
    #[error("step '{step}' failed after {attempts} attempt(s): {message}")]
    RetriesExhausted {
        step: String,
        attempts: u32,
        message: String,
    },
}

impl NodeError {
    /// Shorthand for a [`NodeError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Shorthand for a [`NodeError::Transient`].
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether the durable step runner should try this work again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
