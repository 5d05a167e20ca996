//! `nodes` crate: the `NodeExecutor` trait and built-in node implementations.
//!
//! Every node type, built-in or plugin, must implement [`NodeExecutor`].
//! The engine crate dispatches execution through this trait object, handing
//! each executor a [`StepRunner`] for durable sub-steps and a
//! [`StatusPublisher`] for live status events.

pub mod error;
pub mod http;
pub mod mock;
pub mod node_types;
pub mod status;
pub mod step;
pub mod template;
pub mod traits;
pub mod trigger;

pub use error::NodeError;
pub use status::{track_status, NodeStatus, NullPublisher, StatusEvent, StatusPublisher, STATUS_TOPIC};
pub use step::{node_step_id, step_fn, ImmediateSteps, ScopedSteps, StepRunner, StepWork};
pub use traits::{Context, NodeExecutor, NodeInvocation};
