//! Route handlers, one module per resource.

pub mod executions;
pub mod realtime;
pub mod webhooks;

pub use crate::AppState;
