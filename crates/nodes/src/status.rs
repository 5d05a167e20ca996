//! Live node status events and the publisher seam executors write to.
//!
//! Publishing is observability only: it never blocks and never fails a run.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Topic every built-in executor publishes its lifecycle on.
pub const STATUS_TOPIC: &str = "status";

/// Lifecycle state of one node instance within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Loading,
    Success,
    Error,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Payload carried on a status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub node_id: String,
    pub status: NodeStatus,
}

impl StatusEvent {
    pub fn new(node_id: impl Into<String>, status: NodeStatus) -> Self {
        Self {
            node_id: node_id.into(),
            status,
        }
    }
}

/// Fire-and-forget sink for [`StatusEvent`]s, scoped by `(channel, topic)`.
pub trait StatusPublisher: Send + Sync {
    fn publish(&self, channel: &str, topic: &str, event: StatusEvent);
}

/// Publisher that drops everything. Used when nobody observes a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl StatusPublisher for NullPublisher {
    fn publish(&self, _channel: &str, _topic: &str, _event: StatusEvent) {}
}

/// Publish `loading`, await `work`, then publish `success` or `error`.
///
/// The `error` event is published before the error is handed back to the
/// caller, so observers see it even when the run is about to fail.
pub async fn track_status<T, F>(
    publisher: &dyn StatusPublisher,
    channel: &str,
    node_id: &str,
    work: F,
) -> Result<T, NodeError>
where
    F: Future<Output = Result<T, NodeError>>,
{
    publisher.publish(channel, STATUS_TOPIC, StatusEvent::new(node_id, NodeStatus::Loading));

    let result = work.await;

    let status = if result.is_ok() {
        NodeStatus::Success
    } else {
        NodeStatus::Error
    };
    publisher.publish(channel, STATUS_TOPIC, StatusEvent::new(node_id, status));

    result
}
