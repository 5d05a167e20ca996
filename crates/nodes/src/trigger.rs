//! Trigger nodes: the entry points of a workflow graph.
//!
//! A trigger has no work of its own; the triggering event's data has already
//! seeded the context. It still reports a status lifecycle and checkpoints a
//! step so observers and replays treat it like any other node.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{
    step::step_fn, track_status, Context, NodeError, NodeExecutor, NodeInvocation,
};

/// Pass-through executor for `INITIAL`, `MANUAL_TRIGGER` and `WEBHOOK_TRIGGER` nodes.
#[derive(Debug, Clone)]
pub struct TriggerExecutor {
    channel: &'static str,
    step_name: &'static str,
}

impl TriggerExecutor {
    pub fn initial() -> Self {
        Self {
            channel: "initial-execution",
            step_name: "initial",
        }
    }

    pub fn manual() -> Self {
        Self {
            channel: "manual-trigger-execution",
            step_name: "manual-trigger",
        }
    }

    pub fn webhook() -> Self {
        Self {
            channel: "webhook-trigger-execution",
            step_name: "webhook-trigger",
        }
    }

    /// Status channel this trigger publishes on.
    pub fn channel(&self) -> &'static str {
        self.channel
    }
}

#[async_trait]
impl NodeExecutor for TriggerExecutor {
    async fn execute(&self, invocation: NodeInvocation<'_>) -> Result<Context, NodeError> {
        let NodeInvocation {
            node_id,
            context,
            steps,
            publisher,
            ..
        } = invocation;

        track_status(publisher, self.channel, node_id, async {
            let snapshot = Value::Object(context);
            let replayed = steps
                .run(self.step_name, step_fn(|| {
                    let snapshot = snapshot.clone();
                    async move { Ok(snapshot) }
                }))
                .await?;

            debug!(node_id, step = self.step_name, "trigger passed context through");

            match replayed {
                Value::Object(map) => Ok(map),
                other => Err(NodeError::transient(format!(
                    "trigger step returned a non-object checkpoint: {other}"
                ))),
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingPublisher;
    use crate::{ImmediateSteps, NodeStatus};
    use serde_json::{json, Map};

    #[tokio::test]
    async fn manual_trigger_passes_context_through() {
        let publisher = RecordingPublisher::default();
        let data = Map::new();
        let context = json!({ "seed": 1 }).as_object().cloned().unwrap();

        let out = TriggerExecutor::manual()
            .execute(NodeInvocation {
                node_id: "t1",
                data: &data,
                context: context.clone(),
                steps: &ImmediateSteps,
                publisher: &publisher,
            })
            .await
            .unwrap();

        assert_eq!(out, context);
        assert_eq!(
            publisher.statuses_for("t1"),
            vec![NodeStatus::Loading, NodeStatus::Success]
        );
        assert_eq!(publisher.events()[0].0, "manual-trigger-execution");
    }
}
