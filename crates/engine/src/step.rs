//! Durable step runner: checkpoint, replay and retry.
//!
//! For each `(execution_id, step_id)` the runner first looks for a stored
//! checkpoint and replays it without running any work. Otherwise it runs the
//! work, retrying `NodeError::Transient` failures with exponential back-off,
//! and stores the result once it succeeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use nodes::{NodeError, StepRunner, StepWork};

use crate::store::ExecutionStore;

/// Back-off policy for transient step failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per step, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each attempt after.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after `failed_attempts` consecutive failures.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(failed_attempts.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// [`StepRunner`] bound to one execution, persisting through an [`ExecutionStore`].
pub struct DurableStepRunner {
    execution_id: Uuid,
    store: Arc<dyn ExecutionStore>,
    policy: RetryPolicy,
}

impl DurableStepRunner {
    pub fn new(execution_id: Uuid, store: Arc<dyn ExecutionStore>, policy: RetryPolicy) -> Self {
        Self {
            execution_id,
            store,
            policy,
        }
    }
}

#[async_trait]
impl StepRunner for DurableStepRunner {
    async fn run<'a>(&self, step_id: &str, mut work: StepWork<'a>) -> Result<Value, NodeError> {
        match self.store.load_checkpoint(self.execution_id, step_id).await {
            Ok(Some(memoized)) => {
                debug!(execution_id = %self.execution_id, step_id, "replaying memoized step");
                return Ok(memoized);
            }
            Ok(None) => {}
            Err(e) => {
                return Err(NodeError::transient(format!(
                    "failed to load checkpoint for step '{step_id}': {e}"
                )))
            }
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0u32;

        let output = loop {
            attempts += 1;
            match work().await {
                Ok(output) => break output,

                Err(NodeError::Transient(message)) => {
                    if attempts >= max_attempts {
                        warn!(step_id, attempts, "step retries exhausted: {message}");
                        return Err(NodeError::RetriesExhausted {
                            step: step_id.to_owned(),
                            attempts,
                            message,
                        });
                    }

                    let delay = self.policy.delay_after(attempts);
                    warn!(
                        "step '{}' transient error (attempt {}/{}), retrying in {:?}: {}",
                        step_id, attempts, max_attempts, delay, message
                    );
                    tokio::time::sleep(delay).await;
                }

                Err(other) => return Err(other),
            }
        };

        if let Err(e) = self
            .store
            .save_checkpoint(self.execution_id, step_id, &output)
            .await
        {
            // The work already happened; losing the checkpoint only costs a
            // re-run of this step on resume.
            warn!(step_id, "failed to save checkpoint: {e}");
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use nodes::step_fn;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn runner(store: &Arc<MemoryStore>, execution_id: Uuid, attempts: u32) -> DurableStepRunner {
        DurableStepRunner::new(
            execution_id,
            store.clone(),
            RetryPolicy {
                max_attempts: attempts,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
            },
        )
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn completed_step_is_replayed_without_running_work() {
        let store = Arc::new(MemoryStore::default());
        let execution_id = Uuid::new_v4();
        let calls = AtomicU32::new(0);
        let calls = &calls;

        for _ in 0..2 {
            let out = runner(&store, execution_id, 3)
                .run("s1", step_fn(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({ "n": 1 }))
                }))
                .await
                .unwrap();
            assert_eq!(out, json!({ "n": 1 }));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn checkpoints_are_scoped_per_execution() {
        let store = Arc::new(MemoryStore::default());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        for _ in 0..2 {
            runner(&store, Uuid::new_v4(), 1)
                .run("s1", step_fn(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!(null))
                }))
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let store = Arc::new(MemoryStore::default());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let out = runner(&store, Uuid::new_v4(), 3)
            .run("s1", step_fn(move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(NodeError::transient("flaky"))
                } else {
                    Ok(json!("done"))
                }
            }))
            .await
            .unwrap();

        assert_eq!(out, json!("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_reported_and_not_checkpointed() {
        let store = Arc::new(MemoryStore::default());
        let execution_id = Uuid::new_v4();

        let err = runner(&store, execution_id, 2)
            .run("s1", step_fn(|| async { Err(NodeError::transient("down")) }))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            NodeError::RetriesExhausted {
                step: "s1".into(),
                attempts: 2,
                message: "down".into()
            }
        );
        assert_eq!(store.load_checkpoint(execution_id, "s1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn configuration_errors_are_not_retried() {
        let store = Arc::new(MemoryStore::default());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = runner(&store, Uuid::new_v4(), 5)
            .run("s1", step_fn(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(NodeError::config("bad"))
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
