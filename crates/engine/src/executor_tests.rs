//! Tests for the workflow execution engine.
//!
//! These run the real orchestrator against `MemoryStore` and `MockNode`, so
//! no Postgres connection is required. Durable-step replay is exercised by
//! reusing one `MemoryStore` across runs of the same execution id.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use uuid::Uuid;

use nodes::http::{HttpRequestExecutor, HTTP_REQUEST_CHANNEL};
use nodes::mock::{FakeHttpClient, MockNode};
use nodes::{node_types, NodeExecutor, NodeStatus, StatusEvent, STATUS_TOPIC};

use crate::error::ErrorTier;
use crate::executor::{ExecutorConfig, RunPhase, WorkflowExecutor};
use crate::models::{Connection, Node, TriggerEvent, Workflow};
use crate::registry::ExecutorRegistry;
use crate::status::StatusChannel;
use crate::step::RetryPolicy;
use crate::store::{ExecutionStore, MemoryStore};
use crate::{EngineError, StoreError};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn node(id: &str, node_type: &str) -> Node {
    Node::new(id, node_type, Map::new())
}

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("node data must be an object"),
    }
}

/// Registry holding only the given `(type, executor)` pairs.
fn registry(entries: Vec<(&str, Arc<dyn NodeExecutor>)>) -> Arc<ExecutorRegistry> {
    let mut builder = ExecutorRegistry::builder().allow_missing_builtins();
    for (node_type, executor) in entries {
        builder = builder.register(node_type, executor).unwrap();
    }
    Arc::new(builder.build().unwrap())
}

fn shared(node: &Arc<MockNode>) -> Arc<dyn NodeExecutor> {
    node.clone()
}

fn fast_retry(max_attempts: u32) -> ExecutorConfig {
    ExecutorConfig {
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
    }
}

fn executor(
    store: &Arc<MemoryStore>,
    registry: Arc<ExecutorRegistry>,
    config: ExecutorConfig,
) -> WorkflowExecutor {
    WorkflowExecutor::new(store.clone(), store.clone(), registry, config)
}

fn expect_node_failure(err: EngineError) -> Box<crate::error::NodeFailure> {
    match err {
        EngineError::NodeFailed(failure) => failure,
        other => panic!("expected NodeFailed, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Context flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn context_accumulates_across_nodes() {
    let a = Arc::new(MockNode::setting("callA", json!("a")));
    let b = Arc::new(MockNode::setting("callB", json!("b")));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A"), node("B", "B")],
        vec![Connection::between("A", "B")],
    )]));
    let engine = executor(
        &store,
        registry(vec![("A", shared(&a)), ("B", shared(&b))]),
        ExecutorConfig::default(),
    );

    let out = engine.run(TriggerEvent::new("wf")).await.unwrap();

    assert_eq!(out.order, vec!["A", "B"]);
    assert_eq!(Value::Object(out.result), json!({ "callA": "a", "callB": "b" }));
    assert_eq!(b.input(0).unwrap().get("callA"), Some(&json!("a")));
    assert_eq!(store.phase(out.execution_id), Some(RunPhase::Completed));
}

#[tokio::test]
async fn initial_data_seeds_the_context() {
    let copier = Arc::new(MockNode::copying("userId", "seen"));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("n1", "COPY")],
        vec![],
    )]));
    let engine = executor(&store, registry(vec![("COPY", shared(&copier))]), ExecutorConfig::default());

    let trigger = TriggerEvent::new("wf").with_initial_data(data(json!({ "userId": 42 })));
    let out = engine.run(trigger).await.unwrap();

    assert_eq!(Value::Object(out.result), json!({ "userId": 42, "seen": 42 }));
}

#[tokio::test]
async fn keys_dropped_by_a_node_are_kept() {
    struct Forgetful;

    #[async_trait::async_trait]
    impl NodeExecutor for Forgetful {
        async fn execute(
            &self,
            _invocation: nodes::NodeInvocation<'_>,
        ) -> Result<nodes::Context, nodes::NodeError> {
            Ok(data(json!({ "only": true })))
        }
    }

    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A"), node("B", "FORGET")],
        vec![Connection::between("A", "B")],
    )]));
    let engine = executor(
        &store,
        registry(vec![
            ("A", shared(&Arc::new(MockNode::setting("first", json!(1))))),
            ("FORGET", Arc::new(Forgetful) as Arc<dyn NodeExecutor>),
        ]),
        ExecutorConfig::default(),
    );

    let out = engine.run(TriggerEvent::new("wf")).await.unwrap();

    assert_eq!(Value::Object(out.result), json!({ "first": 1, "only": true }));
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn configuration_error_short_circuits_the_run() {
    let a = Arc::new(MockNode::setting("callA", json!(1)));
    let bad = Arc::new(MockNode::failing_config("no endpoint configured"));
    let c = Arc::new(MockNode::setting("callC", json!(3)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A"), node("B", "BAD"), node("C", "C")],
        vec![Connection::between("A", "B"), Connection::between("B", "C")],
    )]));
    let engine = executor(
        &store,
        registry(vec![("A", shared(&a)), ("BAD", shared(&bad)), ("C", shared(&c))]),
        fast_retry(5),
    );

    let failure = expect_node_failure(engine.run(TriggerEvent::new("wf")).await.unwrap_err());

    assert_eq!(failure.node_id, "B");
    assert_eq!(failure.node_type, "BAD");
    assert_eq!(failure.tier, ErrorTier::Configuration);
    assert_eq!(failure.completed, vec!["A"]);
    assert_eq!(Value::Object(failure.partial.clone()), json!({ "callA": 1 }));
    assert_eq!(bad.call_count(), 1, "configuration errors are never retried");
    assert_eq!(c.call_count(), 0);
    assert!(matches!(
        store.phase(failure.execution_id),
        Some(RunPhase::Failed { error }) if error.contains("no endpoint configured")
    ));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_retry_then_fail_as_transient() {
    let flaky = Arc::new(MockNode::flaky(10, "never", json!(null)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("n1", "FLAKY")],
        vec![],
    )]));
    let engine = executor(&store, registry(vec![("FLAKY", shared(&flaky))]), fast_retry(3));

    let failure = expect_node_failure(engine.run(TriggerEvent::new("wf")).await.unwrap_err());

    assert_eq!(failure.tier, ErrorTier::Transient);
    assert_eq!(flaky.call_count(), 3);
    assert!(store.checkpointed_steps(failure.execution_id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn transient_errors_recover_within_the_retry_budget() {
    let flaky = Arc::new(MockNode::flaky(2, "ok", json!(true)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("n1", "FLAKY")],
        vec![],
    )]));
    let engine = executor(&store, registry(vec![("FLAKY", shared(&flaky))]), fast_retry(3));

    let out = engine.run(TriggerEvent::new("wf")).await.unwrap();

    assert_eq!(out.result.get("ok"), Some(&json!(true)));
    assert_eq!(flaky.call_count(), 3);
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cycle_fails_before_any_node_runs() {
    let a = Arc::new(MockNode::setting("a", json!(1)));
    let b = Arc::new(MockNode::setting("b", json!(2)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A"), node("B", "B")],
        vec![Connection::between("A", "B"), Connection::between("B", "A")],
    )]));
    let engine = executor(
        &store,
        registry(vec![("A", shared(&a)), ("B", shared(&b))]),
        ExecutorConfig::default(),
    );
    let execution_id = Uuid::new_v4();

    let err = engine
        .run(TriggerEvent::new("wf").resuming(execution_id))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::CycleDetected { .. }));
    assert_eq!(err.tier(), ErrorTier::Graph);
    assert_eq!(a.call_count() + b.call_count(), 0);
    assert!(matches!(store.phase(execution_id), Some(RunPhase::Failed { .. })));
}

#[tokio::test]
async fn unregistered_node_type_fails_before_dispatch() {
    let a = Arc::new(MockNode::setting("a", json!(1)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A"), node("X", "MYSTERY")],
        vec![Connection::between("A", "X")],
    )]));
    let engine = executor(&store, registry(vec![("A", shared(&a))]), ExecutorConfig::default());

    let err = engine.run(TriggerEvent::new("wf")).await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::UnregisteredNodeType { ref node_id, ref node_type }
            if node_id == "X" && node_type == "MYSTERY"
    ));
    assert_eq!(a.call_count(), 0, "gaps are found before the first dispatch");
}

#[tokio::test]
async fn phase_write_failure_marks_the_run_failed() {
    /// Rejects every `Running` transition, delegates the rest.
    struct NoRunningPhase(Arc<MemoryStore>);

    #[async_trait::async_trait]
    impl ExecutionStore for NoRunningPhase {
        async fn begin(&self, execution_id: Uuid, workflow_id: &str) -> Result<(), StoreError> {
            self.0.begin(execution_id, workflow_id).await
        }

        async fn set_phase(&self, execution_id: Uuid, phase: &RunPhase) -> Result<(), StoreError> {
            if matches!(phase, RunPhase::Running { .. }) {
                return Err(StoreError::Corrupt("disk full".into()));
            }
            self.0.set_phase(execution_id, phase).await
        }

        async fn load_checkpoint(
            &self,
            execution_id: Uuid,
            step_id: &str,
        ) -> Result<Option<Value>, StoreError> {
            self.0.load_checkpoint(execution_id, step_id).await
        }

        async fn save_checkpoint(
            &self,
            execution_id: Uuid,
            step_id: &str,
            output: &Value,
        ) -> Result<(), StoreError> {
            self.0.save_checkpoint(execution_id, step_id, output).await
        }
    }

    let a = Arc::new(MockNode::setting("a", json!(1)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A")],
        vec![],
    )]));
    let engine = WorkflowExecutor::new(
        store.clone(),
        Arc::new(NoRunningPhase(store.clone())),
        registry(vec![("A", shared(&a))]),
        ExecutorConfig::default(),
    );
    let execution_id = Uuid::new_v4();

    let err = engine
        .run(TriggerEvent::new("wf").resuming(execution_id))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Store(StoreError::Corrupt(_))));
    assert_eq!(a.call_count(), 0);
    assert!(matches!(
        store.phase(execution_id),
        Some(RunPhase::Failed { error }) if error.contains("disk full")
    ));
}

#[tokio::test]
async fn missing_workflow_never_starts_a_run() {
    let store = Arc::new(MemoryStore::new());
    let engine = executor(&store, registry(vec![]), ExecutorConfig::default());
    let execution_id = Uuid::new_v4();

    let err = engine
        .run(TriggerEvent::new("ghost").resuming(execution_id))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::WorkflowNotFound(ref id) if id == "ghost"));
    assert!(store.phases(execution_id).is_empty());
}

#[tokio::test]
async fn empty_workflow_completes_with_the_seed_context() {
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new("wf", vec![], vec![])]));
    let engine = executor(&store, registry(vec![]), ExecutorConfig::default());

    let out = engine
        .run(TriggerEvent::new("wf").with_initial_data(data(json!({ "k": "v" }))))
        .await
        .unwrap();

    assert!(out.order.is_empty());
    assert_eq!(Value::Object(out.result), json!({ "k": "v" }));
}

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resumed_run_replays_completed_nodes() {
    let a = Arc::new(MockNode::setting("callA", json!("a")));
    let b = Arc::new(MockNode::flaky(1, "callB", json!("b")));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A"), node("B", "B")],
        vec![Connection::between("A", "B")],
    )]));
    let engine = executor(
        &store,
        registry(vec![("A", shared(&a)), ("B", shared(&b))]),
        fast_retry(1),
    );
    let execution_id = Uuid::new_v4();

    let first = engine
        .run(TriggerEvent::new("wf").resuming(execution_id))
        .await
        .unwrap_err();
    assert_eq!(expect_node_failure(first).completed, vec!["A"]);
    assert_eq!(store.checkpointed_steps(execution_id), vec!["node:A"]);

    let out = engine
        .run(TriggerEvent::new("wf").resuming(execution_id))
        .await
        .unwrap();

    assert_eq!(a.call_count(), 1, "A must replay from its checkpoint");
    assert_eq!(b.call_count(), 2);
    assert_eq!(Value::Object(out.result), json!({ "callA": "a", "callB": "b" }));
    assert_eq!(store.checkpointed_steps(execution_id), vec!["node:A", "node:B"]);
}

#[tokio::test]
async fn each_run_gets_its_own_execution_id() {
    let a = Arc::new(MockNode::setting("a", json!(1)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A")],
        vec![],
    )]));
    let engine = executor(&store, registry(vec![("A", shared(&a))]), ExecutorConfig::default());

    let first = engine.run(TriggerEvent::new("wf")).await.unwrap();
    let second = engine.run(TriggerEvent::new("wf")).await.unwrap();

    assert_ne!(first.execution_id, second.execution_id);
    assert_eq!(a.call_count(), 2);
}

// ---------------------------------------------------------------------------
// End-to-end with built-in executors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_http_request_node_end_to_end() {
    let http = Arc::new(FakeHttpClient::json(200, json!([{ "id": 1, "name": "Ada" }])));
    let registry = Arc::new(ExecutorRegistry::with_builtins(http.clone()).unwrap());
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![Node::new(
            "n1",
            node_types::HTTP_REQUEST,
            data(json!({
                "endpoint": "https://api.example.com/users",
                "method": "GET",
                "variableName": "call1"
            })),
        )],
        vec![],
    )]));
    let status = Arc::new(StatusChannel::default());
    let token = status.subscribe(HTTP_REQUEST_CHANNEL, STATUS_TOPIC);
    let mut sub = status.attach(&token.token).unwrap();
    let engine = executor(&store, registry, ExecutorConfig::default()).with_publisher(status);

    let out = engine.run(TriggerEvent::new("wf")).await.unwrap();

    assert_eq!(out.order, vec!["n1"]);
    assert_eq!(
        Value::Object(out.result),
        json!({
            "call1": {
                "httpResponse": {
                    "status": 200,
                    "statusText": "OK",
                    "data": [{ "id": 1, "name": "Ada" }]
                }
            }
        })
    );
    assert_eq!(http.requests()[0].url, "https://api.example.com/users");
    assert_eq!(
        store.checkpointed_steps(out.execution_id),
        vec!["node:n1", "node:n1::http-request"]
    );
    assert_eq!(sub.try_recv(), Some(StatusEvent::new("n1", NodeStatus::Loading)));
    assert_eq!(sub.try_recv(), Some(StatusEvent::new("n1", NodeStatus::Success)));
}

#[tokio::test]
async fn node_id_shaped_like_an_inner_step_still_runs() {
    let http = Arc::new(FakeHttpClient::json(200, json!({ "ok": true })));
    let mark = Arc::new(MockNode::setting("mine", json!(true)));
    let registry = ExecutorRegistry::builder()
        .allow_missing_builtins()
        .register(node_types::HTTP_REQUEST, Arc::new(HttpRequestExecutor::new(http)))
        .unwrap()
        .register("MARK", shared(&mark))
        .unwrap()
        .build()
        .unwrap();
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![
            Node::new(
                "n1",
                node_types::HTTP_REQUEST,
                data(json!({
                    "endpoint": "https://api.example.com/ping",
                    "method": "GET",
                    "variableName": "call1"
                })),
            ),
            node("n1/http-request", "MARK"),
            node("n1::http-request", "MARK"),
        ],
        vec![
            Connection::between("n1", "n1/http-request"),
            Connection::between("n1/http-request", "n1::http-request"),
        ],
    )]));
    let engine = executor(&store, Arc::new(registry), ExecutorConfig::default());

    let out = engine.run(TriggerEvent::new("wf")).await.unwrap();

    assert_eq!(mark.call_count(), 2);
    assert_eq!(out.result.get("mine"), Some(&json!(true)));
    assert!(!out.result.contains_key("httpResponse"));
    assert_eq!(
        store.checkpointed_steps(out.execution_id),
        vec![
            "node:n1",
            "node:n1%3A%3Ahttp-request",
            "node:n1/http-request",
            "node:n1::http-request",
        ]
    );
}

#[tokio::test]
async fn trigger_output_feeds_templated_request() {
    let http = Arc::new(FakeHttpClient::json(201, json!({ "created": true })));
    let registry = Arc::new(ExecutorRegistry::with_builtins(http.clone()).unwrap());
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![
            Node::new(
                "post",
                node_types::HTTP_REQUEST,
                data(json!({
                    "endpoint": "https://api.example.com/users/{{ user.id }}",
                    "method": "POST",
                    "variableName": "saved",
                    "body": "{\"user\": {{ user | json }}}"
                })),
            ),
            node("start", node_types::MANUAL_TRIGGER),
        ],
        vec![Connection::between("start", "post")],
    )]));
    let engine = executor(&store, registry, ExecutorConfig::default());

    let out = engine
        .run(TriggerEvent::new("wf").with_initial_data(data(json!({ "user": { "id": 7 } }))))
        .await
        .unwrap();

    assert_eq!(out.order, vec!["start", "post"]);
    let request = &http.requests()[0];
    assert_eq!(request.url, "https://api.example.com/users/7");
    let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({ "user": { "id": 7 } }));
    assert_eq!(out.result["saved"]["httpResponse"]["status"], 201);
}

#[tokio::test]
async fn http_config_error_publishes_error_status() {
    let http = Arc::new(FakeHttpClient::default());
    let registry = Arc::new(ExecutorRegistry::with_builtins(http.clone()).unwrap());
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![Node::new(
            "n1",
            node_types::HTTP_REQUEST,
            data(json!({ "method": "GET", "variableName": "x" })),
        )],
        vec![],
    )]));
    let status = Arc::new(StatusChannel::default());
    let token = status.subscribe(HTTP_REQUEST_CHANNEL, STATUS_TOPIC);
    let mut sub = status.attach(&token.token).unwrap();
    let engine = executor(&store, registry, fast_retry(3)).with_publisher(status);

    let failure = expect_node_failure(engine.run(TriggerEvent::new("wf")).await.unwrap_err());

    assert_eq!(failure.tier, ErrorTier::Configuration);
    assert!(failure.message.contains("no endpoint configured"));
    assert!(http.requests().is_empty());
    assert_eq!(sub.try_recv(), Some(StatusEvent::new("n1", NodeStatus::Loading)));
    assert_eq!(sub.try_recv(), Some(StatusEvent::new("n1", NodeStatus::Error)));
}

#[tokio::test]
async fn fan_out_runs_source_first_and_each_branch_once() {
    let a = Arc::new(MockNode::setting("a", json!(1)));
    let b = Arc::new(MockNode::copying("a", "b"));
    let c = Arc::new(MockNode::copying("a", "c"));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A"), node("B", "B"), node("C", "C")],
        vec![Connection::between("A", "B"), Connection::between("A", "C")],
    )]));
    let engine = executor(
        &store,
        registry(vec![("A", shared(&a)), ("B", shared(&b)), ("C", shared(&c))]),
        ExecutorConfig::default(),
    );

    let out = engine.run(TriggerEvent::new("wf")).await.unwrap();

    assert_eq!(out.order[0], "A");
    assert_eq!(out.order.len(), 3);
    assert!(out.order.contains(&"B".to_string()));
    assert!(out.order.contains(&"C".to_string()));
    assert_eq!((a.call_count(), b.call_count(), c.call_count()), (1, 1, 1));
    assert_eq!(Value::Object(out.result), json!({ "a": 1, "b": 1, "c": 1 }));
}

#[tokio::test]
async fn concurrent_runs_share_one_executor() {
    let a = Arc::new(MockNode::setting("a", json!(1)));
    let store = Arc::new(MemoryStore::with_workflows([Workflow::new(
        "wf",
        vec![node("A", "A")],
        vec![],
    )]));
    let engine = Arc::new(executor(&store, registry(vec![("A", shared(&a))]), ExecutorConfig::default()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.run(TriggerEvent::new("wf")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(a.call_count(), 8);
}
