//! Test doubles: `MockNode`, a recording status publisher, a recording step
//! runner and a canned `HttpClient`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::step::{StepRunner, StepWork};
use crate::{
    Context, NodeError, NodeExecutor, NodeInvocation, NodeStatus, StatusEvent, StatusPublisher,
};

// ---------------------------------------------------------------------------
// MockNode
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Write `value` under `key` in the context.
    Set { key: String, value: Value },
    /// Write the incoming value of `from` (or `null`) under `key`.
    Copy { from: String, key: String },
    /// Fail with a `Configuration` error.
    FailConfig(String),
    /// Fail with a `Transient` error for the first `failures` calls, then `Set`.
    Flaky {
        failures: usize,
        key: String,
        value: Value,
    },
}

/// A mock node that records every context it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All contexts seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<Context>>>,
}

impl MockNode {
    fn with(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A mock that always succeeds, writing `value` under `key`.
    pub fn setting(key: impl Into<String>, value: Value) -> Self {
        Self::with(MockBehaviour::Set {
            key: key.into(),
            value,
        })
    }

    /// A mock that copies `context[from]` into `context[key]`.
    pub fn copying(from: impl Into<String>, key: impl Into<String>) -> Self {
        Self::with(MockBehaviour::Copy {
            from: from.into(),
            key: key.into(),
        })
    }

    /// A mock that always fails with a `Configuration` error.
    pub fn failing_config(msg: impl Into<String>) -> Self {
        Self::with(MockBehaviour::FailConfig(msg.into()))
    }

    /// A mock that fails transiently `failures` times before succeeding.
    pub fn flaky(failures: usize, key: impl Into<String>, value: Value) -> Self {
        Self::with(MockBehaviour::Flaky {
            failures,
            key: key.into(),
            value,
        })
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Context received on the `n`th call.
    pub fn input(&self, n: usize) -> Option<Context> {
        self.calls.lock().unwrap().get(n).cloned()
    }
}

#[async_trait]
impl NodeExecutor for MockNode {
    async fn execute(&self, invocation: NodeInvocation<'_>) -> Result<Context, NodeError> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(invocation.context.clone());
            calls.len() - 1
        };

        let mut out = invocation.context;
        match &self.behaviour {
            MockBehaviour::Set { key, value } => {
                out.insert(key.clone(), value.clone());
                Ok(out)
            }
            MockBehaviour::Copy { from, key } => {
                let copied = out.get(from).cloned().unwrap_or(Value::Null);
                out.insert(key.clone(), copied);
                Ok(out)
            }
            MockBehaviour::FailConfig(msg) => Err(NodeError::Configuration(msg.clone())),
            MockBehaviour::Flaky {
                failures,
                key,
                value,
            } => {
                if call_index < *failures {
                    Err(NodeError::Transient(format!("flaky failure #{}", call_index + 1)))
                } else {
                    out.insert(key.clone(), value.clone());
                    Ok(out)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingPublisher
// ---------------------------------------------------------------------------

/// Publisher that keeps every `(channel, topic, event)` it is handed.
#[derive(Debug, Default, Clone)]
pub struct RecordingPublisher {
    events: Arc<Mutex<Vec<(String, String, StatusEvent)>>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<(String, String, StatusEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Statuses published for one node, in order.
    pub fn statuses_for(&self, node_id: &str) -> Vec<NodeStatus> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, e)| e.node_id == node_id)
            .map(|(_, _, e)| e.status)
            .collect()
    }
}

impl StatusPublisher for RecordingPublisher {
    fn publish(&self, channel: &str, topic: &str, event: StatusEvent) {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_owned(), topic.to_owned(), event));
    }
}

// ---------------------------------------------------------------------------
// RecordingSteps
// ---------------------------------------------------------------------------

/// Step runner that runs each step once and records the ids it saw.
#[derive(Debug, Default, Clone)]
pub struct RecordingSteps {
    ids: Arc<Mutex<Vec<String>>>,
}

impl RecordingSteps {
    pub fn step_ids(&self) -> Vec<String> {
        self.ids.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRunner for RecordingSteps {
    async fn run<'a>(&self, step_id: &str, mut work: StepWork<'a>) -> Result<Value, NodeError> {
        self.ids.lock().unwrap().push(step_id.to_owned());
        work().await
    }
}

// ---------------------------------------------------------------------------
// FakeHttpClient
// ---------------------------------------------------------------------------

/// `HttpClient` that answers from a queue of canned responses.
///
/// The last response is repeated once the queue is down to one entry.
#[derive(Debug, Default)]
pub struct FakeHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse, NodeError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttpClient {
    pub fn new(responses: Vec<Result<HttpResponse, NodeError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with a JSON body.
    pub fn json(status: u16, body: Value) -> Self {
        Self::new(vec![Ok(HttpResponse {
            status,
            status_text: reason(status).to_owned(),
            content_type: Some("application/json; charset=utf-8".into()),
            body: body.to_string(),
        })])
    }

    /// Always answer with a plain-text body.
    pub fn text(status: u16, status_text: &str, body: &str) -> Self {
        Self::new(vec![Ok(HttpResponse {
            status,
            status_text: status_text.to_owned(),
            content_type: Some("text/plain".into()),
            body: body.to_owned(),
        })])
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NodeError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };
        next.unwrap_or_else(|| Err(NodeError::transient("no canned response")))
    }
}
