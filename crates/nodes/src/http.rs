//! `HTTP_REQUEST` node.
//!
//! Node data:
//! - `endpoint`     (required, template): URL to call.
//! - `method`       (required): GET, POST, PUT, PATCH or DELETE.
//! - `variableName` (required): context key the response is stored under.
//! - `body`         (optional, template, POST/PUT/PATCH only): JSON text, defaults to `{}`.
//!
//! Result shape written to the context:
//! ```json
//! { "<variableName>": { "httpResponse": { "status": 200, "statusText": "OK", "data": … } } }
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{
    step::step_fn, template, track_status, Context, NodeError, NodeExecutor, NodeInvocation,
};

/// Status channel the HTTP executor publishes on.
pub const HTTP_REQUEST_CHANNEL: &str = "http-request-execution";

const LABEL: &str = "HTTP Request";

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// HTTP verbs the node accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the node sends its `body` with this method.
    pub fn carries_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }
}

impl FromStr for HttpMethod {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(NodeError::config(format!(
                "{LABEL} node: unsupported method '{other}'"
            ))),
        }
    }
}

/// A fully-resolved outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// JSON body, already validated.
    pub body: Option<String>,
}

/// The parts of a response the node records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as JSON when the content type says so, raw text otherwise.
    fn data(&self) -> Value {
        let is_json = self
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"));
        if is_json {
            match serde_json::from_str(&self.body) {
                Ok(v) => return v,
                Err(e) => warn!("response claimed JSON but failed to parse: {e}"),
            }
        }
        Value::String(self.body.clone())
    }
}

/// Sends [`HttpRequest`]s. Implemented over `reqwest` in production and by
/// fakes in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NodeError>;
}

/// [`HttpClient`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client with the given per-request timeout.
    ///
    /// # Errors
    /// [`NodeError::Configuration`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self, NodeError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, NodeError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| NodeError::config(e.to_string()))?;

        let mut builder = self.inner.request(method, &request.url);
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_builder() {
                NodeError::config(format!("{LABEL} node: invalid request: {e}"))
            } else {
                NodeError::transient(format!("request to {} failed: {e}", request.url))
            }
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::transient(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            content_type,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Executor for `HTTP_REQUEST` nodes.
pub struct HttpRequestExecutor {
    client: Arc<dyn HttpClient>,
}

impl HttpRequestExecutor {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    async fn execute(&self, invocation: NodeInvocation<'_>) -> Result<Context, NodeError> {
        let node_id = invocation.node_id;
        let publisher = invocation.publisher;

        track_status(publisher, HTTP_REQUEST_CHANNEL, node_id, async {
            // Validation happens outside the step: a config error must never
            // be memoized or retried.
            let endpoint = invocation.require_str(LABEL, "endpoint")?;
            let variable_name = invocation.require_str(LABEL, "variableName")?;
            let method: HttpMethod = invocation.require_str(LABEL, "method")?.parse()?;

            let context = &invocation.context;
            let url = template::resolve(endpoint, context)?;
            let body = if method.carries_body() {
                let raw = invocation.optional_str("body").unwrap_or("{}");
                let resolved = template::resolve(raw, context)?;
                serde_json::from_str::<Value>(&resolved).map_err(|e| {
                    NodeError::config(format!("{LABEL} node: body is not valid JSON: {e}"))
                })?;
                Some(resolved)
            } else {
                None
            };

            let request = HttpRequest { method, url, body };
            let client = &self.client;
            let request = &request;

            let payload = invocation
                .steps
                .run("http-request", step_fn(move || async move {
                    debug!(method = request.method.as_str(), url = %request.url, "sending request");
                    let response = client.send(request).await?;
                    if !response.is_success() {
                        return Err(NodeError::transient(format!(
                            "{} {} returned {} {}",
                            request.method.as_str(),
                            request.url,
                            response.status,
                            response.status_text
                        )));
                    }
                    Ok(json!({
                        "httpResponse": {
                            "status": response.status,
                            "statusText": response.status_text,
                            "data": response.data(),
                        }
                    }))
                }))
                .await?;

            let mut out = invocation.context.clone();
            out.insert(variable_name.to_owned(), payload);
            Ok(out)
        })
        .await
    }
}
