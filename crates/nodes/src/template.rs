//! Template resolution for node configuration strings.
//!
//! Templates reference the execution context with dotted paths:
//! ```text
//! https://api.example.com/users/{{ call1.httpResponse.data.id }}
//! ```
//! Missing paths render as an empty string. The `json` helper renders any
//! sub-value as pretty-printed JSON, usable either as a filter or a function:
//! ```text
//! { "user": {{ call1.httpResponse.data | json }} }
//! { "user": {{ json(call1.httpResponse.data) }} }
//! ```
//! Output is never HTML-escaped.

use std::sync::OnceLock;

use minijinja::{Environment, Error as TemplateError, ErrorKind, UndefinedBehavior, Value};

use crate::{Context, NodeError};

fn environment() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_filter("json", to_pretty_json);
        env.add_function("json", to_pretty_json);
        env
    })
}

fn to_pretty_json(value: Value) -> Result<String, TemplateError> {
    if value.is_undefined() {
        return Ok(String::new());
    }
    serde_json::to_string_pretty(&value)
        .map_err(|e| TemplateError::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Render `template` against `context`.
///
/// # Errors
/// [`NodeError::Configuration`] if the template itself is malformed.
pub fn resolve(template: &str, context: &Context) -> Result<String, NodeError> {
    environment()
        .render_str(template, Value::from_serialize(context))
        .map_err(|e| NodeError::config(format!("invalid template '{template}': {e}")))
}
