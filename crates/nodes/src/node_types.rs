//! Type tags for the node types the graph editor can produce.
//!
//! Every tag in [`BUILTIN`] must have an executor registered before the
//! engine will start.

pub const INITIAL: &str = "INITIAL";
pub const MANUAL_TRIGGER: &str = "MANUAL_TRIGGER";
pub const WEBHOOK_TRIGGER: &str = "WEBHOOK_TRIGGER";
pub const HTTP_REQUEST: &str = "HTTP_REQUEST";

pub const BUILTIN: &[&str] = &[INITIAL, MANUAL_TRIGGER, WEBHOOK_TRIGGER, HTTP_REQUEST];
