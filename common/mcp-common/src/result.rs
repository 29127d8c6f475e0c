//! Result helpers for MCP tool responses
//!
//! Tool results travel as plain JSON objects in the `result` member of the
//! response, so handlers only need to turn their response struct into a
//! [`Value`].

use anyhow::Context;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ToolResult;

/// Create a successful JSON result from any serializable data
///
/// # Example
///
/// ```rust,ignore
/// use mcp_common::json_success;
///
/// #[derive(Serialize)]
/// struct MyData { value: i32 }
///
/// fn my_tool(&self) -> ToolResult<Value> {
///     json_success(&MyData { value: 42 })
/// }
/// ```
pub fn json_success<T: Serialize>(data: &T) -> ToolResult<Value> {
    serde_json::to_value(data).context("failed to serialize tool result")
}

/// The bare `{"ok": true}` acknowledgement
pub fn ok_ack() -> Value {
    json!({ "ok": true })
}
