//! Error handling utilities for MCP servers
//!
//! Tool handlers return [`ToolResult`], an `anyhow` result, so any error type
//! flows through `?`. The dispatcher turns a failed handler into a `-32000`
//! response; handlers never build protocol errors themselves.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Unknown method or unknown tool
pub const METHOD_NOT_FOUND: i32 = -32601;

/// A tool handler raised a fault
pub const TOOL_EXECUTION_ERROR: i32 = -32000;

/// Type alias for tool handler results
pub type ToolResult<T> = anyhow::Result<T>;

/// Faults raised by the helpers in this crate
#[derive(Debug, thiserror::Error)]
pub enum ToolFault {
    /// Arguments were missing or of the wrong type
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Anything else that went wrong inside a handler
    #[error("{0}")]
    Internal(String),
}

/// Outcome of a failed [`crate::ToolHost::call_tool`]
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Tool was not found in the server
    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    /// The handler ran and raised a fault
    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

/// Create an internal fault with a message
///
/// # Example
///
/// ```rust,ignore
/// use mcp_common::internal_error;
///
/// fn my_tool(&self) -> ToolResult<Value> {
///     if bad_condition {
///         return Err(internal_error("Something went wrong"));
///     }
///     // ...
/// }
/// ```
pub fn internal_error(message: impl Into<String>) -> anyhow::Error {
    ToolFault::Internal(message.into()).into()
}

/// Create an invalid params fault with a message
///
/// Use this when the tool receives invalid parameters.
pub fn invalid_params(message: impl Into<String>) -> anyhow::Error {
    ToolFault::InvalidParams(message.into()).into()
}

/// Deserialize tool arguments into a typed params struct
///
/// Missing fields and wrong types surface as [`ToolFault::InvalidParams`]
/// with serde's description of the problem. A `null` argument value is
/// treated as an empty object.
pub fn parse_params<T: DeserializeOwned>(arguments: Value) -> ToolResult<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| invalid_params(e.to_string()))
}
