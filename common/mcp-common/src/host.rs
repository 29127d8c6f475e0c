//! Tool host trait served by the dispatcher
//!
//! A server implements [`ToolHost`] to expose a closed set of tools. The
//! dispatcher owns the host for the lifetime of a connection and calls into
//! it for `tools/list` and `tools/call`.
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{async_trait, tool_descriptor, CallError, Tool, ToolHost};
//!
//! #[async_trait]
//! impl ToolHost for MyServer {
//!     fn server_name(&self) -> &str {
//!         "my-server"
//!     }
//!
//!     fn server_version(&self) -> &str {
//!         env!("CARGO_PKG_VERSION")
//!     }
//!
//!     fn list_tools(&self) -> Vec<Tool> {
//!         vec![tool_descriptor::<EchoParams>("echo", "Echo the input back")]
//!     }
//!
//!     async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, CallError> {
//!         match name {
//!             "echo" => Ok(arguments),
//!             _ => Err(CallError::ToolNotFound(name.to_string())),
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{JsonObject, Tool};
use schemars::JsonSchema;
use serde_json::Value;

use crate::error::CallError;

/// Trait for servers that expose tools over the dispatcher
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the dispatcher can be driven
/// from any tokio task.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Returns the server name reported by `initialize`
    fn server_name(&self) -> &str;

    /// Returns the server version reported by `initialize`
    fn server_version(&self) -> &str;

    /// Returns a list of all available tools
    ///
    /// Each tool includes its name, description, and input schema. The list
    /// must be identical on every call.
    fn list_tools(&self) -> Vec<Tool>;

    /// Executes a tool by name with the given arguments
    ///
    /// Returns [`CallError::ToolNotFound`] for names not in
    /// [`ToolHost::list_tools`], and [`CallError::Fault`] when the handler
    /// raised (including invalid arguments).
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, CallError>;

    /// Returns an optional description of the server
    fn server_description(&self) -> Option<&str> {
        None
    }
}

/// Build a tool descriptor whose input schema is generated from `P`
pub fn tool_descriptor<P: JsonSchema>(name: &'static str, description: &'static str) -> Tool {
    let schema = match serde_json::to_value(schemars::schema_for!(P)) {
        Ok(Value::Object(map)) => map,
        _ => JsonObject::new(),
    };
    Tool::new(name, description, Arc::new(schema))
}
