//! MCP Common - Shared utilities for line-delimited MCP servers
//!
//! This crate provides the protocol layer used by the MCP servers in this
//! workspace:
//!
//! - **Channel**: newline-delimited JSON messages over any async reader/writer
//! - **Dispatch**: `initialize`, `tools/list` and `tools/call` routing
//! - **Host**: the [`ToolHost`] trait a server implements to expose its tools
//! - **Errors**: RPC error codes and fault-to-error conversion
//! - **Initialization**: `serve_stdio!` macro for standardized server startup
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{serve_stdio, json_success, ToolResult};
//!
//! // In main.rs
//! serve_stdio!(MyServer, "my_mcp");
//!
//! // In tool implementations
//! fn my_tool(&self) -> ToolResult<serde_json::Value> {
//!     let data = get_some_data();
//!     json_success(&data)
//! }
//! ```

pub mod channel;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod init;
pub mod protocol;
pub mod result;

// Re-export commonly used items at crate root
pub use channel::{MessageChannel, DEFAULT_MAX_LINE_BYTES};
pub use dispatch::{serve, Dispatcher, ServerIdentity, SessionState};
pub use error::{
    internal_error, invalid_params, parse_params, CallError, ToolFault, ToolResult,
    METHOD_NOT_FOUND, TOOL_EXECUTION_ERROR,
};
pub use host::{tool_descriptor, ToolHost};
pub use init::init_tracing;
pub use protocol::{RpcError, RpcRequest, RpcResponse};
pub use result::{json_success, ok_ack};

// Re-export rmcp types that are commonly needed
pub use rmcp::model::Tool;

// Re-export async_trait for implementing ToolHost
pub use async_trait::async_trait;
