//! Wire types for the line-delimited JSON-RPC protocol
//!
//! Requests are parsed leniently: `id`, `method` and `params` may all be
//! missing. The `id` is carried as an opaque [`Value`] and echoed back
//! untouched on the matching response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{METHOD_NOT_FOUND, TOOL_EXECUTION_ERROR};

pub const JSONRPC_VERSION: &str = "2.0";

/// An incoming request line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: id.into(),
            method: Some(method.into()),
            params,
        }
    }

    /// Params as an object; missing, `null` or non-object params become `{}`
    pub fn params_object(&self) -> Map<String, Value> {
        match &self.params {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// An outgoing response line carrying exactly one of `result` or `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Structured error object of an error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn unknown_method(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Unknown method: {}", method))
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Unknown tool: {}", name))
    }

    /// Convert a handler fault into a `-32000` error with its cause chain as data
    pub fn tool_fault(err: &anyhow::Error) -> Self {
        Self::new(TOOL_EXECUTION_ERROR, format!("Tool error: {}", err))
            .with_data(format!("{:?}", err))
    }
}
