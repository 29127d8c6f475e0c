//! Protocol dispatcher
//!
//! Routes `initialize`, `tools/list` and `tools/call` (plus their legacy
//! aliases `list_tools` and `call_tool`) to a [`ToolHost`]. Every request
//! produces exactly one response carrying the request's `id`; faults inside
//! a tool, panics included, become `-32000` error responses.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use rmcp::model::{ProtocolVersion, ServerCapabilities};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::channel::MessageChannel;
use crate::error::CallError;
use crate::host::ToolHost;
use crate::protocol::{RpcError, RpcRequest, RpcResponse};

/// Per-connection handshake state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initialized,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerIdentity {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: ProtocolVersion,
    server_info: ServerIdentity,
    capabilities: ServerCapabilities,
}

pub struct Dispatcher<H> {
    host: H,
    tool_names: BTreeSet<String>,
    state: SessionState,
}

impl<H: ToolHost> Dispatcher<H> {
    pub fn new(host: H) -> Self {
        let tool_names = host
            .list_tools()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();

        Self {
            host,
            tool_names,
            state: SessionState::Idle,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Mark the connection closed
    pub fn end_session(&mut self) {
        self.state = SessionState::Idle;
    }

    pub fn identity(&self) -> ServerIdentity {
        ServerIdentity {
            name: self.host.server_name().to_string(),
            version: self.host.server_version().to_string(),
        }
    }

    /// Handle one request and build its response
    pub async fn dispatch(&mut self, request: RpcRequest) -> RpcResponse {
        let params = request.params_object();
        let RpcRequest { id, method, .. } = request;

        tracing::debug!(method = method.as_deref().unwrap_or(""), id = %id, "Dispatching request");

        match method.as_deref() {
            Some("initialize") => {
                if self.state == SessionState::Initialized {
                    tracing::debug!("Repeated initialize, returning the same metadata");
                }
                self.state = SessionState::Initialized;
                RpcResponse::success(id, self.initialize_result())
            }
            Some("tools/list") | Some("list_tools") => {
                RpcResponse::success(id, json!({ "tools": self.host.list_tools() }))
            }
            Some("tools/call") | Some("call_tool") => {
                let name = params.get("name").cloned().unwrap_or(Value::Null);
                let arguments = match params.get("arguments") {
                    None | Some(Value::Null) => json!({}),
                    Some(args) => args.clone(),
                };
                match self.call_tool(&name, arguments).await {
                    Ok(result) => RpcResponse::success(id, result),
                    Err(error) => RpcResponse::failure(id, error),
                }
            }
            Some(other) => RpcResponse::failure(id, RpcError::unknown_method(other)),
            None => RpcResponse::failure(id, RpcError::unknown_method("<missing>")),
        }
    }

    fn initialize_result(&self) -> Value {
        let result = InitializeResult {
            protocol_version: ProtocolVersion::V_2024_11_05,
            server_info: self.identity(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
        };
        serde_json::to_value(result).unwrap_or_else(|_| json!({}))
    }

    async fn call_tool(&self, name: &Value, arguments: Value) -> Result<Value, RpcError> {
        let Some(name) = name.as_str().filter(|n| self.tool_names.contains(*n)) else {
            let shown = match name {
                Value::String(s) => s.clone(),
                Value::Null => "<missing>".to_string(),
                other => other.to_string(),
            };
            tracing::warn!(tool = %shown, "Unknown tool requested");
            return Err(RpcError::unknown_tool(&shown));
        };

        let outcome = AssertUnwindSafe(self.host.call_tool(name, arguments))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(CallError::ToolNotFound(missing))) => Err(RpcError::unknown_tool(&missing)),
            Ok(Err(CallError::Fault(err))) => {
                tracing::warn!(tool = name, error = %err, "Tool call failed");
                Err(RpcError::tool_fault(&err))
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                tracing::error!(tool = name, reason = %reason, "Tool handler panicked");
                let err = anyhow::anyhow!("handler panicked: {}", reason);
                Err(RpcError::tool_fault(&err))
            }
        }
    }
}

/// Run the strictly sequential read → dispatch → write loop until end of input
pub async fn serve<H, R, W>(host: H, reader: R, writer: W) -> anyhow::Result<()>
where
    H: ToolHost,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut channel = MessageChannel::new(reader, writer);
    let mut dispatcher = Dispatcher::new(host);

    tracing::info!(
        server = dispatcher.host().server_name(),
        tools = dispatcher.tool_names.len(),
        "Server running, waiting for requests..."
    );

    while let Some(request) = channel.read().await? {
        let response = dispatcher.dispatch(request).await;
        channel.write(&response).await?;
    }

    dispatcher.end_session();
    tracing::info!("Input closed");
    Ok(())
}
