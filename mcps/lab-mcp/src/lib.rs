//! Script Lab MCP - restricted script execution with a confined file sandbox
//!
//! Runs Rhai scripts against an allow-listed capability set and keeps
//! artifacts in a single sandbox directory. Served over line-delimited
//! JSON-RPC by `mcp_common::serve`.
//!
//! # Tools
//!
//! - `run_script` - Execute a script, capturing stdout, stderr and `result`
//! - `write_file` / `read_file` - Text files under the sandbox root
//! - `list_files` / `reset_sandbox` - Enumerate or clear the sandbox
//! - `simulate_kerr`, `generate_noise`, `chaos_parameters` - Astro helpers
//! - `backend_info` - Compute backend and available capabilities
//!
//! # Example
//!
//! ```rust,ignore
//! use lab_mcp::{Config, LabServer};
//!
//! let server = LabServer::with_root(Config::default(), "/tmp/lab")?;
//! mcp_common::serve(server, tokio::io::stdin(), tokio::io::stdout()).await?;
//! ```

pub mod astro;
pub mod capability;
pub mod engine;
pub mod handlers;
pub mod params;
pub mod server;
pub mod store;
pub mod types;

pub use capability::CapabilitySet;
pub use engine::ScriptEngine;
pub use server::LabServer;
pub use store::FileStore;
pub use types::{Config, ExecutionResult, LabError};
