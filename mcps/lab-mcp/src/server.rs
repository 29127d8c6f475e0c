//! Script lab server
//!
//! Owns the file store, the capability set and the script engine, and
//! exposes them through a fixed tool table. Handler implementations are in
//! the handlers module.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mcp_common::{async_trait, parse_params, tool_descriptor, CallError, Tool, ToolHost};
use serde_json::Value;

use crate::capability::CapabilitySet;
use crate::engine::ScriptEngine;
use crate::handlers;
use crate::params::*;
use crate::store::FileStore;
use crate::types::{Config, LabError};

pub const SERVER_NAME: &str = "script-lab";

/// Points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "LAB_CONFIG_PATH";

pub struct LabServer {
    store: FileStore,
    capabilities: Arc<CapabilitySet>,
    engine: ScriptEngine,
    config: Config,
    tools: Vec<Tool>,
}

impl LabServer {
    /// Create a new server, loading config from standard locations
    ///
    /// Config is searched in order:
    /// 1. `LAB_CONFIG_PATH` env var
    /// 2. `~/.binks/lab.toml`
    /// 3. `./lab-mcp.toml`
    /// 4. `$XDG_CONFIG_HOME/lab-mcp/config.toml`
    /// 5. `~/.lab-mcp.toml`
    /// 6. Default config if none found
    pub fn new() -> Result<Self, LabError> {
        Self::with_config(Self::load_config())
    }

    /// Create a new server with explicit config
    pub fn with_config(config: Config) -> Result<Self, LabError> {
        let root = config.sandbox_root();
        Self::with_root(config, root)
    }

    /// Create a server over an explicit sandbox root, ignoring env and config roots
    pub fn with_root(config: Config, root: impl AsRef<Path>) -> Result<Self, LabError> {
        let store = FileStore::open(root, &config)?;
        let capabilities = Arc::new(CapabilitySet::probe(&config.capabilities));
        let engine = ScriptEngine::new(capabilities.clone(), config.engine.clone());

        Ok(Self {
            store,
            capabilities,
            engine,
            config,
            tools: tool_table(),
        })
    }

    pub fn store(&self) -> &FileStore {
        &self.store
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load config from standard file locations
    fn load_config() -> Config {
        // 1. Check LAB_CONFIG_PATH env var first
        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                if let Some(config) = read_config(&path) {
                    tracing::info!("Loaded config from {}={}", CONFIG_PATH_ENV, path.display());
                    return config;
                }
            } else {
                tracing::warn!("{}={} does not exist", CONFIG_PATH_ENV, env_path);
            }
        }

        // 2-5. Check standard file locations
        let mut config_paths = Vec::new();

        // 2. ~/.binks/lab.toml (project convention)
        if let Some(home) = dirs::home_dir() {
            config_paths.push(home.join(".binks").join("lab.toml"));
        }

        // 3. ./lab-mcp.toml (local override)
        config_paths.push(PathBuf::from("lab-mcp.toml"));

        // 4. $XDG_CONFIG_HOME/lab-mcp/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            config_paths.push(config_dir.join("lab-mcp").join("config.toml"));
        }

        // 5. ~/.lab-mcp.toml
        if let Some(home) = dirs::home_dir() {
            config_paths.push(home.join(".lab-mcp.toml"));
        }

        for path in config_paths {
            if path.exists() {
                if let Some(config) = read_config(&path) {
                    tracing::info!("Loaded config from {}", path.display());
                    return config;
                }
            }
        }

        // 6. Default config
        tracing::info!("Using default configuration");
        Config::default()
    }
}

fn read_config(path: &Path) -> Option<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!("Failed to read config {}: {}", path.display(), e);
            return None;
        }
    };
    match toml::from_str::<Config>(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Failed to parse config {}: {}", path.display(), e);
            None
        }
    }
}

// ============================================================================
// Tool table
// ============================================================================

fn tool_table() -> Vec<Tool> {
    vec![
        tool_descriptor::<RunScriptParams>(
            "run_script",
            "Execute a Rhai script in the restricted engine. Returns captured stdout, \
             stderr and the value bound to `result`",
        ),
        tool_descriptor::<WriteFileParams>("write_file", "Write a text file inside the sandbox"),
        tool_descriptor::<ReadFileParams>("read_file", "Read a text file from the sandbox"),
        tool_descriptor::<NoParams>("list_files", "List every file in the sandbox"),
        tool_descriptor::<NoParams>("reset_sandbox", "Delete every file in the sandbox"),
        tool_descriptor::<SimulateKerrParams>(
            "simulate_kerr",
            "Sample orbit radii from the Kerr ISCO outward with their gravitational redshifts",
        ),
        tool_descriptor::<GenerateNoiseParams>(
            "generate_noise",
            "Generate a 2D field of uniform noise in [0, 1)",
        ),
        tool_descriptor::<NoParams>(
            "chaos_parameters",
            "Draw a random set of black-hole scene parameters",
        ),
        tool_descriptor::<NoParams>(
            "backend_info",
            "Report the compute backend and the capabilities available to scripts",
        ),
    ]
}

// ============================================================================
// ToolHost Implementation
// ============================================================================

#[async_trait]
impl ToolHost for LabServer {
    fn server_name(&self) -> &str {
        SERVER_NAME
    }

    fn server_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tools.clone()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, CallError> {
        let result = match name {
            "run_script" => handlers::run_script(&self.engine, parse_params(arguments)?).await,
            "write_file" => handlers::write_file(&self.store, parse_params(arguments)?).await,
            "read_file" => handlers::read_file(&self.store, parse_params(arguments)?).await,
            "list_files" => handlers::list_files(&self.store).await,
            "reset_sandbox" => handlers::reset_sandbox(&self.store).await,
            "simulate_kerr" => handlers::simulate_kerr(parse_params(arguments)?).await,
            "generate_noise" => {
                handlers::generate_noise(&self.capabilities, parse_params(arguments)?).await
            }
            "chaos_parameters" => handlers::chaos_parameters(&self.capabilities).await,
            "backend_info" => handlers::backend_info(&self.capabilities).await,
            _ => return Err(CallError::ToolNotFound(name.to_string())),
        };
        Ok(result?)
    }

    fn server_description(&self) -> Option<&str> {
        Some(
            "Restricted script lab: runs Rhai scripts against an allow-listed capability set \
             and keeps artifacts in a path-confined sandbox directory.",
        )
    }
}
