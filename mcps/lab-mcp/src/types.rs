//! Type definitions for the script lab MCP

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::capability::{ASTRO, JSON, MATH, RANDOM};

/// Directory created next to the executable when no root is configured
pub const DEFAULT_SANDBOX_DIR: &str = "sandbox";

/// Overrides `sandbox.root` from the config file
pub const SANDBOX_ROOT_ENV: &str = "LAB_SANDBOX_ROOT";

// ============================================================================
// Configuration Types
// ============================================================================

/// Configuration for the script lab
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub capabilities: CapabilityConfig,
}

impl Config {
    /// Resolve the sandbox root: env override, then config, then `sandbox/`
    /// next to the executable
    pub fn sandbox_root(&self) -> PathBuf {
        if let Ok(root) = std::env::var(SANDBOX_ROOT_ENV) {
            if !root.trim().is_empty() {
                return expand_home(&root);
            }
        }

        if let Some(root) = &self.sandbox.root {
            return expand_home(root);
        }

        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_SANDBOX_DIR)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Root directory for all file tools (`~` is expanded)
    #[serde(default)]
    pub root: Option<String>,
    /// Reject paths whose existing ancestors resolve outside the root through symlinks
    #[serde(default = "default_true")]
    pub reject_symlink_escape: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: None,
            reject_symlink_escape: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum file size in bytes for reads and writes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024 // 10MB
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Operation budget per script, 0 = unlimited
    ///
    /// With the default of 0 a script that never terminates blocks the
    /// server forever.
    #[serde(default)]
    pub max_operations: u64,
    /// Maximum size per captured stream (stdout/stderr) in bytes
    #[serde(default = "default_max_output")]
    pub max_output_bytes: usize,
    /// Maximum function call nesting depth
    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,
}

fn default_max_output() -> usize {
    1024 * 1024 // 1MB
}

fn default_max_call_levels() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_output_bytes: default_max_output(),
            max_call_levels: default_max_call_levels(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// Capabilities scripts may use; names not compiled in are ignored
    #[serde(default = "default_allowed_capabilities")]
    pub allow: Vec<String>,
}

fn default_allowed_capabilities() -> Vec<String> {
    [MATH, RANDOM, JSON, ASTRO]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            allow: default_allowed_capabilities(),
        }
    }
}

/// Resolve ~ to home directory
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

// ============================================================================
// Response Types
// ============================================================================

/// Response for run_script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Value bound to `result` by the script, `null` when unbound
    pub result: Value,
    pub truncated: bool,
}

/// Response for write_file
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteFileResponse {
    pub ok: bool,
    pub path: String,
    pub bytes_written: usize,
}

/// Response for read_file
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadFileResponse {
    pub content: String,
    pub path: String,
    pub size: u64,
}

/// Response for list_files
#[derive(Debug, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<String>,
    pub total_count: usize,
}

/// Outcome of clearing the sandbox
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub removed: usize,
    pub failed: usize,
}

/// Response for reset_sandbox
#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub ok: bool,
    pub removed: usize,
    pub failed: usize,
}

/// Response for simulate_kerr
#[derive(Debug, Serialize, Deserialize)]
pub struct KerrSimulation {
    pub spin: f64,
    pub radii: Vec<f64>,
    /// `None` (JSON `null`) where the redshift is infinite, i.e. `r <= 2`
    pub redshifts: Vec<Option<f64>>,
    /// Number of sampled radii at or inside the horizon
    pub inside_horizon: usize,
}

/// Response for generate_noise
#[derive(Debug, Serialize, Deserialize)]
pub struct NoiseResponse {
    pub width: usize,
    pub height: usize,
    pub field: Vec<Vec<f64>>,
}

/// Response for backend_info
#[derive(Debug, Serialize, Deserialize)]
pub struct BackendInfo {
    pub backend: String,
    pub capabilities: Vec<String>,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum LabError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path escapes sandbox: {0}")]
    PathEscape(String),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config error: {0}")]
    ConfigError(String),
}

pub type LabResult<T> = Result<T, LabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.sandbox.reject_symlink_escape);
        assert_eq!(config.engine.max_operations, 0);
        assert_eq!(config.capabilities.allow.len(), 4);
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [sandbox]
            root = "/tmp/lab"

            [engine]
            max_operations = 5000
            "#,
        )
        .unwrap();
        assert_eq!(config.sandbox.root.as_deref(), Some("/tmp/lab"));
        assert!(config.sandbox.reject_symlink_escape);
        assert_eq!(config.engine.max_operations, 5000);
        assert_eq!(config.engine.max_output_bytes, 1024 * 1024);
        assert_eq!(config.limits.max_file_size, 10 * 1024 * 1024);
    }

    #[test]
    fn test_tilde_resolution() {
        let resolved = expand_home("~/lab");
        assert!(resolved.to_string_lossy().ends_with("lab"));
        assert!(!resolved.to_string_lossy().starts_with('~'));
    }
}
