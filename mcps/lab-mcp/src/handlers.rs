//! Tool handler implementations
//!
//! Each handler takes its typed params and returns the JSON object placed in
//! the response `result`. Errors flow out through `?` and become `-32000`
//! responses in the dispatcher.

use mcp_common::{invalid_params, json_success, ToolResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;

use crate::astro;
use crate::capability::{lock_rng, CapabilitySet};
use crate::engine::ScriptEngine;
use crate::params::*;
use crate::store::FileStore;
use crate::types::{
    BackendInfo, KerrSimulation, ListFilesResponse, NoiseResponse, ReadFileResponse,
    ResetResponse, WriteFileResponse,
};

/// Upper bound on `simulate_kerr` samples
pub const MAX_KERR_SAMPLES: usize = 100_000;

// ============================================================================
// Script execution
// ============================================================================

pub async fn run_script(engine: &ScriptEngine, params: RunScriptParams) -> ToolResult<Value> {
    tracing::debug!(bytes = params.code.len(), "Running script");
    let output = engine.run_on_worker(params.code).await?;

    json_success(&output)
}

// ============================================================================
// File store
// ============================================================================

pub async fn write_file(store: &FileStore, params: WriteFileParams) -> ToolResult<Value> {
    let resolved = store.write(&params.path, &params.content).await?;

    json_success(&WriteFileResponse {
        ok: true,
        path: store.relative(&resolved),
        bytes_written: params.content.len(),
    })
}

pub async fn read_file(store: &FileStore, params: ReadFileParams) -> ToolResult<Value> {
    let (resolved, content) = store.read(&params.path).await?;

    json_success(&ReadFileResponse {
        path: store.relative(&resolved),
        size: content.len() as u64,
        content,
    })
}

pub async fn list_files(store: &FileStore) -> ToolResult<Value> {
    let files = store.list().await?;

    json_success(&ListFilesResponse {
        total_count: files.len(),
        files,
    })
}

pub async fn reset_sandbox(store: &FileStore) -> ToolResult<Value> {
    let summary = store.reset().await;

    json_success(&ResetResponse {
        ok: true,
        removed: summary.removed,
        failed: summary.failed,
    })
}

// ============================================================================
// Astro helpers
// ============================================================================

pub async fn simulate_kerr(params: SimulateKerrParams) -> ToolResult<Value> {
    if !(0.0..=1.0).contains(&params.spin) {
        return Err(invalid_params(format!(
            "spin must be within [0, 1], got {}",
            params.spin
        )));
    }
    if params.samples == 0 || params.samples > MAX_KERR_SAMPLES {
        return Err(invalid_params(format!(
            "samples must be between 1 and {}, got {}",
            MAX_KERR_SAMPLES, params.samples
        )));
    }

    let radii = astro::sample_orbit_radii(params.spin, params.samples);
    // null marks radii at or inside the horizon, where the redshift diverges
    let redshifts: Vec<Option<f64>> = radii
        .iter()
        .map(|r| Some(astro::gravitational_redshift(*r, 1.0)).filter(|z| z.is_finite()))
        .collect();
    let inside_horizon = redshifts.iter().filter(|z| z.is_none()).count();

    json_success(&KerrSimulation {
        spin: params.spin,
        radii,
        redshifts,
        inside_horizon,
    })
}

pub async fn generate_noise(
    capabilities: &CapabilitySet,
    params: GenerateNoiseParams,
) -> ToolResult<Value> {
    astro::check_noise_size(params.width, params.height).map_err(invalid_params)?;

    let field = match params.seed {
        Some(seed) => {
            astro::generate_noise_field(params.width, params.height, &mut StdRng::seed_from_u64(seed))
        }
        None => astro::generate_noise_field(
            params.width,
            params.height,
            &mut *lock_rng(capabilities.rng()),
        ),
    };

    json_success(&NoiseResponse {
        width: params.width,
        height: params.height,
        field,
    })
}

pub async fn chaos_parameters(capabilities: &CapabilitySet) -> ToolResult<Value> {
    let params = astro::generate_chaos_parameters(&mut *lock_rng(capabilities.rng()));
    json_success(&params)
}

pub async fn backend_info(capabilities: &CapabilitySet) -> ToolResult<Value> {
    json_success(&BackendInfo {
        backend: "cpu".to_string(),
        capabilities: capabilities.names(),
    })
}
