//! Numeric helpers for black-hole visualisation experiments
//!
//! Radii are in units of GM/c². All functions are pure apart from the
//! caller-supplied random source.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Outer edge of the sampled disk
pub const OUTER_RADIUS: f64 = 20.0;

/// Largest noise field (width × height) a single call may produce
pub const MAX_NOISE_CELLS: usize = 4_000_000;

/// Randomised scene parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosParameters {
    pub spin: f64,
    pub turbulence: f64,
    pub hotspot_orbits: i64,
    pub lensing_intensity: f64,
    pub frame_drag_factor: f64,
    pub noise_seed: i64,
}

/// Prograde innermost stable circular orbit for dimensionless spin `a`
///
/// Bardeen, Press & Teukolsky (1972). `a = 0` gives 6, `a = 1` gives 1.
pub fn kerr_isco_radius(a: f64) -> f64 {
    let a2 = a * a;
    let z1 = 1.0 + (1.0 - a2).cbrt() * ((1.0 + a).cbrt() + (1.0 - a).cbrt());
    let z2 = (3.0 * a2 + z1 * z1).sqrt();
    3.0 + z2 - ((3.0 - z1) * (3.0 + z1 + 2.0 * z2)).sqrt()
}

/// Schwarzschild redshift factor `1 / sqrt(1 - 2m/r)`, infinite at or inside the horizon
pub fn gravitational_redshift(r: f64, m: f64) -> f64 {
    if r <= 2.0 * m {
        return f64::INFINITY;
    }
    1.0 / (1.0 - 2.0 * m / r).sqrt()
}

/// `n` radii spaced evenly from the ISCO out to [`OUTER_RADIUS`], both ends included
pub fn sample_orbit_radii(a: f64, n: usize) -> Vec<f64> {
    let isco = kerr_isco_radius(a);
    match n {
        0 => Vec::new(),
        1 => vec![isco],
        _ => {
            let step = (OUTER_RADIUS - isco) / (n - 1) as f64;
            (0..n).map(|i| isco + step * i as f64).collect()
        }
    }
}

pub fn generate_chaos_parameters<R: Rng + ?Sized>(rng: &mut R) -> ChaosParameters {
    ChaosParameters {
        spin: rng.gen_range(0.9..=0.9999),
        turbulence: rng.gen_range(0.3..=1.5),
        hotspot_orbits: rng.gen_range(1..=7),
        lensing_intensity: rng.gen_range(0.8..=1.4),
        frame_drag_factor: rng.gen_range(1.0..=1.5),
        noise_seed: rng.gen_range(0..=10_000_000),
    }
}

/// Check noise dimensions before allocating
pub fn check_noise_size(width: usize, height: usize) -> Result<(), String> {
    match width.checked_mul(height) {
        Some(cells) if cells <= MAX_NOISE_CELLS => Ok(()),
        _ => Err(format!(
            "noise field {}x{} exceeds {} cells",
            width, height, MAX_NOISE_CELLS
        )),
    }
}

/// `height` rows of `width` uniform samples in [0, 1)
pub fn generate_noise_field<R: Rng + ?Sized>(
    width: usize,
    height: usize,
    rng: &mut R,
) -> Vec<Vec<f64>> {
    (0..height)
        .map(|_| (0..width).map(|_| rng.gen::<f64>()).collect())
        .collect()
}
