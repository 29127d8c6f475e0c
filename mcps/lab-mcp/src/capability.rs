//! Capability registry
//!
//! Scripts reach the outside world only through the modules collected here.
//! The set is built once at startup from the compiled-in capabilities and
//! the configured allow-list, then shared read-only by every execution.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Module, Shared, INT};

use crate::astro;
use crate::types::CapabilityConfig;

pub const MATH: &str = "math";
pub const RANDOM: &str = "random";
pub const JSON: &str = "json";
pub const ASTRO: &str = "astro";

/// Every capability this build can provide
pub const AVAILABLE: [&str; 4] = [MATH, RANDOM, JSON, ASTRO];

/// Return type of native functions exposed to scripts
pub type RhaiResultOf<T> = Result<T, Box<EvalAltResult>>;

/// Process-wide PRNG behind `random::*` and the astro generators
pub type SharedRng = Arc<Mutex<StdRng>>;

/// How a capability is exposed to scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Reachable as `name::function(...)`
    Namespace,
    /// Functions merged into the global namespace
    Global,
}

#[derive(Clone)]
pub struct Capability {
    pub name: &'static str,
    pub binding: Binding,
    module: Shared<Module>,
}

#[derive(Clone)]
pub struct CapabilitySet {
    capabilities: Vec<Capability>,
    rng: SharedRng,
}

impl CapabilitySet {
    /// Build the set from the allow-list with an entropy-seeded PRNG
    pub fn probe(config: &CapabilityConfig) -> Self {
        Self::probe_with_rng(config, StdRng::from_entropy())
    }

    pub fn probe_with_rng(config: &CapabilityConfig, rng: StdRng) -> Self {
        for name in &config.allow {
            if !AVAILABLE.contains(&name.as_str()) {
                tracing::warn!(capability = %name, "Unknown capability in allow-list, ignoring");
            }
        }

        let rng: SharedRng = Arc::new(Mutex::new(rng));
        let allowed = |name: &str| config.allow.iter().any(|a| a == name);

        let mut capabilities = Vec::new();
        for name in AVAILABLE {
            if !allowed(name) {
                continue;
            }
            let (binding, module) = match name {
                MATH => (Binding::Namespace, math_module()),
                RANDOM => (Binding::Namespace, random_module(rng.clone())),
                JSON => (Binding::Namespace, json_module()),
                _ => (Binding::Global, astro_module(rng.clone())),
            };
            capabilities.push(Capability {
                name,
                binding,
                module: module.into(),
            });
        }

        let names: Vec<&str> = capabilities.iter().map(|c| c.name).collect();
        tracing::info!(capabilities = ?names, "Capability set ready");

        Self { capabilities, rng }
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.name.to_string()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }

    pub fn rng(&self) -> &SharedRng {
        &self.rng
    }

    /// Register every capability module on a fresh engine
    pub fn install(&self, engine: &mut Engine) {
        for capability in &self.capabilities {
            match capability.binding {
                Binding::Namespace => {
                    engine.register_static_module(capability.name, capability.module.clone());
                }
                Binding::Global => {
                    engine.register_global_module(capability.module.clone());
                }
            }
        }
    }
}

/// Lock the PRNG, recovering it if a previous holder panicked
pub fn lock_rng(rng: &SharedRng) -> std::sync::MutexGuard<'_, StdRng> {
    rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Module builders
// ============================================================================

fn math_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("sqrt", |x: f64| -> RhaiResultOf<f64> { Ok(x.sqrt()) });
    module.set_native_fn("exp", |x: f64| -> RhaiResultOf<f64> { Ok(x.exp()) });
    module.set_native_fn("ln", |x: f64| -> RhaiResultOf<f64> { Ok(x.ln()) });
    module.set_native_fn("log10", |x: f64| -> RhaiResultOf<f64> { Ok(x.log10()) });
    module.set_native_fn("sin", |x: f64| -> RhaiResultOf<f64> { Ok(x.sin()) });
    module.set_native_fn("cos", |x: f64| -> RhaiResultOf<f64> { Ok(x.cos()) });
    module.set_native_fn("tan", |x: f64| -> RhaiResultOf<f64> { Ok(x.tan()) });
    module.set_native_fn("atan2", |y: f64, x: f64| -> RhaiResultOf<f64> { Ok(y.atan2(x)) });
    module.set_native_fn("pow", |x: f64, y: f64| -> RhaiResultOf<f64> { Ok(x.powf(y)) });
    module.set_native_fn("floor", |x: f64| -> RhaiResultOf<f64> { Ok(x.floor()) });
    module.set_native_fn("ceil", |x: f64| -> RhaiResultOf<f64> { Ok(x.ceil()) });
    module.set_native_fn("abs", |x: f64| -> RhaiResultOf<f64> { Ok(x.abs()) });
    module.set_native_fn("hypot", |x: f64, y: f64| -> RhaiResultOf<f64> { Ok(x.hypot(y)) });

    module.set_var("PI", std::f64::consts::PI);
    module.set_var("E", std::f64::consts::E);
    module.set_var("TAU", std::f64::consts::TAU);

    module.build_index();
    module
}

fn random_module(rng: SharedRng) -> Module {
    let mut module = Module::new();

    let state = rng.clone();
    module.set_native_fn("seed", move |seed: INT| -> RhaiResultOf<()> {
        *lock_rng(&state) = StdRng::seed_from_u64(seed as u64);
        Ok(())
    });

    let state = rng.clone();
    module.set_native_fn("random", move || -> RhaiResultOf<f64> {
        Ok(lock_rng(&state).gen::<f64>())
    });

    let state = rng.clone();
    module.set_native_fn("uniform", move |a: f64, b: f64| -> RhaiResultOf<f64> {
        let t = lock_rng(&state).gen::<f64>();
        Ok(a + (b - a) * t)
    });

    let state = rng;
    module.set_native_fn("randint", move |a: INT, b: INT| -> RhaiResultOf<INT> {
        if a > b {
            return Err(format!("randint: empty range {}..={}", a, b).into());
        }
        Ok(lock_rng(&state).gen_range(a..=b))
    });

    module.build_index();
    module
}

fn json_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("stringify", |value: Dynamic| -> RhaiResultOf<String> {
        serde_json::to_string(&value).map_err(|e| format!("json::stringify: {}", e).into())
    });

    module.set_native_fn("parse", |text: ImmutableString| -> RhaiResultOf<Dynamic> {
        serde_json::from_str::<Dynamic>(text.as_str())
            .map_err(|e| format!("json::parse: {}", e).into())
    });

    module.build_index();
    module
}

fn astro_module(rng: SharedRng) -> Module {
    let mut module = Module::new();

    module.set_native_fn("kerr_isco_radius", |a: f64| -> RhaiResultOf<f64> {
        Ok(astro::kerr_isco_radius(a))
    });

    module.set_native_fn("gravitational_redshift", |r: f64| -> RhaiResultOf<f64> {
        Ok(astro::gravitational_redshift(r, 1.0))
    });
    module.set_native_fn(
        "gravitational_redshift",
        |r: f64, m: f64| -> RhaiResultOf<f64> { Ok(astro::gravitational_redshift(r, m)) },
    );

    module.set_native_fn("sample_orbit_radii", |a: f64, n: INT| -> RhaiResultOf<Array> {
        let n = usize::try_from(n).map_err(|_| format!("sample_orbit_radii: n must be >= 0, got {}", n))?;
        Ok(astro::sample_orbit_radii(a, n)
            .into_iter()
            .map(Dynamic::from_float)
            .collect())
    });

    let state = rng.clone();
    module.set_native_fn("generate_chaos_parameters", move || -> RhaiResultOf<Dynamic> {
        let params = astro::generate_chaos_parameters(&mut *lock_rng(&state));
        rhai::serde::to_dynamic(&params)
    });

    let state = rng;
    module.set_native_fn(
        "generate_noise_field",
        move |width: INT, height: INT| -> RhaiResultOf<Array> {
            let (width, height) = noise_dims(width, height)?;
            let field = astro::generate_noise_field(width, height, &mut *lock_rng(&state));
            Ok(field_to_array(field))
        },
    );
    module.set_native_fn(
        "generate_noise_field",
        |width: INT, height: INT, seed: INT| -> RhaiResultOf<Array> {
            let (width, height) = noise_dims(width, height)?;
            let mut seeded = StdRng::seed_from_u64(seed as u64);
            Ok(field_to_array(astro::generate_noise_field(width, height, &mut seeded)))
        },
    );

    module.build_index();
    module
}

fn noise_dims(width: INT, height: INT) -> RhaiResultOf<(usize, usize)> {
    let width = usize::try_from(width).map_err(|_| format!("width must be >= 0, got {}", width))?;
    let height =
        usize::try_from(height).map_err(|_| format!("height must be >= 0, got {}", height))?;
    astro::check_noise_size(width, height)?;
    Ok((width, height))
}

fn field_to_array(field: Vec<Vec<f64>>) -> Array {
    field
        .into_iter()
        .map(|row| Dynamic::from_array(row.into_iter().map(Dynamic::from_float).collect()))
        .collect()
}
