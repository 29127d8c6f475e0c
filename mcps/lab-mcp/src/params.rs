//! Parameter types for script lab tools

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunScriptParams {
    #[schemars(description = "Rhai source to execute; bind `result` to return a value")]
    #[serde(default, alias = "script")]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    #[schemars(description = "Path relative to the sandbox root")]
    pub path: String,

    #[schemars(description = "Text content to write (default: empty)")]
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    #[schemars(description = "Path relative to the sandbox root")]
    pub path: String,
}

/// Tools without parameters
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SimulateKerrParams {
    #[schemars(description = "Dimensionless spin in [0, 1] (default: 0.95)")]
    #[serde(default = "default_spin", deserialize_with = "lenient_f64")]
    pub spin: f64,

    #[schemars(description = "Number of orbit radii to sample (default: 128)")]
    #[serde(default = "default_samples", deserialize_with = "lenient_usize")]
    pub samples: usize,
}

fn default_spin() -> f64 {
    0.95
}

fn default_samples() -> usize {
    128
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GenerateNoiseParams {
    #[schemars(description = "Columns per row (default: 64)")]
    #[serde(default = "default_noise_dim", deserialize_with = "lenient_usize")]
    pub width: usize,

    #[schemars(description = "Number of rows (default: 64)")]
    #[serde(default = "default_noise_dim", deserialize_with = "lenient_usize")]
    pub height: usize,

    #[schemars(description = "Seed for a repeatable field; omit for fresh noise")]
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub seed: Option<u64>,
}

fn default_noise_dim() -> usize {
    64
}

// ============================================================================
// Lenient numbers
// ============================================================================

/// Numbers may arrive as JSON numbers or numeric strings
#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Int(u64),
    Float(f64),
    Str(String),
}

impl NumOrStr {
    fn as_f64<E: serde::de::Error>(&self) -> Result<f64, E> {
        match self {
            NumOrStr::Int(n) => Ok(*n as f64),
            NumOrStr::Float(x) => Ok(*x),
            NumOrStr::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a number, got {:?}", s))),
        }
    }

    fn as_u64<E: serde::de::Error>(&self) -> Result<u64, E> {
        match self {
            NumOrStr::Int(n) => Ok(*n),
            NumOrStr::Float(x) if x.fract() == 0.0 && *x >= 0.0 && *x <= u64::MAX as f64 => {
                Ok(*x as u64)
            }
            NumOrStr::Float(x) => Err(E::custom(format!(
                "expected a non-negative integer, got {}",
                x
            ))),
            NumOrStr::Str(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a non-negative integer, got {:?}", s))),
        }
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    NumOrStr::deserialize(deserializer)?.as_f64()
}

fn lenient_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let n = NumOrStr::deserialize(deserializer)?.as_u64::<D::Error>()?;
    usize::try_from(n).map_err(serde::de::Error::custom)
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<NumOrStr>::deserialize(deserializer)? {
        Some(value) => value.as_u64().map(Some),
        None => Ok(None),
    }
}
