//! Restricted script execution
//!
//! Each call builds a fresh Rhai engine from the standard package, the
//! `sum` builtin and the capability set. There is no filesystem, process or
//! network function anywhere in that namespace; `eval` is disabled and
//! `import` resolves nothing. Output from `print` and `debug` lands in
//! per-call buffers, so a faulting script leaves no global state behind.
//!
//! Scripts run on a dedicated thread whose stack grows with the configured
//! call depth, so deep recursion ends in a captured fault rather than a
//! stack overflow.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::packages::{Package, StandardPackage};
use rhai::{Array, Dynamic, Engine, Map, Module, Scope, Shared, FLOAT, INT};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::capability::{CapabilitySet, RhaiResultOf};
use crate::types::{EngineConfig, ExecutionResult};

/// Name a script binds to hand back a value
pub const RESULT_BINDING: &str = "result";

/// Deepest script call nesting accepted from configuration
pub const MAX_CALL_LEVELS: usize = 256;

/// Worker stack before any script calls
const BASE_STACK_BYTES: usize = 8 * 1024 * 1024;

/// Worker stack reserved per script call level (unoptimised builds need the most)
const STACK_BYTES_PER_CALL_LEVEL: usize = 512 * 1024;

/// Captured stream that stops growing at its byte limit
#[derive(Debug)]
struct OutputBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Append `line` plus a newline, cutting on a char boundary at the limit
    fn push_line(&mut self, line: &str) {
        if self.truncated {
            return;
        }

        let remaining = self.limit.saturating_sub(self.text.len());
        if line.len() < remaining {
            self.text.push_str(line);
            self.text.push('\n');
            return;
        }

        let mut cut = remaining.min(line.len());
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        self.text.push_str(&line[..cut]);
        self.truncated = true;
    }

    /// Append a fault line regardless of the limit
    fn push_fault(&mut self, line: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(line);
        self.text.push('\n');
    }
}

type SharedBuffer = Arc<Mutex<OutputBuffer>>;

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, OutputBuffer> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct ScriptEngine {
    capabilities: Arc<CapabilitySet>,
    config: EngineConfig,
    stdlib: Shared<Module>,
}

impl ScriptEngine {
    pub fn new(capabilities: Arc<CapabilitySet>, mut config: EngineConfig) -> Self {
        if config.max_call_levels > MAX_CALL_LEVELS {
            tracing::warn!(
                configured = config.max_call_levels,
                max = MAX_CALL_LEVELS,
                "engine.max_call_levels too deep, clamping"
            );
            config.max_call_levels = MAX_CALL_LEVELS;
        }

        Self {
            capabilities,
            config,
            stdlib: StandardPackage::new().as_shared_module(),
        }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stack size of the worker thread for the configured call depth
    pub fn stack_size(&self) -> usize {
        BASE_STACK_BYTES + self.config.max_call_levels * STACK_BYTES_PER_CALL_LEVEL
    }

    /// Run a script on its own worker thread
    ///
    /// Fails only if the worker cannot be started or dies without reporting.
    pub async fn run_on_worker(&self, code: String) -> anyhow::Result<ExecutionResult> {
        let engine = self.clone();
        let (tx, rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("script-worker".to_string())
            .stack_size(self.stack_size())
            .spawn(move || {
                let _ = tx.send(engine.run(&code));
            })
            .context("failed to start script worker")?;

        rx.await.context("script worker exited without a result")
    }

    /// Run a script and capture what it produced
    ///
    /// Never fails: parse and runtime faults are reported in `stderr` and
    /// leave `result` as `null`. Call from a thread sized by
    /// [`ScriptEngine::stack_size`] when scripts may recurse deeply.
    pub fn run(&self, code: &str) -> ExecutionResult {
        let stdout: SharedBuffer = Arc::new(Mutex::new(OutputBuffer::new(self.config.max_output_bytes)));
        let stderr: SharedBuffer = Arc::new(Mutex::new(OutputBuffer::new(self.config.max_output_bytes)));

        let engine = self.build_engine(stdout.clone(), stderr.clone());
        let mut scope = Scope::new();
        scope.push_dynamic(RESULT_BINDING, Dynamic::UNIT);

        if let Err(err) = engine.run_with_scope(&mut scope, code) {
            tracing::debug!(error = %err, "Script faulted");
            lock(&stderr).push_fault(&format!("error: {}", err));
        }

        let result = match scope.get_value::<Dynamic>(RESULT_BINDING) {
            Some(value) if !value.is_unit() => match serde_json::to_value(&value) {
                Ok(json) => {
                    if has_non_finite(&value) {
                        lock(&stderr).push_fault(
                            "warning: result contains non-finite numbers, encoded as null",
                        );
                    }
                    json
                }
                Err(e) => {
                    lock(&stderr).push_fault(&format!(
                        "error: cannot convert result of type {}: {}",
                        value.type_name(),
                        e
                    ));
                    Value::Null
                }
            },
            _ => Value::Null,
        };
        drop(engine);

        let mut stdout = lock(&stdout);
        let mut stderr = lock(&stderr);
        ExecutionResult {
            stdout: std::mem::take(&mut stdout.text),
            stderr: std::mem::take(&mut stderr.text),
            result,
            truncated: stdout.truncated || stderr.truncated,
        }
    }

    fn build_engine(&self, stdout: SharedBuffer, stderr: SharedBuffer) -> Engine {
        let mut engine = Engine::new_raw();
        engine.register_global_module(self.stdlib.clone());

        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.set_max_operations(self.config.max_operations);
        engine.set_max_call_levels(self.config.max_call_levels);

        engine.register_fn("sum", sum);
        self.capabilities.install(&mut engine);

        engine.on_print(move |text| lock(&stdout).push_line(text));
        engine.on_debug(move |text, _source, _pos| lock(&stderr).push_line(text));

        engine
    }
}

/// Whether a value holds NaN or an infinity anywhere, which JSON cannot carry
fn has_non_finite(value: &Dynamic) -> bool {
    if let Ok(x) = value.as_float() {
        return !x.is_finite();
    }
    if let Some(items) = value.read_lock::<Array>() {
        return items.iter().any(has_non_finite);
    }
    if let Some(map) = value.read_lock::<Map>() {
        return map.values().any(has_non_finite);
    }
    false
}

/// Sum of a numeric array; integer unless any element is a float
fn sum(items: Array) -> RhaiResultOf<Dynamic> {
    let mut ints: INT = 0;
    let mut floats: FLOAT = 0.0;
    let mut any_float = false;

    for item in &items {
        if let Ok(n) = item.as_int() {
            ints = ints.checked_add(n).ok_or("sum: integer overflow")?;
        } else if let Ok(x) = item.as_float() {
            floats += x;
            any_float = true;
        } else {
            return Err(format!("sum: cannot add a value of type {}", item.type_name()).into());
        }
    }

    if any_float {
        Ok(Dynamic::from_float(ints as FLOAT + floats))
    } else {
        Ok(Dynamic::from_int(ints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CapabilityConfig;
    use serde_json::json;

    fn engine() -> ScriptEngine {
        engine_with(EngineConfig::default())
    }

    fn engine_with(config: EngineConfig) -> ScriptEngine {
        let capabilities = CapabilitySet::probe(&CapabilityConfig::default());
        ScriptEngine::new(Arc::new(capabilities), config)
    }

    #[test]
    fn test_print_is_captured() {
        let out = engine().run(r#"print("hello"); print(40 + 2);"#);
        assert_eq!(out.stdout, "hello\n42\n");
        assert_eq!(out.stderr, "");
        assert_eq!(out.result, Value::Null);
        assert!(!out.truncated);
    }

    #[test]
    fn test_result_binding() {
        assert_eq!(engine().run("result = 42;").result, json!(42));
        assert_eq!(engine().run("let result = 1.5;").result, json!(1.5));
        assert_eq!(
            engine().run(r#"result = #{ name: "disk", radii: [1, 2] };"#).result,
            json!({ "name": "disk", "radii": [1, 2] })
        );
    }

    #[test]
    fn test_division_by_zero_is_captured() {
        let out = engine().run("let x = 1 / 0; result = x;");
        assert!(out.stderr.starts_with("error: "));
        assert_eq!(out.result, Value::Null);
    }

    #[test]
    fn test_syntax_error_is_captured() {
        let out = engine().run("let = ;");
        assert!(out.stderr.contains("error"));
        assert_eq!(out.result, Value::Null);
    }

    #[test]
    fn test_no_state_between_runs() {
        let engine = engine();
        assert_eq!(engine.run("let x = 5; result = x;").result, json!(5));

        let out = engine.run("result = x;");
        assert!(!out.stderr.is_empty());
        assert_eq!(out.result, Value::Null);
    }

    #[test]
    fn test_eval_and_import_are_blocked() {
        let out = engine().run(r#"result = eval("1 + 1");"#);
        assert!(!out.stderr.is_empty());
        assert_eq!(out.result, Value::Null);

        let out = engine().run(r#"import "os" as os; result = 1;"#);
        assert!(!out.stderr.is_empty());
        assert_eq!(out.result, Value::Null);
    }

    #[test]
    fn test_debug_goes_to_stderr() {
        let out = engine().run("debug(7);");
        assert_eq!(out.stdout, "");
        assert_eq!(out.stderr, "7\n");
    }

    #[test]
    fn test_sum_builtin() {
        assert_eq!(engine().run("result = sum([1, 2, 3]);").result, json!(6));
        assert_eq!(engine().run("result = sum([1, 2.5]);").result, json!(3.5));
        assert_eq!(engine().run("result = sum([]);").result, json!(0));

        let out = engine().run(r#"result = sum([1, "two"]);"#);
        assert!(out.stderr.contains("sum"));
        assert_eq!(out.result, Value::Null);
    }

    #[test]
    fn test_capabilities_are_reachable() {
        let out = engine().run("result = math::floor(math::sqrt(17.0)) + kerr_isco_radius(0.0);");
        assert_eq!(out.result, json!(10.0));
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let engine = engine();
        let code = "random::seed(5); result = [random::random(), random::randint(1, 100)];";
        assert_eq!(engine.run(code).result, engine.run(code).result);
    }

    #[test]
    fn test_operation_budget() {
        let out = engine_with(EngineConfig {
            max_operations: 10_000,
            ..EngineConfig::default()
        })
        .run("loop { }");
        assert!(!out.stderr.is_empty());
        assert_eq!(out.result, Value::Null);
    }

    #[test]
    fn test_output_is_truncated() {
        let out = engine_with(EngineConfig {
            max_output_bytes: 16,
            ..EngineConfig::default()
        })
        .run(r#"for i in 0..10 { print("hello world"); }"#);
        assert!(out.truncated);
        assert_eq!(out.stdout.len(), 16);
        assert!(out.stdout.starts_with("hello world\nhell"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let mut buffer = OutputBuffer::new(5);
        buffer.push_line("ééé");
        assert!(buffer.truncated);
        assert_eq!(buffer.text, "éé");

        buffer.push_line("more");
        assert_eq!(buffer.text, "éé");
    }

    const COUNTDOWN: &str = "fn depth(n) { if n == 0 { 0 } else { depth(n - 1) + 1 } }";

    #[tokio::test]
    async fn test_deep_recursion_within_limit() {
        let engine = engine();
        let levels = engine.config().max_call_levels;

        let code = format!("{} result = depth({});", COUNTDOWN, levels - 4);
        let out = engine.run_on_worker(code).await.unwrap();
        assert_eq!(out.stderr, "");
        assert_eq!(out.result, json!(levels - 4));
    }

    #[tokio::test]
    async fn test_recursion_past_limit_is_captured() {
        let engine = engine();
        let levels = engine.config().max_call_levels;

        let code = format!("{} result = depth({});", COUNTDOWN, levels + 1);
        let out = engine.run_on_worker(code).await.unwrap();
        assert!(out.stderr.starts_with("error: "));
        assert_eq!(out.result, Value::Null);

        let code = format!("{} result = depth(100000);", COUNTDOWN);
        let out = engine.run_on_worker(code).await.unwrap();
        assert!(out.stderr.starts_with("error: "));
    }

    #[test]
    fn test_call_levels_are_clamped() {
        let engine = engine_with(EngineConfig {
            max_call_levels: 100_000,
            ..EngineConfig::default()
        });
        assert_eq!(engine.config().max_call_levels, MAX_CALL_LEVELS);
        assert!(engine.stack_size() > MAX_CALL_LEVELS * STACK_BYTES_PER_CALL_LEVEL);
    }

    #[test]
    fn test_non_finite_result_is_reported() {
        let out = engine().run("result = 1.0 / 0.0;");
        assert_eq!(out.result, Value::Null);
        assert!(out.stderr.contains("non-finite"));

        let out = engine().run("result = [1.0, 0.0 / 0.0];");
        assert_eq!(out.result, json!([1.0, null]));
        assert!(out.stderr.contains("non-finite"));

        let out = engine().run("result = #{ ok: 2.0 };");
        assert_eq!(out.stderr, "");
    }

    #[test]
    fn test_faults_survive_zero_output_limit() {
        let engine = engine_with(EngineConfig {
            max_output_bytes: 0,
            ..EngineConfig::default()
        });

        let out = engine.run(r#"print("dropped"); let x = 1 / 0;"#);
        assert_eq!(out.stdout, "");
        assert!(out.truncated);
        assert!(out.stderr.starts_with("error: "));
    }

    #[test]
    fn test_fault_line_follows_truncated_output() {
        let mut buffer = OutputBuffer::new(4);
        buffer.push_line("debug noise");
        buffer.push_fault("error: boom");
        assert_eq!(buffer.text, "debu\nerror: boom\n");
    }
}
