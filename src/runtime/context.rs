//! Runtime Context
//!
//! Per-execution state owned for the duration of one `execute` call:
//! variables with lock-on-first-assign typing, the scoped pipe value, the
//! host-function registry, observability callbacks, the cooperative abort
//! signal, the call stack, compiled auto-exception patterns, and timeout
//! configuration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Serialize;

use crate::ast::Span;

use super::callable::HostFunction;
use super::errors::{ids, CallFrame, RillError};
use super::value::Value;

/// Default cap on script-level call-stack depth.
pub const DEFAULT_MAX_CALL_STACK_DEPTH: usize = 256;

/// Default loop/iterator iteration limit.
pub const DEFAULT_ITERATION_LIMIT: u64 = 10_000;

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative cancellation handle. Cloning shares the underlying flag;
/// the evaluator polls it at statement starts, pipe-segment boundaries,
/// call entries, and loop iterations.
#[derive(Clone, Debug, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    StepStart,
    StepEnd,
    Capture,
    HostCall,
    FunctionReturn,
    Error,
    Extension,
}

/// A structured observability event with an ISO-8601 timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub category: EventCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsystem: Option<String>,
    pub data: serde_json::Value,
}

type LogFn = Box<dyn Fn(&str) + Send + Sync>;
type LogEventFn = Box<dyn Fn(&LogEvent) + Send + Sync>;
type StepStartFn = Box<dyn Fn(usize, Span) + Send + Sync>;
type StepEndFn = Box<dyn Fn(usize, &Value) + Send + Sync>;
type CaptureFn = Box<dyn Fn(&str, &Value) + Send + Sync>;
type HostCallFn = Box<dyn Fn(&str, &[Value]) + Send + Sync>;
type FunctionReturnFn = Box<dyn Fn(&str, &Value) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&RillError) + Send + Sync>;

/// Optional observer callbacks. All are fire-and-forget.
#[derive(Default)]
pub struct RuntimeCallbacks {
    pub on_log: Option<LogFn>,
    pub on_log_event: Option<LogEventFn>,
    pub on_step_start: Option<StepStartFn>,
    pub on_step_end: Option<StepEndFn>,
    pub on_capture: Option<CaptureFn>,
    pub on_host_call: Option<HostCallFn>,
    pub on_function_return: Option<FunctionReturnFn>,
    pub on_error: Option<ErrorFn>,
}

// ============================================================================
// Extensions
// ============================================================================

/// An extension package: a bundle of host functions plus an optional
/// async dispose hook that runs at context teardown.
#[async_trait]
pub trait Extension: Send + Sync {
    /// The functions this extension contributes, keyed by bare name.
    fn functions(&self) -> HashMap<String, Arc<HostFunction>>;

    /// Teardown hook; the default does nothing.
    async fn dispose(&self) {}
}

/// Return a registry with every key renamed to `ns::name`. A top-level
/// `dispose` hook keeps its unprefixed name.
pub fn prefix_functions(
    ns: &str,
    functions: HashMap<String, Arc<HostFunction>>,
) -> HashMap<String, Arc<HostFunction>> {
    functions
        .into_iter()
        .map(|(name, f)| {
            if name == "dispose" {
                (name, f)
            } else {
                (format!("{}::{}", ns, name), f)
            }
        })
        .collect()
}

// ============================================================================
// Auto-exception patterns
// ============================================================================

/// A compiled auto-exception pattern; the original source is kept for
/// error context.
#[derive(Debug, Clone)]
pub struct AutoExceptionPattern {
    pub source: String,
    regex: Regex,
}

impl AutoExceptionPattern {
    /// Compile a pattern, anchoring it so only full-string matches fire.
    pub fn compile(pattern: &str) -> Result<Self, RillError> {
        let anchored = format!("^(?:{})$", pattern);
        let regex = Regex::new(&anchored).map_err(|e| {
            RillError::runtime(
                ids::INVALID_REGEX,
                format!("invalid auto-exception pattern '{}': {}", pattern, e),
            )
            .with_context("pattern", pattern)
        })?;
        Ok(Self { source: pattern.to_string(), regex })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

// ============================================================================
// Context options
// ============================================================================

/// Options for constructing a [`RuntimeContext`].
#[derive(Default)]
pub struct ContextOptions {
    /// Initial variables; their types are locked immediately.
    pub variables: HashMap<String, Value>,
    /// Host-function registry.
    pub functions: HashMap<String, Arc<HostFunction>>,
    pub callbacks: RuntimeCallbacks,
    pub signal: Option<AbortSignal>,
    /// Default timeout for host calls; per-function timeouts win.
    pub default_timeout: Option<Duration>,
    pub max_call_stack_depth: Option<usize>,
    pub iteration_limit: Option<u64>,
    /// Auto-exception pattern sources, compiled on construction.
    pub auto_exceptions: Vec<String>,
}

// ============================================================================
// Runtime context
// ============================================================================

/// Process-wide per-execution state. Owned exclusively by the evaluator
/// and the host-function bodies it awaits; no other task mutates it.
pub struct RuntimeContext {
    variables: HashMap<String, Value>,
    locked_types: HashMap<String, &'static str>,
    pipe_value: Option<Value>,
    accumulator: Option<Value>,
    functions: HashMap<String, Arc<HostFunction>>,
    pub callbacks: RuntimeCallbacks,
    signal: Option<AbortSignal>,
    call_stack: Vec<CallFrame>,
    auto_exceptions: Vec<AutoExceptionPattern>,
    extensions: Vec<Arc<dyn Extension>>,
    pub max_call_stack_depth: usize,
    pub default_timeout: Option<Duration>,
    pub iteration_limit: u64,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext").finish_non_exhaustive()
    }
}

impl RuntimeContext {
    /// Build a context from options. Fails with `RILL-R-InvalidRegex` if
    /// an auto-exception pattern does not compile.
    pub fn new(options: ContextOptions) -> Result<Self, RillError> {
        let mut auto_exceptions = Vec::with_capacity(options.auto_exceptions.len());
        for pattern in &options.auto_exceptions {
            auto_exceptions.push(AutoExceptionPattern::compile(pattern)?);
        }

        let locked_types = options
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), value.type_name()))
            .collect();

        Ok(Self {
            variables: options.variables,
            locked_types,
            pipe_value: None,
            accumulator: None,
            functions: options.functions,
            callbacks: options.callbacks,
            signal: options.signal,
            call_stack: Vec::new(),
            auto_exceptions,
            extensions: Vec::new(),
            max_call_stack_depth: options
                .max_call_stack_depth
                .unwrap_or(DEFAULT_MAX_CALL_STACK_DEPTH),
            default_timeout: options.default_timeout,
            iteration_limit: options.iteration_limit.unwrap_or(DEFAULT_ITERATION_LIMIT),
        })
    }

    /// Context with no host functions and default limits.
    pub fn empty() -> Self {
        Self::new(ContextOptions::default()).expect("default options are valid")
    }

    // -------------------------------------------------------------------
    // Variables
    // -------------------------------------------------------------------

    /// Read a variable. Fails with `RILL-R-UndefinedVariable` when unset.
    pub fn get(&self, name: &str) -> Result<Value, RillError> {
        self.variables.get(name).cloned().ok_or_else(|| {
            RillError::runtime(
                ids::UNDEFINED_VARIABLE,
                format!("variable '${}' is not defined", name),
            )
            .with_context("name", name)
        })
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    /// Write a variable. The first assignment locks the variable to the
    /// value's type; later assignments of a different type fail with
    /// `RILL-R-TypeMismatch`.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), RillError> {
        let actual = value.type_name();
        match self.locked_types.get(name) {
            Some(expected) if *expected != actual => {
                return Err(RillError::runtime(
                    ids::TYPE_MISMATCH,
                    format!(
                        "variable '${}' is locked to type {}, cannot assign {}",
                        name, expected, actual
                    ),
                )
                .with_context("name", name)
                .with_context("expected", *expected)
                .with_context("actual", actual));
            }
            Some(_) => {}
            None => {
                self.locked_types.insert(name.to_string(), actual);
            }
        }
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    /// Like [`set`](Self::set), but first asserts the value's inferred
    /// type equals the declared one.
    pub fn set_with_type(
        &mut self,
        name: &str,
        value: Value,
        declared: &str,
    ) -> Result<(), RillError> {
        if !super::value::is_known_type(declared) {
            return Err(RillError::runtime(
                ids::UNKNOWN_TYPE,
                format!("unknown type '{}'", declared),
            )
            .with_context("type", declared));
        }
        let actual = value.type_name();
        if actual != declared {
            return Err(RillError::runtime(
                ids::TYPE_ASSERTION,
                format!("expected {} for '${}', got {}", declared, name, actual),
            )
            .with_context("expected", declared)
            .with_context("actual", actual));
        }
        self.set(name, value)
    }

    /// All variables, cloned for the host at the end of execution.
    pub fn variables(&self) -> HashMap<String, Value> {
        self.variables.clone()
    }

    /// Snapshot the lexical environment for closure capture.
    pub(crate) fn snapshot_scope(
        &self,
    ) -> (HashMap<String, Value>, HashMap<String, &'static str>) {
        (self.variables.clone(), self.locked_types.clone())
    }

    /// Replace the variable scope, returning the previous one. Used by
    /// closure invocation to install the captured environment.
    pub(crate) fn swap_scope(
        &mut self,
        variables: HashMap<String, Value>,
        locked_types: HashMap<String, &'static str>,
    ) -> (HashMap<String, Value>, HashMap<String, &'static str>) {
        (
            std::mem::replace(&mut self.variables, variables),
            std::mem::replace(&mut self.locked_types, locked_types),
        )
    }

    // -------------------------------------------------------------------
    // Pipe value & accumulator
    // -------------------------------------------------------------------

    pub fn pipe_value(&self) -> Option<&Value> {
        self.pipe_value.as_ref()
    }

    /// Seed `$` before execution starts — the CLI surfaces positional
    /// arguments to the script this way.
    pub fn set_pipe_value(&mut self, value: Value) {
        self.pipe_value = Some(value);
    }

    /// Swap the pipe slot, returning the previous occupant. Callers
    /// restore the saved value on every exit path.
    pub(crate) fn swap_pipe(&mut self, value: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut self.pipe_value, value)
    }

    pub fn accumulator(&self) -> Option<&Value> {
        self.accumulator.as_ref()
    }

    pub(crate) fn swap_accumulator(&mut self, value: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut self.accumulator, value)
    }

    // -------------------------------------------------------------------
    // Host functions & extensions
    // -------------------------------------------------------------------

    pub fn function(&self, name: &str) -> Option<Arc<HostFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn function_names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    pub fn functions(&self) -> &HashMap<String, Arc<HostFunction>> {
        &self.functions
    }

    pub fn register_function(&mut self, function: HostFunction) {
        self.functions.insert(function.name.clone(), Arc::new(function));
    }

    /// Register an extension under a namespace; its functions become
    /// `ns::name` and its dispose hook runs at [`dispose`](Self::dispose).
    pub fn register_extension(&mut self, ns: &str, extension: Arc<dyn Extension>) {
        let prefixed = prefix_functions(ns, extension.functions());
        self.functions.extend(prefixed);
        self.extensions.push(extension);
    }

    /// Run every extension's dispose hook. Called by the host at
    /// teardown; idempotent because the hooks are drained.
    pub async fn dispose(&mut self) {
        for ext in std::mem::take(&mut self.extensions) {
            ext.dispose().await;
        }
    }

    // -------------------------------------------------------------------
    // Call stack
    // -------------------------------------------------------------------

    /// Push a call frame, failing with `RILL-R-CallStackOverflow` when
    /// the configured depth would be exceeded.
    pub fn push_call_frame(
        &mut self,
        span: Span,
        function_name: Option<String>,
        context: Option<String>,
    ) -> Result<(), RillError> {
        if self.call_stack.len() >= self.max_call_stack_depth {
            return Err(RillError::runtime(
                ids::CALL_STACK_OVERFLOW,
                format!("call stack exceeded {} frames", self.max_call_stack_depth),
            )
            .at(span)
            .with_context("maxDepth", self.max_call_stack_depth as u64)
            .with_call_stack(self.call_stack.clone()));
        }
        self.call_stack.push(CallFrame { span, function_name, context });
        Ok(())
    }

    /// Pop the innermost frame. The runtime keeps push/pop balanced on
    /// all paths, including error unwind.
    pub fn pop_call_frame(&mut self) {
        self.call_stack.pop();
    }

    pub fn call_stack_depth(&self) -> usize {
        self.call_stack.len()
    }

    pub fn call_stack_snapshot(&self) -> Vec<CallFrame> {
        self.call_stack.clone()
    }

    // -------------------------------------------------------------------
    // Cancellation & auto-exceptions
    // -------------------------------------------------------------------

    /// Fail with `RILL-R-Aborted` if the cancellation signal fired.
    pub fn check_aborted(&self, span: Option<Span>) -> Result<(), RillError> {
        match &self.signal {
            Some(signal) if signal.is_aborted() => Err(RillError::aborted(span)),
            _ => Ok(()),
        }
    }

    /// Test a pipe value against the auto-exception patterns. Only
    /// strings are inspected, keeping the sweep cheap.
    pub fn sweep_auto_exceptions(&self, value: &Value, span: Span) -> Result<(), RillError> {
        if let Value::String(s) = value {
            for pattern in &self.auto_exceptions {
                if pattern.matches(s) {
                    return Err(RillError::auto_exception(&pattern.source, s, span));
                }
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Observability
    // -------------------------------------------------------------------

    pub fn log(&self, message: &str) {
        if let Some(cb) = &self.callbacks.on_log {
            cb(message);
        }
    }

    /// Emit a structured event with the current timestamp.
    pub fn emit_event(
        &self,
        category: EventCategory,
        subsystem: Option<&str>,
        data: serde_json::Value,
    ) {
        if let Some(cb) = &self.callbacks.on_log_event {
            let event = LogEvent {
                timestamp: chrono::Utc::now().to_rfc3339(),
                category,
                subsystem: subsystem.map(str::to_string),
                data,
            };
            cb(&event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_undefined_variable() {
        let ctx = RuntimeContext::empty();
        let err = ctx.get("missing").unwrap_err();
        assert_eq!(err.id, ids::UNDEFINED_VARIABLE);
        assert_eq!(err.context.get("name").unwrap(), "missing");
    }

    #[test]
    fn test_type_lock_on_first_assign() {
        let mut ctx = RuntimeContext::empty();
        ctx.set("x", Value::string("a")).unwrap();
        // Same type: fine.
        ctx.set("x", Value::string("b")).unwrap();
        // Different type: locked.
        let err = ctx.set("x", Value::Number(42.0)).unwrap_err();
        assert_eq!(err.id, ids::TYPE_MISMATCH);
        assert_eq!(err.context.get("name").unwrap(), "x");
        assert_eq!(err.context.get("expected").unwrap(), "string");
        assert_eq!(err.context.get("actual").unwrap(), "number");
    }

    #[test]
    fn test_initial_variables_lock_types() {
        let mut options = ContextOptions::default();
        options.variables.insert("n".to_string(), Value::Number(1.0));
        let mut ctx = RuntimeContext::new(options).unwrap();
        assert!(ctx.set("n", Value::string("nope")).is_err());
    }

    #[test]
    fn test_set_with_type() {
        let mut ctx = RuntimeContext::empty();
        ctx.set_with_type("s", Value::string("ok"), "string").unwrap();
        let err = ctx.set_with_type("n", Value::string("no"), "number").unwrap_err();
        assert_eq!(err.id, ids::TYPE_ASSERTION);
        let err = ctx.set_with_type("q", Value::Null, "nonsense").unwrap_err();
        assert_eq!(err.id, ids::UNKNOWN_TYPE);
    }

    #[test]
    fn test_call_stack_overflow() {
        let mut ctx = RuntimeContext::new(ContextOptions {
            max_call_stack_depth: Some(2),
            ..Default::default()
        })
        .unwrap();
        ctx.push_call_frame(Span::default(), Some("a".into()), None).unwrap();
        ctx.push_call_frame(Span::default(), Some("b".into()), None).unwrap();
        let err = ctx
            .push_call_frame(Span::default(), Some("c".into()), None)
            .unwrap_err();
        assert_eq!(err.id, ids::CALL_STACK_OVERFLOW);
        ctx.pop_call_frame();
        ctx.pop_call_frame();
        assert_eq!(ctx.call_stack_depth(), 0);
    }

    #[test]
    fn test_abort_signal() {
        let signal = AbortSignal::new();
        let ctx = RuntimeContext::new(ContextOptions {
            signal: Some(signal.clone()),
            ..Default::default()
        })
        .unwrap();
        assert!(ctx.check_aborted(None).is_ok());
        signal.abort();
        let err = ctx.check_aborted(None).unwrap_err();
        assert_eq!(err.id, ids::ABORTED);
    }

    #[test]
    fn test_auto_exception_full_match_only() {
        let ctx = RuntimeContext::new(ContextOptions {
            auto_exceptions: vec!["ERROR:.*".to_string()],
            ..Default::default()
        })
        .unwrap();
        let span = Span::default();
        assert!(ctx
            .sweep_auto_exceptions(&Value::string("ERROR: disk full"), span)
            .is_err());
        // Partial match does not fire: the pattern is anchored.
        assert!(ctx
            .sweep_auto_exceptions(&Value::string("harmless ERROR: inside"), span)
            .is_ok());
        // Non-strings are never inspected.
        assert!(ctx.sweep_auto_exceptions(&Value::Number(1.0), span).is_ok());
    }

    #[test]
    fn test_invalid_auto_exception_pattern() {
        let err = RuntimeContext::new(ContextOptions {
            auto_exceptions: vec!["(unclosed".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err.id, ids::INVALID_REGEX);
    }

    #[test]
    fn test_prefix_functions_preserves_dispose() {
        use super::super::callable::host_body;
        let mut functions = HashMap::new();
        let body = host_body(|_args| async move { Ok(Value::Null) });
        functions.insert(
            "search".to_string(),
            Arc::new(HostFunction::new("search", vec![], "", "null", body.clone())),
        );
        functions.insert(
            "dispose".to_string(),
            Arc::new(HostFunction::new("dispose", vec![], "", "null", body)),
        );
        let prefixed = prefix_functions("vec", functions);
        assert!(prefixed.contains_key("vec::search"));
        assert!(prefixed.contains_key("dispose"));
        assert!(!prefixed.contains_key("search"));
    }
}
