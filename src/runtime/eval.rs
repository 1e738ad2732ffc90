//! Script Execution
//!
//! The top-level entry points: `execute` runs a whole script against a
//! context, `Stepper` advances one top-level statement at a time. Both
//! emit step start/end events, thread the pipe value between top-level
//! statements, and guarantee the call stack returns to its entry depth.

use std::collections::HashMap;

use crate::ast::{Script, Statement, Terminator};

use super::context::{EventCategory, RuntimeContext};
use super::errors::RillError;
use super::expr::eval_expression;
use super::signals::{EvalResult, Interrupt};
use super::value::Value;

/// Result of a successful execution.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Value of the script's last statement (or of a terminating
    /// break/return).
    pub value: Value,
    /// Final variable bindings.
    pub variables: HashMap<String, Value>,
}

/// Execute a script's top-level statements against a context.
pub async fn execute(script: &Script, ctx: &mut RuntimeContext) -> Result<Execution, RillError> {
    let entry_depth = ctx.call_stack_depth();
    let result = run_statements(ctx, &script.statements).await;
    debug_assert_eq!(ctx.call_stack_depth(), entry_depth, "call stack must stay balanced");

    match result {
        Ok(value) => Ok(Execution { value, variables: ctx.variables() }),
        // A top-level break/return ends the script with its value.
        Err(Interrupt::Break(value)) | Err(Interrupt::Return(value)) => {
            Ok(Execution { value, variables: ctx.variables() })
        }
        Err(Interrupt::Failure(error)) => {
            if let Some(cb) = &ctx.callbacks.on_error {
                cb(&error);
            }
            ctx.emit_event(
                EventCategory::Error,
                None,
                serde_json::json!({ "errorId": error.id, "message": error.message }),
            );
            Err(*error)
        }
    }
}

/// Parse and execute a source string.
pub async fn execute_source(
    source: &str,
    ctx: &mut RuntimeContext,
) -> Result<Execution, RillError> {
    let script = crate::parser::parse(source)?;
    execute(&script, ctx).await
}

async fn run_statements(ctx: &mut RuntimeContext, statements: &[Statement]) -> EvalResult {
    let mut last = Value::Null;
    for (index, statement) in statements.iter().enumerate() {
        ctx.check_aborted(Some(statement.span))?;
        emit_step_start(ctx, index, statement);
        let value = eval_statement(ctx, statement).await?;
        ctx.sweep_auto_exceptions(&value, statement.span)?;
        emit_step_end(ctx, index, &value);
        // The statement's value becomes `$` for the next statement.
        ctx.swap_pipe(Some(value.clone()));
        last = value;
    }
    Ok(last)
}

/// Evaluate one statement: its expression, then its terminator.
pub(crate) async fn eval_statement(ctx: &mut RuntimeContext, statement: &Statement) -> EvalResult {
    ctx.check_aborted(Some(statement.span))?;
    let value = eval_expression(ctx, &statement.expression).await?;
    match &statement.terminator {
        None => Ok(value),
        Some(Terminator::Capture { name, declared_type, span }) => {
            match declared_type {
                Some(declared) => ctx.set_with_type(name, value.clone(), declared),
                None => ctx.set(name, value.clone()),
            }
            .map_err(|e| Interrupt::from(e.at_fallback(*span)))?;
            if let Some(cb) = &ctx.callbacks.on_capture {
                cb(name, &value);
            }
            ctx.emit_event(
                EventCategory::Capture,
                None,
                serde_json::json!({ "name": name, "type": value.type_name() }),
            );
            Ok(value)
        }
        Some(Terminator::Break(_)) => Err(Interrupt::Break(value)),
        Some(Terminator::Return(_)) => Err(Interrupt::Return(value)),
    }
}

fn emit_step_start(ctx: &RuntimeContext, index: usize, statement: &Statement) {
    if let Some(cb) = &ctx.callbacks.on_step_start {
        cb(index, statement.span);
    }
    ctx.emit_event(
        EventCategory::StepStart,
        None,
        serde_json::json!({ "step": index, "line": statement.span.start.line }),
    );
}

fn emit_step_end(ctx: &RuntimeContext, index: usize, value: &Value) {
    if let Some(cb) = &ctx.callbacks.on_step_end {
        cb(index, value);
    }
    ctx.emit_event(
        EventCategory::StepEnd,
        None,
        serde_json::json!({ "step": index, "type": value.type_name() }),
    );
}

// ============================================================================
// Stepper
// ============================================================================

/// Stepping interface: advances one top-level statement per `next` call.
pub struct Stepper {
    script: Script,
    context: RuntimeContext,
    index: usize,
    finished: bool,
}

/// Build a stepping handle over a parsed script.
pub fn create_stepper(script: Script, context: RuntimeContext) -> Stepper {
    Stepper { script, context, index: 0, finished: false }
}

impl Stepper {
    /// Run the next statement. Returns `Ok(None)` once the script is
    /// exhausted (or was ended by break/return).
    pub async fn next(&mut self) -> Result<Option<Value>, RillError> {
        if self.finished || self.index >= self.script.statements.len() {
            return Ok(None);
        }
        let statement = self.script.statements[self.index].clone();
        let index = self.index;

        self.context.check_aborted(Some(statement.span))?;
        emit_step_start(&self.context, index, &statement);

        match eval_statement(&mut self.context, &statement).await {
            Ok(value) => {
                emit_step_end(&self.context, index, &value);
                self.context.swap_pipe(Some(value.clone()));
                self.index += 1;
                Ok(Some(value))
            }
            Err(Interrupt::Break(value)) | Err(Interrupt::Return(value)) => {
                emit_step_end(&self.context, index, &value);
                self.finished = true;
                Ok(Some(value))
            }
            Err(Interrupt::Failure(error)) => {
                if let Some(cb) = &self.context.callbacks.on_error {
                    cb(&error);
                }
                self.finished = true;
                Err(*error)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished || self.index >= self.script.statements.len()
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    /// Tear down the stepper and recover the context.
    pub fn into_context(self) -> RuntimeContext {
        self.context
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::runtime::callable::{host_body, HostFunction, ParamSpec};
    use crate::runtime::context::{AbortSignal, ContextOptions};
    use crate::runtime::errors::ids;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn run(source: &str) -> Result<Execution, RillError> {
        let mut ctx = RuntimeContext::empty();
        execute_source(source, &mut ctx).await
    }

    async fn eval_ok(source: &str) -> Value {
        run(source).await.expect("script should succeed").value
    }

    fn num_list(values: &[f64]) -> Value {
        Value::List(values.iter().map(|n| Value::Number(*n)).collect())
    }

    #[tokio::test]
    async fn test_map_then_fold() {
        let value = eval_ok("[1,2,3] -> map { $ * 2 } -> fold(0) { $@ + $ }").await;
        assert_eq!(value, Value::Number(12.0));
    }

    #[tokio::test]
    async fn test_filter_even() {
        let value = eval_ok("[1,2,3,4,5] -> filter { ($ % 2) == 0 }").await;
        assert_eq!(value, num_list(&[2.0, 4.0]));
    }

    #[tokio::test]
    async fn test_property_auto_invoke_with_dict_bound_pipe() {
        let value = eval_ok(
            "[name:\"tools\", greet: || { \"I am {$.name}\" }] -> $o\n$o.greet",
        )
        .await;
        assert_eq!(value, Value::string("I am tools"));
    }

    #[tokio::test]
    async fn test_type_lock_across_captures() {
        let err = run("\"a\" => $x\n42 => $x").await.unwrap_err();
        assert_eq!(err.id, ids::TYPE_MISMATCH);
        assert_eq!(err.context.get("name").unwrap(), "x");
        assert_eq!(err.context.get("expected").unwrap(), "string");
        assert_eq!(err.context.get("actual").unwrap(), "number");
    }

    #[tokio::test]
    async fn test_negative_index() {
        let value = eval_ok("[1,2,3] -> $arr\n$arr[-1]").await;
        assert_eq!(value, Value::Number(3.0));
    }

    #[tokio::test]
    async fn test_missing_field_default() {
        let value = eval_ok("[name:\"Eve\"] -> $d\n$d.missing ?? \"Anon\"").await;
        assert_eq!(value, Value::string("Anon"));
    }

    #[tokio::test]
    async fn test_iteration_limit_fires() {
        let err = run("0 -> ($ < 20000) @ { $ + 1 }").await.unwrap_err();
        assert_eq!(err.id, ids::ITERATION_LIMIT);
        assert_eq!(err.context.get("limit").unwrap(), 10_000);
    }

    #[tokio::test]
    async fn test_pre_aborted_signal() {
        let signal = AbortSignal::new();
        signal.abort();
        let mut ctx = RuntimeContext::new(ContextOptions {
            signal: Some(signal),
            ..Default::default()
        })
        .unwrap();
        let err = execute_source("1 + 1", &mut ctx).await.unwrap_err();
        assert_eq!(err.id, ids::ABORTED);
        assert!(err.call_stack.is_empty());
    }

    #[tokio::test]
    async fn test_call_stack_balanced_after_success_and_error() {
        let mut ctx = RuntimeContext::empty();
        execute_source("|x| ($x + 1) => $f\n$f(1)", &mut ctx).await.unwrap();
        assert_eq!(ctx.call_stack_depth(), 0);

        let mut ctx = RuntimeContext::empty();
        let _ = execute_source("|x| { $missing } => $f\n$f(1)", &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(ctx.call_stack_depth(), 0);
    }

    #[tokio::test]
    async fn test_while_zero_iterations_returns_input() {
        let value = eval_ok("5 -> ($ > 10) @ { $ + 1 }").await;
        assert_eq!(value, Value::Number(5.0));
    }

    #[tokio::test]
    async fn test_do_while_runs_body_first() {
        let value = eval_ok("0 -> @ { $ + 1 } ? ($ < 3)").await;
        assert_eq!(value, Value::Number(3.0));
    }

    #[tokio::test]
    async fn test_each_over_string_preserves_order() {
        let value = eval_ok("\"abc\" -> each { $.upper }").await;
        assert_eq!(
            value,
            Value::List(vec![Value::string("A"), Value::string("B"), Value::string("C")])
        );
    }

    #[tokio::test]
    async fn test_each_with_accumulator() {
        let value = eval_ok("[1,2,3] -> each(0) { $@ + $ }").await;
        assert_eq!(value, num_list(&[1.0, 3.0, 6.0]));
    }

    #[tokio::test]
    async fn test_dict_iteration_yields_pairs() {
        let value = eval_ok("[a:1, b:2] -> map { $[1] }").await;
        assert_eq!(value, num_list(&[1.0, 2.0]));
        let value = eval_ok("[a:1, b:2] -> map { $[0] }").await;
        assert_eq!(value, Value::List(vec![Value::string("a"), Value::string("b")]));
    }

    #[tokio::test]
    async fn test_sequential_spread() {
        let value = eval_ok("|x| ($x + 1) => $inc\n|x| ($x * 2) => $dbl\n5 -> @[$inc, $dbl]").await;
        assert_eq!(value, Value::Number(12.0));
    }

    #[tokio::test]
    async fn test_closure_pipe_binding_idiom() {
        // `$` inside a pipe-invoked closure is the pipe value, `$x` the
        // first argument; both are 5 here.
        let value = eval_ok("5 -> |x| ( $x * $ )").await;
        assert_eq!(value, Value::Number(25.0));
    }

    #[tokio::test]
    async fn test_closure_captures_are_immutable() {
        let value = eval_ok("1 => $a\n|| { $a } => $f\n2 => $a\n$f()").await;
        assert_eq!(value, Value::Number(1.0));
    }

    #[tokio::test]
    async fn test_conditional_branches() {
        assert_eq!(eval_ok("5 -> ($ > 3) ? \"big\" ! \"small\"").await, Value::string("big"));
        assert_eq!(eval_ok("2 -> ($ > 3) ? \"big\" ! \"small\"").await, Value::string("small"));
        // Bare conditional tests the pipe value.
        assert_eq!(eval_ok("5 -> ? \"yes\" ! \"no\"").await, Value::string("yes"));
        assert_eq!(eval_ok("0 -> ? \"yes\" ! \"no\"").await, Value::string("no"));
        // Missing else yields null.
        assert_eq!(eval_ok("0 -> ? \"yes\"").await, Value::Null);
    }

    #[tokio::test]
    async fn test_else_if_chain() {
        let script = "($n > 0) ? \"pos\" ! ($n < 0) ? \"neg\" ! \"zero\"";
        for (input, expected) in [(1.0, "pos"), (-1.0, "neg"), (0.0, "zero")] {
            let mut ctx = RuntimeContext::empty();
            ctx.set("n", Value::Number(input)).unwrap();
            let out = execute_source(script, &mut ctx).await.unwrap().value;
            assert_eq!(out, Value::string(expected));
        }
    }

    #[tokio::test]
    async fn test_break_in_each_contributes_value() {
        let value = eval_ok("[1,2,3,4] -> each { ($ == 3) ? { 99 -> break } ! $ }").await;
        assert_eq!(value, num_list(&[1.0, 2.0, 99.0]));
    }

    #[tokio::test]
    async fn test_break_in_fold_returns_accumulator() {
        let value = eval_ok("[1,2,3,4] -> fold(0) { ($ == 3) ? { 0 -> break } ! ($@ + $) }").await;
        assert_eq!(value, Value::Number(3.0));
    }

    #[tokio::test]
    async fn test_return_unwinds_to_closure() {
        let source = "|x| { ($x > 2) ? { \"big\" -> return } ! null\n\"small\" } => $f\n$f(5)";
        assert_eq!(eval_ok(source).await, Value::string("big"));
        let source = "|x| { ($x > 2) ? { \"big\" -> return } ! null\n\"small\" } => $f\n$f(1)";
        assert_eq!(eval_ok(source).await, Value::string("small"));
    }

    #[tokio::test]
    async fn test_string_interpolation() {
        assert_eq!(eval_ok("\"2+2={2 + 2}!\"").await, Value::string("2+2=4!"));
        assert_eq!(eval_ok("\"{{literal}}\"").await, Value::string("{literal}"));
        assert_eq!(
            eval_ok("[name:\"Eve\"] -> \"hello {$.name}\"").await,
            Value::string("hello Eve")
        );
    }

    #[tokio::test]
    async fn test_type_assert_and_check() {
        assert_eq!(eval_ok("42:number").await, Value::Number(42.0));
        assert_eq!(eval_ok("42:?string").await, Value::Bool(false));
        assert_eq!(eval_ok("\"x\":?string").await, Value::Bool(true));
        let err = run("\"x\":number").await.unwrap_err();
        assert_eq!(err.id, ids::TYPE_ASSERTION);
        assert_eq!(err.context.get("expected").unwrap(), "number");
        assert_eq!(err.context.get("actual").unwrap(), "string");
        // Bare form applies to the pipe value.
        assert_eq!(eval_ok("42 -> :number").await, Value::Number(42.0));
        assert_eq!(eval_ok("42 -> :?number").await, Value::Bool(true));
    }

    #[tokio::test]
    async fn test_existence_checks() {
        let setup = "[name:\"Eve\", meta:[age:30]] -> $d\n";
        assert_eq!(eval_ok(&format!("{}$d.?name", setup)).await, Value::Bool(true));
        assert_eq!(eval_ok(&format!("{}$d.?nope", setup)).await, Value::Bool(false));
        assert_eq!(eval_ok(&format!("{}$d.?meta.age", setup)).await, Value::Bool(true));
        assert_eq!(eval_ok(&format!("{}$d.?meta.nope", setup)).await, Value::Bool(false));
        assert_eq!(eval_ok(&format!("{}$d.?name&string", setup)).await, Value::Bool(true));
        assert_eq!(eval_ok(&format!("{}$d.?name&number", setup)).await, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_alternatives_access() {
        let value = eval_ok("[title:\"Dr\"] -> $d\n$d.(nick || title)").await;
        assert_eq!(value, Value::string("Dr"));
        let value = eval_ok("[:] -> $d\n$d.(nick || title) ?? \"none\"").await;
        assert_eq!(value, Value::string("none"));
    }

    #[tokio::test]
    async fn test_variable_and_computed_keys() {
        let value = eval_ok("\"name\" => $k\n[name:\"Eve\"] -> $d\n$d.$k").await;
        assert_eq!(value, Value::string("Eve"));
        let value = eval_ok("[name:\"Eve\"] -> $d\n$d.(\"na\" + \"me\")").await;
        assert_eq!(value, Value::string("Eve"));
    }

    #[tokio::test]
    async fn test_reserved_dict_keys_rejected() {
        let err = run("[keys: 1]").await.unwrap_err();
        assert_eq!(err.id, ids::RESERVED_METHOD);
        let err = run("[a: 1, a: 2]").await.unwrap_err();
        assert_eq!(err.id, ids::DUPLICATE_KEY);
    }

    #[tokio::test]
    async fn test_error_statement() {
        let err = run("\"boom\" => $m\nerror \"failed: {$m}\"").await.unwrap_err();
        assert_eq!(err.id, ids::RUNTIME);
        assert_eq!(err.message, "failed: boom");
    }

    #[tokio::test]
    async fn test_assert_statement() {
        assert_eq!(eval_ok("assert 1 == 1").await, Value::Bool(true));
        let err = run("assert 1 == 2").await.unwrap_err();
        assert_eq!(err.id, ids::ASSERTION);
    }

    #[tokio::test]
    async fn test_host_function_in_pipe_and_call() {
        let mut options = ContextOptions::default();
        options.functions.insert(
            "double".to_string(),
            Arc::new(HostFunction::new(
                "double",
                vec![ParamSpec::new("n", "number")],
                "Doubles a number",
                "number",
                host_body(|args| async move {
                    match &args[0] {
                        Value::Number(n) => Ok(Value::Number(n * 2.0)),
                        _ => unreachable!("declared type enforced"),
                    }
                }),
            )),
        );
        let mut ctx = RuntimeContext::new(options).unwrap();
        let out = execute_source("5 -> double", &mut ctx).await.unwrap().value;
        assert_eq!(out, Value::Number(10.0));
        let out = execute_source("double(21)", &mut ctx).await.unwrap().value;
        assert_eq!(out, Value::Number(42.0));
    }

    #[tokio::test]
    async fn test_auto_exception_on_string_pipe_value() {
        let mut ctx = RuntimeContext::new(ContextOptions {
            auto_exceptions: vec!["ERROR:.*".to_string()],
            ..Default::default()
        })
        .unwrap();
        let err = execute_source("\"ERROR: disk full\"", &mut ctx).await.unwrap_err();
        assert_eq!(err.id, ids::AUTO_EXCEPTION);
        assert_eq!(err.context.get("pattern").unwrap(), "ERROR:.*");
        assert_eq!(err.context.get("matchedValue").unwrap(), "ERROR: disk full");
    }

    #[tokio::test]
    async fn test_auto_exception_in_iterator_bodies() {
        let mut ctx = RuntimeContext::new(ContextOptions {
            auto_exceptions: vec!["ERROR:.*".to_string()],
            ..Default::default()
        })
        .unwrap();
        // A closure body: only the iterator boundary sweeps its result.
        let err = execute_source("[\"ERROR: boom\"] -> each |s| ($s.upper)", &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.id, ids::AUTO_EXCEPTION);
        assert_eq!(err.context.get("matchedValue").unwrap(), "ERROR: BOOM");

        // map/fold body results are swept the same way.
        let mut ctx = RuntimeContext::new(ContextOptions {
            auto_exceptions: vec!["ERROR:.*".to_string()],
            ..Default::default()
        })
        .unwrap();
        let err = execute_source("[\"boom\"] -> map { \"ERROR: \" + $ }", &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.id, ids::AUTO_EXCEPTION);
        assert_eq!(err.context.get("matchedValue").unwrap(), "ERROR: boom");
    }

    #[tokio::test]
    async fn test_closure_extra_arguments() {
        // A zero-parameter closure rejects explicit-call arguments.
        let err = run("|| { 1 } => $f\n$f(1)").await.unwrap_err();
        assert_eq!(err.id, ids::EXTRA_ARGUMENT);
        // A trailing (untyped) parameter absorbs extras.
        let value = eval_ok("|x| ($x) => $g\n$g(1, 2, 3)").await;
        assert_eq!(value, Value::Number(1.0));
        // Pipe position still works for zero-parameter closures.
        let value = eval_ok("1 -> || { 5 }").await;
        assert_eq!(value, Value::Number(5.0));
    }

    #[tokio::test]
    async fn test_pipe_chain_order_and_outer_pipe_restored() {
        let mut ctx = RuntimeContext::empty();
        let out = execute_source("\"seed\" => $s\n[1,2] -> .len -> ($ + 1)", &mut ctx)
            .await
            .unwrap()
            .value;
        assert_eq!(out, Value::Number(3.0));
    }

    #[tokio::test]
    async fn test_methods_in_pipe_position() {
        assert_eq!(eval_ok("\" hi \" -> .trim -> .upper").await, Value::string("HI"));
        assert_eq!(eval_ok("\"a,b,c\" -> .split(\",\") -> .len").await, Value::Number(3.0));
    }

    #[tokio::test]
    async fn test_top_level_return_ends_script() {
        let value = eval_ok("1 -> return\n\"unreachable\"").await;
        assert_eq!(value, Value::Number(1.0));
    }

    #[tokio::test]
    async fn test_execution_reports_variables() {
        let exec = run("1 => $a\n\"x\" => $b").await.unwrap();
        assert_eq!(exec.variables.get("a").unwrap(), &Value::Number(1.0));
        assert_eq!(exec.variables.get("b").unwrap(), &Value::string("x"));
    }

    #[tokio::test]
    async fn test_capture_with_declared_type() {
        assert_eq!(eval_ok("42 => $n:number").await, Value::Number(42.0));
        let err = run("42 => $n:string").await.unwrap_err();
        assert_eq!(err.id, ids::TYPE_ASSERTION);
    }

    #[tokio::test]
    async fn test_stepper_advances_statement_at_a_time() {
        let starts = Arc::new(AtomicUsize::new(0));
        let starts_cb = starts.clone();
        let mut options = ContextOptions::default();
        options.callbacks.on_step_start = Some(Box::new(move |_, _| {
            starts_cb.fetch_add(1, Ordering::SeqCst);
        }));
        let ctx = RuntimeContext::new(options).unwrap();

        let script = parse("1 => $a\n$a + 1").unwrap();
        let mut stepper = create_stepper(script, ctx);

        assert_eq!(stepper.next().await.unwrap(), Some(Value::Number(1.0)));
        assert!(!stepper.is_finished());
        assert_eq!(stepper.next().await.unwrap(), Some(Value::Number(2.0)));
        assert_eq!(stepper.next().await.unwrap(), None);
        assert!(stepper.is_finished());
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stack_frames_attached_to_nested_errors() {
        let source = "|| { error \"inner\" } => $f\n|| { $f() } => $g\n$g()";
        let err = run(source).await.unwrap_err();
        assert_eq!(err.id, ids::RUNTIME);
        assert_eq!(err.call_stack.len(), 2);
        assert_eq!(err.call_stack[0].function_name.as_deref(), Some("g"));
        assert_eq!(err.call_stack[1].function_name.as_deref(), Some("f"));
    }

    #[tokio::test]
    async fn test_property_round_trip_for_plain_fields() {
        let value = eval_ok("[k:\"v\"] -> $d\n$d.k == \"v\"").await;
        assert_eq!(value, Value::Bool(true));
        let value = eval_ok("[k:\"v\"] -> $d\n$d[\"k\"] == \"v\"").await;
        assert_eq!(value, Value::Bool(true));
    }

    #[tokio::test]
    async fn test_parameter_defaults() {
        let value = eval_ok("|x, y = 10| ($x + $y) => $f\n$f(1)").await;
        assert_eq!(value, Value::Number(11.0));
        let value = eval_ok("|x, y = 10| ($x + $y) => $f\n$f(1, 2)").await;
        assert_eq!(value, Value::Number(3.0));
        let err = run("|x| ($x) => $f\n$f()").await.unwrap_err();
        assert_eq!(err.id, ids::MISSING_ARGUMENT);
        assert_eq!(err.context.get("param").unwrap(), "x");
    }

    #[tokio::test]
    async fn test_empty_dict_literal() {
        let value = eval_ok("[:]").await;
        assert_eq!(value, Value::Dict(indexmap::IndexMap::new()));
        // Empty brackets are an empty list.
        let value = eval_ok("[]").await;
        assert_eq!(value, Value::List(vec![]));
    }

    #[tokio::test]
    async fn test_mixed_tuple_uses_index_keys() {
        let value = eval_ok("[\"a\", label:\"b\"] -> $d\n$d[0]").await;
        assert_eq!(value, Value::string("a"));
    }

    #[tokio::test]
    async fn test_coalesce_keeps_present_values() {
        assert_eq!(eval_ok("[name:\"Eve\"] -> $d\n$d.name ?? \"Anon\"").await, Value::string("Eve"));
        assert_eq!(eval_ok("null ?? \"fallback\"").await, Value::string("fallback"));
        assert_eq!(eval_ok("false ?? \"fallback\"").await, Value::Bool(false));
        // Out-of-range indexing is recoverable too.
        assert_eq!(eval_ok("[1] -> $l\n$l[9] ?? 0").await, Value::Number(0.0));
        // Other failures are not swallowed.
        let err = run("$nope ?? 1").await.unwrap_err();
        assert_eq!(err.id, ids::UNDEFINED_VARIABLE);
    }
}
