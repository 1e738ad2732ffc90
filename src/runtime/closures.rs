//! Closure Machinery
//!
//! Closure construction (environment snapshot, property marking inside
//! dict literals) and the shared invocation path implementing the
//! `$`-binding policy: a property closure binds `$` to its owning dict,
//! a pipe-target invocation binds `$` to the upstream value, and an
//! explicit call binds `$` to the first argument.

use std::sync::Arc;

use crate::ast::{ClosureLiteral, Span};

use super::callable::{Callable, ClosureValue};
use super::context::{EventCategory, RuntimeContext};
use super::errors::{ids, RillError};
use super::expr::eval_expression;
use super::host;
use super::methods;
use super::signals::{EvalResult, Interrupt};
use super::value::Value;

/// Evaluate a closure literal: snapshot the lexical environment and build
/// the callable value. `is_property` is true only when the literal is a
/// zero-parameter direct field value of a dict literal.
pub(crate) fn create_closure(
    ctx: &RuntimeContext,
    literal: &ClosureLiteral,
    is_property: bool,
) -> Value {
    let (captured, captured_types) = ctx.snapshot_scope();
    Value::Callable(Callable::Closure(Arc::new(ClosureValue {
        params: literal.params.clone(),
        body: (*literal.body).clone(),
        captured,
        captured_types,
        bound_dict: None,
        is_property,
        span: literal.span,
    })))
}

/// Rebuild a property closure with its owning dict recorded. Called once
/// the enclosing dict literal is fully evaluated.
pub(crate) fn bind_dict(closure: &ClosureValue, dict: Value) -> Value {
    Value::Callable(Callable::Closure(Arc::new(ClosureValue {
        params: closure.params.clone(),
        body: closure.body.clone(),
        captured: closure.captured.clone(),
        captured_types: closure.captured_types.clone(),
        bound_dict: Some(dict),
        is_property: closure.is_property,
        span: closure.span,
    })))
}

/// Invoke any callable with positional args and an optional pipe binding.
pub(crate) async fn invoke_callable(
    ctx: &mut RuntimeContext,
    callable: &Callable,
    args: Vec<Value>,
    pipe: Option<Value>,
    span: Span,
    name: Option<&str>,
) -> EvalResult {
    match callable {
        Callable::Closure(c) => invoke_closure(ctx, c, args, pipe, span, name).await,
        Callable::Host(h) => host::invoke_host(ctx, h.clone(), args, span)
            .await
            .map_err(Interrupt::from),
        Callable::Builtin(m) => {
            // Pipe position: the upstream value is the receiver. Explicit
            // call: the first argument is.
            let (receiver, rest) = match pipe {
                Some(p) => (p, args),
                None => {
                    let mut iter = args.into_iter();
                    let receiver = iter.next().ok_or_else(|| {
                        RillError::runtime(
                            ids::MISSING_ARGUMENT,
                            format!("method '{}' requires a receiver", m.name),
                        )
                        .at(span)
                        .with_context("param", "receiver")
                    })?;
                    (receiver, iter.collect())
                }
            };
            methods::apply(m, &receiver, &rest, span).map_err(Interrupt::from)
        }
    }
}

/// Invoke a script closure per the callable protocol: abort check, call
/// frame, `$` binding, captured-environment installation, parameter
/// overlay, body evaluation, `return` unwrapping. Push/pop stays balanced
/// on every path.
pub(crate) async fn invoke_closure(
    ctx: &mut RuntimeContext,
    closure: &ClosureValue,
    args: Vec<Value>,
    pipe: Option<Value>,
    span: Span,
    name: Option<&str>,
) -> EvalResult {
    ctx.check_aborted(Some(span))?;
    ctx.push_call_frame(span, name.map(str::to_string), None)?;

    let result = run_closure_body(ctx, closure, args, pipe, span).await;

    let result = match result {
        Err(Interrupt::Failure(mut e)) => {
            if e.call_stack.is_empty() {
                e.call_stack = ctx.call_stack_snapshot();
            }
            Err(Interrupt::Failure(e))
        }
        // A `return` unwinds exactly to the closure boundary.
        Err(Interrupt::Return(v)) => Ok(v),
        other => other,
    };

    if let Ok(value) = &result {
        if let Some(cb) = &ctx.callbacks.on_function_return {
            cb(name.unwrap_or("closure"), value);
        }
        ctx.emit_event(
            EventCategory::FunctionReturn,
            None,
            serde_json::json!({ "function": name.unwrap_or("closure"), "type": value.type_name() }),
        );
    }

    ctx.pop_call_frame();
    result
}

/// Body of the invocation: installs scope and pipe, binds parameters,
/// evaluates, and restores state on every path.
async fn run_closure_body(
    ctx: &mut RuntimeContext,
    closure: &ClosureValue,
    args: Vec<Value>,
    pipe: Option<Value>,
    span: Span,
) -> EvalResult {
    // Script parameters are untyped, so a trailing parameter absorbs
    // extra positional args the way an `any`-typed host parameter does.
    // A zero-parameter closure has no trailing parameter to absorb them;
    // pipe-position invocations are exempt because the upstream value
    // rides in the argument slot and is consumed by the `$` binding.
    if pipe.is_none() && closure.params.is_empty() && !args.is_empty() {
        return Err(RillError::runtime(
            ids::EXTRA_ARGUMENT,
            format!("closure takes no parameters, got {} argument(s)", args.len()),
        )
        .at(span)
        .with_context("expected", 0u64)
        .with_context("actual", args.len() as u64)
        .into());
    }

    // $-binding policy (dict-bound wins, then pipe, then first argument).
    let dollar = if closure.is_property && closure.bound_dict.is_some() {
        closure.bound_dict.clone()
    } else if pipe.is_some() {
        pipe
    } else {
        args.first().cloned()
    };

    let (saved_vars, saved_types) =
        ctx.swap_scope(closure.captured.clone(), closure.captured_types.clone());
    let saved_pipe = ctx.swap_pipe(dollar);

    let result = bind_params_and_eval(ctx, closure, args, span).await;

    ctx.swap_pipe(saved_pipe);
    ctx.swap_scope(saved_vars, saved_types);
    result
}

async fn bind_params_and_eval(
    ctx: &mut RuntimeContext,
    closure: &ClosureValue,
    args: Vec<Value>,
    span: Span,
) -> EvalResult {
    for (i, param) in closure.params.iter().enumerate() {
        let value = match args.get(i) {
            Some(v) => v.clone(),
            None => match &param.default {
                Some(default) => eval_expression(ctx, default).await?,
                None => {
                    return Err(RillError::runtime(
                        ids::MISSING_ARGUMENT,
                        format!("missing argument '{}'", param.name),
                    )
                    .at(span)
                    .with_context("param", param.name.as_str())
                    .into());
                }
            },
        };
        ctx.set(&param.name, value)
            .map_err(|e| Interrupt::from(e.at_fallback(param.span)))?;
    }
    eval_expression(ctx, &closure.body).await
}
