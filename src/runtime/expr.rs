//! Expression Evaluator
//!
//! The recursive core: literals, variables, pipe chains, operators,
//! tuple literals (including property-closure marking), calls, and the
//! `error`/`assert` statements. Control constructs and access chains are
//! delegated to their own modules.
//!
//! Recursion is tied off through the boxed [`eval_expression`] entry
//! point; every cycle in the evaluator passes through it.

use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;

use crate::ast::{
    BinaryOp, CallExpr, Callee, Expression, PipeChain, PipeTarget, Span, TupleLiteral, UnaryOp,
};

use super::access;
use super::callable::Callable;
use super::closures::{self, invoke_callable};
use super::context::{EventCategory, RuntimeContext};
use super::control_flow;
use super::errors::{ids, RillError};
use super::host;
use super::interpolation;
use super::signals::{EvalResult, Interrupt};
use super::type_eval;
use super::value::{Value, RESERVED_METHODS};

pub(crate) type EvalFuture<'a> = Pin<Box<dyn Future<Output = EvalResult> + Send + 'a>>;

/// Evaluate an expression. Boxed so the evaluator can recurse.
pub(crate) fn eval_expression<'a>(
    ctx: &'a mut RuntimeContext,
    expr: &'a Expression,
) -> EvalFuture<'a> {
    Box::pin(eval_expression_inner(ctx, expr))
}

/// Read the current pipe value, failing when `$` is not set.
pub(crate) fn require_pipe_value(ctx: &RuntimeContext, span: Span) -> Result<Value, RillError> {
    ctx.pipe_value().cloned().ok_or_else(|| {
        RillError::runtime(ids::UNDEFINED_VARIABLE, "pipe value '$' is not set")
            .at(span)
            .with_context("name", "$")
    })
}

/// Evaluate an expression with `$` temporarily set to `pipe`, restoring
/// the previous pipe value on every exit path.
pub(crate) async fn eval_with_pipe(
    ctx: &mut RuntimeContext,
    pipe: Value,
    expr: &Expression,
) -> EvalResult {
    let saved = ctx.swap_pipe(Some(pipe));
    let result = eval_expression(ctx, expr).await;
    ctx.swap_pipe(saved);
    result
}

async fn eval_expression_inner(ctx: &mut RuntimeContext, expr: &Expression) -> EvalResult {
    match expr {
        Expression::Null(_) => Ok(Value::Null),
        Expression::Bool(b, _) => Ok(Value::Bool(*b)),
        Expression::Number(n, _) => Ok(Value::Number(*n)),
        Expression::StringTemplate(template) => interpolation::eval_template(ctx, template).await,
        Expression::Tuple(tuple) => eval_tuple(ctx, tuple).await,
        Expression::PipeValue(span) => require_pipe_value(ctx, *span).map_err(Into::into),
        Expression::Accumulator(span) => ctx.accumulator().cloned().ok_or_else(|| {
            RillError::runtime(
                ids::UNDEFINED_VARIABLE,
                "accumulator '$@' is only available inside fold or each(init) bodies",
            )
            .at(*span)
            .with_context("name", "$@")
            .into()
        }),
        Expression::Variable { name, span } => ctx
            .get(name)
            .map_err(|e| Interrupt::from(e.at_fallback(*span))),
        Expression::Chain(chain) => eval_chain(ctx, chain).await,
        Expression::Binary { op, left, right, span } => {
            eval_binary(ctx, *op, left, right, *span).await
        }
        Expression::Unary { op, operand, span } => {
            let value = eval_expression(ctx, operand).await?;
            apply_unary_op(*op, value, *span).map_err(Interrupt::from)
        }
        Expression::Postfix(postfix) => access::eval_postfix(ctx, postfix).await,
        Expression::Closure(literal) => Ok(closures::create_closure(ctx, literal, false)),
        Expression::Block(block) => control_flow::eval_block(ctx, block).await,
        Expression::Conditional(cond) => control_flow::eval_conditional(ctx, cond).await,
        Expression::While(w) => control_flow::eval_while(ctx, w).await,
        Expression::DoWhile(w) => control_flow::eval_do_while(ctx, w).await,
        Expression::Iterate(it) => control_flow::eval_iterate(ctx, it).await,
        Expression::Spread(spread) => control_flow::eval_spread(ctx, spread).await,
        Expression::Call(call) => eval_call(ctx, call).await,
        Expression::TypeAssert { value, type_name, span } => {
            type_eval::eval_type_assert(ctx, value.as_deref(), type_name, *span).await
        }
        Expression::TypeCheck { value, type_name, span } => {
            type_eval::eval_type_check(ctx, value.as_deref(), type_name, *span).await
        }
        Expression::Raise { message, span } => {
            let rendered = eval_expression(ctx, message).await?.render();
            Err(RillError::runtime(ids::RUNTIME, rendered)
                .at(*span)
                .with_call_stack(ctx.call_stack_snapshot())
                .into())
        }
        Expression::Assert { condition, span } => {
            let value = eval_expression(ctx, condition).await?;
            if value.is_truthy() {
                Ok(value)
            } else {
                Err(RillError::runtime(ids::ASSERTION, "assertion failed")
                    .at(*span)
                    .with_context("value", value.to_json())
                    .into())
            }
        }
    }
}

// ============================================================================
// Pipe chains
// ============================================================================

/// Evaluate a pipe chain left-to-right. The outer `$` is restored after
/// the chain regardless of how it exits.
async fn eval_chain(ctx: &mut RuntimeContext, chain: &PipeChain) -> EvalResult {
    let saved = ctx.pipe_value().cloned();
    let result = run_chain(ctx, chain).await;
    ctx.swap_pipe(saved);
    result
}

async fn run_chain(ctx: &mut RuntimeContext, chain: &PipeChain) -> EvalResult {
    let mut current = eval_expression(ctx, &chain.head).await?;
    if !chain.segments.is_empty() {
        ctx.sweep_auto_exceptions(&current, chain.head.span())?;
    }
    for segment in &chain.segments {
        ctx.check_aborted(Some(segment.span))?;
        ctx.swap_pipe(Some(current.clone()));
        current = eval_pipe_target(ctx, &segment.target, segment.span, current).await?;
        ctx.sweep_auto_exceptions(&current, segment.span)?;
    }
    Ok(current)
}

async fn eval_pipe_target(
    ctx: &mut RuntimeContext,
    target: &PipeTarget,
    span: Span,
    upstream: Value,
) -> EvalResult {
    match target {
        PipeTarget::Bind { name, span } => {
            ctx.set(name, upstream.clone())
                .map_err(|e| Interrupt::from(e.at_fallback(*span)))?;
            if let Some(cb) = &ctx.callbacks.on_capture {
                cb(name, &upstream);
            }
            ctx.emit_event(
                EventCategory::Capture,
                None,
                serde_json::json!({ "name": name, "type": upstream.type_name() }),
            );
            Ok(upstream)
        }
        PipeTarget::Binding { name, span } => {
            // Variables shadow host functions.
            if ctx.has_variable(name) {
                let value = ctx.get(name).map_err(|e| Interrupt::from(e.at_fallback(*span)))?;
                match value {
                    Value::Callable(callable) => {
                        invoke_callable(
                            ctx,
                            &callable,
                            vec![upstream.clone()],
                            Some(upstream),
                            *span,
                            Some(name.as_str()),
                        )
                        .await
                    }
                    other => Ok(other),
                }
            } else if let Some(func) = ctx.function(name) {
                host::invoke_host(ctx, func, vec![upstream], *span)
                    .await
                    .map_err(Interrupt::from)
            } else {
                Err(RillError::runtime(
                    ids::UNKNOWN_FUNCTION,
                    format!("'{}' is neither a variable nor a registered function", name),
                )
                .at(*span)
                .with_context("name", name.as_str())
                .into())
            }
        }
        PipeTarget::Expr(expr) => {
            // An inline closure literal in pipe position is invoked
            // immediately with the upstream value.
            if let Expression::Closure(literal) = expr {
                let closure = closures::create_closure(ctx, literal, false);
                let Value::Callable(callable) = &closure else {
                    unreachable!("create_closure returns a callable");
                };
                return invoke_callable(
                    ctx,
                    callable,
                    vec![upstream.clone()],
                    Some(upstream),
                    span,
                    None,
                )
                .await;
            }
            eval_expression(ctx, expr).await
        }
    }
}

// ============================================================================
// Tuple literals
// ============================================================================

async fn eval_tuple(ctx: &mut RuntimeContext, tuple: &TupleLiteral) -> EvalResult {
    let is_dict = tuple.explicit_dict || tuple.entries.iter().any(|e| e.key.is_some());

    if !is_dict {
        let mut items = Vec::with_capacity(tuple.entries.len());
        for entry in &tuple.entries {
            items.push(eval_expression(ctx, &entry.value).await?);
        }
        return Ok(Value::List(items));
    }

    let mut dict: IndexMap<String, Value> = IndexMap::new();
    let mut property_fields: Vec<String> = Vec::new();

    for (i, entry) in tuple.entries.iter().enumerate() {
        let key = entry.key.clone().unwrap_or_else(|| i.to_string());
        if RESERVED_METHODS.contains(&key.as_str()) {
            return Err(RillError::runtime(
                ids::RESERVED_METHOD,
                format!("'{}' is a reserved method name and cannot be a dict key", key),
            )
            .at(entry.span)
            .with_context("key", key)
            .into());
        }
        if dict.contains_key(&key) {
            return Err(RillError::runtime(
                ids::DUPLICATE_KEY,
                format!("duplicate dict key '{}'", key),
            )
            .at(entry.span)
            .with_context("key", key)
            .into());
        }
        // Zero-parameter closures declared directly in a dict literal are
        // property-style; they auto-invoke on access.
        let value = match &entry.value {
            Expression::Closure(literal) => {
                let is_property = literal.params.is_empty();
                if is_property {
                    property_fields.push(key.clone());
                }
                closures::create_closure(ctx, literal, is_property)
            }
            other => eval_expression(ctx, other).await?,
        };
        dict.insert(key, value);
    }

    // Record the finished dict on each property closure.
    if !property_fields.is_empty() {
        let snapshot = Value::Dict(dict.clone());
        for key in property_fields {
            if let Some(Value::Callable(Callable::Closure(closure))) = dict.get(&key) {
                let patched = closures::bind_dict(closure, snapshot.clone());
                dict.insert(key, patched);
            }
        }
    }

    Ok(Value::Dict(dict))
}

// ============================================================================
// Calls
// ============================================================================

async fn eval_call(ctx: &mut RuntimeContext, call: &CallExpr) -> EvalResult {
    let mut args = Vec::with_capacity(call.args.len());
    for arg in &call.args {
        args.push(eval_expression(ctx, arg).await?);
    }

    match &call.callee {
        Callee::Named(name) => {
            if let Some(func) = ctx.function(name) {
                return host::invoke_host(ctx, func, args, call.span)
                    .await
                    .map_err(Interrupt::from);
            }
            if ctx.has_variable(name) {
                let value = ctx.get(name).map_err(Interrupt::from)?;
                return invoke_value(ctx, value, args, call.span, name).await;
            }
            Err(RillError::runtime(
                ids::UNKNOWN_FUNCTION,
                format!("no registered function '{}'", name),
            )
            .at(call.span)
            .with_context("name", name.as_str())
            .into())
        }
        Callee::Var(name) => {
            let value = ctx
                .get(name)
                .map_err(|e| Interrupt::from(e.at_fallback(call.span)))?;
            invoke_value(ctx, value, args, call.span, name).await
        }
    }
}

async fn invoke_value(
    ctx: &mut RuntimeContext,
    value: Value,
    args: Vec<Value>,
    span: Span,
    name: &str,
) -> EvalResult {
    match value {
        Value::Callable(callable) => {
            invoke_callable(ctx, &callable, args, None, span, Some(name)).await
        }
        other => Err(RillError::runtime(
            ids::NOT_CALLABLE,
            format!("'{}' is a {}, not a callable", name, other.type_name()),
        )
        .at(span)
        .with_context("actual", other.type_name())
        .into()),
    }
}

// ============================================================================
// Operators
// ============================================================================

async fn eval_binary(
    ctx: &mut RuntimeContext,
    op: BinaryOp,
    left: &Expression,
    right: &Expression,
    span: Span,
) -> EvalResult {
    match op {
        // Short-circuiting operators keep the deciding operand's value.
        BinaryOp::And => {
            let l = eval_expression(ctx, left).await?;
            if l.is_truthy() {
                eval_expression(ctx, right).await
            } else {
                Ok(l)
            }
        }
        BinaryOp::Or => {
            let l = eval_expression(ctx, left).await?;
            if l.is_truthy() {
                Ok(l)
            } else {
                eval_expression(ctx, right).await
            }
        }
        // `??` recovers locally from null, missing-field, and
        // index-out-of-range; everything else propagates.
        BinaryOp::Coalesce => match eval_expression(ctx, left).await {
            Ok(Value::Null) => eval_expression(ctx, right).await,
            Ok(v) => Ok(v),
            Err(Interrupt::Failure(e)) if access::is_recoverable(&e) => {
                eval_expression(ctx, right).await
            }
            Err(other) => Err(other),
        },
        _ => {
            let l = eval_expression(ctx, left).await?;
            let r = eval_expression(ctx, right).await?;
            apply_binary_op(op, l, r, span).map_err(Interrupt::from)
        }
    }
}

/// Apply a non-short-circuiting binary operator.
pub(crate) fn apply_binary_op(
    op: BinaryOp,
    left: Value,
    right: Value,
    span: Span,
) -> Result<Value, RillError> {
    use BinaryOp::*;
    match op {
        Eq => Ok(Value::Bool(left == right)),
        Ne => Ok(Value::Bool(left != right)),
        Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (Value::Dict(mut a), Value::Dict(b)) => {
                for (k, v) in b {
                    a.insert(k, v);
                }
                Ok(Value::Dict(a))
            }
            (l, r) => Err(operand_error(op, &l, &r, span)),
        },
        Sub | Mul | Div | Mod => match (left, right) {
            (Value::Number(a), Value::Number(b)) => match op {
                Sub => Ok(Value::Number(a - b)),
                Mul => Ok(Value::Number(a * b)),
                Div | Mod if b == 0.0 => Err(RillError::runtime(
                    ids::DIVISION_BY_ZERO,
                    "division by zero",
                )
                .at(span)),
                Div => Ok(Value::Number(a / b)),
                Mod => Ok(Value::Number(a % b)),
                _ => unreachable!(),
            },
            (l, r) => Err(operand_error(op, &l, &r, span)),
        },
        Lt | Le | Gt | Ge => {
            let ord = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            match ord {
                Some(ord) => {
                    let result = match op {
                        Lt => ord.is_lt(),
                        Le => ord.is_le(),
                        Gt => ord.is_gt(),
                        Ge => ord.is_ge(),
                        _ => unreachable!(),
                    };
                    Ok(Value::Bool(result))
                }
                None => Err(operand_error(op, &left, &right, span)),
            }
        }
        And | Or | Coalesce => unreachable!("short-circuit operators are handled by eval_binary"),
    }
}

fn apply_unary_op(op: UnaryOp, value: Value, span: Span) -> Result<Value, RillError> {
    match op {
        UnaryOp::Neg => match value {
            Value::Number(n) => Ok(Value::Number(-n)),
            other => Err(RillError::runtime(
                ids::OPERAND_TYPE,
                format!("cannot negate {}", other.type_name()),
            )
            .at(span)),
        },
    }
}

fn operand_error(op: BinaryOp, left: &Value, right: &Value, span: Span) -> RillError {
    RillError::runtime(
        ids::OPERAND_TYPE,
        format!(
            "operator '{}' cannot be applied to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
    )
    .at(span)
    .with_context("operator", op.to_string())
    .with_context("left", left.type_name())
    .with_context("right", right.type_name())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let span = Span::default();
        assert_eq!(
            apply_binary_op(BinaryOp::Add, Value::Number(2.0), Value::Number(3.0), span).unwrap(),
            Value::Number(5.0)
        );
        assert_eq!(
            apply_binary_op(BinaryOp::Mod, Value::Number(7.0), Value::Number(2.0), span).unwrap(),
            Value::Number(1.0)
        );
        assert_eq!(
            apply_binary_op(BinaryOp::Add, Value::string("a"), Value::string("b"), span).unwrap(),
            Value::string("ab")
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err =
            apply_binary_op(BinaryOp::Div, Value::Number(1.0), Value::Number(0.0), Span::default())
                .unwrap_err();
        assert_eq!(err.id, ids::DIVISION_BY_ZERO);
        let err =
            apply_binary_op(BinaryOp::Mod, Value::Number(1.0), Value::Number(0.0), Span::default())
                .unwrap_err();
        assert_eq!(err.id, ids::DIVISION_BY_ZERO);
    }

    #[test]
    fn test_operand_type_error() {
        let err =
            apply_binary_op(BinaryOp::Sub, Value::string("a"), Value::Number(1.0), Span::default())
                .unwrap_err();
        assert_eq!(err.id, ids::OPERAND_TYPE);
        assert_eq!(err.context.get("operator").unwrap(), "-");
    }

    #[test]
    fn test_structural_comparison() {
        let a = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(
            apply_binary_op(BinaryOp::Eq, a, b, Span::default()).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_string_ordering() {
        assert_eq!(
            apply_binary_op(BinaryOp::Lt, Value::string("abc"), Value::string("abd"), Span::default())
                .unwrap(),
            Value::Bool(true)
        );
    }
}
