//! Property Access
//!
//! Access-chain evaluation: fields, numeric/negative indices, variable
//! and computed keys, alternatives, existence checks, and property-style
//! auto-invocation of zero-parameter dict closures.
//!
//! Missing-field and index-out-of-range failures are the recoverable
//! conditions that `??` may convert locally; they are identified by
//! their error IDs.

use crate::ast::{Access, PostfixExpr, Span};

use super::callable::Callable;
use super::closures::{invoke_callable, invoke_closure};
use super::context::RuntimeContext;
use super::errors::{ids, RillError};
use super::expr::eval_expression;
use super::methods;
use super::signals::{EvalResult, Interrupt};
use super::value::{Value, RESERVED_METHODS};

/// True for the failures `??` recovers from.
pub(crate) fn is_recoverable(err: &RillError) -> bool {
    err.id == ids::MISSING_FIELD || err.id == ids::INDEX_OUT_OF_RANGE
}

/// Evaluate a postfix expression: the base, then each access step
/// left-to-right.
pub(crate) async fn eval_postfix(ctx: &mut RuntimeContext, postfix: &PostfixExpr) -> EvalResult {
    let mut current = eval_expression(ctx, &postfix.base).await?;
    for access in &postfix.accesses {
        current = apply_access(ctx, current, access).await?;
    }
    Ok(current)
}

/// Apply a single access step to a value.
pub(crate) async fn apply_access(
    ctx: &mut RuntimeContext,
    value: Value,
    access: &Access,
) -> EvalResult {
    match access {
        Access::Field { name, span } => read_member(ctx, value, name, *span).await,
        Access::Method { name, args, span } => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(eval_expression(ctx, arg).await?);
            }
            invoke_member(ctx, value, name, evaluated, *span).await
        }
        Access::Index { index, span } => {
            let key = eval_expression(ctx, index).await?;
            index_value(ctx, value, key, *span).await
        }
        Access::VarKey { name, span } => {
            let key = ctx.get(name).map_err(|e| Interrupt::from(e.at_fallback(*span)))?;
            match key {
                Value::String(_) | Value::Number(_) => index_value(ctx, value, key, *span).await,
                other => Err(RillError::runtime(
                    ids::OPERAND_TYPE,
                    format!(
                        "key variable '${}' must be a string or number, got {}",
                        name,
                        other.type_name()
                    ),
                )
                .at(*span)
                .into()),
            }
        }
        Access::Computed { expr, span } => {
            let key = eval_expression(ctx, expr).await?;
            index_value(ctx, value, key, *span).await
        }
        Access::Alternatives { keys, span } => read_alternatives(ctx, value, keys, *span).await,
        Access::Exists { path, type_name, span } => {
            Ok(Value::Bool(check_exists(&value, path, type_name.as_deref(), *span)))
        }
    }
}

/// `.field` on a dict reads the field (auto-invoking property closures);
/// on any receiver a builtin method of that type may answer instead.
async fn read_member(
    ctx: &mut RuntimeContext,
    value: Value,
    name: &str,
    span: Span,
) -> EvalResult {
    if let Value::Dict(entries) = &value {
        if RESERVED_METHODS.contains(&name) {
            let method = methods::lookup("dict", name).expect("reserved methods are builtins");
            return methods::apply(method, &value, &[], span).map_err(Interrupt::from);
        }
        if let Some(field) = entries.get(name) {
            let field = field.clone();
            return auto_invoke(ctx, field, &value, name, span).await;
        }
        if let Some(method) = methods::lookup("dict", name) {
            return methods::apply(method, &value, &[], span).map_err(Interrupt::from);
        }
        return Err(missing_field(name, span).into());
    }

    match methods::lookup(value.type_name(), name) {
        Some(method) => methods::apply(method, &value, &[], span).map_err(Interrupt::from),
        None => Err(RillError::runtime(
            ids::UNKNOWN_METHOD,
            format!("type {} has no method '{}'", value.type_name(), name),
        )
        .at(span)
        .with_context("method", name)
        .with_context("receiver", value.type_name())
        .into()),
    }
}

/// `.name(args)` — a dict field holding a callable is invoked explicitly;
/// otherwise a builtin method of the receiver type.
async fn invoke_member(
    ctx: &mut RuntimeContext,
    value: Value,
    name: &str,
    args: Vec<Value>,
    span: Span,
) -> EvalResult {
    if let Value::Dict(entries) = &value {
        if !RESERVED_METHODS.contains(&name) {
            if let Some(field) = entries.get(name) {
                return match field.clone() {
                    Value::Callable(callable) => {
                        invoke_callable(ctx, &callable, args, None, span, Some(name)).await
                    }
                    other => Err(RillError::runtime(
                        ids::NOT_CALLABLE,
                        format!("field '{}' is a {}, not a callable", name, other.type_name()),
                    )
                    .at(span)
                    .into()),
                };
            }
        }
    }

    match methods::lookup(value.type_name(), name) {
        Some(method) => methods::apply(method, &value, &args, span).map_err(Interrupt::from),
        None => Err(RillError::runtime(
            ids::UNKNOWN_METHOD,
            format!("type {} has no method '{}'", value.type_name(), name),
        )
        .at(span)
        .with_context("method", name)
        .with_context("receiver", value.type_name())
        .into()),
    }
}

/// Auto-invoke property-style closures on field access: a zero-parameter
/// closure declared in a dict literal runs with `$` bound to its dict.
/// Parameterised closures are returned as values.
async fn auto_invoke(
    ctx: &mut RuntimeContext,
    field: Value,
    receiver: &Value,
    name: &str,
    span: Span,
) -> EvalResult {
    match &field {
        Value::Callable(Callable::Closure(closure)) if closure.is_property => {
            if closure.bound_dict.is_some() {
                return invoke_closure(ctx, closure, Vec::new(), None, span, Some(name)).await;
            }
            // Inner copies (a dict snapshot referenced from a bound dict)
            // lose their binding; the receiver takes its place.
            let rebound = super::closures::bind_dict(closure, receiver.clone());
            let Value::Callable(Callable::Closure(rebound)) = &rebound else {
                unreachable!("bind_dict returns a closure");
            };
            invoke_closure(ctx, rebound, Vec::new(), None, span, Some(name)).await
        }
        _ => Ok(field),
    }
}

/// `[expr]`, `.$var`, `.(expr)` — index a list by number (negative wraps
/// from the end), a dict by string or numeric key, or a string by
/// character position.
async fn index_value(
    ctx: &mut RuntimeContext,
    value: Value,
    key: Value,
    span: Span,
) -> EvalResult {
    match (&value, &key) {
        (Value::List(items), Value::Number(n)) => {
            match resolve_index(*n, items.len()) {
                Some(i) => Ok(items[i].clone()),
                None => Err(out_of_range(*n, items.len(), span).into()),
            }
        }
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            match resolve_index(*n, chars.len()) {
                Some(i) => Ok(Value::String(chars[i].to_string())),
                None => Err(out_of_range(*n, chars.len(), span).into()),
            }
        }
        (Value::Dict(entries), Value::String(k)) => match entries.get(k) {
            Some(field) => {
                let field = field.clone();
                auto_invoke(ctx, field, &value, k, span).await
            }
            None => Err(missing_field(k, span).into()),
        },
        (Value::Dict(entries), Value::Number(n)) => {
            let k = super::value::format_number(*n);
            match entries.get(&k) {
                Some(field) => {
                    let field = field.clone();
                    auto_invoke(ctx, field, &value, &k, span).await
                }
                None => Err(missing_field(&k, span).into()),
            }
        }
        _ => Err(RillError::runtime(
            ids::OPERAND_TYPE,
            format!(
                "cannot index {} with {}",
                value.type_name(),
                key.type_name()
            ),
        )
        .at(span)
        .into()),
    }
}

/// `.(a || b || ...)` — return the first present field.
async fn read_alternatives(
    ctx: &mut RuntimeContext,
    value: Value,
    keys: &[String],
    span: Span,
) -> EvalResult {
    let Value::Dict(entries) = &value else {
        return Err(RillError::runtime(
            ids::OPERAND_TYPE,
            format!("alternatives access requires a dict, got {}", value.type_name()),
        )
        .at(span)
        .into());
    };
    for key in keys {
        if let Some(field) = entries.get(key) {
            let field = field.clone();
            return auto_invoke(ctx, field, &value, key, span).await;
        }
    }
    Err(RillError::runtime(
        ids::MISSING_FIELD,
        format!("none of the fields '{}' are present", keys.join("', '")),
    )
    .at(span)
    .with_context("fields", serde_json::json!(keys))
    .into())
}

/// `.?a.b` — true iff every path segment is a present, non-null dict
/// field; short-circuits to false on the first missing segment. With
/// `&T`, the final value must also have the given type.
fn check_exists(value: &Value, path: &[String], type_name: Option<&str>, _span: Span) -> bool {
    let mut current = value;
    for segment in path {
        match current {
            Value::Dict(entries) => match entries.get(segment) {
                Some(v) if !v.is_null() => current = v,
                _ => return false,
            },
            _ => return false,
        }
    }
    match type_name {
        Some(t) => current.type_name() == t,
        None => true,
    }
}

fn resolve_index(n: f64, len: usize) -> Option<usize> {
    let idx = n.trunc() as i64;
    let resolved = if idx < 0 { len as i64 + idx } else { idx };
    if resolved >= 0 && (resolved as usize) < len {
        Some(resolved as usize)
    } else {
        None
    }
}

fn missing_field(name: &str, span: Span) -> RillError {
    RillError::runtime(ids::MISSING_FIELD, format!("no field '{}'", name))
        .at(span)
        .with_context("field", name)
}

fn out_of_range(index: f64, len: usize, span: Span) -> RillError {
    RillError::runtime(
        ids::INDEX_OUT_OF_RANGE,
        format!("index {} out of range for length {}", super::value::format_number(index), len),
    )
    .at(span)
    .with_context("index", index.trunc() as i64)
    .with_context("length", len as u64)
}

// ============================================================================
// Tests
// ============================================================================
