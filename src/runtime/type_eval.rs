//! Type Evaluator
//!
//! `expr:T` asserts the declared type and passes the value through
//! unchanged; `expr:?T` answers with a bool and never fails on mismatch.
//! The bare forms apply to the pipe value.

use crate::ast::{Expression, Span};

use super::context::RuntimeContext;
use super::errors::{ids, RillError};
use super::expr::{eval_expression, require_pipe_value};
use super::signals::EvalResult;
use super::value::{is_known_type, Value};

pub(crate) async fn eval_type_assert(
    ctx: &mut RuntimeContext,
    value: Option<&Expression>,
    type_name: &str,
    span: Span,
) -> EvalResult {
    let subject = resolve_subject(ctx, value, span).await?;
    check_known(type_name, span)?;
    let actual = subject.type_name();
    if actual == type_name {
        Ok(subject)
    } else {
        Err(RillError::runtime(
            ids::TYPE_ASSERTION,
            format!("expected {}, got {}", type_name, actual),
        )
        .at(span)
        .with_context("expected", type_name)
        .with_context("actual", actual)
        .into())
    }
}

pub(crate) async fn eval_type_check(
    ctx: &mut RuntimeContext,
    value: Option<&Expression>,
    type_name: &str,
    span: Span,
) -> EvalResult {
    let subject = resolve_subject(ctx, value, span).await?;
    check_known(type_name, span)?;
    Ok(Value::Bool(subject.type_name() == type_name))
}

async fn resolve_subject(
    ctx: &mut RuntimeContext,
    value: Option<&Expression>,
    span: Span,
) -> EvalResult {
    match value {
        Some(expr) => eval_expression(ctx, expr).await,
        None => require_pipe_value(ctx, span).map_err(Into::into),
    }
}

fn check_known(type_name: &str, span: Span) -> Result<(), RillError> {
    if is_known_type(type_name) {
        Ok(())
    } else {
        Err(RillError::runtime(ids::UNKNOWN_TYPE, format!("unknown type '{}'", type_name))
            .at(span)
            .with_context("type", type_name))
    }
}
