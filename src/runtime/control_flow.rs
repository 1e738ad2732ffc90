//! Control-Flow Evaluator
//!
//! Conditionals, while / do-while loops with the iteration limit, blocks,
//! the `each`/`map`/`fold`/`filter` iterators, and the sequential spread.
//! Break signals are caught here, at the nearest enclosing loop or
//! iterator; return signals pass through to the closure boundary.

use crate::ast::{
    Block, Conditional, DoWhileLoop, Expression, IterateExpr, IterateKind, Span, SpreadExpr,
    WhileLoop,
};

use super::closures::{create_closure, invoke_callable};
use super::context::RuntimeContext;
use super::errors::{ids, RillError};
use super::eval::eval_statement;
use super::expr::{eval_expression, eval_with_pipe, require_pipe_value};
use super::signals::{EvalResult, Interrupt};
use super::value::Value;

// ============================================================================
// Conditionals
// ============================================================================

/// `cond ? then ! else`. A missing condition tests the upstream pipe
/// value. Exactly one branch is evaluated; a missing else yields null.
pub(crate) async fn eval_conditional(ctx: &mut RuntimeContext, cond: &Conditional) -> EvalResult {
    let decider = match &cond.condition {
        Some(expr) => eval_expression(ctx, expr).await?,
        None => require_pipe_value(ctx, cond.span)?,
    };
    if decider.is_truthy() {
        eval_expression(ctx, &cond.then_branch).await
    } else {
        match &cond.else_branch {
            Some(els) => eval_expression(ctx, els).await,
            None => Ok(Value::Null),
        }
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// `{ ... }` — statements run in order with `$` starting as the block's
/// input; each statement's value becomes `$` for the next. The entry
/// pipe value is restored on exit.
pub(crate) async fn eval_block(ctx: &mut RuntimeContext, block: &Block) -> EvalResult {
    let saved = ctx.pipe_value().cloned();
    let result = run_block(ctx, block).await;
    ctx.swap_pipe(saved);
    result
}

async fn run_block(ctx: &mut RuntimeContext, block: &Block) -> EvalResult {
    let mut value = Value::Null;
    for statement in &block.statements {
        value = eval_statement(ctx, statement).await?;
        ctx.sweep_auto_exceptions(&value, statement.span)?;
        ctx.swap_pipe(Some(value.clone()));
    }
    Ok(value)
}

// ============================================================================
// Loops
// ============================================================================

/// `cond @ body` — the condition is re-evaluated with the current value
/// before each iteration; the body's value feeds the next round. Zero
/// iterations yield the loop's input.
pub(crate) async fn eval_while(ctx: &mut RuntimeContext, w: &WhileLoop) -> EvalResult {
    let saved = ctx.pipe_value().cloned();
    let result = run_while(ctx, w, saved.clone()).await;
    ctx.swap_pipe(saved);
    result
}

async fn run_while(
    ctx: &mut RuntimeContext,
    w: &WhileLoop,
    input: Option<Value>,
) -> EvalResult {
    let mut current = input.unwrap_or(Value::Null);
    let mut iterations: u64 = 0;
    loop {
        ctx.check_aborted(Some(w.span))?;
        let cond = eval_with_pipe(ctx, current.clone(), &w.condition).await?;
        if !cond.is_truthy() {
            return Ok(current);
        }
        iterations += 1;
        check_iteration_limit(ctx, iterations, w.span)?;
        match apply_body(ctx, &w.body, current.clone(), None).await {
            Ok(v) => current = v,
            Err(Interrupt::Break(v)) => return Ok(v),
            Err(other) => return Err(other),
        }
        ctx.sweep_auto_exceptions(&current, w.span)?;
    }
}

/// `@ body ? cond` — the body runs before the first condition check.
pub(crate) async fn eval_do_while(ctx: &mut RuntimeContext, w: &DoWhileLoop) -> EvalResult {
    let saved = ctx.pipe_value().cloned();
    let result = run_do_while(ctx, w, saved.clone()).await;
    ctx.swap_pipe(saved);
    result
}

async fn run_do_while(
    ctx: &mut RuntimeContext,
    w: &DoWhileLoop,
    input: Option<Value>,
) -> EvalResult {
    let mut current = input.unwrap_or(Value::Null);
    let mut iterations: u64 = 0;
    loop {
        ctx.check_aborted(Some(w.span))?;
        iterations += 1;
        check_iteration_limit(ctx, iterations, w.span)?;
        match apply_body(ctx, &w.body, current.clone(), None).await {
            Ok(v) => current = v,
            Err(Interrupt::Break(v)) => return Ok(v),
            Err(other) => return Err(other),
        }
        ctx.sweep_auto_exceptions(&current, w.span)?;
        let cond = eval_with_pipe(ctx, current.clone(), &w.condition).await?;
        if !cond.is_truthy() {
            return Ok(current);
        }
    }
}

fn check_iteration_limit(
    ctx: &RuntimeContext,
    iterations: u64,
    span: Span,
) -> Result<(), Interrupt> {
    if iterations > ctx.iteration_limit {
        return Err(RillError::runtime(
            ids::ITERATION_LIMIT,
            format!("loop exceeded {} iterations", ctx.iteration_limit),
        )
        .at(span)
        .with_context("limit", ctx.iteration_limit)
        .into());
    }
    Ok(())
}

// ============================================================================
// Iterators
// ============================================================================

/// `each`/`map`/`fold`/`filter` over the pipe value. Lists iterate their
/// elements, dicts their `[key, value]` pairs in insertion order, and
/// strings their characters. Results preserve input order.
pub(crate) async fn eval_iterate(ctx: &mut RuntimeContext, it: &IterateExpr) -> EvalResult {
    let input = require_pipe_value(ctx, it.span)?;
    let elements = iterable_elements(&input, it.span)?;
    match it.kind {
        IterateKind::Each => run_each(ctx, it, elements).await,
        IterateKind::Map => run_map(ctx, it, elements).await,
        IterateKind::Filter => run_filter(ctx, it, elements).await,
        IterateKind::Fold => run_fold(ctx, it, elements).await,
    }
}

async fn run_each(
    ctx: &mut RuntimeContext,
    it: &IterateExpr,
    elements: Vec<Value>,
) -> EvalResult {
    let mut accumulator = match &it.init {
        Some(init) => Some(eval_expression(ctx, init).await?),
        None => None,
    };
    let track_accumulator = accumulator.is_some();

    let mut results = Vec::with_capacity(elements.len());
    for element in elements {
        ctx.check_aborted(Some(it.span))?;
        match apply_body(ctx, &it.body, element, accumulator.as_ref()).await {
            Ok(v) => {
                ctx.sweep_auto_exceptions(&v, it.span)?;
                if track_accumulator {
                    accumulator = Some(v.clone());
                }
                results.push(v);
            }
            // A break contributes its value and stops the collection.
            Err(Interrupt::Break(v)) => {
                ctx.sweep_auto_exceptions(&v, it.span)?;
                results.push(v);
                break;
            }
            Err(other) => return Err(other),
        }
    }
    Ok(Value::List(results))
}

async fn run_map(
    ctx: &mut RuntimeContext,
    it: &IterateExpr,
    elements: Vec<Value>,
) -> EvalResult {
    // Parallel semantics are a contract, not an implementation: per-element
    // bodies must not depend on order, and sequential evaluation satisfies
    // the order-preserving result guarantee.
    let mut results = Vec::with_capacity(elements.len());
    for element in elements {
        ctx.check_aborted(Some(it.span))?;
        match apply_body(ctx, &it.body, element, None).await {
            Ok(v) => {
                ctx.sweep_auto_exceptions(&v, it.span)?;
                results.push(v);
            }
            Err(Interrupt::Break(v)) => {
                ctx.sweep_auto_exceptions(&v, it.span)?;
                results.push(v);
                break;
            }
            Err(other) => return Err(other),
        }
    }
    Ok(Value::List(results))
}

async fn run_filter(
    ctx: &mut RuntimeContext,
    it: &IterateExpr,
    elements: Vec<Value>,
) -> EvalResult {
    let mut results = Vec::new();
    for element in elements {
        ctx.check_aborted(Some(it.span))?;
        match apply_body(ctx, &it.body, element.clone(), None).await {
            Ok(pred) => {
                ctx.sweep_auto_exceptions(&pred, it.span)?;
                if pred.is_truthy() {
                    results.push(element);
                }
            }
            Err(Interrupt::Break(v)) => {
                ctx.sweep_auto_exceptions(&v, it.span)?;
                if v.is_truthy() {
                    results.push(element);
                }
                break;
            }
            Err(other) => return Err(other),
        }
    }
    Ok(Value::List(results))
}

async fn run_fold(
    ctx: &mut RuntimeContext,
    it: &IterateExpr,
    elements: Vec<Value>,
) -> EvalResult {
    let init = it.init.as_ref().ok_or_else(|| {
        Interrupt::from(
            RillError::runtime(ids::MISSING_ARGUMENT, "fold requires an initial accumulator")
                .at(it.span)
                .with_context("param", "init"),
        )
    })?;
    let mut accumulator = eval_expression(ctx, init).await?;
    for element in elements {
        ctx.check_aborted(Some(it.span))?;
        match apply_body(ctx, &it.body, element, Some(&accumulator)).await {
            Ok(v) => {
                ctx.sweep_auto_exceptions(&v, it.span)?;
                accumulator = v;
            }
            // Break inside fold returns the current accumulator.
            Err(Interrupt::Break(_)) => return Ok(accumulator),
            Err(other) => return Err(other),
        }
    }
    Ok(accumulator)
}

fn iterable_elements(input: &Value, span: Span) -> Result<Vec<Value>, Interrupt> {
    match input {
        Value::List(items) => Ok(items.clone()),
        Value::Dict(entries) => Ok(entries
            .iter()
            .map(|(k, v)| Value::List(vec![Value::string(k), v.clone()]))
            .collect()),
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        other => Err(RillError::runtime(
            ids::OPERAND_TYPE,
            format!("cannot iterate over {}", other.type_name()),
        )
        .at(span)
        .into()),
    }
}

/// Run an iteration/loop body with `$` bound to the element and `$@` to
/// the accumulator. A closure-literal body is invoked with the element.
async fn apply_body(
    ctx: &mut RuntimeContext,
    body: &Expression,
    element: Value,
    accumulator: Option<&Value>,
) -> EvalResult {
    let saved_accumulator = ctx.swap_accumulator(accumulator.cloned());
    let result = match body {
        Expression::Closure(literal) => {
            let closure = create_closure(ctx, literal, false);
            let Value::Callable(callable) = &closure else {
                unreachable!("create_closure returns a callable");
            };
            invoke_callable(
                ctx,
                callable,
                vec![element.clone()],
                Some(element),
                literal.span,
                None,
            )
            .await
        }
        other => eval_with_pipe(ctx, element, other).await,
    };
    ctx.swap_accumulator(saved_accumulator);
    result
}

// ============================================================================
// Sequential spread
// ============================================================================

/// `@[f1, f2, ...]` — thread the pipe value through each callable.
pub(crate) async fn eval_spread(ctx: &mut RuntimeContext, spread: &SpreadExpr) -> EvalResult {
    let mut current = require_pipe_value(ctx, spread.span)?;
    for target in &spread.targets {
        ctx.check_aborted(Some(spread.span))?;
        let callee = match target {
            Expression::Closure(literal) => create_closure(ctx, literal, false),
            other => eval_with_pipe(ctx, current.clone(), other).await?,
        };
        match callee {
            Value::Callable(callable) => {
                current = invoke_callable(
                    ctx,
                    &callable,
                    vec![current.clone()],
                    Some(current.clone()),
                    target.span(),
                    None,
                )
                .await?;
            }
            other => {
                return Err(RillError::runtime(
                    ids::NOT_CALLABLE,
                    format!("spread target is a {}, not a callable", other.type_name()),
                )
                .at(target.span())
                .into());
            }
        }
    }
    Ok(current)
}
