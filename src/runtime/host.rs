//! Host-Call Engine
//!
//! Invocation of host-registered async functions: argument validation
//! against the declared parameter metadata, the timeout race, abort
//! polling, balanced call-stack framing, and observability events.
//!
//! A lost timeout race does not cancel the underlying host work; hosts
//! that need hard cancellation wire the context's abort signal into
//! their own I/O.

use std::sync::Arc;

use crate::ast::Span;

use super::callable::HostFunction;
use super::context::{EventCategory, RuntimeContext};
use super::errors::{ids, RillError};
use super::value::Value;

/// Invoke a host function per the callable protocol.
pub(crate) async fn invoke_host(
    ctx: &mut RuntimeContext,
    func: Arc<HostFunction>,
    args: Vec<Value>,
    span: Span,
) -> Result<Value, RillError> {
    ctx.check_aborted(Some(span))?;

    let bound = bind_arguments(&func, args, span)?;

    ctx.push_call_frame(span, Some(func.name.clone()), None)?;
    if let Some(cb) = &ctx.callbacks.on_host_call {
        cb(&func.name, &bound);
    }
    ctx.emit_event(
        EventCategory::HostCall,
        None,
        serde_json::json!({ "function": func.name, "argCount": bound.len() }),
    );

    let limit = func.timeout.or(ctx.default_timeout);
    let body = func.body.clone();
    let result = match limit {
        Some(limit) => match tokio::time::timeout(limit, body(bound, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(RillError::timeout(&func.name, limit, span)),
        },
        None => body(bound, ctx).await,
    };

    let result = match result {
        Ok(value) => {
            if let Some(cb) = &ctx.callbacks.on_function_return {
                cb(&func.name, &value);
            }
            ctx.emit_event(
                EventCategory::FunctionReturn,
                None,
                serde_json::json!({ "function": func.name, "type": value.type_name() }),
            );
            Ok(value)
        }
        Err(mut e) => {
            e = e.at_fallback(span);
            if e.call_stack.is_empty() {
                e.call_stack = ctx.call_stack_snapshot();
            }
            Err(e)
        }
    };

    ctx.pop_call_frame();
    result
}

/// Bind positional args to the declared parameters: defaults fill gaps,
/// a missing required parameter fails, and declared types are enforced
/// (`any` accepts everything). Extra positional args are variadic-ignored
/// only when the last declared parameter is untyped `any`; otherwise the
/// call fails with `RILL-R-ExtraArgument`.
fn bind_arguments(
    func: &HostFunction,
    args: Vec<Value>,
    span: Span,
) -> Result<Vec<Value>, RillError> {
    if args.len() > func.params.len() {
        let variadic = func.params.last().map_or(false, |p| p.type_name == "any");
        if !variadic {
            return Err(RillError::runtime(
                ids::EXTRA_ARGUMENT,
                format!(
                    "function '{}' takes {} argument(s), got {}",
                    func.name,
                    func.params.len(),
                    args.len()
                ),
            )
            .at(span)
            .with_context("expected", func.params.len() as u64)
            .with_context("actual", args.len() as u64));
        }
    }
    let mut bound = Vec::with_capacity(func.params.len());
    for (i, param) in func.params.iter().enumerate() {
        let value = match args.get(i) {
            Some(v) => v.clone(),
            None => match &param.default {
                Some(default) => default.clone(),
                None => {
                    return Err(RillError::runtime(
                        ids::MISSING_ARGUMENT,
                        format!("function '{}' requires argument '{}'", func.name, param.name),
                    )
                    .at(span)
                    .with_context("param", param.name.as_str()));
                }
            },
        };
        if param.type_name != "any" && value.type_name() != param.type_name {
            return Err(RillError::runtime(
                ids::TYPE_ASSERTION,
                format!(
                    "function '{}' expects {} for '{}', got {}",
                    func.name,
                    param.type_name,
                    param.name,
                    value.type_name()
                ),
            )
            .at(span)
            .with_context("expected", param.type_name.as_str())
            .with_context("actual", value.type_name()));
        }
        bound.push(value);
    }
    Ok(bound)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::callable::{host_body, ParamSpec};
    use crate::runtime::context::{ContextOptions, AbortSignal};
    use std::time::Duration;

    fn echo_fn() -> HostFunction {
        HostFunction::new(
            "echo",
            vec![ParamSpec::new("value", "any")],
            "Returns its argument",
            "any",
            host_body(|args| async move { Ok(args[0].clone()) }),
        )
    }

    #[tokio::test]
    async fn test_invoke_host_binds_and_returns() {
        let mut ctx = RuntimeContext::empty();
        let func = Arc::new(echo_fn());
        let out = invoke_host(&mut ctx, func, vec![Value::Number(7.0)], Span::default())
            .await
            .unwrap();
        assert_eq!(out, Value::Number(7.0));
        assert_eq!(ctx.call_stack_depth(), 0);
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let mut ctx = RuntimeContext::empty();
        let func = Arc::new(echo_fn());
        let err = invoke_host(&mut ctx, func, vec![], Span::default())
            .await
            .unwrap_err();
        assert_eq!(err.id, ids::MISSING_ARGUMENT);
        assert_eq!(err.context.get("param").unwrap(), "value");
        assert_eq!(ctx.call_stack_depth(), 0);
    }

    #[tokio::test]
    async fn test_default_fills_missing_argument() {
        let mut ctx = RuntimeContext::empty();
        let func = Arc::new(HostFunction::new(
            "greet",
            vec![ParamSpec::new("name", "string").with_default(Value::string("world"))],
            "",
            "string",
            host_body(|args| async move {
                Ok(Value::String(format!("hello {}", args[0].render())))
            }),
        ));
        let out = invoke_host(&mut ctx, func, vec![], Span::default()).await.unwrap();
        assert_eq!(out, Value::string("hello world"));
    }

    #[tokio::test]
    async fn test_extra_arguments_need_variadic_any_tail() {
        let mut ctx = RuntimeContext::empty();
        // Typed last parameter: extras are rejected.
        let func = Arc::new(HostFunction::new(
            "inc",
            vec![ParamSpec::new("n", "number")],
            "",
            "number",
            host_body(|args| async move { Ok(args[0].clone()) }),
        ));
        let err = invoke_host(
            &mut ctx,
            func,
            vec![Value::Number(1.0), Value::Number(2.0)],
            Span::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.id, ids::EXTRA_ARGUMENT);
        assert_eq!(err.context.get("expected").unwrap(), 1);
        assert_eq!(err.context.get("actual").unwrap(), 2);

        // Untyped `any` last parameter: extras are silently ignored.
        let out = invoke_host(
            &mut ctx,
            Arc::new(echo_fn()),
            vec![Value::Number(7.0), Value::Number(8.0)],
            Span::default(),
        )
        .await
        .unwrap();
        assert_eq!(out, Value::Number(7.0));
    }

    #[tokio::test]
    async fn test_declared_type_enforced() {
        let mut ctx = RuntimeContext::empty();
        let func = Arc::new(HostFunction::new(
            "inc",
            vec![ParamSpec::new("n", "number")],
            "",
            "number",
            host_body(|args| async move { Ok(args[0].clone()) }),
        ));
        let err = invoke_host(&mut ctx, func, vec![Value::string("x")], Span::default())
            .await
            .unwrap_err();
        assert_eq!(err.id, ids::TYPE_ASSERTION);
        assert_eq!(err.context.get("expected").unwrap(), "number");
        assert_eq!(err.context.get("actual").unwrap(), "string");
    }

    #[tokio::test]
    async fn test_timeout_race() {
        let mut ctx = RuntimeContext::empty();
        let func = Arc::new(
            HostFunction::new(
                "slow",
                vec![],
                "",
                "null",
                host_body(|_args| async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Value::Null)
                }),
            )
            .with_timeout(Duration::from_millis(20)),
        );
        let err = invoke_host(&mut ctx, func, vec![], Span::default())
            .await
            .unwrap_err();
        assert_eq!(err.id, ids::TIMEOUT);
        assert_eq!(err.context.get("functionName").unwrap(), "slow");
        assert_eq!(err.context.get("timeoutMs").unwrap(), 20);
        // Balanced stack even on the timeout path.
        assert_eq!(ctx.call_stack_depth(), 0);
    }

    #[tokio::test]
    async fn test_aborted_before_call() {
        let signal = AbortSignal::new();
        signal.abort();
        let mut ctx = RuntimeContext::new(ContextOptions {
            signal: Some(signal),
            ..Default::default()
        })
        .unwrap();
        let err = invoke_host(&mut ctx, Arc::new(echo_fn()), vec![Value::Null], Span::default())
            .await
            .unwrap_err();
        assert_eq!(err.id, ids::ABORTED);
    }

    #[tokio::test]
    async fn test_host_error_gains_call_stack() {
        let mut ctx = RuntimeContext::empty();
        let func = Arc::new(HostFunction::new(
            "fail",
            vec![],
            "",
            "null",
            host_body(|_args| async move {
                Err(RillError::runtime(ids::RUNTIME, "host exploded"))
            }),
        ));
        let err = invoke_host(&mut ctx, func, vec![], Span::default())
            .await
            .unwrap_err();
        assert_eq!(err.call_stack.len(), 1);
        assert_eq!(err.call_stack[0].function_name.as_deref(), Some("fail"));
    }
}
