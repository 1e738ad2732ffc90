//! String Interpolation
//!
//! Template parts are evaluated left-to-right with the current `$` and
//! rendered with the canonical `to_string` rules. Escaped braces are a
//! parser concern; by the time a template reaches the runtime its text
//! parts already contain literal braces.

use crate::ast::{StringTemplate, TemplatePart};

use super::context::RuntimeContext;
use super::expr::eval_expression;
use super::signals::EvalResult;
use super::value::Value;

pub(crate) async fn eval_template(
    ctx: &mut RuntimeContext,
    template: &StringTemplate,
) -> EvalResult {
    // Fast path: a plain string literal.
    if let [TemplatePart::Text(text)] = template.parts.as_slice() {
        return Ok(Value::String(text.clone()));
    }
    let mut out = String::new();
    for part in &template.parts {
        match part {
            TemplatePart::Text(text) => out.push_str(text),
            TemplatePart::Expr(expr) => {
                let value = eval_expression(ctx, expr).await?;
                out.push_str(&value.render());
            }
        }
    }
    Ok(Value::String(out))
}
