//! Runtime Builtin Methods
//!
//! Method-style builtins (`.len`, `.upper`, `.split`, ...) dispatched on
//! the receiver's type. Each entry carries parameter metadata so the
//! introspection catalog can describe it.

use indexmap::IndexMap;

use crate::ast::Span;

use super::callable::BuiltinMethod;
use super::errors::{ids, RillError};
use super::value::{format_number, value_cmp, Value};

/// Look up a builtin method for a receiver type.
pub fn lookup(receiver_type: &str, name: &str) -> Option<&'static BuiltinMethod> {
    BUILTIN_METHODS
        .iter()
        .find(|m| m.receiver == receiver_type && m.name == name)
}

/// The full builtin catalog, for introspection.
pub fn catalog() -> &'static [BuiltinMethod] {
    BUILTIN_METHODS
}

/// Validate the argument count and types declared by a method. Extra
/// positional args are accepted only past a trailing `any` parameter.
fn check_args(method: &BuiltinMethod, args: &[Value], span: Span) -> Result<(), RillError> {
    if args.len() > method.params.len() {
        let variadic = method.params.last().map_or(false, |(_, t)| *t == "any");
        if !variadic {
            return Err(RillError::runtime(
                ids::EXTRA_ARGUMENT,
                format!(
                    "method '{}' takes {} argument(s), got {}",
                    method.name,
                    method.params.len(),
                    args.len()
                ),
            )
            .at(span)
            .with_context("expected", method.params.len() as u64)
            .with_context("actual", args.len() as u64));
        }
    }
    for (i, (name, type_name)) in method.params.iter().enumerate() {
        let Some(arg) = args.get(i) else {
            return Err(RillError::runtime(
                ids::MISSING_ARGUMENT,
                format!("method '{}' requires argument '{}'", method.name, name),
            )
            .at(span)
            .with_context("param", *name));
        };
        if *type_name != "any" && arg.type_name() != *type_name {
            return Err(RillError::runtime(
                ids::OPERAND_TYPE,
                format!(
                    "method '{}' expects {} for '{}', got {}",
                    method.name,
                    type_name,
                    name,
                    arg.type_name()
                ),
            )
            .at(span)
            .with_context("expected", *type_name)
            .with_context("actual", arg.type_name()));
        }
    }
    Ok(())
}

/// Apply a builtin method after validating its arguments.
pub fn apply(
    method: &'static BuiltinMethod,
    receiver: &Value,
    args: &[Value],
    span: Span,
) -> Result<Value, RillError> {
    check_args(method, args, span)?;
    (method.apply)(receiver, args, span)
}

// ---------------------------------------------------------------------------
// Receiver helpers
// ---------------------------------------------------------------------------

fn expect_string(v: &Value) -> &str {
    match v {
        Value::String(s) => s,
        _ => unreachable!("dispatched on receiver type"),
    }
}

fn expect_list(v: &Value) -> &[Value] {
    match v {
        Value::List(l) => l,
        _ => unreachable!("dispatched on receiver type"),
    }
}

fn expect_dict(v: &Value) -> &IndexMap<String, Value> {
    match v {
        Value::Dict(d) => d,
        _ => unreachable!("dispatched on receiver type"),
    }
}

fn expect_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => *n,
        _ => unreachable!("dispatched on receiver type"),
    }
}

fn arg_string(args: &[Value], i: usize) -> &str {
    match &args[i] {
        Value::String(s) => s,
        _ => unreachable!("validated by check_args"),
    }
}

// ---------------------------------------------------------------------------
// String methods
// ---------------------------------------------------------------------------

fn string_len(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Number(expect_string(recv).chars().count() as f64))
}

fn string_upper(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::String(expect_string(recv).to_uppercase()))
}

fn string_lower(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::String(expect_string(recv).to_lowercase()))
}

fn string_trim(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::String(expect_string(recv).trim().to_string()))
}

fn string_split(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    let sep = arg_string(args, 0);
    let s = expect_string(recv);
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::string).collect()
    };
    Ok(Value::List(parts))
}

fn string_replace(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    let from = arg_string(args, 0);
    let to = arg_string(args, 1);
    Ok(Value::String(expect_string(recv).replace(from, to)))
}

fn string_contains(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Bool(expect_string(recv).contains(arg_string(args, 0))))
}

fn string_starts_with(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Bool(expect_string(recv).starts_with(arg_string(args, 0))))
}

fn string_ends_with(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Bool(expect_string(recv).ends_with(arg_string(args, 0))))
}

fn string_to_number(recv: &Value, _args: &[Value], span: Span) -> Result<Value, RillError> {
    let s = expect_string(recv).trim();
    s.parse::<f64>().map(Value::Number).map_err(|_| {
        RillError::runtime(ids::OPERAND_TYPE, format!("'{}' is not a number", s)).at(span)
    })
}

fn string_chars(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::List(
        expect_string(recv)
            .chars()
            .map(|c| Value::String(c.to_string()))
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// List methods
// ---------------------------------------------------------------------------

fn list_len(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Number(expect_list(recv).len() as f64))
}

fn list_first(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(expect_list(recv).first().cloned().unwrap_or(Value::Null))
}

fn list_last(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(expect_list(recv).last().cloned().unwrap_or(Value::Null))
}

fn list_reverse(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    let mut items = expect_list(recv).to_vec();
    items.reverse();
    Ok(Value::List(items))
}

fn list_sort(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    let mut items = expect_list(recv).to_vec();
    items.sort_by(value_cmp);
    Ok(Value::List(items))
}

fn list_join(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    let sep = arg_string(args, 0);
    let joined = expect_list(recv)
        .iter()
        .map(Value::render)
        .collect::<Vec<_>>()
        .join(sep);
    Ok(Value::String(joined))
}

fn list_sum(recv: &Value, _args: &[Value], span: Span) -> Result<Value, RillError> {
    let mut total = 0.0;
    for item in expect_list(recv) {
        match item {
            Value::Number(n) => total += n,
            other => {
                return Err(RillError::runtime(
                    ids::OPERAND_TYPE,
                    format!("'sum' requires numbers, got {}", other.type_name()),
                )
                .at(span));
            }
        }
    }
    Ok(Value::Number(total))
}

fn list_contains(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Bool(expect_list(recv).contains(&args[0])))
}

fn list_flatten(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    let mut out = Vec::new();
    for item in expect_list(recv) {
        match item {
            Value::List(inner) => out.extend(inner.iter().cloned()),
            other => out.push(other.clone()),
        }
    }
    Ok(Value::List(out))
}

// ---------------------------------------------------------------------------
// Dict methods
// ---------------------------------------------------------------------------

fn dict_keys(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::List(
        expect_dict(recv).keys().map(Value::string).collect(),
    ))
}

fn dict_values(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::List(expect_dict(recv).values().cloned().collect()))
}

fn dict_entries(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::List(
        expect_dict(recv)
            .iter()
            .map(|(k, v)| Value::List(vec![Value::string(k), v.clone()]))
            .collect(),
    ))
}

fn dict_len(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Number(expect_dict(recv).len() as f64))
}

fn dict_has(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Bool(expect_dict(recv).contains_key(arg_string(args, 0))))
}

fn dict_merge(recv: &Value, args: &[Value], _span: Span) -> Result<Value, RillError> {
    let mut merged = expect_dict(recv).clone();
    if let Value::Dict(other) = &args[0] {
        for (k, v) in other {
            merged.insert(k.clone(), v.clone());
        }
    }
    Ok(Value::Dict(merged))
}

// ---------------------------------------------------------------------------
// Number methods
// ---------------------------------------------------------------------------

fn number_round(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Number(expect_number(recv).round()))
}

fn number_floor(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Number(expect_number(recv).floor()))
}

fn number_ceil(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Number(expect_number(recv).ceil()))
}

fn number_abs(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::Number(expect_number(recv).abs()))
}

fn number_to_string(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    Ok(Value::String(format_number(expect_number(recv))))
}

// ---------------------------------------------------------------------------
// Vector methods
// ---------------------------------------------------------------------------

fn vector_len(recv: &Value, _args: &[Value], _span: Span) -> Result<Value, RillError> {
    match recv {
        Value::Vector(v) => Ok(Value::Number(v.len() as f64)),
        _ => unreachable!("dispatched on receiver type"),
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

macro_rules! method {
    ($name:expr, $recv:expr, $params:expr, $desc:expr, $ret:expr, $apply:expr) => {
        BuiltinMethod {
            name: $name,
            receiver: $recv,
            params: $params,
            description: $desc,
            return_type: $ret,
            apply: $apply,
        }
    };
}

static BUILTIN_METHODS: &[BuiltinMethod] = &[
    // string
    method!("len", "string", &[], "Number of characters", "number", string_len),
    method!("upper", "string", &[], "Uppercased copy", "string", string_upper),
    method!("lower", "string", &[], "Lowercased copy", "string", string_lower),
    method!("trim", "string", &[], "Copy with surrounding whitespace removed", "string", string_trim),
    method!("split", "string", &[("sep", "string")], "Split on a separator; empty separator splits into characters", "list", string_split),
    method!("replace", "string", &[("from", "string"), ("to", "string")], "Replace every occurrence", "string", string_replace),
    method!("contains", "string", &[("sub", "string")], "True if the substring occurs", "bool", string_contains),
    method!("starts_with", "string", &[("prefix", "string")], "True if the string starts with the prefix", "bool", string_starts_with),
    method!("ends_with", "string", &[("suffix", "string")], "True if the string ends with the suffix", "bool", string_ends_with),
    method!("to_number", "string", &[], "Parse as a number", "number", string_to_number),
    method!("chars", "string", &[], "List of single-character strings", "list", string_chars),
    // list
    method!("len", "list", &[], "Number of elements", "number", list_len),
    method!("first", "list", &[], "First element, or null when empty", "any", list_first),
    method!("last", "list", &[], "Last element, or null when empty", "any", list_last),
    method!("reverse", "list", &[], "Reversed copy", "list", list_reverse),
    method!("sort", "list", &[], "Sorted copy", "list", list_sort),
    method!("join", "list", &[("sep", "string")], "Render elements and join with a separator", "string", list_join),
    method!("sum", "list", &[], "Sum of a numeric list", "number", list_sum),
    method!("contains", "list", &[("value", "any")], "True if an equal element exists", "bool", list_contains),
    method!("flatten", "list", &[], "Concatenate nested lists one level deep", "list", list_flatten),
    // dict
    method!("keys", "dict", &[], "Keys in insertion order", "list", dict_keys),
    method!("values", "dict", &[], "Values in insertion order", "list", dict_values),
    method!("entries", "dict", &[], "[key, value] pairs in insertion order", "list", dict_entries),
    method!("len", "dict", &[], "Number of entries", "number", dict_len),
    method!("has", "dict", &[("key", "string")], "True if the key is present", "bool", dict_has),
    method!("merge", "dict", &[("other", "dict")], "Copy with the other dict's entries merged in", "dict", dict_merge),
    // number
    method!("round", "number", &[], "Round to the nearest integer", "number", number_round),
    method!("floor", "number", &[], "Round down", "number", number_floor),
    method!("ceil", "number", &[], "Round up", "number", number_ceil),
    method!("abs", "number", &[], "Absolute value", "number", number_abs),
    method!("to_string", "number", &[], "Canonical decimal rendering", "string", number_to_string),
    // vector
    method!("len", "vector", &[], "Number of components", "number", vector_len),
];

// ============================================================================
// Tests
// ============================================================================
