//! Value Model
//!
//! The tagged union every Rill expression evaluates to, plus structural
//! equality, type inference, truthiness, and the canonical renderings
//! (display form and JSON-compact form).
//!
//! Lists and dicts are logically immutable at the language level: every
//! operation builds a new value. Dicts preserve insertion order.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::callable::Callable;

/// The eight type names the language recognises.
pub const TYPE_NAMES: &[&str] = &[
    "null", "bool", "number", "string", "list", "dict", "vector", "closure",
];

/// Reserved dict method names; rejected as dict-literal keys.
pub const RESERVED_METHODS: &[&str] = &["keys", "values", "entries"];

/// Homogeneous 32-bit float sequence with an origin tag used for debugging.
#[derive(Debug, Clone)]
pub struct VectorData {
    pub values: Arc<Vec<f32>>,
    pub origin: String,
}

impl VectorData {
    pub fn new(values: Vec<f32>, origin: impl Into<String>) -> Self {
        Self { values: Arc::new(values), origin: origin.into() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A Rill value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    Vector(VectorData),
    Callable(Callable),
}

impl Value {
    /// The language-level type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Vector(_) => "vector",
            Value::Callable(_) => "closure",
        }
    }

    /// Truthiness: `false`, `null`, empty string/list/dict/vector and `0`
    /// are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Vector(v) => !v.is_empty(),
            Value::Callable(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Canonical display rendering (used by string interpolation and the
    /// CLI). Numbers drop trailing zeros; lists and dicts render as
    /// JSON-compact text; vectors render as a size tag.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(_) | Value::Dict(_) => self.to_json().to_string(),
            Value::Vector(v) => format!("<vector n={}>", v.len()),
            Value::Callable(c) => format!("<{}>", c.kind_name()),
        }
    }

    /// JSON-compact form. Vectors and callables have no JSON counterpart
    /// and render as their display tags.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    serde_json::Value::Number(serde_json::Number::from(*n as i64))
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Vector(v) => serde_json::Value::String(format!("<vector n={}>", v.len())),
            Value::Callable(c) => serde_json::Value::String(format!("<{}>", c.kind_name())),
        }
    }

    /// Convert a JSON value into a Rill value.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let mut dict = IndexMap::new();
                for (k, v) in map {
                    dict.insert(k.clone(), Value::from_json(v));
                }
                Value::Dict(dict)
            }
        }
    }
}

/// Render a number without trailing zeros; integral values render without
/// a decimal point.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// True iff `type_name` is one of the language's type names.
pub fn is_known_type(type_name: &str) -> bool {
    TYPE_NAMES.contains(&type_name)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Vector(a), Value::Vector(b)) => a.values == b.values,
            (Value::Callable(a), Value::Callable(b)) => a.same_instance(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

/// Ordering used by `.sort`: null < bool < number < string < list < dict.
pub fn value_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn type_rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::List(_) => 4,
            Value::Dict(_) => 5,
            Value::Vector(_) => 6,
            Value::Callable(_) => 7,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::List(x), Value::List(y)) => {
            for (xi, yi) in x.iter().zip(y.iter()) {
                let ord = value_cmp(xi, yi);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, Value)]) -> Value {
        let mut m = IndexMap::new();
        for (k, v) in entries {
            m.insert(k.to_string(), v.clone());
        }
        Value::Dict(m)
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Bool(true).type_name(), "bool");
        assert_eq!(Value::Number(1.5).type_name(), "number");
        assert_eq!(Value::string("hi").type_name(), "string");
        assert_eq!(Value::List(vec![]).type_name(), "list");
        assert_eq!(dict(&[]).type_name(), "dict");
        assert_eq!(
            Value::Vector(VectorData::new(vec![1.0], "test")).type_name(),
            "vector"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::string("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!dict(&[]).is_truthy());
        assert!(!Value::Vector(VectorData::new(vec![], "t")).is_truthy());

        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(Value::string("x").is_truthy());
        assert!(Value::List(vec![Value::Null]).is_truthy());
        assert!(Value::Vector(VectorData::new(vec![0.5], "t")).is_truthy());
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::List(vec![Value::Number(1.0), Value::string("x")]);
        let b = Value::List(vec![Value::Number(1.0), Value::string("x")]);
        assert_eq!(a, b);

        let d1 = dict(&[("a", Value::Number(1.0)), ("b", Value::Number(2.0))]);
        let d2 = dict(&[("b", Value::Number(2.0)), ("a", Value::Number(1.0))]);
        // Same key set and per-key values; insertion order does not matter
        // for equality.
        assert_eq!(d1, d2);

        let d3 = dict(&[("a", Value::Number(1.0))]);
        assert_ne!(d1, d3);
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(0.1), "0.1");
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Null.render(), "null");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::string("hi").render(), "hi");
        assert_eq!(
            Value::List(vec![Value::Number(1.0), Value::Number(2.5)]).render(),
            "[1,2.5]"
        );
        assert_eq!(
            Value::Vector(VectorData::new(vec![1.0, 2.0, 3.0], "t")).render(),
            "<vector n=3>"
        );
    }

    #[test]
    fn test_json_round_trip() {
        let original = dict(&[
            ("name", Value::string("Eve")),
            ("scores", Value::List(vec![Value::Number(1.0), Value::Number(2.0)])),
            ("active", Value::Bool(true)),
            ("extra", Value::Null),
        ]);
        let json = original.to_json();
        let back = Value::from_json(&json);
        assert_eq!(original, back);
    }

    #[test]
    fn test_value_cmp_sorts_types() {
        let mut values = vec![
            Value::string("b"),
            Value::Number(2.0),
            Value::Null,
            Value::string("a"),
            Value::Number(1.0),
        ];
        values.sort_by(value_cmp);
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Number(1.0),
                Value::Number(2.0),
                Value::string("a"),
                Value::string("b"),
            ]
        );
    }
}
