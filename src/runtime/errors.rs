//! Runtime Error Model
//!
//! Every failure in the runtime carries a stable, category-prefixed error
//! ID (`RILL-L-…` lex, `RILL-P-…` parse, `RILL-R-…` runtime, `RILL-C-…`
//! check), a human message, an optional source span, an ordered context
//! map, optional suggestions/help URL, and an optional frozen call-stack
//! snapshot.
//!
//! IDs are validated against a static registry at construction time: an
//! unknown ID or a category mismatch is a programmer bug, not a script
//! bug, and panics at the construction boundary.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use indexmap::IndexMap;

use crate::ast::Span;

/// Error category, derived from the ID prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Lex,
    Parse,
    Runtime,
    Check,
}

impl ErrorCategory {
    pub fn prefix(&self) -> &'static str {
        match self {
            ErrorCategory::Lex => "RILL-L-",
            ErrorCategory::Parse => "RILL-P-",
            ErrorCategory::Runtime => "RILL-R-",
            ErrorCategory::Check => "RILL-C-",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Lex => "lex",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Runtime => "runtime",
            ErrorCategory::Check => "check",
        };
        write!(f, "{}", s)
    }
}

/// Stable error identifiers.
pub mod ids {
    // Lex
    pub const LEX_UNEXPECTED_CHAR: &str = "RILL-L-UnexpectedChar";
    pub const LEX_UNTERMINATED_STRING: &str = "RILL-L-UnterminatedString";
    pub const LEX_INPUT_TOO_LARGE: &str = "RILL-L-InputTooLarge";
    pub const LEX_BAD_NUMBER: &str = "RILL-L-BadNumber";

    // Parse
    pub const PARSE_SYNTAX: &str = "RILL-P-Syntax";
    pub const PARSE_UNEXPECTED_TOKEN: &str = "RILL-P-UnexpectedToken";
    pub const PARSE_EMPTY_BLOCK: &str = "RILL-P-EmptyBlock";
    pub const PARSE_ERROR_REQUIRES_MESSAGE: &str = "RILL-P-ErrorRequiresMessage";
    pub const PARSE_TOO_DEEP: &str = "RILL-P-TooDeep";
    pub const PARSE_TOO_MANY_TOKENS: &str = "RILL-P-TooManyTokens";
    pub const PARSE_UNTERMINATED_INTERPOLATION: &str = "RILL-P-UnterminatedInterpolation";

    // Runtime
    pub const UNDEFINED_VARIABLE: &str = "RILL-R-UndefinedVariable";
    pub const TYPE_MISMATCH: &str = "RILL-R-TypeMismatch";
    pub const TYPE_ASSERTION: &str = "RILL-R-TypeAssertion";
    pub const MISSING_FIELD: &str = "RILL-R-MissingField";
    pub const INDEX_OUT_OF_RANGE: &str = "RILL-R-IndexOutOfRange";
    pub const MISSING_ARGUMENT: &str = "RILL-R-MissingArgument";
    pub const EXTRA_ARGUMENT: &str = "RILL-R-ExtraArgument";
    pub const ITERATION_LIMIT: &str = "RILL-R-IterationLimit";
    pub const CALL_STACK_OVERFLOW: &str = "RILL-R-CallStackOverflow";
    pub const OPERAND_TYPE: &str = "RILL-R-OperandType";
    pub const DIVISION_BY_ZERO: &str = "RILL-R-DivisionByZero";
    pub const INVALID_REGEX: &str = "RILL-R-InvalidRegex";
    pub const RESERVED_METHOD: &str = "RILL-R-ReservedMethod";
    pub const DUPLICATE_KEY: &str = "RILL-R-DuplicateKey";
    pub const AUTO_EXCEPTION: &str = "RILL-R-AutoException";
    pub const TIMEOUT: &str = "RILL-R-Timeout";
    pub const ABORTED: &str = "RILL-R-Aborted";
    pub const UNKNOWN_FUNCTION: &str = "RILL-R-UnknownFunction";
    pub const UNKNOWN_METHOD: &str = "RILL-R-UnknownMethod";
    pub const UNKNOWN_TYPE: &str = "RILL-R-UnknownType";
    pub const NOT_CALLABLE: &str = "RILL-R-NotCallable";
    pub const ASSERTION: &str = "RILL-R-Assertion";
    pub const RUNTIME: &str = "RILL-R-Runtime";

    // Check
    pub const CHECK_VALIDATION: &str = "RILL-C-Validation";
}

/// Metadata attached to a registered error ID.
pub struct ErrorSpec {
    pub category: ErrorCategory,
    /// Default suggestion shown as `= help:` in human output.
    pub help: Option<&'static str>,
    /// Documentation URL.
    pub help_url: Option<&'static str>,
}

const DOC_BASE: &str = "https://rill-lang.dev/errors";

macro_rules! error_spec {
    ($map:ident, $id:expr, $cat:expr, $help:expr) => {
        $map.insert(
            $id,
            ErrorSpec { category: $cat, help: $help, help_url: Some(DOC_BASE) },
        );
    };
}

lazy_static::lazy_static! {
    /// Registry of every known error ID.
    static ref ERROR_REGISTRY: HashMap<&'static str, ErrorSpec> = {
        use ErrorCategory::*;
        let mut m = HashMap::new();
        error_spec!(m, ids::LEX_UNEXPECTED_CHAR, Lex, None);
        error_spec!(m, ids::LEX_UNTERMINATED_STRING, Lex, Some("close the string with a matching quote"));
        error_spec!(m, ids::LEX_INPUT_TOO_LARGE, Lex, None);
        error_spec!(m, ids::LEX_BAD_NUMBER, Lex, None);

        error_spec!(m, ids::PARSE_SYNTAX, Parse, None);
        error_spec!(m, ids::PARSE_UNEXPECTED_TOKEN, Parse, None);
        error_spec!(m, ids::PARSE_EMPTY_BLOCK, Parse, Some("blocks must contain at least one statement"));
        error_spec!(m, ids::PARSE_ERROR_REQUIRES_MESSAGE, Parse, Some("write `error \"message\"`"));
        error_spec!(m, ids::PARSE_TOO_DEEP, Parse, None);
        error_spec!(m, ids::PARSE_TOO_MANY_TOKENS, Parse, None);
        error_spec!(m, ids::PARSE_UNTERMINATED_INTERPOLATION, Parse, Some("close the interpolation with `}`"));

        error_spec!(m, ids::UNDEFINED_VARIABLE, Runtime, Some("capture a value first with `=> $name`"));
        error_spec!(m, ids::TYPE_MISMATCH, Runtime, Some("a variable keeps the type of its first assignment"));
        error_spec!(m, ids::TYPE_ASSERTION, Runtime, None);
        error_spec!(m, ids::MISSING_FIELD, Runtime, Some("use `?? default` to supply a fallback"));
        error_spec!(m, ids::INDEX_OUT_OF_RANGE, Runtime, None);
        error_spec!(m, ids::MISSING_ARGUMENT, Runtime, None);
        error_spec!(m, ids::EXTRA_ARGUMENT, Runtime, Some("a trailing `any` parameter accepts extra arguments"));
        error_spec!(m, ids::ITERATION_LIMIT, Runtime, Some("raise the iteration limit on the runtime context"));
        error_spec!(m, ids::CALL_STACK_OVERFLOW, Runtime, None);
        error_spec!(m, ids::OPERAND_TYPE, Runtime, None);
        error_spec!(m, ids::DIVISION_BY_ZERO, Runtime, None);
        error_spec!(m, ids::INVALID_REGEX, Runtime, None);
        error_spec!(m, ids::RESERVED_METHOD, Runtime, Some("`keys`, `values` and `entries` are reserved method names"));
        error_spec!(m, ids::DUPLICATE_KEY, Runtime, None);
        error_spec!(m, ids::AUTO_EXCEPTION, Runtime, None);
        error_spec!(m, ids::TIMEOUT, Runtime, None);
        error_spec!(m, ids::ABORTED, Runtime, None);
        error_spec!(m, ids::UNKNOWN_FUNCTION, Runtime, Some("check the registered host functions"));
        error_spec!(m, ids::UNKNOWN_METHOD, Runtime, None);
        error_spec!(m, ids::UNKNOWN_TYPE, Runtime, Some("known types: null, bool, number, string, list, dict, vector, closure"));
        error_spec!(m, ids::NOT_CALLABLE, Runtime, None);
        error_spec!(m, ids::ASSERTION, Runtime, None);
        error_spec!(m, ids::RUNTIME, Runtime, None);

        error_spec!(m, ids::CHECK_VALIDATION, Check, None);
        m
    };
}

/// Look up the registry entry for an ID, panicking on unknown IDs.
fn registry_entry(id: &str) -> (&'static str, &'static ErrorSpec) {
    ERROR_REGISTRY
        .get_key_value(id)
        .map(|(k, v)| (*k, v))
        .unwrap_or_else(|| panic!("unregistered error id: {}", id))
}

/// A single frame of the script-level call stack.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub span: Span,
    pub function_name: Option<String>,
    pub context: Option<String>,
}

/// The runtime's error value.
#[derive(Debug, Clone)]
pub struct RillError {
    /// Stable, registry-validated identifier.
    pub id: &'static str,
    /// Human message, without the location suffix.
    pub message: String,
    pub location: Option<Span>,
    /// Ordered context map (expected/actual type names and the like).
    pub context: IndexMap<String, serde_json::Value>,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
    /// Frozen call-stack snapshot, innermost frame last.
    pub call_stack: Vec<CallFrame>,
}

impl RillError {
    /// Construct an error with a registered ID. Panics if the ID is not in
    /// the registry — that is a bug in the caller, not in the script.
    pub fn new(id: &str, message: impl Into<String>) -> Self {
        let (id, spec) = registry_entry(id);
        let mut suggestions = Vec::new();
        if let Some(help) = spec.help {
            suggestions.push(help.to_string());
        }
        Self {
            id,
            message: message.into(),
            location: None,
            context: IndexMap::new(),
            suggestions,
            help_url: spec.help_url.map(str::to_string),
            call_stack: Vec::new(),
        }
    }

    /// Construct a runtime-category error, asserting the category matches.
    pub fn runtime(id: &str, message: impl Into<String>) -> Self {
        let err = Self::new(id, message);
        assert_eq!(
            err.category(),
            ErrorCategory::Runtime,
            "expected a runtime error id, got {}",
            err.id
        );
        err
    }

    pub fn category(&self) -> ErrorCategory {
        registry_entry(self.id).1.category
    }

    pub fn at(mut self, span: Span) -> Self {
        self.location = Some(span);
        self
    }

    /// Attach a span only if none is set yet; inner errors keep the more
    /// precise location.
    pub fn at_fallback(mut self, span: Span) -> Self {
        if self.location.is_none() {
            self.location = Some(span);
        }
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_call_stack(mut self, frames: Vec<CallFrame>) -> Self {
        self.call_stack = frames;
        self
    }

    /// Human message with the `at line:col` suffix.
    pub fn message_with_location(&self) -> String {
        match self.location {
            Some(span) => format!("{} at {}", self.message, span.start),
            None => self.message.clone(),
        }
    }

    // -------------------------------------------------------------------
    // Specialised kinds
    // -------------------------------------------------------------------

    /// `RILL-R-Timeout` — a host call lost the race against its deadline.
    pub fn timeout(function_name: &str, limit: Duration, span: Span) -> Self {
        let ms = limit.as_millis() as u64;
        Self::runtime(
            ids::TIMEOUT,
            format!("function '{}' timed out after {}ms", function_name, ms),
        )
        .at(span)
        .with_context("functionName", function_name)
        .with_context("timeoutMs", ms)
    }

    /// `RILL-R-Aborted` — the cancellation signal fired.
    pub fn aborted(span: Option<Span>) -> Self {
        let err = Self::runtime(ids::ABORTED, "execution aborted");
        match span {
            Some(s) => err.at(s),
            None => err,
        }
    }

    /// `RILL-R-AutoException` — a string pipe value matched a configured
    /// pattern.
    pub fn auto_exception(pattern: &str, matched: &str, span: Span) -> Self {
        Self::runtime(
            ids::AUTO_EXCEPTION,
            format!("value matched exception pattern '{}'", pattern),
        )
        .at(span)
        .with_context("pattern", pattern)
        .with_context("matchedValue", matched)
    }
}

impl fmt::Display for RillError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.id, self.message_with_location())
    }
}

impl std::error::Error for RillError {}

// ============================================================================
// Tests
// ============================================================================
