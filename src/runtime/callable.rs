//! Callable Protocol
//!
//! Uniform representation of the three kinds of callable values: script
//! closures, host functions (async, registered by the embedding
//! application), and runtime-builtin methods. All three share the
//! invocation contract implemented in `closures.rs` and `host.rs`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::ast::{Expression, ParamDecl, Span};

use super::context::RuntimeContext;
use super::errors::RillError;
use super::value::Value;

/// A callable value.
#[derive(Clone)]
pub enum Callable {
    Closure(Arc<ClosureValue>),
    Host(Arc<HostFunction>),
    Builtin(&'static BuiltinMethod),
}

impl Callable {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Callable::Closure(_) => "closure",
            Callable::Host(_) => "host function",
            Callable::Builtin(_) => "builtin",
        }
    }

    /// Identity comparison: closures and host functions are equal only to
    /// themselves; builtins compare by name.
    pub fn same_instance(&self, other: &Callable) -> bool {
        match (self, other) {
            (Callable::Closure(a), Callable::Closure(b)) => Arc::ptr_eq(a, b),
            (Callable::Host(a), Callable::Host(b)) => Arc::ptr_eq(a, b),
            (Callable::Builtin(a), Callable::Builtin(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Closure(c) => f
                .debug_struct("Closure")
                .field("params", &c.params.len())
                .field("is_property", &c.is_property)
                .finish(),
            Callable::Host(h) => f.debug_struct("Host").field("name", &h.name).finish(),
            Callable::Builtin(b) => f.debug_struct("Builtin").field("name", &b.name).finish(),
        }
    }
}

// ============================================================================
// Script closures
// ============================================================================

/// A script closure: parameters, body AST, and the lexical environment
/// snapshot taken when the literal was evaluated. The snapshot is
/// immutable once constructed; later writes in the outer scope do not
/// leak in.
#[derive(Debug)]
pub struct ClosureValue {
    pub params: Vec<ParamDecl>,
    pub body: Expression,
    /// Captured variables at literal-evaluation time.
    pub captured: HashMap<String, Value>,
    /// Type locks carried over from the capturing scope.
    pub captured_types: HashMap<String, &'static str>,
    /// The dict this closure was declared in, when declared as a direct
    /// field value of a dict literal. `$` binds to it during invocation.
    pub bound_dict: Option<Value>,
    /// True when declared with zero parameters inside a dict literal;
    /// such closures are auto-invoked on property access.
    pub is_property: bool,
    /// Span of the closure literal, for call-stack frames.
    pub span: Span,
}

// ============================================================================
// Host functions
// ============================================================================

/// Parameter metadata for host functions and builtins.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    /// Declared type name; `any` accepts every value.
    pub type_name: String,
    pub default: Option<Value>,
    /// Per-parameter documentation, counted by the docs-coverage report.
    pub doc: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_name: type_name.into(), default: None, doc: None }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// The async body of a host function. It receives the validated argument
/// values and a mutable handle to the runtime context, and may read or
/// write variables, emit events, or invoke other callables.
pub type HostBody = Arc<
    dyn for<'a> Fn(Vec<Value>, &'a mut RuntimeContext) -> HostFuture<'a> + Send + Sync,
>;

pub type HostFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, RillError>> + Send + 'a>>;

/// A host-registered function.
pub struct HostFunction {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub description: String,
    pub return_type: String,
    /// Per-function timeout; the context default applies when unset.
    pub timeout: Option<Duration>,
    pub body: HostBody,
}

impl HostFunction {
    /// Convenience constructor for the common case.
    pub fn new(
        name: impl Into<String>,
        params: Vec<ParamSpec>,
        description: impl Into<String>,
        return_type: impl Into<String>,
        body: HostBody,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            description: description.into(),
            return_type: return_type.into(),
            timeout: None,
            body,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .finish()
    }
}

// ============================================================================
// Runtime builtins
// ============================================================================

/// A runtime-builtin method (`.len`, `.upper`, `.split`, ...). Builtins
/// are synchronous and dispatched on the receiver's type.
pub struct BuiltinMethod {
    pub name: &'static str,
    /// Receiver type name this method applies to.
    pub receiver: &'static str,
    /// (name, type) pairs for the introspection catalog.
    pub params: &'static [(&'static str, &'static str)],
    pub description: &'static str,
    pub return_type: &'static str,
    pub apply: fn(&Value, &[Value], Span) -> Result<Value, RillError>,
}

impl fmt::Debug for BuiltinMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinMethod")
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .finish()
    }
}

/// Wrap a context-aware host body. The explicit higher-ranked bound
/// pins the closure's signature so inference accepts
/// `host_fn(|args, ctx| Box::pin(async move { ... }))`.
pub fn host_fn<F>(f: F) -> HostBody
where
    F: for<'a> Fn(Vec<Value>, &'a mut RuntimeContext) -> HostFuture<'a> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure that only needs its arguments into a
/// [`HostBody`].
///
/// ```ignore
/// let body = host_body(|args| async move { Ok(args[0].clone()) });
/// ```
pub fn host_body<F, Fut>(f: F) -> HostBody
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RillError>> + Send + 'static,
{
    host_fn(move |args, _ctx| Box::pin(f(args)))
}
