//! Rill runtime: value model, runtime context, and the tree-walking
//! evaluator.

pub mod access;
pub mod callable;
pub mod closures;
pub mod context;
pub mod control_flow;
pub mod errors;
pub mod eval;
pub mod expr;
pub mod host;
pub mod interpolation;
pub mod introspect;
pub mod methods;
pub mod signals;
pub mod type_eval;
pub mod value;

pub use callable::{
    host_body, host_fn, BuiltinMethod, Callable, ClosureValue, HostBody, HostFunction, ParamSpec,
};
pub use context::{
    prefix_functions, AbortSignal, ContextOptions, EventCategory, Extension, LogEvent,
    RuntimeCallbacks, RuntimeContext,
};
pub use errors::{ids, CallFrame, ErrorCategory, RillError};
pub use eval::{create_stepper, execute, execute_source, Execution, Stepper};
pub use introspect::{
    builtin_catalog, docs_coverage, function_catalog, version_info, DocsCoverage, FunctionInfo,
    ParamInfo, VersionInfo,
};
pub use signals::{EvalResult, Interrupt};
pub use value::{Value, VectorData};
