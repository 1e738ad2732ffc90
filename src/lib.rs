//! rill - an embeddable pipe-oriented scripting language
//!
//! This library provides the parser and tree-walking runtime for Rill
//! scripts: a host constructs a [`runtime::RuntimeContext`], registers
//! typed host functions, and executes parsed scripts that flow values
//! through pipelines of methods, closures, and control constructs.

pub mod ast;
pub mod diagnostics;
pub mod parser;
pub mod runtime;

pub use ast::{Script, Span};
pub use parser::{parse, parse_expression_source};
pub use runtime::{
    create_stepper, execute, execute_source, host_body, host_fn, prefix_functions, AbortSignal,
    ContextOptions, Execution, Extension, HostFunction, ParamSpec, RillError, RuntimeCallbacks,
    RuntimeContext, Stepper, Value,
};
