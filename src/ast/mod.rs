//! AST module for Rill scripts.

pub mod types;

pub use types::*;
