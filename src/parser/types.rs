//! Parser Types and Limits
//!
//! Shared error type and resource limits for the lexer and parser.

use thiserror::Error;

use crate::ast::Span;
use crate::runtime::errors::RillError;

// Limits to prevent hangs and resource exhaustion on malformed input.
pub const MAX_INPUT_SIZE: usize = 1_000_000;
pub const MAX_TOKENS: usize = 100_000;
pub const MAX_PARSER_DEPTH: usize = 200;

/// A lex or parse failure, carrying the registered error ID and span.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SyntaxError {
    id: &'static str,
    message: String,
    span: Span,
}

impl SyntaxError {
    pub fn lex(id: &'static str, message: String, span: Span) -> Self {
        Self { id, message, span }
    }

    pub fn parse(id: &'static str, message: String, span: Span) -> Self {
        Self { id, message, span }
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

impl From<SyntaxError> for RillError {
    fn from(e: SyntaxError) -> Self {
        RillError::new(e.id, e.message).at(e.span)
    }
}
