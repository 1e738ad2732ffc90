//! Abstract Syntax Tree (AST) Types for Rill
//!
//! This module defines the complete AST structure for Rill scripts.
//! Every node carries a source span so that diagnostics survive all the
//! way from evaluation back to the editor.

use std::fmt;

// =============================================================================
// BASE TYPES
// =============================================================================

/// Position information for error reporting. Lines and columns are 1-indexed;
/// `offset` is the byte offset into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Span in source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: if self.start.offset <= other.start.offset { self.start } else { other.start },
            end: if self.end.offset >= other.end.offset { self.end } else { other.end },
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

// =============================================================================
// SCRIPT & STATEMENTS
// =============================================================================

/// Root node: a complete script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

/// A statement is a pipe chain with an optional terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub expression: Expression,
    pub terminator: Option<Terminator>,
    pub span: Span,
}

/// Statement terminators: capture into a variable, break out of the
/// enclosing loop/iterator, or return from the enclosing closure.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// `=> $name` or `:> $name`, with an optional `:type` annotation.
    Capture {
        name: String,
        declared_type: Option<String>,
        span: Span,
    },
    Break(Span),
    Return(Span),
}

// =============================================================================
// PIPE CHAINS
// =============================================================================

/// A pipe chain: head expression plus `->` segments.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeChain {
    pub head: Expression,
    pub segments: Vec<PipeSegment>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipeSegment {
    pub target: PipeTarget,
    pub span: Span,
}

/// What a pipe segment does with the upstream value.
#[derive(Debug, Clone, PartialEq)]
pub enum PipeTarget {
    /// `$name` — bind the upstream value into a variable; the value keeps
    /// flowing down the chain.
    Bind { name: String, span: Span },
    /// A bare identifier. The upstream value flows in as `$`; if the name
    /// resolves to a callable it is auto-invoked with `$` as the single
    /// argument.
    Binding { name: String, span: Span },
    /// Any other expression, evaluated with `$` set to the upstream value.
    Expr(Expression),
}

// =============================================================================
// EXPRESSIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Null(Span),
    Bool(bool, Span),
    Number(f64, Span),
    /// String literal with interpolation parts.
    StringTemplate(StringTemplate),
    /// `[...]` tuple literal: list or dict depending on its entries.
    Tuple(TupleLiteral),
    /// Bare `$`.
    PipeValue(Span),
    /// `$@` — the accumulator inside `each(init)`/`fold` bodies.
    Accumulator(Span),
    /// `$name`.
    Variable { name: String, span: Span },
    /// A nested pipe chain (inside parentheses or as a statement body).
    Chain(Box<PipeChain>),
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
        span: Span,
    },
    /// Primary with an access chain: `$d.user[0].name`.
    Postfix(Box<PostfixExpr>),
    Closure(ClosureLiteral),
    Block(Block),
    Conditional(Box<Conditional>),
    While(Box<WhileLoop>),
    DoWhile(Box<DoWhileLoop>),
    /// `each` / `map` / `fold` / `filter` over the pipe value.
    Iterate(Box<IterateExpr>),
    /// `@[f1, f2, ...]` sequential spread.
    Spread(SpreadExpr),
    /// `name(args)` or `$var(args)`.
    Call(Box<CallExpr>),
    /// `expr:T` or bare `:T` (applies to `$`).
    TypeAssert {
        value: Option<Box<Expression>>,
        type_name: String,
        span: Span,
    },
    /// `expr:?T` or bare `:?T`.
    TypeCheck {
        value: Option<Box<Expression>>,
        type_name: String,
        span: Span,
    },
    /// `error <message>` — raise a runtime error.
    Raise { message: Box<Expression>, span: Span },
    /// `assert <condition>` — fail unless the condition is truthy.
    Assert { condition: Box<Expression>, span: Span },
}

impl Expression {
    /// Source span of this expression.
    pub fn span(&self) -> Span {
        match self {
            Expression::Null(s)
            | Expression::Bool(_, s)
            | Expression::Number(_, s)
            | Expression::PipeValue(s)
            | Expression::Accumulator(s) => *s,
            Expression::StringTemplate(t) => t.span,
            Expression::Tuple(t) => t.span,
            Expression::Variable { span, .. } => *span,
            Expression::Chain(c) => c.span,
            Expression::Binary { span, .. } => *span,
            Expression::Unary { span, .. } => *span,
            Expression::Postfix(p) => p.span,
            Expression::Closure(c) => c.span,
            Expression::Block(b) => b.span,
            Expression::Conditional(c) => c.span,
            Expression::While(w) => w.span,
            Expression::DoWhile(w) => w.span,
            Expression::Iterate(i) => i.span,
            Expression::Spread(s) => s.span,
            Expression::Call(c) => c.span,
            Expression::TypeAssert { span, .. } => *span,
            Expression::TypeCheck { span, .. } => *span,
            Expression::Raise { span, .. } => *span,
            Expression::Assert { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// `??` — left if present and non-null, else right.
    Coalesce,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Coalesce => "??",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

// =============================================================================
// STRING TEMPLATES
// =============================================================================

/// A string literal as an ordered list of plain-text and interpolation parts.
#[derive(Debug, Clone, PartialEq)]
pub struct StringTemplate {
    pub parts: Vec<TemplatePart>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expression),
}

impl StringTemplate {
    /// Build a template holding a single plain-text part.
    pub fn plain(text: impl Into<String>, span: Span) -> Self {
        Self { parts: vec![TemplatePart::Text(text.into())], span }
    }
}

// =============================================================================
// TUPLE LITERALS
// =============================================================================

/// `[...]` literal. All-positional entries yield a list; any named entry
/// makes the whole literal a dict. `[:]` is the empty dict.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleLiteral {
    pub entries: Vec<TupleEntry>,
    /// True for the explicit empty-dict form `[:]`.
    pub explicit_dict: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleEntry {
    pub key: Option<String>,
    pub value: Expression,
    pub span: Span,
}

// =============================================================================
// CLOSURES & BLOCKS
// =============================================================================

/// `|a, b = 0| body` — closure literal. `||` introduces a zero-parameter
/// closure.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureLiteral {
    pub params: Vec<ParamDecl>,
    pub body: Box<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub default: Option<Expression>,
    pub span: Span,
}

/// `{ ... }` — statements evaluated in order; the block's value is the
/// value of its last statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

// =============================================================================
// CONTROL FLOW
// =============================================================================

/// `cond ? then ! else`. In pipe position the condition may be omitted;
/// the upstream pipe value is tested instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: Option<Expression>,
    pub then_branch: Expression,
    pub else_branch: Option<Expression>,
    pub span: Span,
}

/// `cond @ body`.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoop {
    pub condition: Expression,
    pub body: Expression,
    pub span: Span,
}

/// `@ body ? cond` — body runs before the first condition check.
#[derive(Debug, Clone, PartialEq)]
pub struct DoWhileLoop {
    pub body: Expression,
    pub condition: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterateKind {
    Each,
    Map,
    Fold,
    Filter,
}

impl fmt::Display for IterateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IterateKind::Each => "each",
            IterateKind::Map => "map",
            IterateKind::Fold => "fold",
            IterateKind::Filter => "filter",
        };
        write!(f, "{}", s)
    }
}

/// `each { ... }`, `each(init) { ... }`, `map { ... }`, `fold(init) { ... }`,
/// `filter { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct IterateExpr {
    pub kind: IterateKind,
    pub init: Option<Expression>,
    pub body: Expression,
    pub span: Span,
}

/// `@[f1, f2, ...]` — thread the pipe value through each callable in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadExpr {
    pub targets: Vec<Expression>,
    pub span: Span,
}

// =============================================================================
// CALLS & ACCESS CHAINS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub callee: Callee,
    pub args: Vec<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    /// `name(args)` — host function, falling back to a variable holding a
    /// callable.
    Named(String),
    /// `$var(args)`.
    Var(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostfixExpr {
    pub base: Expression,
    pub accesses: Vec<Access>,
    pub span: Span,
}

/// One step of an access chain, applied left-to-right.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    /// `.field` — dict field, falling back to a builtin method.
    Field { name: String, span: Span },
    /// `.name(args)` — explicit method/closure-field call.
    Method { name: String, args: Vec<Expression>, span: Span },
    /// `[expr]` — numeric index or dict key.
    Index { index: Expression, span: Span },
    /// `.$var` — key read from a variable.
    VarKey { name: String, span: Span },
    /// `.(expr)` — computed key.
    Computed { expr: Expression, span: Span },
    /// `.(a || b || ...)` — first present key wins.
    Alternatives { keys: Vec<String>, span: Span },
    /// `.?a.b` / `.?a&T` — existence (and type) check over a field path.
    Exists { path: Vec<String>, type_name: Option<String>, span: Span },
}

impl Access {
    pub fn span(&self) -> Span {
        match self {
            Access::Field { span, .. }
            | Access::Method { span, .. }
            | Access::Index { span, .. }
            | Access::VarKey { span, .. }
            | Access::Computed { span, .. }
            | Access::Alternatives { span, .. }
            | Access::Exists { span, .. } => *span,
        }
    }
}
