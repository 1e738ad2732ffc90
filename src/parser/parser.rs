//! Recursive-Descent Parser for Rill
//!
//! Grammar summary:
//!
//! ```text
//! script      := statement (NEWLINE statement)*
//! statement   := expression ('->' segment)* terminator?
//! terminator  := ('=>' | ':>') $name (':' type)? | 'break' | 'return'
//! segment     := '.'access-chain | bare-ident | '$name' (bind)
//!              | ':'type | ':?'type | '?' cond-tail | '@[' spread ']'
//!              | iterator | expression
//! expression  := do-while | binary ('?' cond-tail | '@' body)?
//! binary      := precedence ladder (|| && ?? == != < <= > >= + - * / %)
//! unary       := '-' unary | postfix
//! postfix     := primary access* (':'type | ':?'type)*
//! primary     := literal | '$' | '$@' | '$name' | call | '(' chain ')'
//!              | tuple | block | closure | iterator | 'error' expr
//!              | 'assert' expr
//! ```
//!
//! An explicit depth limit guards against stack exhaustion on
//! pathological nesting.

use crate::ast::{
    Access, Block, Callee, CallExpr, ClosureLiteral, Conditional, DoWhileLoop, Expression,
    IterateExpr, IterateKind, ParamDecl, PipeChain, PipeSegment, PipeTarget, Position,
    PostfixExpr, Script, Span, SpreadExpr, Statement, StringTemplate, TemplatePart, Terminator,
    TupleEntry, TupleLiteral, UnaryOp, WhileLoop, BinaryOp,
};
use crate::runtime::errors::{ids, RillError};

use super::lexer::{Lexer, Token, TokenType};
use super::types::{SyntaxError, MAX_PARSER_DEPTH};

/// Parse a complete script.
pub fn parse(source: &str) -> Result<Script, RillError> {
    parse_internal(source).map_err(Into::into)
}

fn parse_internal(source: &str) -> Result<Script, SyntaxError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_script()
}

/// Parse a single expression (used by the `rill-eval` binary and string
/// interpolation).
pub fn parse_expression_source(source: &str) -> Result<Expression, RillError> {
    parse_expression_at(source, Position::new(1, 1, 0)).map_err(Into::into)
}

fn parse_expression_at(source: &str, origin: Position) -> Result<Expression, SyntaxError> {
    let tokens = Lexer::new_at(source, origin).tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.skip_newlines();
    let expr = parser.parse_chain_expression()?;
    parser.skip_newlines();
    parser.expect_eof()?;
    Ok(expr)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    // -------------------------------------------------------------------
    // Token helpers
    // -------------------------------------------------------------------

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens.last().expect("token stream always ends with Eof")
        })
    }

    fn peek(&self) -> &TokenType {
        &self.current().token_type
    }

    fn peek_at(&self, n: usize) -> &TokenType {
        self.tokens
            .get(self.pos + n)
            .map(|t| &t.token_type)
            .unwrap_or(&TokenType::Eof)
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn prev_span(&self) -> Span {
        if self.pos == 0 {
            self.span()
        } else {
            self.tokens[self.pos - 1].span
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &TokenType) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: TokenType, what: &str) -> Result<Token, SyntaxError> {
        if self.peek() == &expected {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> SyntaxError {
        SyntaxError::parse(
            ids::PARSE_UNEXPECTED_TOKEN,
            format!("expected {}, found {}", what, describe(self.peek())),
            self.span(),
        )
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenType::Newline) {
            self.advance();
        }
    }

    fn expect_eof(&self) -> Result<(), SyntaxError> {
        if matches!(self.peek(), TokenType::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            return Err(SyntaxError::parse(
                ids::PARSE_TOO_DEEP,
                format!("nesting exceeds {} levels", MAX_PARSER_DEPTH),
                self.span(),
            ));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    // -------------------------------------------------------------------
    // Script & statements
    // -------------------------------------------------------------------

    pub fn parse_script(&mut self) -> Result<Script, SyntaxError> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek(), TokenType::Eof) {
            statements.push(self.parse_statement()?);
            match self.peek() {
                TokenType::Newline => self.skip_newlines(),
                TokenType::Eof => break,
                _ => return Err(self.unexpected("a newline between statements")),
            }
        }
        Ok(Script { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.span();
        let head = self.parse_expression()?;
        let mut segments = Vec::new();
        let mut terminator = None;

        loop {
            match self.peek() {
                TokenType::Arrow => {
                    self.advance();
                    match self.peek() {
                        TokenType::Break => {
                            let span = self.advance().span;
                            terminator = Some(Terminator::Break(span));
                            break;
                        }
                        TokenType::Return => {
                            let span = self.advance().span;
                            terminator = Some(Terminator::Return(span));
                            break;
                        }
                        _ => segments.push(self.parse_pipe_segment()?),
                    }
                }
                TokenType::FatArrow | TokenType::ColonArrow => {
                    terminator = Some(self.parse_capture()?);
                    break;
                }
                TokenType::Break => {
                    let span = self.advance().span;
                    terminator = Some(Terminator::Break(span));
                    break;
                }
                TokenType::Return => {
                    let span = self.advance().span;
                    terminator = Some(Terminator::Return(span));
                    break;
                }
                _ => break,
            }
        }

        let span = start.merge(self.prev_span());
        let expression = if segments.is_empty() {
            head
        } else {
            Expression::Chain(Box::new(PipeChain { head, segments, span }))
        };
        Ok(Statement { expression, terminator, span })
    }

    fn parse_capture(&mut self) -> Result<Terminator, SyntaxError> {
        let start = self.advance().span; // => or :>
        let name = match self.peek().clone() {
            TokenType::DollarIdent(name) => {
                self.advance();
                name
            }
            _ => return Err(self.unexpected("a capture target like `$name`")),
        };
        let declared_type = if self.eat(&TokenType::Colon) {
            match self.peek().clone() {
                TokenType::Ident(t) => {
                    self.advance();
                    Some(t)
                }
                _ => return Err(self.unexpected("a type name after ':'")),
            }
        } else {
            None
        };
        Ok(Terminator::Capture { name, declared_type, span: start.merge(self.prev_span()) })
    }

    // -------------------------------------------------------------------
    // Pipe chains
    // -------------------------------------------------------------------

    /// Chain expression without statement terminators — used inside
    /// parentheses and interpolations.
    fn parse_chain_expression(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.span();
        let head = self.parse_expression()?;
        let mut segments = Vec::new();
        while matches!(self.peek(), TokenType::Arrow) {
            self.advance();
            segments.push(self.parse_pipe_segment()?);
        }
        if segments.is_empty() {
            Ok(head)
        } else {
            let span = start.merge(self.prev_span());
            Ok(Expression::Chain(Box::new(PipeChain { head, segments, span })))
        }
    }

    fn parse_pipe_segment(&mut self) -> Result<PipeSegment, SyntaxError> {
        let start = self.span();
        let target = self.parse_pipe_target()?;
        Ok(PipeSegment { target, span: start.merge(self.prev_span()) })
    }

    fn parse_pipe_target(&mut self) -> Result<PipeTarget, SyntaxError> {
        let start = self.span();
        match self.peek().clone() {
            // `-> $name` binds the flowing value; anything more complex
            // after the variable makes it an ordinary expression.
            TokenType::DollarIdent(name) if self.is_bare_variable_segment() => {
                let span = self.advance().span;
                Ok(PipeTarget::Bind { name, span })
            }
            // `-> .method`, `-> .field[...]`, `-> .?exists`
            TokenType::Dot | TokenType::DotQuestion => {
                let accesses = self.parse_access_chain()?;
                let span = start.merge(self.prev_span());
                Ok(PipeTarget::Expr(Expression::Postfix(Box::new(PostfixExpr {
                    base: Expression::PipeValue(start),
                    accesses,
                    span,
                }))))
            }
            // `-> :T` / `-> :?T` apply to the flowing value.
            TokenType::Colon => {
                self.advance();
                let type_name = self.expect_type_name()?;
                Ok(PipeTarget::Expr(Expression::TypeAssert {
                    value: None,
                    type_name,
                    span: start.merge(self.prev_span()),
                }))
            }
            TokenType::ColonQuestion => {
                self.advance();
                let type_name = self.expect_type_name()?;
                Ok(PipeTarget::Expr(Expression::TypeCheck {
                    value: None,
                    type_name,
                    span: start.merge(self.prev_span()),
                }))
            }
            // `-> ? then ! else` tests the flowing value.
            TokenType::Question => {
                let cond = self.parse_conditional_tail(None)?;
                Ok(PipeTarget::Expr(cond))
            }
            TokenType::AtBracket => {
                let spread = self.parse_spread()?;
                Ok(PipeTarget::Expr(spread))
            }
            // Bare identifier: auto-invoked binding.
            TokenType::Ident(name) if !matches!(self.peek_at(1), TokenType::LParen) => {
                let span = self.advance().span;
                Ok(PipeTarget::Binding { name, span })
            }
            _ => Ok(PipeTarget::Expr(self.parse_expression()?)),
        }
    }

    /// True when a `$name` segment is just a bind target, with no access
    /// chain or call following it.
    fn is_bare_variable_segment(&self) -> bool {
        !matches!(
            self.peek_at(1),
            TokenType::LParen
                | TokenType::LBracket
                | TokenType::Dot
                | TokenType::DotQuestion
                | TokenType::Colon
                | TokenType::ColonQuestion
                | TokenType::Plus
                | TokenType::Minus
                | TokenType::Star
                | TokenType::Slash
                | TokenType::Percent
                | TokenType::EqEq
                | TokenType::BangEq
                | TokenType::Lt
                | TokenType::Le
                | TokenType::Gt
                | TokenType::Ge
                | TokenType::AmpAmp
                | TokenType::PipePipe
                | TokenType::QuestionQuestion
                | TokenType::Question
                | TokenType::At
        )
    }

    fn parse_spread(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.expect(TokenType::AtBracket, "`@[`")?.span;
        let mut targets = Vec::new();
        loop {
            targets.push(self.parse_expression()?);
            if !self.eat(&TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBracket, "`]` closing the spread")?;
        Ok(Expression::Spread(SpreadExpr { targets, span: start.merge(self.prev_span()) }))
    }

    // -------------------------------------------------------------------
    // Expressions
    // -------------------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expression, SyntaxError> {
        self.enter()?;
        let result = self.parse_expression_inner();
        self.exit();
        result
    }

    fn parse_expression_inner(&mut self) -> Result<Expression, SyntaxError> {
        // `@ body ? cond` — do-while.
        if matches!(self.peek(), TokenType::At) {
            return self.parse_do_while();
        }
        let start = self.span();
        let expr = self.parse_binary(0)?;
        match self.peek() {
            TokenType::Question => self.parse_conditional_tail(Some(expr)),
            TokenType::At => {
                self.advance();
                let body = self.parse_binary(0)?;
                let span = start.merge(self.prev_span());
                Ok(Expression::While(Box::new(WhileLoop { condition: expr, body, span })))
            }
            _ => Ok(expr),
        }
    }

    fn parse_do_while(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.expect(TokenType::At, "`@`")?.span;
        let body = self.parse_primary()?;
        self.expect(TokenType::Question, "`?` introducing the do-while condition")?;
        let condition = self.parse_binary(0)?;
        let span = start.merge(self.prev_span());
        Ok(Expression::DoWhile(Box::new(DoWhileLoop { body, condition, span })))
    }

    /// Parse `? then ! else` given an optional already-parsed condition.
    fn parse_conditional_tail(
        &mut self,
        condition: Option<Expression>,
    ) -> Result<Expression, SyntaxError> {
        let start = condition
            .as_ref()
            .map(|c| c.span())
            .unwrap_or_else(|| self.span());
        self.expect(TokenType::Question, "`?`")?;
        let then_branch = self.parse_binary(0)?;
        // The else branch may itself be a conditional (else-if chain).
        let else_branch = if self.eat(&TokenType::Bang) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let span = start.merge(self.prev_span());
        Ok(Expression::Conditional(Box::new(Conditional {
            condition,
            then_branch,
            else_branch,
            span,
        })))
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expression, SyntaxError> {
        let start = self.span();
        let mut left = self.parse_unary()?;
        loop {
            let (op, prec) = match self.peek() {
                TokenType::PipePipe => (BinaryOp::Or, 1),
                TokenType::AmpAmp => (BinaryOp::And, 2),
                TokenType::QuestionQuestion => (BinaryOp::Coalesce, 3),
                TokenType::EqEq => (BinaryOp::Eq, 4),
                TokenType::BangEq => (BinaryOp::Ne, 4),
                TokenType::Lt => (BinaryOp::Lt, 5),
                TokenType::Le => (BinaryOp::Le, 5),
                TokenType::Gt => (BinaryOp::Gt, 5),
                TokenType::Ge => (BinaryOp::Ge, 5),
                TokenType::Plus => (BinaryOp::Add, 6),
                TokenType::Minus => (BinaryOp::Sub, 6),
                TokenType::Star => (BinaryOp::Mul, 7),
                TokenType::Slash => (BinaryOp::Div, 7),
                TokenType::Percent => (BinaryOp::Mod, 7),
                _ => break,
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = start.merge(self.prev_span());
            left = Expression::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, SyntaxError> {
        if matches!(self.peek(), TokenType::Minus) {
            let start = self.advance().span;
            let operand = self.parse_unary()?;
            let span = start.merge(self.prev_span());
            return Ok(Expression::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.span();
        let mut expr = self.parse_primary()?;

        let accesses = self.parse_access_chain()?;
        if !accesses.is_empty() {
            let span = start.merge(self.prev_span());
            expr = Expression::Postfix(Box::new(PostfixExpr { base: expr, accesses, span }));
        }

        // `expr:T` / `expr:?T` suffixes.
        loop {
            match self.peek() {
                TokenType::Colon if matches!(self.peek_at(1), TokenType::Ident(_)) => {
                    self.advance();
                    let type_name = self.expect_type_name()?;
                    let span = start.merge(self.prev_span());
                    expr = Expression::TypeAssert {
                        value: Some(Box::new(expr)),
                        type_name,
                        span,
                    };
                }
                TokenType::ColonQuestion if matches!(self.peek_at(1), TokenType::Ident(_)) => {
                    self.advance();
                    let type_name = self.expect_type_name()?;
                    let span = start.merge(self.prev_span());
                    expr = Expression::TypeCheck {
                        value: Some(Box::new(expr)),
                        type_name,
                        span,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_access_chain(&mut self) -> Result<Vec<Access>, SyntaxError> {
        let mut accesses = Vec::new();
        loop {
            match self.peek() {
                TokenType::Dot => {
                    let start = self.advance().span;
                    match self.peek().clone() {
                        TokenType::Ident(name) => {
                            self.advance();
                            if matches!(self.peek(), TokenType::LParen) {
                                let args = self.parse_call_args()?;
                                accesses.push(Access::Method {
                                    name,
                                    args,
                                    span: start.merge(self.prev_span()),
                                });
                            } else {
                                accesses.push(Access::Field {
                                    name,
                                    span: start.merge(self.prev_span()),
                                });
                            }
                        }
                        TokenType::DollarIdent(name) => {
                            self.advance();
                            accesses.push(Access::VarKey {
                                name,
                                span: start.merge(self.prev_span()),
                            });
                        }
                        TokenType::LParen => {
                            self.advance();
                            accesses.push(self.parse_paren_access(start)?);
                        }
                        _ => return Err(self.unexpected("a field name after '.'")),
                    }
                }
                TokenType::DotQuestion => {
                    let start = self.advance().span;
                    accesses.push(self.parse_exists_access(start)?);
                }
                TokenType::LBracket => {
                    let start = self.advance().span;
                    let index = self.parse_expression()?;
                    self.expect(TokenType::RBracket, "`]` closing the index")?;
                    accesses.push(Access::Index {
                        index,
                        span: start.merge(self.prev_span()),
                    });
                }
                _ => break,
            }
        }
        Ok(accesses)
    }

    /// After `.(`: either alternatives (`a || b || c`) or a computed key.
    fn parse_paren_access(&mut self, start: Span) -> Result<Access, SyntaxError> {
        let is_alternatives = matches!(self.peek(), TokenType::Ident(_))
            && matches!(self.peek_at(1), TokenType::PipePipe | TokenType::RParen);
        if is_alternatives {
            let mut keys = Vec::new();
            loop {
                match self.peek().clone() {
                    TokenType::Ident(name) => {
                        self.advance();
                        keys.push(name);
                    }
                    _ => return Err(self.unexpected("a field name")),
                }
                if !self.eat(&TokenType::PipePipe) {
                    break;
                }
            }
            self.expect(TokenType::RParen, "`)` closing the alternatives")?;
            Ok(Access::Alternatives { keys, span: start.merge(self.prev_span()) })
        } else {
            let expr = self.parse_chain_expression()?;
            self.expect(TokenType::RParen, "`)` closing the computed key")?;
            Ok(Access::Computed { expr, span: start.merge(self.prev_span()) })
        }
    }

    /// After `.?`: a dotted field path with an optional `&type` suffix.
    fn parse_exists_access(&mut self, start: Span) -> Result<Access, SyntaxError> {
        let mut path = Vec::new();
        match self.peek().clone() {
            TokenType::Ident(name) => {
                self.advance();
                path.push(name);
            }
            _ => return Err(self.unexpected("a field name after '.?'")),
        }
        while matches!(self.peek(), TokenType::Dot)
            && matches!(self.peek_at(1), TokenType::Ident(_))
        {
            self.advance();
            match self.peek().clone() {
                TokenType::Ident(name) => {
                    self.advance();
                    path.push(name);
                }
                _ => unreachable!("guarded by peek_at"),
            }
        }
        let type_name = if self.eat(&TokenType::Amp) {
            Some(self.expect_type_name()?)
        } else {
            None
        };
        Ok(Access::Exists { path, type_name, span: start.merge(self.prev_span()) })
    }

    fn expect_type_name(&mut self) -> Result<String, SyntaxError> {
        match self.peek().clone() {
            TokenType::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a type name")),
        }
    }

    // -------------------------------------------------------------------
    // Primaries
    // -------------------------------------------------------------------

    fn parse_primary(&mut self) -> Result<Expression, SyntaxError> {
        self.enter()?;
        let result = self.parse_primary_inner();
        self.exit();
        result
    }

    fn parse_primary_inner(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.span();
        match self.peek().clone() {
            TokenType::Number(n) => {
                self.advance();
                Ok(Expression::Number(n, start))
            }
            TokenType::Str { raw } => {
                self.advance();
                let template = parse_template(&raw, start)?;
                Ok(Expression::StringTemplate(template))
            }
            TokenType::True => {
                self.advance();
                Ok(Expression::Bool(true, start))
            }
            TokenType::False => {
                self.advance();
                Ok(Expression::Bool(false, start))
            }
            TokenType::Null => {
                self.advance();
                Ok(Expression::Null(start))
            }
            TokenType::Dollar => {
                self.advance();
                Ok(Expression::PipeValue(start))
            }
            TokenType::DollarAt => {
                self.advance();
                Ok(Expression::Accumulator(start))
            }
            TokenType::DollarIdent(name) => {
                self.advance();
                if matches!(self.peek(), TokenType::LParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expression::Call(Box::new(CallExpr {
                        callee: Callee::Var(name),
                        args,
                        span: start.merge(self.prev_span()),
                    })))
                } else {
                    Ok(Expression::Variable { name, span: start })
                }
            }
            TokenType::Ident(name) => {
                self.advance();
                if matches!(self.peek(), TokenType::LParen) {
                    let args = self.parse_call_args()?;
                    Ok(Expression::Call(Box::new(CallExpr {
                        callee: Callee::Named(name),
                        args,
                        span: start.merge(self.prev_span()),
                    })))
                } else {
                    Err(SyntaxError::parse(
                        ids::PARSE_UNEXPECTED_TOKEN,
                        format!("unexpected identifier '{}'", name),
                        start,
                    ))
                }
            }
            TokenType::Each | TokenType::Map | TokenType::Fold | TokenType::Filter => {
                self.parse_iterate()
            }
            TokenType::ErrorKw => {
                self.advance();
                if matches!(
                    self.peek(),
                    TokenType::Newline | TokenType::Eof | TokenType::RBrace
                ) {
                    return Err(SyntaxError::parse(
                        ids::PARSE_ERROR_REQUIRES_MESSAGE,
                        "error statement requires a message".to_string(),
                        start,
                    ));
                }
                let message = self.parse_binary(0)?;
                Ok(Expression::Raise {
                    message: Box::new(message),
                    span: start.merge(self.prev_span()),
                })
            }
            TokenType::AssertKw => {
                self.advance();
                let condition = self.parse_binary(0)?;
                Ok(Expression::Assert {
                    condition: Box::new(condition),
                    span: start.merge(self.prev_span()),
                })
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_chain_expression()?;
                self.expect(TokenType::RParen, "`)`")?;
                Ok(expr)
            }
            TokenType::LBracket => self.parse_tuple(),
            TokenType::LBrace => self.parse_block().map(Expression::Block),
            TokenType::Pipe | TokenType::PipePipe => self.parse_closure(),
            TokenType::AtBracket => self.parse_spread(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expression>, SyntaxError> {
        self.expect(TokenType::LParen, "`(`")?;
        let mut args = Vec::new();
        if self.eat(&TokenType::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_chain_expression()?);
            if !self.eat(&TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen, "`)` closing the arguments")?;
        Ok(args)
    }

    fn parse_tuple(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.expect(TokenType::LBracket, "`[`")?.span;

        // `[:]` — empty dict.
        if matches!(self.peek(), TokenType::Colon) && matches!(self.peek_at(1), TokenType::RBracket)
        {
            self.advance();
            self.advance();
            return Ok(Expression::Tuple(TupleLiteral {
                entries: Vec::new(),
                explicit_dict: true,
                span: start.merge(self.prev_span()),
            }));
        }
        // `[]` — empty list.
        if self.eat(&TokenType::RBracket) {
            return Ok(Expression::Tuple(TupleLiteral {
                entries: Vec::new(),
                explicit_dict: false,
                span: start.merge(self.prev_span()),
            }));
        }

        let mut entries = Vec::new();
        loop {
            let entry_start = self.span();
            let key = match self.peek().clone() {
                TokenType::Ident(name) if matches!(self.peek_at(1), TokenType::Colon) => {
                    self.advance();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let value = self.parse_chain_expression()?;
            entries.push(TupleEntry {
                key,
                value,
                span: entry_start.merge(self.prev_span()),
            });
            if !self.eat(&TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBracket, "`]` closing the tuple")?;
        Ok(Expression::Tuple(TupleLiteral {
            entries,
            explicit_dict: false,
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        let start = self.expect(TokenType::LBrace, "`{`")?.span;
        self.skip_newlines();
        if matches!(self.peek(), TokenType::RBrace) {
            return Err(SyntaxError::parse(
                ids::PARSE_EMPTY_BLOCK,
                "empty block".to_string(),
                start.merge(self.span()),
            ));
        }
        let mut statements = Vec::new();
        loop {
            statements.push(self.parse_statement()?);
            self.skip_newlines();
            if matches!(self.peek(), TokenType::RBrace) {
                break;
            }
            if matches!(self.peek(), TokenType::Eof) {
                return Err(self.unexpected("`}` closing the block"));
            }
        }
        self.expect(TokenType::RBrace, "`}`")?;
        Ok(Block { statements, span: start.merge(self.prev_span()) })
    }

    fn parse_closure(&mut self) -> Result<Expression, SyntaxError> {
        let start = self.span();
        let params = match self.peek() {
            // `||` introduces a zero-parameter closure.
            TokenType::PipePipe => {
                self.advance();
                Vec::new()
            }
            TokenType::Pipe => {
                self.advance();
                let mut params = Vec::new();
                loop {
                    let param_start = self.span();
                    let name = match self.peek().clone() {
                        TokenType::Ident(name) => {
                            self.advance();
                            name
                        }
                        _ => return Err(self.unexpected("a parameter name")),
                    };
                    let default = if self.eat(&TokenType::Equals) {
                        Some(self.parse_binary(0)?)
                    } else {
                        None
                    };
                    params.push(ParamDecl {
                        name,
                        default,
                        span: param_start.merge(self.prev_span()),
                    });
                    if !self.eat(&TokenType::Comma) {
                        break;
                    }
                }
                self.expect(TokenType::Pipe, "`|` closing the parameter list")?;
                params
            }
            _ => return Err(self.unexpected("a closure")),
        };
        let body = self.parse_primary()?;
        Ok(Expression::Closure(ClosureLiteral {
            params,
            body: Box::new(body),
            span: start.merge(self.prev_span()),
        }))
    }

    fn parse_iterate(&mut self) -> Result<Expression, SyntaxError> {
        let token = self.advance();
        let start = token.span;
        let kind = match token.token_type {
            TokenType::Each => IterateKind::Each,
            TokenType::Map => IterateKind::Map,
            TokenType::Fold => IterateKind::Fold,
            TokenType::Filter => IterateKind::Filter,
            _ => unreachable!("caller checked the keyword"),
        };
        let init = if self.eat(&TokenType::LParen) {
            let expr = self.parse_chain_expression()?;
            self.expect(TokenType::RParen, "`)` closing the initial accumulator")?;
            Some(expr)
        } else {
            None
        };
        let body = self.parse_primary()?;
        Ok(Expression::Iterate(Box::new(IterateExpr {
            kind,
            init,
            body,
            span: start.merge(self.prev_span()),
        })))
    }
}

// ============================================================================
// String templates
// ============================================================================

/// Split a raw string literal into text and interpolation parts. `{{` and
/// `}}` render as literal braces; interpolation expressions may nest
/// braces and contain string literals.
fn parse_template(raw: &str, span: Span) -> Result<StringTemplate, SyntaxError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                text.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                text.push('}');
                i += 2;
            }
            '{' => {
                let close = find_interpolation_end(&chars, i + 1).ok_or_else(|| {
                    SyntaxError::parse(
                        ids::PARSE_UNTERMINATED_INTERPOLATION,
                        "unterminated interpolation".to_string(),
                        span,
                    )
                })?;
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                }
                let snippet: String = chars[i + 1..close].iter().collect();
                let expr = parse_expression_at(&snippet, span.start)?;
                parts.push(TemplatePart::Expr(expr));
                i = close + 1;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    if !text.is_empty() || parts.is_empty() {
        parts.push(TemplatePart::Text(text));
    }
    Ok(StringTemplate { parts, span })
}

/// Find the `}` closing an interpolation, honouring nested braces and
/// string literals inside the expression.
fn find_interpolation_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn describe(token: &TokenType) -> String {
    match token {
        TokenType::Number(n) => format!("number {}", n),
        TokenType::Str { .. } => "a string".to_string(),
        TokenType::Ident(name) => format!("identifier '{}'", name),
        TokenType::DollarIdent(name) => format!("variable '${}'", name),
        TokenType::Newline => "end of line".to_string(),
        TokenType::Eof => "end of input".to_string(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Statement {
        let script = parse(source).unwrap();
        assert_eq!(script.statements.len(), 1, "expected one statement");
        script.statements.into_iter().next().unwrap()
    }

    #[test]
    fn test_parse_pipe_chain_with_terminator() {
        let stmt = parse_one("[1,2,3] -> map { $ * 2 } => $out");
        let Expression::Chain(chain) = &stmt.expression else {
            panic!("expected a chain");
        };
        assert_eq!(chain.segments.len(), 1);
        assert!(matches!(
            stmt.terminator,
            Some(Terminator::Capture { ref name, .. }) if name == "out"
        ));
    }

    #[test]
    fn test_parse_capture_with_type() {
        let stmt = parse_one("42 => $n:number");
        assert!(matches!(
            stmt.terminator,
            Some(Terminator::Capture { ref name, declared_type: Some(ref t), .. })
                if name == "n" && t == "number"
        ));
    }

    #[test]
    fn test_parse_bind_segment() {
        let stmt = parse_one("[1,2] -> $arr");
        let Expression::Chain(chain) = &stmt.expression else {
            panic!("expected a chain");
        };
        assert!(matches!(
            chain.segments[0].target,
            PipeTarget::Bind { ref name, .. } if name == "arr"
        ));
    }

    #[test]
    fn test_parse_bare_binding_segment() {
        let stmt = parse_one("5 -> double");
        let Expression::Chain(chain) = &stmt.expression else {
            panic!("expected a chain");
        };
        assert!(matches!(
            chain.segments[0].target,
            PipeTarget::Binding { ref name, .. } if name == "double"
        ));
    }

    #[test]
    fn test_parse_method_segment() {
        let stmt = parse_one("\"a,b\" -> .split(\",\")");
        let Expression::Chain(chain) = &stmt.expression else {
            panic!("expected a chain");
        };
        let PipeTarget::Expr(Expression::Postfix(postfix)) = &chain.segments[0].target else {
            panic!("expected a postfix segment");
        };
        assert!(matches!(postfix.base, Expression::PipeValue(_)));
        assert!(matches!(
            postfix.accesses[0],
            Access::Method { ref name, ref args, .. } if name == "split" && args.len() == 1
        ));
    }

    #[test]
    fn test_parse_while_loop() {
        let stmt = parse_one("0 -> ($ < 10) @ { $ + 1 }");
        let Expression::Chain(chain) = &stmt.expression else {
            panic!("expected a chain");
        };
        assert!(matches!(
            chain.segments[0].target,
            PipeTarget::Expr(Expression::While(_))
        ));
    }

    #[test]
    fn test_parse_do_while() {
        let stmt = parse_one("0 -> @ { $ + 1 } ? ($ < 3)");
        let Expression::Chain(chain) = &stmt.expression else {
            panic!("expected a chain");
        };
        assert!(matches!(
            chain.segments[0].target,
            PipeTarget::Expr(Expression::DoWhile(_))
        ));
    }

    #[test]
    fn test_parse_closure_with_defaults() {
        let stmt = parse_one("|x, y = 10| ($x + $y)");
        let Expression::Closure(closure) = &stmt.expression else {
            panic!("expected a closure");
        };
        assert_eq!(closure.params.len(), 2);
        assert_eq!(closure.params[0].name, "x");
        assert!(closure.params[0].default.is_none());
        assert!(closure.params[1].default.is_some());
    }

    #[test]
    fn test_parse_zero_param_closure() {
        let stmt = parse_one("|| { 1 }");
        let Expression::Closure(closure) = &stmt.expression else {
            panic!("expected a closure");
        };
        assert!(closure.params.is_empty());
    }

    #[test]
    fn test_parse_dict_literal() {
        let stmt = parse_one("[name:\"Eve\", age:30]");
        let Expression::Tuple(tuple) = &stmt.expression else {
            panic!("expected a tuple");
        };
        assert_eq!(tuple.entries.len(), 2);
        assert_eq!(tuple.entries[0].key.as_deref(), Some("name"));
    }

    #[test]
    fn test_parse_empty_dict_and_list() {
        let stmt = parse_one("[:]");
        let Expression::Tuple(tuple) = &stmt.expression else {
            panic!("expected a tuple");
        };
        assert!(tuple.explicit_dict);

        let stmt = parse_one("[]");
        let Expression::Tuple(tuple) = &stmt.expression else {
            panic!("expected a tuple");
        };
        assert!(!tuple.explicit_dict);
        assert!(tuple.entries.is_empty());
    }

    #[test]
    fn test_parse_alternatives_vs_computed() {
        let stmt = parse_one("$d.(a || b)");
        let Expression::Postfix(postfix) = &stmt.expression else {
            panic!("expected a postfix");
        };
        assert!(matches!(
            postfix.accesses[0],
            Access::Alternatives { ref keys, .. } if keys == &["a".to_string(), "b".to_string()]
        ));

        let stmt = parse_one("$d.(\"a\" + \"b\")");
        let Expression::Postfix(postfix) = &stmt.expression else {
            panic!("expected a postfix");
        };
        assert!(matches!(postfix.accesses[0], Access::Computed { .. }));
    }

    #[test]
    fn test_parse_exists_with_type() {
        let stmt = parse_one("$d.?meta.age&number");
        let Expression::Postfix(postfix) = &stmt.expression else {
            panic!("expected a postfix");
        };
        assert!(matches!(
            postfix.accesses[0],
            Access::Exists { ref path, type_name: Some(ref t), .. }
                if path == &["meta".to_string(), "age".to_string()] && t == "number"
        ));
    }

    #[test]
    fn test_parse_type_suffixes() {
        let stmt = parse_one("42:number");
        assert!(matches!(stmt.expression, Expression::TypeAssert { .. }));
        let stmt = parse_one("42:?number");
        assert!(matches!(stmt.expression, Expression::TypeCheck { .. }));
    }

    #[test]
    fn test_parse_break_terminator() {
        let stmt = parse_one("99 -> break");
        assert!(matches!(stmt.terminator, Some(Terminator::Break(_))));
        let stmt = parse_one("1 -> return");
        assert!(matches!(stmt.terminator, Some(Terminator::Return(_))));
    }

    #[test]
    fn test_parse_template_parts() {
        let template = parse_template("a {$x} b {{c}}", Span::default()).unwrap();
        assert_eq!(template.parts.len(), 3);
        assert!(matches!(&template.parts[0], TemplatePart::Text(t) if t == "a "));
        assert!(matches!(&template.parts[1], TemplatePart::Expr(_)));
        assert!(matches!(&template.parts[2], TemplatePart::Text(t) if t == " b {c}"));
    }

    #[test]
    fn test_template_nested_braces_and_strings() {
        let template = parse_template("v={[a:1].a ?? \"}\"}", Span::default()).unwrap();
        assert_eq!(template.parts.len(), 2);
        assert!(matches!(&template.parts[1], TemplatePart::Expr(_)));
    }

    #[test]
    fn test_empty_block_rejected() {
        let err = parse("{ }").unwrap_err();
        assert_eq!(err.id, ids::PARSE_EMPTY_BLOCK);
    }

    #[test]
    fn test_error_requires_message() {
        let err = parse("error").unwrap_err();
        assert_eq!(err.id, ids::PARSE_ERROR_REQUIRES_MESSAGE);
    }

    #[test]
    fn test_unexpected_token_has_span() {
        let err = parse("1 +").unwrap_err();
        assert_eq!(err.id, ids::PARSE_UNEXPECTED_TOKEN);
        assert!(err.location.is_some());
    }

    #[test]
    fn test_deep_nesting_guard() {
        let source = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        let err = parse(&source).unwrap_err();
        assert_eq!(err.id, ids::PARSE_TOO_DEEP);
    }

    #[test]
    fn test_multi_statement_script() {
        let script = parse("1 => $a\n$a + 1\n").unwrap();
        assert_eq!(script.statements.len(), 2);
    }
}
