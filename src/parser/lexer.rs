//! Lexer for Rill source
//!
//! Hand-rolled scanner producing spanned tokens. Newlines separate
//! statements, so they are tokens — except inside parentheses and
//! brackets, where they are layout. Input-size and token-count limits
//! keep malformed input from hanging the front-end.

use std::collections::HashMap;

use crate::ast::{Position, Span};
use crate::runtime::errors::ids;

use super::types::{SyntaxError, MAX_INPUT_SIZE, MAX_TOKENS};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenType {
    // Literals & names
    Number(f64),
    /// Raw string contents; interpolation is split out by the parser.
    Str { raw: String },
    Ident(String),
    /// `$`
    Dollar,
    /// `$name`
    DollarIdent(String),
    /// `$@`
    DollarAt,

    // Keywords
    Each,
    Map,
    Fold,
    Filter,
    Break,
    Return,
    ErrorKw,
    AssertKw,
    True,
    False,
    Null,

    // Operators & punctuation
    Arrow,        // ->
    FatArrow,     // =>
    ColonArrow,   // :>
    Question,     // ?
    Bang,         // !
    At,           // @
    AtBracket,    // @[
    PipePipe,     // ||
    Pipe,         // |
    AmpAmp,       // &&
    Amp,          // &
    EqEq,         // ==
    BangEq,       // !=
    Le,           // <=
    Ge,           // >=
    Lt,           // <
    Gt,           // >
    QuestionQuestion, // ??
    DotQuestion,  // .?
    ColonQuestion, // :?
    Dot,          // .
    Colon,        // :
    Comma,        // ,
    Equals,       // =
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub span: Span,
}

lazy_static::lazy_static! {
    /// Reserved words.
    static ref KEYWORDS: HashMap<&'static str, TokenType> = {
        let mut m = HashMap::new();
        m.insert("each", TokenType::Each);
        m.insert("map", TokenType::Map);
        m.insert("fold", TokenType::Fold);
        m.insert("filter", TokenType::Filter);
        m.insert("break", TokenType::Break);
        m.insert("return", TokenType::Return);
        m.insert("error", TokenType::ErrorKw);
        m.insert("assert", TokenType::AssertKw);
        m.insert("true", TokenType::True);
        m.insert("false", TokenType::False);
        m.insert("null", TokenType::Null);
        m
    };
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    offset: usize,
    /// Open `(`/`[` delimiters; newlines inside them are layout.
    bracket_depth: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::new_at(source, Position::new(1, 1, 0))
    }

    /// Start scanning at a given origin — used when sub-parsing string
    /// interpolation so spans point into the enclosing source.
    pub fn new_at(source: &str, origin: Position) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: origin.line,
            column: origin.column,
            offset: origin.offset,
            bracket_depth: 0,
        }
    }

    /// Scan the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        if self.chars.len() > MAX_INPUT_SIZE {
            return Err(SyntaxError::lex(
                ids::LEX_INPUT_TOO_LARGE,
                format!("input exceeds {} characters", MAX_INPUT_SIZE),
                Span::default(),
            ));
        }
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.token_type == TokenType::Eof;
            // Collapse runs of newlines.
            let redundant = token.token_type == TokenType::Newline
                && matches!(
                    tokens.last().map(|t: &Token| &t.token_type),
                    None | Some(TokenType::Newline)
                );
            if !redundant {
                tokens.push(token);
            }
            if done {
                break;
            }
            if tokens.len() > MAX_TOKENS {
                return Err(SyntaxError::lex(
                    ids::LEX_INPUT_TOO_LARGE,
                    format!("input exceeds {} tokens", MAX_TOKENS),
                    self.here(),
                ));
            }
        }
        Ok(tokens)
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column, self.offset)
    }

    fn here(&self) -> Span {
        Span::new(self.position(), self.position())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn token(&self, token_type: TokenType, start: Position) -> Token {
        Token { token_type, span: Span::new(start, self.position()) }
    }

    fn next_token(&mut self) -> Result<Token, SyntaxError> {
        // Inside parens/brackets newlines are layout, not separators.
        loop {
            self.skip_spaces_and_comments();
            if self.peek() == Some('\n') && self.bracket_depth > 0 {
                self.advance();
                continue;
            }
            break;
        }
        let start = self.position();

        let Some(c) = self.peek() else {
            return Ok(self.token(TokenType::Eof, start));
        };

        if c == '\n' {
            self.advance();
            return Ok(self.token(TokenType::Newline, start));
        }

        if c.is_ascii_digit() {
            return self.scan_number(start);
        }
        if c == '"' {
            return self.scan_string(start);
        }
        if c == '$' {
            self.advance();
            if self.peek() == Some('@') {
                self.advance();
                return Ok(self.token(TokenType::DollarAt, start));
            }
            if self.peek().map_or(false, is_ident_start) {
                let name = self.scan_ident_text();
                return Ok(self.token(TokenType::DollarIdent(name), start));
            }
            return Ok(self.token(TokenType::Dollar, start));
        }
        if is_ident_start(c) {
            let name = self.scan_ident_text();
            let token_type = KEYWORDS
                .get(name.as_str())
                .cloned()
                .unwrap_or(TokenType::Ident(name));
            return Ok(self.token(token_type, start));
        }

        self.advance();
        let two = |lexer: &Lexer, next: char| lexer.peek() == Some(next);
        let token_type = match c {
            '-' if two(self, '>') => {
                self.advance();
                TokenType::Arrow
            }
            '-' => TokenType::Minus,
            '=' if two(self, '>') => {
                self.advance();
                TokenType::FatArrow
            }
            '=' if two(self, '=') => {
                self.advance();
                TokenType::EqEq
            }
            '=' => TokenType::Equals,
            ':' if two(self, '>') => {
                self.advance();
                TokenType::ColonArrow
            }
            ':' if two(self, '?') => {
                self.advance();
                TokenType::ColonQuestion
            }
            ':' => TokenType::Colon,
            '?' if two(self, '?') => {
                self.advance();
                TokenType::QuestionQuestion
            }
            '?' => TokenType::Question,
            '!' if two(self, '=') => {
                self.advance();
                TokenType::BangEq
            }
            '!' => TokenType::Bang,
            '@' if two(self, '[') => {
                self.advance();
                self.bracket_depth += 1;
                TokenType::AtBracket
            }
            '@' => TokenType::At,
            '|' if two(self, '|') => {
                self.advance();
                TokenType::PipePipe
            }
            '|' => TokenType::Pipe,
            '&' if two(self, '&') => {
                self.advance();
                TokenType::AmpAmp
            }
            '&' => TokenType::Amp,
            '<' if two(self, '=') => {
                self.advance();
                TokenType::Le
            }
            '<' => TokenType::Lt,
            '>' if two(self, '=') => {
                self.advance();
                TokenType::Ge
            }
            '>' => TokenType::Gt,
            '.' if two(self, '?') => {
                self.advance();
                TokenType::DotQuestion
            }
            '.' => TokenType::Dot,
            ',' => TokenType::Comma,
            '+' => TokenType::Plus,
            '*' => TokenType::Star,
            '/' => TokenType::Slash,
            '%' => TokenType::Percent,
            '(' => {
                self.bracket_depth += 1;
                TokenType::LParen
            }
            ')' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenType::RParen
            }
            '[' => {
                self.bracket_depth += 1;
                TokenType::LBracket
            }
            ']' => {
                self.bracket_depth = self.bracket_depth.saturating_sub(1);
                TokenType::RBracket
            }
            '{' => TokenType::LBrace,
            '}' => TokenType::RBrace,
            other => {
                return Err(SyntaxError::lex(
                    ids::LEX_UNEXPECTED_CHAR,
                    format!("unexpected character '{}'", other),
                    Span::new(start, self.position()),
                ));
            }
        };
        Ok(self.token(token_type, start))
    }

    fn skip_spaces_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_ident_text(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    fn scan_number(&mut self, start: Position) -> Result<Token, SyntaxError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_ahead(1).map_or(false, |c| c.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let value: f64 = text.parse().map_err(|_| {
            SyntaxError::lex(
                ids::LEX_BAD_NUMBER,
                format!("malformed number '{}'", text),
                Span::new(start, self.position()),
            )
        })?;
        Ok(self.token(TokenType::Number(value), start))
    }

    /// Scan `"..."` or `"""..."""`. Backslash escapes are resolved here;
    /// interpolation braces stay raw for the parser to split.
    fn scan_string(&mut self, start: Position) -> Result<Token, SyntaxError> {
        let triple = self.peek_ahead(1) == Some('"') && self.peek_ahead(2) == Some('"');
        let quotes = if triple { 3 } else { 1 };
        for _ in 0..quotes {
            self.advance();
        }

        let mut raw = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(SyntaxError::lex(
                        ids::LEX_UNTERMINATED_STRING,
                        "unterminated string literal".to_string(),
                        Span::new(start, self.position()),
                    ));
                }
                Some('\n') if !triple => {
                    return Err(SyntaxError::lex(
                        ids::LEX_UNTERMINATED_STRING,
                        "unterminated string literal".to_string(),
                        Span::new(start, self.position()),
                    ));
                }
                Some('"') => {
                    if !triple {
                        self.advance();
                        break;
                    }
                    if self.peek_ahead(1) == Some('"') && self.peek_ahead(2) == Some('"') {
                        for _ in 0..3 {
                            self.advance();
                        }
                        break;
                    }
                    raw.push('"');
                    self.advance();
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(other) => other,
                        None => {
                            return Err(SyntaxError::lex(
                                ids::LEX_UNTERMINATED_STRING,
                                "unterminated string literal".to_string(),
                                Span::new(start, self.position()),
                            ));
                        }
                    };
                    raw.push(escaped);
                }
                Some(c) => {
                    raw.push(c);
                    self.advance();
                }
            }
        }
        Ok(self.token(TokenType::Str { raw }, start))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            types("1 -> $x"),
            vec![
                TokenType::Number(1.0),
                TokenType::Arrow,
                TokenType::DollarIdent("x".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_dollar_forms() {
        assert_eq!(
            types("$ $@ $name"),
            vec![
                TokenType::Dollar,
                TokenType::DollarAt,
                TokenType::DollarIdent("name".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            types("-> => :> ?? .? :? == != <= >= && || @["),
            vec![
                TokenType::Arrow,
                TokenType::FatArrow,
                TokenType::ColonArrow,
                TokenType::QuestionQuestion,
                TokenType::DotQuestion,
                TokenType::ColonQuestion,
                TokenType::EqEq,
                TokenType::BangEq,
                TokenType::Le,
                TokenType::Ge,
                TokenType::AmpAmp,
                TokenType::PipePipe,
                TokenType::AtBracket,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            types("each map fold filter custom"),
            vec![
                TokenType::Each,
                TokenType::Map,
                TokenType::Fold,
                TokenType::Filter,
                TokenType::Ident("custom".to_string()),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_string_with_escapes() {
        assert_eq!(
            types(r#""a\nb""#),
            vec![TokenType::Str { raw: "a\nb".to_string() }, TokenType::Eof]
        );
    }

    #[test]
    fn test_triple_quoted_string_spans_lines() {
        let tokens = types("\"\"\"line1\nline2\"\"\"");
        assert_eq!(
            tokens,
            vec![
                TokenType::Str { raw: "line1\nline2".to_string() },
                TokenType::Eof
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc").tokenize().unwrap_err();
        assert_eq!(err.id(), ids::LEX_UNTERMINATED_STRING);
    }

    #[test]
    fn test_newlines_suppressed_in_brackets() {
        assert_eq!(
            types("[1,\n2]"),
            vec![
                TokenType::LBracket,
                TokenType::Number(1.0),
                TokenType::Comma,
                TokenType::Number(2.0),
                TokenType::RBracket,
                TokenType::Eof,
            ]
        );
        assert!(types("1\n2").contains(&TokenType::Newline));
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            types("1 # comment\n2"),
            vec![
                TokenType::Number(1.0),
                TokenType::Newline,
                TokenType::Number(2.0),
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            types("42 3.25"),
            vec![TokenType::Number(42.0), TokenType::Number(3.25), TokenType::Eof]
        );
    }

    #[test]
    fn test_spans_track_lines() {
        let tokens = Lexer::new("1\n  2").tokenize().unwrap();
        let two = tokens
            .iter()
            .find(|t| t.token_type == TokenType::Number(2.0))
            .unwrap();
        assert_eq!(two.span.start.line, 2);
        assert_eq!(two.span.start.column, 3);
    }
}
