//! # OpenSCAD Lexer
//!
//! Tokenizes OpenSCAD source into a flat token stream with spans.
//! Comments and whitespace are skipped; line/column positions are tracked
//! through them so every token carries an accurate source location.
//!
//! ## Example
//!
//! ```rust
//! use scad_parser::lexer::Lexer;
//! use scad_parser::token::TokenKind;
//!
//! let tokens = Lexer::new("cube(10);").tokenize();
//! assert_eq!(tokens[0].kind, TokenKind::Identifier);
//! assert_eq!(tokens[0].text, "cube");
//! ```

use crate::span::{Position, Span};
use crate::token::{Token, TokenKind};

// =============================================================================
// CURSOR
// =============================================================================

/// Character cursor tracking byte offset, line, and column.
struct Cursor<'a> {
    source: &'a str,
    byte: usize,
    line: usize,
    column: usize,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            byte: 0,
            line: 0,
            column: 0,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.byte, self.line, self.column)
    }

    fn is_eof(&self) -> bool {
        self.byte >= self.source.len()
    }

    fn peek(&self) -> Option<char> {
        self.source[self.byte..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.byte..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.byte += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn advance_while(&mut self, predicate: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.advance();
        }
    }
}

// =============================================================================
// LEXER
// =============================================================================

/// OpenSCAD lexer.
///
/// ## Example
///
/// ```rust
/// use scad_parser::lexer::Lexer;
///
/// let tokens = Lexer::new("translate([1, 2, 3]) cube(5);").tokenize();
/// assert!(tokens.last().map(|t| t.is_eof()).unwrap_or(false));
/// ```
pub struct Lexer<'a> {
    source: &'a str,
    cursor: Cursor<'a>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for source text.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: Cursor::new(source),
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire source, appending a trailing EOF token.
    pub fn tokenize(mut self) -> Vec<Token> {
        loop {
            self.skip_trivia();
            if self.cursor.is_eof() {
                break;
            }
            self.scan_token();
        }

        let eof = self.cursor.position();
        self.tokens
            .push(Token::new(TokenKind::Eof, Span::new(eof, eof), String::new()));
        self.tokens
    }

    /// Skip whitespace, `//` line comments, and `/* */` block comments.
    fn skip_trivia(&mut self) {
        loop {
            self.cursor.advance_while(|c| c.is_whitespace());

            if self.cursor.peek() == Some('/') && self.cursor.peek_next() == Some('/') {
                self.cursor.advance_while(|c| c != '\n');
                continue;
            }

            if self.cursor.peek() == Some('/') && self.cursor.peek_next() == Some('*') {
                self.cursor.advance();
                self.cursor.advance();
                while !self.cursor.is_eof() {
                    if self.cursor.peek() == Some('*') && self.cursor.peek_next() == Some('/') {
                        self.cursor.advance();
                        self.cursor.advance();
                        break;
                    }
                    self.cursor.advance();
                }
                continue;
            }

            break;
        }
    }

    fn scan_token(&mut self) {
        let start = self.cursor.position();
        let c = match self.cursor.advance() {
            Some(c) => c,
            None => return,
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '#' => TokenKind::Hash,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,

            '=' => self.two_char('=', TokenKind::EqEq, TokenKind::Eq),
            '!' => self.two_char('=', TokenKind::BangEq, TokenKind::Bang),
            '<' => self.two_char('=', TokenKind::LtEq, TokenKind::Lt),
            '>' => self.two_char('=', TokenKind::GtEq, TokenKind::Gt),
            '&' => self.two_char('&', TokenKind::AmpAmp, TokenKind::Error),
            '|' => self.two_char('|', TokenKind::PipePipe, TokenKind::Error),

            '"' => return self.scan_string(start),
            '0'..='9' => return self.scan_number(start),
            '.' if matches!(self.cursor.peek(), Some('0'..='9')) => {
                return self.scan_number(start)
            }
            '.' => TokenKind::Dot,
            'a'..='z' | 'A'..='Z' | '_' => return self.scan_identifier(start),
            '$' => return self.scan_special_variable(start),

            _ => TokenKind::Error,
        };

        self.push(kind, start);
    }

    /// Consume `next` if it follows, producing `matched`, else `fallback`.
    fn two_char(&mut self, next: char, matched: TokenKind, fallback: TokenKind) -> TokenKind {
        if self.cursor.peek() == Some(next) {
            self.cursor.advance();
            matched
        } else {
            fallback
        }
    }

    fn scan_string(&mut self, start: Position) {
        while let Some(c) = self.cursor.peek() {
            if c == '"' {
                self.cursor.advance();
                break;
            }
            if c == '\\' {
                self.cursor.advance();
            }
            self.cursor.advance();
        }
        self.push(TokenKind::String, start);
    }

    fn scan_number(&mut self, start: Position) {
        let mut has_dot = self.source[start.byte..].starts_with('.');
        let mut has_exponent = false;

        while let Some(c) = self.cursor.peek() {
            match c {
                '0'..='9' => {
                    self.cursor.advance();
                }
                '.' if !has_dot && !has_exponent => {
                    // Not part of a number if it introduces a range `..`
                    if self.cursor.peek_next() == Some('.') {
                        break;
                    }
                    has_dot = true;
                    self.cursor.advance();
                }
                'e' | 'E' if !has_exponent => {
                    has_exponent = true;
                    self.cursor.advance();
                    if matches!(self.cursor.peek(), Some('+') | Some('-')) {
                        self.cursor.advance();
                    }
                }
                _ => break,
            }
        }
        self.push(TokenKind::Number, start);
    }

    fn scan_identifier(&mut self, start: Position) {
        self.cursor
            .advance_while(|c| c.is_alphanumeric() || c == '_');

        let text = &self.source[start.byte..self.cursor.position().byte];
        let kind = match text {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "undef" => TokenKind::Undef,
            "module" => TokenKind::Module,
            "function" => TokenKind::Function,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "let" => TokenKind::Let,
            "each" => TokenKind::Each,
            "include" => TokenKind::Include,
            "use" => TokenKind::Use,
            _ => TokenKind::Identifier,
        };
        self.push(kind, start);
    }

    fn scan_special_variable(&mut self, start: Position) {
        self.cursor
            .advance_while(|c| c.is_alphanumeric() || c == '_');
        self.push(TokenKind::SpecialVariable, start);
    }

    fn push(&mut self, kind: TokenKind, start: Position) {
        let end = self.cursor.position();
        let text = self.source[start.byte..end.byte].to_string();
        self.tokens.push(Token::new(kind, Span::new(start, end), text));
    }
}

// =============================================================================
// TESTS
// =============================================================================
