//! # OpenSCAD Parser
//!
//! Recursive descent parser producing a CST.
//!
//! The parser never aborts on bad input: errors are pushed onto an error
//! list and parsing resynchronizes at the next statement boundary, so a
//! partially-broken file still yields its well-formed statements.
//!
//! ## Grammar sketch
//!
//! ```text
//! statement  = call | assignment | declaration | for | if | let
//!            | include | use | block | ";"
//! call       = identifier "(" arguments? ")" (";" | block | statement)
//! expression = ternary with the usual precedence ladder below it
//! ```

use crate::cst::{Cst, CstNode, NodeKind};
use crate::error::{ParseError, ParseErrorKind};
use crate::span::{Position, Span};
use crate::token::{Token, TokenKind};

// =============================================================================
// PARSER
// =============================================================================

/// Recursive descent parser for OpenSCAD.
///
/// ## Example
///
/// ```rust
/// use scad_parser::lexer::Lexer;
/// use scad_parser::parser::Parser;
///
/// let tokens = Lexer::new("cube(10);").tokenize();
/// let cst = Parser::new(tokens).parse();
/// assert!(cst.errors.is_empty());
/// ```
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    /// Create a new parser over a token stream.
    ///
    /// The stream must end with an EOF token (the lexer guarantees this).
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the entire token stream into a CST.
    pub fn parse(mut self) -> Cst {
        let start = self.current_position();
        let mut children = Vec::new();

        while !self.is_at_end() {
            match self.parse_statement() {
                Ok(node) => children.push(node),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        let end = self.current_position();
        let root = CstNode::with_children(NodeKind::SourceFile, Span::new(start, end), children);
        Cst::new(root, self.errors)
    }

    // =========================================================================
    // TOKEN ACCESS
    // =========================================================================

    fn peek(&self) -> &Token {
        // The stream always ends with EOF, so last() cannot be empty.
        self.tokens
            .get(self.current)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_next_kind(&self) -> TokenKind {
        self.tokens
            .get(self.current + 1)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::Eof
    }

    fn current_position(&self) -> Position {
        self.peek().span.start
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance().clone())
        } else {
            Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    found: self.peek().text.clone(),
                    expected: kind.display().to_string(),
                },
                self.peek().span,
            ))
        }
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn span_from(&self, start: Position) -> Span {
        Span::new(start, self.previous().span.end)
    }

    // =========================================================================
    // ERROR RECOVERY
    // =========================================================================

    /// Skip tokens until a plausible statement boundary.
    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek_kind() {
                TokenKind::Module
                | TokenKind::Function
                | TokenKind::For
                | TokenKind::If
                | TokenKind::Let
                | TokenKind::Include
                | TokenKind::Use
                | TokenKind::RBrace => return,
                _ => {}
            }
            self.advance();
        }
    }

    // =========================================================================
    // STATEMENTS
    // =========================================================================

    fn parse_statement(&mut self) -> Result<CstNode, ParseError> {
        // Modifier characters (* ! # %) wrap the following statement.
        if let Some(modifier) = self.parse_modifier() {
            let start = modifier.span.start;
            let stmt = self.parse_statement()?;
            let span = Span::new(start, stmt.span.end);
            return Ok(CstNode::with_children(
                NodeKind::Modifier,
                span,
                vec![modifier, stmt],
            ));
        }

        match self.peek_kind() {
            TokenKind::Module => self.parse_module_declaration(),
            TokenKind::Function => self.parse_function_declaration(),
            TokenKind::For => self.parse_for_block(),
            TokenKind::If => self.parse_if_block(),
            TokenKind::Let => self.parse_let_block(),
            TokenKind::Include => self.parse_path_statement(NodeKind::Include),
            TokenKind::Use => self.parse_path_statement(NodeKind::Use),
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Identifier | TokenKind::SpecialVariable => {
                self.parse_identifier_statement()
            }
            TokenKind::Semicolon => {
                let start = self.current_position();
                self.advance();
                Ok(CstNode::new(NodeKind::Empty, self.span_from(start)))
            }
            _ => {
                let token = self.peek().clone();
                Err(
                    ParseError::unexpected_token(&token.text, "statement")
                        .with_span(token.span),
                )
            }
        }
    }

    fn parse_modifier(&mut self) -> Option<CstNode> {
        match self.peek_kind() {
            TokenKind::Star | TokenKind::Bang | TokenKind::Hash | TokenKind::Percent => {
                let token = self.advance().clone();
                Some(CstNode::with_text(
                    NodeKind::Identifier,
                    token.span,
                    token.text,
                ))
            }
            _ => None,
        }
    }

    /// Statement starting with an identifier: a call or an assignment.
    fn parse_identifier_statement(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        let name = self.advance().clone();

        if self.check(TokenKind::Eq) {
            return self.parse_assignment(start, name);
        }
        self.parse_call(start, name)
    }

    /// Call statement: `name(args)` followed by `;`, a block, or a child
    /// statement (the transform form `translate(v) cube(1);`).
    fn parse_call(&mut self, start: Position, name: Token) -> Result<CstNode, ParseError> {
        let mut children = vec![CstNode::with_text(
            NodeKind::Identifier,
            name.span,
            name.text,
        )];

        self.expect(TokenKind::LParen)?;
        children.push(self.parse_arguments()?);
        self.expect(TokenKind::RParen)?;

        if self.check(TokenKind::Semicolon) {
            self.advance();
        } else if self.check(TokenKind::LBrace) {
            children.push(self.parse_block()?);
        } else {
            children.push(self.parse_statement()?);
        }

        Ok(CstNode::with_children(
            NodeKind::Call,
            self.span_from(start),
            children,
        ))
    }

    fn parse_assignment(&mut self, start: Position, name: Token) -> Result<CstNode, ParseError> {
        let name_node = CstNode::with_text(NodeKind::Identifier, name.span, name.text);
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(CstNode::with_children(
            NodeKind::Assignment,
            self.span_from(start),
            vec![name_node, value],
        ))
    }

    /// Argument list between parentheses (the parens themselves are the
    /// caller's job).
    fn parse_arguments(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        let mut children = Vec::new();

        if !self.check(TokenKind::RParen) {
            children.push(self.parse_argument()?);
            while self.match_token(TokenKind::Comma) {
                // Trailing comma is tolerated.
                if self.check(TokenKind::RParen) {
                    break;
                }
                children.push(self.parse_argument()?);
            }
        }

        Ok(CstNode::with_children(
            NodeKind::Arguments,
            self.span_from(start),
            children,
        ))
    }

    fn parse_argument(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();

        // Named argument: `name = value` (also `$fn = value`).
        if matches!(
            self.peek_kind(),
            TokenKind::Identifier | TokenKind::SpecialVariable
        ) && self.peek_next_kind() == TokenKind::Eq
        {
            let name = self.advance().clone();
            self.expect(TokenKind::Eq)?;
            let value = self.parse_expression()?;
            return Ok(CstNode::with_children(
                NodeKind::NamedArgument,
                self.span_from(start),
                vec![
                    CstNode::with_text(NodeKind::Identifier, name.span, name.text),
                    value,
                ],
            ));
        }

        let expr = self.parse_expression()?;
        Ok(CstNode::with_children(
            NodeKind::Argument,
            self.span_from(start),
            vec![expr],
        ))
    }

    fn parse_block(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.expect(TokenKind::LBrace)?;

        let mut children = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            match self.parse_statement() {
                Ok(stmt) => children.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(CstNode::with_children(
            NodeKind::Block,
            self.span_from(start),
            children,
        ))
    }

    /// Module declaration: `module name(params) body`.
    ///
    /// The body may be a block or any single statement.
    fn parse_module_declaration(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.advance(); // module
        let name = self.expect(TokenKind::Identifier)?;
        let name_node = CstNode::with_text(NodeKind::Identifier, name.span, name.text);
        let params = self.parse_parameters()?;
        let body = self.parse_statement()?;

        Ok(CstNode::with_children(
            NodeKind::ModuleDeclaration,
            self.span_from(start),
            vec![name_node, params, body],
        ))
    }

    fn parse_function_declaration(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.advance(); // function
        let name = self.expect(TokenKind::Identifier)?;
        let name_node = CstNode::with_text(NodeKind::Identifier, name.span, name.text);
        let params = self.parse_parameters()?;
        self.expect(TokenKind::Eq)?;
        let body = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;

        Ok(CstNode::with_children(
            NodeKind::FunctionDeclaration,
            self.span_from(start),
            vec![name_node, params, body],
        ))
    }

    /// Parenthesized parameter list: `(a, b = 2, $fn = 32)`.
    fn parse_parameters(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.expect(TokenKind::LParen)?;

        let mut children = Vec::new();
        while !self.check(TokenKind::RParen) && !self.is_at_end() {
            let p_start = self.current_position();
            let name = if matches!(
                self.peek_kind(),
                TokenKind::Identifier | TokenKind::SpecialVariable
            ) {
                self.advance().clone()
            } else {
                return Err(ParseError::unexpected_token(
                    &self.peek().text,
                    "parameter name",
                )
                .with_span(self.peek().span));
            };

            let mut param = vec![CstNode::with_text(
                NodeKind::Identifier,
                name.span,
                name.text,
            )];
            if self.match_token(TokenKind::Eq) {
                param.push(self.parse_expression()?);
            }
            children.push(CstNode::with_children(
                NodeKind::Parameter,
                self.span_from(p_start),
                param,
            ));

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen)?;
        Ok(CstNode::with_children(
            NodeKind::Parameters,
            self.span_from(start),
            children,
        ))
    }

    /// For/let binding list: `(i = [0:10], j = 2)`.
    fn parse_bindings(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.expect(TokenKind::LParen)?;

        let mut children = Vec::new();
        while !self.check(TokenKind::RParen) && !self.is_at_end() {
            let b_start = self.current_position();
            let name = self.expect(TokenKind::Identifier)?;
            let name_node = CstNode::with_text(NodeKind::Identifier, name.span, name.text);
            self.expect(TokenKind::Eq)?;
            let value = self.parse_expression()?;
            children.push(CstNode::with_children(
                NodeKind::NamedArgument,
                self.span_from(b_start),
                vec![name_node, value],
            ));

            if !self.match_token(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen)?;
        Ok(CstNode::with_children(
            NodeKind::Arguments,
            self.span_from(start),
            children,
        ))
    }

    fn parse_for_block(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.advance(); // for
        let bindings = self.parse_bindings()?;
        let body = self.parse_statement()?;

        Ok(CstNode::with_children(
            NodeKind::ForBlock,
            self.span_from(start),
            vec![bindings, body],
        ))
    }

    fn parse_if_block(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.advance(); // if
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let then_body = self.parse_statement()?;

        let mut children = vec![condition, then_body];
        if self.match_token(TokenKind::Else) {
            children.push(self.parse_statement()?);
        }

        Ok(CstNode::with_children(
            NodeKind::IfBlock,
            self.span_from(start),
            children,
        ))
    }

    fn parse_let_block(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.advance(); // let
        let bindings = self.parse_bindings()?;
        let body = self.parse_statement()?;

        Ok(CstNode::with_children(
            NodeKind::LetBlock,
            self.span_from(start),
            vec![bindings, body],
        ))
    }

    /// Include/use statement: `include <BOSL2/std.scad>`.
    ///
    /// The path between the angle brackets is free-form; tokens are joined
    /// back into a single text child. No trailing semicolon is required.
    fn parse_path_statement(&mut self, kind: NodeKind) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.advance(); // include | use
        self.expect(TokenKind::Lt)?;

        let mut path = String::new();
        while !self.check(TokenKind::Gt) && !self.is_at_end() {
            // Brace/semicolon here means the bracket was never closed.
            if matches!(self.peek_kind(), TokenKind::LBrace | TokenKind::Semicolon) {
                return Err(ParseError::unexpected_token(&self.peek().text, ">")
                    .with_span(self.peek().span));
            }
            path.push_str(&self.advance().text);
        }
        self.expect(TokenKind::Gt)?;
        self.match_token(TokenKind::Semicolon);

        let span = self.span_from(start);
        let mut node = CstNode::new(kind, span);
        node.text = Some(path);
        Ok(node)
    }

    // =========================================================================
    // EXPRESSIONS
    // =========================================================================

    fn parse_expression(&mut self) -> Result<CstNode, ParseError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        let condition = self.parse_or()?;

        if self.match_token(TokenKind::Question) {
            let then_value = self.parse_expression()?;
            self.expect(TokenKind::Colon)?;
            let else_value = self.parse_expression()?;
            return Ok(CstNode::with_children(
                NodeKind::Ternary,
                self.span_from(start),
                vec![condition, then_value, else_value],
            ));
        }
        Ok(condition)
    }

    fn parse_or(&mut self) -> Result<CstNode, ParseError> {
        self.parse_binary_level(&[TokenKind::PipePipe], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<CstNode, ParseError> {
        self.parse_binary_level(&[TokenKind::AmpAmp], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<CstNode, ParseError> {
        self.parse_binary_level(&[TokenKind::EqEq, TokenKind::BangEq], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Result<CstNode, ParseError> {
        self.parse_binary_level(
            &[TokenKind::Lt, TokenKind::Gt, TokenKind::LtEq, TokenKind::GtEq],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<CstNode, ParseError> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<CstNode, ParseError> {
        self.parse_binary_level(
            &[
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Caret,
            ],
            Self::parse_unary,
        )
    }

    /// One left-associative precedence level.
    fn parse_binary_level(
        &mut self,
        operators: &[TokenKind],
        next: fn(&mut Self) -> Result<CstNode, ParseError>,
    ) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        let mut lhs = next(self)?;

        while operators.contains(&self.peek_kind()) {
            let op = self.advance().text.clone();
            let rhs = next(self)?;
            let mut node = CstNode::with_children(
                NodeKind::Binary,
                self.span_from(start),
                vec![lhs, rhs],
            );
            node.text = Some(op);
            lhs = node;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<CstNode, ParseError> {
        if matches!(
            self.peek_kind(),
            TokenKind::Minus | TokenKind::Plus | TokenKind::Bang
        ) {
            let start = self.current_position();
            let op = self.advance().text.clone();
            let operand = self.parse_unary()?;
            let mut node =
                CstNode::with_children(NodeKind::Unary, self.span_from(start), vec![operand]);
            node.text = Some(op);
            return Ok(node);
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        let mut expr = self.parse_primary()?;

        while self.check(TokenKind::LBracket) {
            self.advance();
            let index = self.parse_expression()?;
            self.expect(TokenKind::RBracket)?;
            expr = CstNode::with_children(
                NodeKind::Index,
                self.span_from(start),
                vec![expr, index],
            );
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<CstNode, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                // Validated here so consumers can parse the text infallibly.
                if token.text.parse::<f64>().is_err() {
                    self.errors.push(ParseError::new(
                        ParseErrorKind::InvalidNumber {
                            text: token.text.clone(),
                        },
                        token.span,
                    ));
                }
                Ok(CstNode::with_text(NodeKind::Number, token.span, token.text))
            }
            TokenKind::String => {
                self.advance();
                let unquoted = token.text.trim_matches('"').to_string();
                Ok(CstNode::with_text(NodeKind::String, token.span, unquoted))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(CstNode::with_text(NodeKind::Boolean, token.span, token.text))
            }
            TokenKind::Undef => {
                self.advance();
                Ok(CstNode::new(NodeKind::Undef, token.span))
            }
            TokenKind::SpecialVariable => {
                self.advance();
                Ok(CstNode::with_text(
                    NodeKind::SpecialVariable,
                    token.span,
                    token.text,
                ))
            }
            TokenKind::Identifier => {
                self.advance();
                // Expression-position call like `sin(x)`.
                if self.check(TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_arguments()?;
                    self.expect(TokenKind::RParen)?;
                    let span = Span::new(token.span.start, self.previous().span.end);
                    return Ok(CstNode::with_children(
                        NodeKind::FunctionCall,
                        span,
                        vec![
                            CstNode::with_text(NodeKind::Identifier, token.span, token.text),
                            args,
                        ],
                    ));
                }
                Ok(CstNode::with_text(
                    NodeKind::Identifier,
                    token.span,
                    token.text,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_list_or_range(),
            _ => Err(ParseError::unexpected_token(&token.text, "expression")
                .with_span(token.span)),
        }
    }

    /// Bracketed construct: a list `[1, 2, 3]`, a range `[0:2:10]`, or a
    /// comprehension (kept opaque).
    fn parse_list_or_range(&mut self) -> Result<CstNode, ParseError> {
        let start = self.current_position();
        self.expect(TokenKind::LBracket)?;

        // Empty list.
        if self.match_token(TokenKind::RBracket) {
            return Ok(CstNode::new(NodeKind::List, self.span_from(start)));
        }

        // Comprehensions are skipped wholesale: the mapping engine only needs
        // literal vectors, and failing soft beats failing loud here.
        if matches!(
            self.peek_kind(),
            TokenKind::For | TokenKind::Each | TokenKind::Let
        ) {
            self.skip_balanced_brackets()?;
            return Ok(CstNode::new(NodeKind::List, self.span_from(start)));
        }

        let first = self.parse_expression()?;

        // Range form: `[start : end]` or `[start : step : end]`.
        if self.match_token(TokenKind::Colon) {
            let second = self.parse_expression()?;
            let mut children = vec![first, second];
            if self.match_token(TokenKind::Colon) {
                children.push(self.parse_expression()?);
            }
            self.expect(TokenKind::RBracket)?;
            return Ok(CstNode::with_children(
                NodeKind::Range,
                self.span_from(start),
                children,
            ));
        }

        // List form.
        let mut children = vec![first];
        while self.match_token(TokenKind::Comma) {
            if self.check(TokenKind::RBracket) {
                break;
            }
            children.push(self.parse_expression()?);
        }
        self.expect(TokenKind::RBracket)?;

        Ok(CstNode::with_children(
            NodeKind::List,
            self.span_from(start),
            children,
        ))
    }

    /// Consume tokens up to and including the `]` matching the already
    /// consumed `[`.
    fn skip_balanced_brackets(&mut self) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            match self.peek_kind() {
                TokenKind::LBracket => depth += 1,
                TokenKind::RBracket => depth -= 1,
                TokenKind::Eof => {
                    return Err(ParseError::unexpected_eof("]").with_span(self.peek().span))
                }
                _ => {}
            }
            self.advance();
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Cst {
        Parser::new(Lexer::new(source).tokenize()).parse()
    }

    #[test]
    fn test_parse_empty() {
        let cst = parse("");
        assert!(cst.errors.is_empty());
        assert!(cst.root.children.is_empty());
    }

    #[test]
    fn test_parse_call() {
        let cst = parse("cube(10);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);

        let call = &cst.root.children[0];
        assert_eq!(call.kind, NodeKind::Call);
        assert_eq!(
            call.find_child(NodeKind::Identifier).unwrap().text_or_empty(),
            "cube"
        );
        let args = call.find_child(NodeKind::Arguments).unwrap();
        assert_eq!(args.children.len(), 1);
    }

    #[test]
    fn test_parse_named_argument() {
        let cst = parse("cube([10, 20, 30], center=true);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);

        let args = cst.root.children[0].find_child(NodeKind::Arguments).unwrap();
        assert_eq!(args.children.len(), 2);
        assert_eq!(args.children[0].kind, NodeKind::Argument);
        assert_eq!(args.children[1].kind, NodeKind::NamedArgument);
    }

    #[test]
    fn test_parse_transform_with_child() {
        let cst = parse("translate([1, 2, 3]) cube(5);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);

        let translate = &cst.root.children[0];
        assert_eq!(translate.kind, NodeKind::Call);
        // name, arguments, child call
        assert_eq!(translate.children.len(), 3);
        assert_eq!(translate.children[2].kind, NodeKind::Call);
    }

    #[test]
    fn test_parse_call_with_block() {
        let cst = parse("union() { cube(10); sphere(5); }");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);

        let union = &cst.root.children[0];
        let block = union.find_child(NodeKind::Block).unwrap();
        assert_eq!(block.children.len(), 2);
    }

    #[test]
    fn test_parse_module_declaration() {
        let cst = parse("module foo(a, b = 2) { cube(a); }");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);

        let decl = &cst.root.children[0];
        assert_eq!(decl.kind, NodeKind::ModuleDeclaration);
        assert_eq!(
            decl.find_child(NodeKind::Identifier).unwrap().text_or_empty(),
            "foo"
        );
        let params = decl.find_child(NodeKind::Parameters).unwrap();
        assert_eq!(params.children.len(), 2);
        assert_eq!(decl.find_child(NodeKind::Block).unwrap().children.len(), 1);
    }

    #[test]
    fn test_parse_module_declaration_single_statement_body() {
        let cst = parse("module peg() cylinder(h=4, r=1);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        let decl = &cst.root.children[0];
        assert_eq!(decl.kind, NodeKind::ModuleDeclaration);
        assert!(decl.find_child(NodeKind::Call).is_some());
    }

    #[test]
    fn test_parse_function_declaration() {
        let cst = parse("function area(r) = 3.14159 * r * r;");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        assert_eq!(cst.root.children[0].kind, NodeKind::FunctionDeclaration);
    }

    #[test]
    fn test_parse_assignment() {
        let cst = parse("width = 10 + 2;");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        let assign = &cst.root.children[0];
        assert_eq!(assign.kind, NodeKind::Assignment);
        assert_eq!(assign.children[1].kind, NodeKind::Binary);
    }

    #[test]
    fn test_parse_negative_number() {
        let cst = parse("translate([-5, 0, 0]) cube(1);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);

        let args = cst.root.children[0].find_child(NodeKind::Arguments).unwrap();
        let list = &args.children[0].children[0];
        assert_eq!(list.kind, NodeKind::List);
        assert_eq!(list.children[0].kind, NodeKind::Unary);
        assert_eq!(list.children[0].text_or_empty(), "-");
    }

    #[test]
    fn test_parse_for_block() {
        let cst = parse("for (i = [0:3]) translate([i, 0, 0]) cube(1);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        let for_block = &cst.root.children[0];
        assert_eq!(for_block.kind, NodeKind::ForBlock);
        assert_eq!(for_block.children[0].kind, NodeKind::Arguments);
        assert_eq!(for_block.children[1].kind, NodeKind::Call);
    }

    #[test]
    fn test_parse_if_else() {
        let cst = parse("if (x > 0) cube(1); else sphere(1);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        let if_block = &cst.root.children[0];
        assert_eq!(if_block.kind, NodeKind::IfBlock);
        assert_eq!(if_block.children.len(), 3);
    }

    #[test]
    fn test_parse_include() {
        let cst = parse("include <BOSL2/std.scad>\ncube(10);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        assert_eq!(cst.root.children[0].kind, NodeKind::Include);
        assert_eq!(cst.root.children[0].text_or_empty(), "BOSL2/std.scad");
        assert_eq!(cst.root.children[1].kind, NodeKind::Call);
    }

    #[test]
    fn test_parse_modifier() {
        let cst = parse("#cube(10);");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        let modifier = &cst.root.children[0];
        assert_eq!(modifier.kind, NodeKind::Modifier);
        assert_eq!(modifier.children[1].kind, NodeKind::Call);
    }

    #[test]
    fn test_parse_ternary_and_index() {
        let cst = parse("x = flag ? sizes[0] : sizes[1];");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        let value = &cst.root.children[0].children[1];
        assert_eq!(value.kind, NodeKind::Ternary);
        assert_eq!(value.children[1].kind, NodeKind::Index);
    }

    #[test]
    fn test_parse_comprehension_is_opaque() {
        let cst = parse("points = [for (i = [0:3]) [i, i]];");
        assert!(cst.errors.is_empty(), "errors: {:?}", cst.errors);
        let value = &cst.root.children[0].children[1];
        assert_eq!(value.kind, NodeKind::List);
        assert!(value.children.is_empty());
    }

    #[test]
    fn test_error_recovery_keeps_later_statements() {
        let cst = parse("cube(; sphere(5);");
        assert!(!cst.errors.is_empty());
        // sphere must survive recovery.
        let has_sphere = cst.root.children.iter().any(|c| {
            c.find_child(NodeKind::Identifier)
                .map(|i| i.text_or_empty() == "sphere")
                .unwrap_or(false)
        });
        assert!(has_sphere, "tree: {:?}", cst.root.children);
    }

    #[test]
    fn test_spans_are_tracked() {
        let cst = parse("cube(1);\nsphere(2);");
        let sphere = &cst.root.children[1];
        assert_eq!(sphere.span.start.line, 1);
        assert_eq!(sphere.span.start.column, 0);
    }
}
