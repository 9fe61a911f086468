//! # Parse Errors
//!
//! Error types for the OpenSCAD parser. Errors are collected, never thrown;
//! the parser recovers at statement boundaries and keeps going.

use crate::span::Span;
use thiserror::Error;

// =============================================================================
// PARSE ERROR
// =============================================================================

/// A parse error with location information.
///
/// ## Example
///
/// ```rust
/// use scad_parser::error::ParseError;
///
/// let error = ParseError::unexpected_token(")", "identifier");
/// assert!(error.to_string().contains("unexpected token"));
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at line {}, column {}", .span.start.line + 1, .span.start.column + 1)]
pub struct ParseError {
    /// Error kind with details.
    pub kind: ParseErrorKind,
    /// Source location of the error.
    pub span: Span,
}

impl ParseError {
    /// Create a new parse error.
    pub const fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Create an unexpected-token error at an unknown location.
    pub fn unexpected_token(found: &str, expected: &str) -> Self {
        Self::new(
            ParseErrorKind::UnexpectedToken {
                found: found.to_string(),
                expected: expected.to_string(),
            },
            Span::zero(),
        )
    }

    /// Create an unexpected-EOF error.
    pub fn unexpected_eof(expected: &str) -> Self {
        Self::new(
            ParseErrorKind::UnexpectedEof {
                expected: expected.to_string(),
            },
            Span::zero(),
        )
    }

    /// Attach a span to this error.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

// =============================================================================
// PARSE ERROR KIND
// =============================================================================

/// Kinds of parse errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseErrorKind {
    /// Found a token other than what the grammar expects.
    #[error("unexpected token '{found}', expected {expected}")]
    UnexpectedToken {
        /// Token that was found.
        found: String,
        /// Description of what was expected.
        expected: String,
    },

    /// Input ended mid-construct.
    #[error("unexpected end of file, expected {expected}")]
    UnexpectedEof {
        /// Description of what was expected.
        expected: String,
    },

    /// A number literal that failed to parse as f64.
    #[error("invalid number '{text}'")]
    InvalidNumber {
        /// The invalid text.
        text: String,
    },
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_token_display() {
        let error = ParseError::unexpected_token(")", "identifier");
        let msg = error.to_string();
        assert!(msg.contains("unexpected token ')'"));
        assert!(msg.contains("identifier"));
    }

    #[test]
    fn test_display_is_one_indexed() {
        let error = ParseError::unexpected_eof("semicolon")
            .with_span(Span::from_bytes(10, 10));
        // Byte 10 on line 0 / column 10 renders as line 1, column 11.
        assert!(error.to_string().contains("line 1"));
        assert!(error.to_string().contains("column 11"));
    }

    #[test]
    fn test_with_span() {
        let error = ParseError::unexpected_token("x", "y").with_span(Span::from_bytes(4, 5));
        assert_eq!(error.span.start.byte, 4);
    }
}
