//! # OpenSCAD Parser (Pure Rust)
//!
//! A pure Rust parser for OpenSCAD source code.
//!
//! ## Architecture
//!
//! ```text
//! Source Text → Lexer → Tokens → Parser → CST
//! ```
//!
//! ## Example
//!
//! ```rust
//! use scad_parser::parse;
//!
//! let cst = parse("cube(10);");
//! assert!(cst.is_ok());
//! ```
//!
//! ## Error Handling
//!
//! The parser recovers from errors and continues at the next statement
//! boundary. Errors are collected in `Cst::errors`; a syntax-broken file
//! still yields the statements that parsed, which is what keeps the
//! downstream source-mapping UI alive while the user types.

pub mod cst;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

// Re-export public API
pub use cst::{Cst, CstNode, NodeKind};
pub use error::{ParseError, ParseErrorKind};
pub use span::{Position, Span, Spanned};

/// Parse OpenSCAD source code into a concrete syntax tree.
///
/// ## Example
///
/// ```rust
/// use scad_parser::{parse, NodeKind};
///
/// let cst = parse("translate([1, 0, 0]) cube(2);");
/// assert_eq!(cst.root.kind, NodeKind::SourceFile);
/// assert!(cst.errors.is_empty());
/// ```
pub fn parse(source: &str) -> Cst {
    let tokens = lexer::Lexer::new(source).tokenize();
    parser::Parser::new(tokens).parse()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let cst = parse("cube(10);");
        assert!(cst.is_ok(), "errors: {:?}", cst.errors);
        assert_eq!(cst.root.children.len(), 1);
    }

    #[test]
    fn test_parse_nested_transforms() {
        let cst = parse("translate([0, 0, 5]) rotate([0, 0, 45]) cube([2, 2, 2]);");
        assert!(cst.is_ok(), "errors: {:?}", cst.errors);
    }

    #[test]
    fn test_parse_realistic_model() {
        let source = r#"
            include <BOSL2/std.scad>

            base_d = 40;
            module stand() {
                cyl(h = 10, d = base_d, anchor = BOTTOM);
                up(10) cuboid([20, 20, 4]);
            }
            stand();
        "#;
        let cst = parse(source);
        assert!(cst.is_ok(), "errors: {:?}", cst.errors);
        assert_eq!(cst.root.children.len(), 4);
    }

    #[test]
    fn test_broken_input_still_produces_tree() {
        let cst = parse("cube(10;\ncylinder(h=4, r=2);");
        assert!(!cst.is_ok());
        assert!(!cst.root.children.is_empty());
    }
}
