//! # Concrete Syntax Tree
//!
//! CST types for parsed OpenSCAD source. Every node carries its source span;
//! terminals additionally carry their text.
//!
//! ## Example
//!
//! ```rust
//! use scad_parser::cst::NodeKind;
//!
//! let cst = scad_parser::parse("cube(10);");
//! assert_eq!(cst.root.kind, NodeKind::SourceFile);
//! ```

use crate::error::ParseError;
use crate::span::{Span, Spanned};
use serde::{Deserialize, Serialize};

// =============================================================================
// CST
// =============================================================================

/// Parse result: the root node plus any collected errors.
///
/// Parsing never throws; a syntax-broken file yields whatever statements
/// parsed successfully alongside the error list.
#[derive(Debug, Clone)]
pub struct Cst {
    /// Root node of the syntax tree.
    pub root: CstNode,
    /// Parse errors encountered.
    pub errors: Vec<ParseError>,
}

impl Cst {
    /// Create a new CST.
    pub fn new(root: CstNode, errors: Vec<ParseError>) -> Self {
        Self { root, errors }
    }

    /// Check if parsing was fully successful (no errors).
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// CST NODE
// =============================================================================

/// A node in the concrete syntax tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CstNode {
    /// Node type.
    pub kind: NodeKind,
    /// Source span.
    pub span: Span,
    /// Child nodes.
    pub children: Vec<CstNode>,
    /// Text content (terminals only).
    pub text: Option<String>,
}

impl CstNode {
    /// Create a new node without children or text.
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            children: Vec::new(),
            text: None,
        }
    }

    /// Create a terminal node with text content.
    pub fn with_text(kind: NodeKind, span: Span, text: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            children: Vec::new(),
            text: Some(text.into()),
        }
    }

    /// Create an interior node with children.
    pub fn with_children(kind: NodeKind, span: Span, children: Vec<CstNode>) -> Self {
        Self {
            kind,
            span,
            children,
            text: None,
        }
    }

    /// Text content, or empty string for non-terminals.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// First child with the given kind.
    pub fn find_child(&self, kind: NodeKind) -> Option<&CstNode> {
        self.children.iter().find(|c| c.kind == kind)
    }

    /// All children with the given kind.
    pub fn find_children(&self, kind: NodeKind) -> impl Iterator<Item = &CstNode> {
        self.children.iter().filter(move |c| c.kind == kind)
    }
}

impl Spanned for CstNode {
    fn span(&self) -> Span {
        self.span
    }
}

// =============================================================================
// NODE KIND
// =============================================================================

/// Types of CST nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    // Top-level
    /// Root node containing all statements.
    SourceFile,

    // Statements
    /// Call statement like `cube(10);` or `translate(v) child;`
    ///
    /// Covers primitives, transforms, boolean operations, and user-defined
    /// module invocations alike; the consumer classifies by name.
    Call,
    /// Variable assignment like `x = 10;`
    Assignment,
    /// Module definition like `module foo() { ... }`
    ModuleDeclaration,
    /// Function definition like `function foo() = ...;`
    FunctionDeclaration,
    /// For loop like `for (i = [0:10]) { ... }`
    ForBlock,
    /// If statement like `if (x > 0) { ... }`
    IfBlock,
    /// Let block like `let (x = 1) { ... }`
    LetBlock,
    /// Include statement
    Include,
    /// Use statement
    Use,
    /// Block of statements `{ ... }`
    Block,
    /// Modifier-wrapped statement like `#cube(1);`
    Modifier,
    /// Empty statement (lone semicolon)
    Empty,

    // Expressions
    /// Binary operation like `a + b`
    Binary,
    /// Unary operation like `-x` or `!x`
    Unary,
    /// Ternary operation like `a ? b : c`
    Ternary,
    /// Expression-position call like `sin(x)`
    FunctionCall,
    /// Index access like `arr[0]`
    Index,
    /// Range like `[0:10]` or `[0:1:10]`
    Range,
    /// List literal like `[1, 2, 3]`
    List,

    // Terminals
    /// Identifier like `cube` or `my_var`
    Identifier,
    /// Special variable like `$fn`
    SpecialVariable,
    /// Number literal like `10` or `3.14`
    Number,
    /// String literal like `"hello"`
    String,
    /// Boolean literal `true` or `false`
    Boolean,
    /// Undef literal
    Undef,

    // Arguments and parameters
    /// Argument list `(10, center=true)`
    Arguments,
    /// Positional argument
    Argument,
    /// Named argument `center=true`
    NamedArgument,
    /// Parameter list of a declaration
    Parameters,
    /// Single parameter, optionally with a default
    Parameter,

    /// Error placeholder emitted during recovery.
    Error,
}

impl NodeKind {
    /// Check if this is an expression node.
    pub const fn is_expression(&self) -> bool {
        matches!(
            self,
            Self::Binary
                | Self::Unary
                | Self::Ternary
                | Self::FunctionCall
                | Self::Index
                | Self::Range
                | Self::List
                | Self::Identifier
                | Self::SpecialVariable
                | Self::Number
                | Self::String
                | Self::Boolean
                | Self::Undef
        )
    }

    /// Check if this is a statement node.
    pub const fn is_statement(&self) -> bool {
        matches!(
            self,
            Self::Call
                | Self::Assignment
                | Self::ModuleDeclaration
                | Self::FunctionDeclaration
                | Self::ForBlock
                | Self::IfBlock
                | Self::LetBlock
                | Self::Include
                | Self::Use
                | Self::Block
                | Self::Modifier
                | Self::Empty
        )
    }

    /// Check if this is a literal terminal.
    pub const fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Number | Self::String | Self::Boolean | Self::Undef
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
