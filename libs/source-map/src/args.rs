//! # Call Argument Extraction
//!
//! Read-only view over a call's CST node plus value readers used by the
//! bounds rules. Readers are deliberately forgiving: anything that does not
//! match the expected shape yields `None` and the caller falls back to a
//! default. The extractor prioritizes availability over precision.

use glam::DVec3;
use scad_parser::{CstNode, NodeKind};

// =============================================================================
// CALL VIEW
// =============================================================================

/// Read-only view over a `Call` CST node.
///
/// ## Example
///
/// ```rust
/// use scad_source_map::args::CallView;
///
/// let cst = scad_parser::parse("cylinder(h=4, r=2);");
/// let call = CallView::from_node(&cst.root.children[0]).unwrap();
/// assert_eq!(call.name(), "cylinder");
/// assert!(call.arg("r", 1).is_some());
/// ```
pub struct CallView<'a> {
    name: &'a str,
    args: &'a [CstNode],
    node: &'a CstNode,
}

impl<'a> CallView<'a> {
    /// Build a view over a `Call` node; `None` for any other kind or a
    /// malformed call missing its name.
    pub fn from_node(node: &'a CstNode) -> Option<Self> {
        if node.kind != NodeKind::Call {
            return None;
        }
        let name = node.find_child(NodeKind::Identifier)?.text.as_deref()?;
        let args = node
            .find_child(NodeKind::Arguments)
            .map(|a| a.children.as_slice())
            .unwrap_or(&[]);
        Some(Self { name, args, node })
    }

    /// The called name.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Look up an argument value by name, falling back to the given
    /// position. The positional fallback only applies when the argument at
    /// that position is itself positional.
    pub fn arg(&self, name: &str, position: usize) -> Option<&'a CstNode> {
        if let Some(value) = self.named(name) {
            return Some(value);
        }
        match self.args.get(position) {
            Some(arg) if arg.kind == NodeKind::Argument => arg.children.first(),
            _ => None,
        }
    }

    /// Look up an argument value by name only.
    pub fn named(&self, name: &str) -> Option<&'a CstNode> {
        self.args.iter().find_map(|arg| {
            if arg.kind != NodeKind::NamedArgument {
                return None;
            }
            let arg_name = arg.children.first()?.text.as_deref()?;
            if arg_name == name {
                arg.children.get(1)
            } else {
                None
            }
        })
    }

    /// Child statements of the call: a trailing block's statements, or the
    /// single trailing child statement of the transform form.
    pub fn child_statements(&self) -> impl Iterator<Item = &'a CstNode> {
        self.node
            .children
            .iter()
            .filter(|c| c.kind.is_statement())
    }
}

// =============================================================================
// VALUE READERS
// =============================================================================

/// Extract a numeric value: a number literal, optionally behind unary
/// plus/minus.
pub fn number_of(node: &CstNode) -> Option<f64> {
    match node.kind {
        NodeKind::Number => node.text.as_deref()?.parse().ok(),
        NodeKind::Unary => {
            let inner = number_of(node.children.first()?)?;
            match node.text.as_deref() {
                Some("-") => Some(-inner),
                Some("+") => Some(inner),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Extract a 3-vector from a list literal.
///
/// Length-2 lists are padded with `z = 0`; longer lists take the first
/// three components. A single nested list is unwrapped.
pub fn vector_of(node: &CstNode) -> Option<DVec3> {
    if node.kind != NodeKind::List {
        return None;
    }
    match node.children.len() {
        0 => None,
        1 => vector_of(&node.children[0]),
        2 => Some(DVec3::new(
            number_of(&node.children[0])?,
            number_of(&node.children[1])?,
            0.0,
        )),
        _ => Some(DVec3::new(
            number_of(&node.children[0])?,
            number_of(&node.children[1])?,
            number_of(&node.children[2])?,
        )),
    }
}

/// Extract a boolean literal.
pub fn bool_of(node: &CstNode) -> Option<bool> {
    if node.kind != NodeKind::Boolean {
        return None;
    }
    match node.text.as_deref() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

/// Extract a word: a string literal or a bare identifier.
///
/// Anchor arguments like `anchor = BOTTOM` arrive as identifier references.
pub fn word_of(node: &CstNode) -> Option<&str> {
    match node.kind {
        NodeKind::String | NodeKind::Identifier => node.text.as_deref(),
        _ => None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn first_call(source: &str) -> CstNode {
        let cst = scad_parser::parse(source);
        assert!(cst.is_ok(), "errors: {:?}", cst.errors);
        cst.root.children[0].clone()
    }

    #[test]
    fn test_named_argument_wins_over_position() {
        let node = first_call("cylinder(3, r=5);");
        let call = CallView::from_node(&node).unwrap();
        assert_eq!(number_of(call.arg("h", 0).unwrap()), Some(3.0));
        assert_eq!(number_of(call.arg("r", 1).unwrap()), Some(5.0));
    }

    #[test]
    fn test_positional_fallback_skips_named_slots() {
        // Position 1 holds a named argument, so a positional lookup at
        // index 1 for a different name must miss.
        let node = first_call("cylinder(3, center=true);");
        let call = CallView::from_node(&node).unwrap();
        assert!(call.arg("r", 1).is_none());
        assert_eq!(bool_of(call.arg("center", 3).unwrap()), Some(true));
    }

    #[test]
    fn test_number_of_handles_sign() {
        let node = first_call("up(-4) cube(1);");
        let call = CallView::from_node(&node).unwrap();
        assert_eq!(number_of(call.arg("z", 0).unwrap()), Some(-4.0));
    }

    #[test]
    fn test_vector_of_pads_two_elements() {
        let node = first_call("translate([3, 4]) cube(1);");
        let call = CallView::from_node(&node).unwrap();
        let v = vector_of(call.arg("v", 0).unwrap()).unwrap();
        assert_eq!(v, DVec3::new(3.0, 4.0, 0.0));
    }

    #[test]
    fn test_vector_of_takes_first_three() {
        let node = first_call("translate([1, 2, 3, 4]) cube(1);");
        let call = CallView::from_node(&node).unwrap();
        let v = vector_of(call.arg("v", 0).unwrap()).unwrap();
        assert_eq!(v, DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_vector_of_rejects_non_numeric() {
        let node = first_call("translate([a, b, c]) cube(1);");
        let call = CallView::from_node(&node).unwrap();
        assert!(vector_of(call.arg("v", 0).unwrap()).is_none());
    }

    #[test]
    fn test_word_of_reads_anchor_identifier() {
        let node = first_call("cyl(h=10, r=2, anchor=BOTTOM);");
        let call = CallView::from_node(&node).unwrap();
        assert_eq!(word_of(call.named("anchor").unwrap()), Some("BOTTOM"));
    }

    #[test]
    fn test_child_statements_of_transform() {
        let node = first_call("translate([1, 0, 0]) cube(1);");
        let call = CallView::from_node(&node).unwrap();
        assert_eq!(call.child_statements().count(), 1);
    }

    #[test]
    fn test_child_statements_of_plain_call() {
        let node = first_call("cube(1);");
        let call = CallView::from_node(&node).unwrap();
        assert_eq!(call.child_statements().count(), 0);
    }
}
