//! # Primitive Extraction
//!
//! Walks the CST and produces the flat primitive list the resolver works
//! on. The walk threads two pieces of context:
//!
//! - a [`TransformStack`]: the ordered sequence of transform matrices in
//!   effect. The stack is immutable — pushing returns a new stack — so
//!   sibling branches can never observe each other's transforms and no
//!   call site has to remember to pop.
//! - the enclosing module-definition name, used to index primitives for
//!   the call-site redirection the resolver performs.
//!
//! Extraction never fails: parse errors are carried through as strings and
//! whatever statements parsed are still walked.

use crate::args::CallView;
use crate::bounds::{primitive_bounds, transform_for_call};
use crate::matrix::TransformMatrix;
use crate::primitive::{
    AnalysisResult, GeometricBounds, MappedPrimitive, PrimitiveKind, SourceLocation,
    PARAM_MODULE_NAME,
};
use scad_parser::{CstNode, NodeKind};
use std::collections::BTreeMap;

// =============================================================================
// TRANSFORM STACK
// =============================================================================

/// Immutable sequence of nested transform matrices, outermost first.
///
/// ## Example
///
/// ```rust
/// use scad_source_map::extract::TransformStack;
/// use scad_source_map::matrix::TransformMatrix;
/// use glam::DVec3;
///
/// let stack = TransformStack::new().pushed(TransformMatrix::translation(5.0, 0.0, 0.0));
/// let p = stack.world().transform_point(DVec3::ZERO);
/// assert_eq!(p, DVec3::new(5.0, 0.0, 0.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransformStack {
    matrices: Vec<TransformMatrix>,
}

impl TransformStack {
    /// The empty stack (world = identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// A new stack with `matrix` appended as the innermost transform.
    pub fn pushed(&self, matrix: TransformMatrix) -> Self {
        let mut matrices = self.matrices.clone();
        matrices.push(matrix);
        Self { matrices }
    }

    /// The accumulated world transform, composed parent-to-child.
    pub fn world(&self) -> TransformMatrix {
        self.matrices
            .iter()
            .fold(TransformMatrix::IDENTITY, |acc, m| acc.multiply(m))
    }

    /// Nesting depth.
    pub fn depth(&self) -> usize {
        self.matrices.len()
    }
}

// =============================================================================
// ANALYZE
// =============================================================================

/// Parse source text and extract its mapped primitives.
///
/// This is the main entry point of the mapping engine. The previous result
/// for a file is meant to be replaced wholesale by the new one.
///
/// ## Example
///
/// ```rust
/// use scad_source_map::analyze;
///
/// let result = analyze("translate([10, 0, 0]) cube([2, 2, 2]);");
/// assert_eq!(result.primitives.len(), 1);
/// assert_eq!(result.primitives[0].id, "cube-1-23");
/// ```
pub fn analyze(source: &str) -> AnalysisResult {
    let cst = scad_parser::parse(source);

    let mut extractor = Extractor {
        primitives: Vec::new(),
        modules: BTreeMap::new(),
    };
    for statement in &cst.root.children {
        extractor.visit(statement, &TransformStack::new(), None);
    }

    AnalysisResult {
        primitives: extractor.primitives,
        modules: extractor.modules,
        errors: cst.errors.iter().map(|e| e.to_string()).collect(),
    }
}

// =============================================================================
// EXTRACTOR
// =============================================================================

struct Extractor {
    primitives: Vec<MappedPrimitive>,
    modules: BTreeMap<String, Vec<usize>>,
}

impl Extractor {
    fn visit(&mut self, node: &CstNode, stack: &TransformStack, module: Option<&str>) {
        match node.kind {
            NodeKind::Call => self.visit_call(node, stack, module),
            NodeKind::Block => {
                for child in &node.children {
                    self.visit(child, stack, module);
                }
            }
            NodeKind::ModuleDeclaration => {
                // Body runs under the declared name; the declaration itself
                // emits nothing.
                let name = node
                    .find_child(NodeKind::Identifier)
                    .and_then(|n| n.text.as_deref());
                if let (Some(name), Some(body)) = (name, node.children.get(2)) {
                    self.visit(body, stack, Some(name));
                }
            }
            NodeKind::Modifier => {
                if let Some(inner) = node.children.get(1) {
                    self.visit(inner, stack, module);
                }
            }
            NodeKind::ForBlock | NodeKind::LetBlock => {
                if let Some(body) = node.children.get(1) {
                    self.visit(body, stack, module);
                }
            }
            NodeKind::IfBlock => {
                // Both branches are candidates; evaluation is not modeled.
                for branch in node.children.iter().skip(1) {
                    self.visit(branch, stack, module);
                }
            }
            _ => {}
        }
    }

    fn visit_call(&mut self, node: &CstNode, stack: &TransformStack, module: Option<&str>) {
        let call = match CallView::from_node(node) {
            Some(call) => call,
            None => return,
        };

        // Transform: push and recurse, nothing emitted.
        if let Some(matrix) = transform_for_call(&call) {
            let inner = stack.pushed(matrix);
            for child in call.child_statements() {
                self.visit(child, &inner, module);
            }
            return;
        }

        let location = SourceLocation::from_span(node.span);
        let world = stack.world();

        match PrimitiveKind::from_name(call.name()) {
            Some(kind) if kind.is_geometric() => {
                let bounds = primitive_bounds(kind, &call, &world);
                self.emit(kind, location, bounds, module, None);
            }
            Some(kind) => {
                // Boolean operation: a zero-size fallback match target.
                self.emit(kind, location, GeometricBounds::placeholder(world), module, None);
            }
            None => {
                // User-defined module call; the resolver prefers these over
                // shapes nested in module definitions.
                let mut parameters = BTreeMap::new();
                parameters.insert(PARAM_MODULE_NAME.to_string(), call.name().to_string());
                self.emit_with_id(
                    format!(
                        "module_call-{}-{}-{}",
                        call.name(),
                        location.start_line,
                        location.start_column
                    ),
                    PrimitiveKind::ModuleCall,
                    location,
                    GeometricBounds::placeholder(world),
                    module,
                    Some(parameters),
                );
            }
        }

        for child in call.child_statements() {
            self.visit(child, stack, module);
        }
    }

    fn emit(
        &mut self,
        kind: PrimitiveKind,
        location: SourceLocation,
        bounds: GeometricBounds,
        module: Option<&str>,
        parameters: Option<BTreeMap<String, String>>,
    ) {
        let id = format!(
            "{}-{}-{}",
            kind.as_str(),
            location.start_line,
            location.start_column
        );
        self.emit_with_id(id, kind, location, bounds, module, parameters);
    }

    fn emit_with_id(
        &mut self,
        id: String,
        kind: PrimitiveKind,
        location: SourceLocation,
        bounds: GeometricBounds,
        module: Option<&str>,
        parameters: Option<BTreeMap<String, String>>,
    ) {
        let index = self.primitives.len();
        self.primitives.push(MappedPrimitive {
            id,
            kind,
            location,
            bounds,
            parent_module_id: module.map(str::to_string),
            parameters,
        });

        // Only shapes inside a definition join the module index; that is
        // what the call-site redirection consults.
        if kind.is_geometric() {
            if let Some(module) = module {
                self.modules.entry(module.to_string()).or_default().push(index);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
