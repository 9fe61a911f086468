//! # Mapped Primitives
//!
//! The central data model of the mapping engine: each shape-producing
//! construct in the source is extracted into a [`MappedPrimitive`] carrying
//! its source span and world-space bounds. The full list is discarded and
//! rebuilt on every re-parse; nothing is patched incrementally.

use crate::matrix::TransformMatrix;
use glam::DVec3;
use scad_parser::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter key under which a module-call primitive records the name of
/// the module it invokes.
pub const PARAM_MODULE_NAME: &str = "module_name";

// =============================================================================
// PRIMITIVE KIND
// =============================================================================

/// The closed set of primitive kinds the mapping engine recognizes.
///
/// Covers standard OpenSCAD shapes, the BOSL2 shape library, boolean
/// operations, and user-defined module calls. Matching is exhaustive so a
/// new kind cannot be added without every dispatch site being revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    // Standard OpenSCAD
    Cube,
    Sphere,
    Cylinder,
    Polyhedron,
    Circle,
    Square,
    Polygon,
    Text,
    LinearExtrude,
    RotateExtrude,
    Surface,
    // BOSL2 shapes
    Cyl,
    Cuboid,
    Prismoid,
    Spheroid,
    Tube,
    PieSlice,
    Arc,
    Rect,
    Oval,
    RegularNgon,
    Pentagon,
    Hexagon,
    Octagon,
    Teardrop,
    Egg,
    Wedge,
    Onion,
    Torus,
    // Boolean operations
    Union,
    Difference,
    Intersection,
    Hull,
    Minkowski,
    // User-defined module invocation
    ModuleCall,
}

/// Shape family used for normal-alignment scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalProfile {
    /// Axis-aligned faces (cube, cuboid, prismoid).
    BoxLike,
    /// End caps along Z plus a lateral surface (cylinder, cyl, tube).
    CylinderLike,
    /// Radially symmetric surface (sphere, spheroid).
    SphereLike,
    /// No specific profile; scored with a flat neutral value.
    Other,
}

impl PrimitiveKind {
    /// Look up a call name. Returns `None` for unknown identifiers, which
    /// the extractor treats as user-defined module calls.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "cube" => Self::Cube,
            "sphere" => Self::Sphere,
            "cylinder" => Self::Cylinder,
            "polyhedron" => Self::Polyhedron,
            "circle" => Self::Circle,
            "square" => Self::Square,
            "polygon" => Self::Polygon,
            "text" => Self::Text,
            "linear_extrude" => Self::LinearExtrude,
            "rotate_extrude" => Self::RotateExtrude,
            "surface" => Self::Surface,
            "cyl" => Self::Cyl,
            "cuboid" => Self::Cuboid,
            "prismoid" => Self::Prismoid,
            "spheroid" => Self::Spheroid,
            "tube" => Self::Tube,
            "pie_slice" => Self::PieSlice,
            "arc" => Self::Arc,
            "rect" => Self::Rect,
            "oval" => Self::Oval,
            "regular_ngon" => Self::RegularNgon,
            "pentagon" => Self::Pentagon,
            "hexagon" => Self::Hexagon,
            "octagon" => Self::Octagon,
            "teardrop" => Self::Teardrop,
            "egg" => Self::Egg,
            "wedge" => Self::Wedge,
            "onion" => Self::Onion,
            "torus" => Self::Torus,
            "union" => Self::Union,
            "difference" => Self::Difference,
            "intersection" => Self::Intersection,
            "hull" => Self::Hull,
            "minkowski" => Self::Minkowski,
            _ => return None,
        })
    }

    /// The source-language name (also used in primitive ids).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cube => "cube",
            Self::Sphere => "sphere",
            Self::Cylinder => "cylinder",
            Self::Polyhedron => "polyhedron",
            Self::Circle => "circle",
            Self::Square => "square",
            Self::Polygon => "polygon",
            Self::Text => "text",
            Self::LinearExtrude => "linear_extrude",
            Self::RotateExtrude => "rotate_extrude",
            Self::Surface => "surface",
            Self::Cyl => "cyl",
            Self::Cuboid => "cuboid",
            Self::Prismoid => "prismoid",
            Self::Spheroid => "spheroid",
            Self::Tube => "tube",
            Self::PieSlice => "pie_slice",
            Self::Arc => "arc",
            Self::Rect => "rect",
            Self::Oval => "oval",
            Self::RegularNgon => "regular_ngon",
            Self::Pentagon => "pentagon",
            Self::Hexagon => "hexagon",
            Self::Octagon => "octagon",
            Self::Teardrop => "teardrop",
            Self::Egg => "egg",
            Self::Wedge => "wedge",
            Self::Onion => "onion",
            Self::Torus => "torus",
            Self::Union => "union",
            Self::Difference => "difference",
            Self::Intersection => "intersection",
            Self::Hull => "hull",
            Self::Minkowski => "minkowski",
            Self::ModuleCall => "module_call",
        }
    }

    /// Check if this is a boolean operation.
    pub const fn is_boolean_op(&self) -> bool {
        matches!(
            self,
            Self::Union | Self::Difference | Self::Intersection | Self::Hull | Self::Minkowski
        )
    }

    /// Check if this is a user-defined module call.
    pub const fn is_module_call(&self) -> bool {
        matches!(self, Self::ModuleCall)
    }

    /// Check if this kind produces geometry directly.
    pub const fn is_geometric(&self) -> bool {
        !self.is_boolean_op() && !self.is_module_call()
    }

    /// The shape family used for normal-alignment scoring.
    pub const fn normal_profile(&self) -> NormalProfile {
        match self {
            Self::Cube | Self::Cuboid | Self::Prismoid => NormalProfile::BoxLike,
            Self::Cylinder | Self::Cyl | Self::Tube => NormalProfile::CylinderLike,
            Self::Sphere | Self::Spheroid => NormalProfile::SphereLike,
            _ => NormalProfile::Other,
        }
    }
}

// =============================================================================
// SOURCE LOCATION
// =============================================================================

/// A 1-indexed line/column span in the original source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// First line (1-indexed).
    pub start_line: u32,
    /// Last line (1-indexed).
    pub end_line: u32,
    /// First column (1-indexed).
    pub start_column: u32,
    /// Last column (1-indexed).
    pub end_column: u32,
}

impl SourceLocation {
    /// Convert a parser span (0-indexed) to a source location (1-indexed).
    pub fn from_span(span: Span) -> Self {
        Self {
            start_line: span.start.line as u32 + 1,
            end_line: span.end.line as u32 + 1,
            start_column: span.start.column as u32 + 1,
            end_column: span.end.column as u32 + 1,
        }
    }

    /// Check if this location covers the given 1-indexed line.
    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }

    /// Line count of the span, used as the specificity tie-breaker.
    pub fn line_span(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line)
    }
}

// =============================================================================
// GEOMETRIC BOUNDS
// =============================================================================

/// World-space bounding information for a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometricBounds {
    /// Center in world space (transform already applied).
    pub center: DVec3,
    /// Axis-aligned extents in local space.
    pub dimensions: DVec3,
    /// The accumulated transform that was active at extraction time.
    pub transform: TransformMatrix,
}

impl GeometricBounds {
    /// Zero-size bounds at the world position given by `transform`.
    ///
    /// Used for boolean operations and module calls, which act as match
    /// targets without geometry of their own.
    pub fn placeholder(transform: TransformMatrix) -> Self {
        Self {
            center: transform.transform_point(DVec3::ZERO),
            dimensions: DVec3::ZERO,
            transform,
        }
    }

    /// Largest bounding dimension, used to normalize click distances.
    pub fn max_dimension(&self) -> f64 {
        self.dimensions.x.max(self.dimensions.y).max(self.dimensions.z)
    }

    /// Check if a world point lies within the axis-aligned half-extents
    /// around the center.
    pub fn contains_point(&self, point: DVec3) -> bool {
        let half = self.dimensions * 0.5;
        (point.x - self.center.x).abs() <= half.x
            && (point.y - self.center.y).abs() <= half.y
            && (point.z - self.center.z).abs() <= half.z
    }

    /// Z extent of the bounds, `(min_z, max_z)`.
    pub fn z_range(&self) -> (f64, f64) {
        let half = self.dimensions.z / 2.0;
        (self.center.z - half, self.center.z + half)
    }
}

// =============================================================================
// MAPPED PRIMITIVE
// =============================================================================

/// A primitive extracted from source, carrying everything the resolver
/// needs to map between code and geometry.
///
/// Immutable after creation. Ids derive solely from kind and location, so
/// re-parsing unchanged code yields identical ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedPrimitive {
    /// Stable id: `{type}-{startLine}-{startColumn}` (module calls include
    /// the called name).
    pub id: String,
    /// Primitive kind.
    pub kind: PrimitiveKind,
    /// Source span (1-indexed).
    pub location: SourceLocation,
    /// World-space bounds.
    pub bounds: GeometricBounds,
    /// Name of the enclosing module definition, if extracted inside one.
    ///
    /// A plain identifier used for lookup in the module index; never an
    /// owning reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_module_id: Option<String>,
    /// Free-form parameters; module calls carry the called module's name
    /// under [`PARAM_MODULE_NAME`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
}

impl MappedPrimitive {
    /// The called module's name, for module-call primitives.
    pub fn module_name(&self) -> Option<&str> {
        self.parameters
            .as_ref()
            .and_then(|p| p.get(PARAM_MODULE_NAME))
            .map(String::as_str)
    }
}

// =============================================================================
// ANALYSIS RESULT
// =============================================================================

/// The output of one extraction pass over a source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// All primitives in traversal order.
    pub primitives: Vec<MappedPrimitive>,
    /// Module name → indices into `primitives` for shapes extracted inside
    /// that module's definition.
    pub modules: BTreeMap<String, Vec<usize>>,
    /// Parse errors, already formatted for display.
    pub errors: Vec<String>,
}

impl AnalysisResult {
    /// Primitives defined inside the named module.
    pub fn primitives_in_module(&self, name: &str) -> impl Iterator<Item = &MappedPrimitive> {
        self.modules
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.primitives.get(i))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_round_trips() {
        for name in ["cube", "cyl", "pie_slice", "union", "minkowski"] {
            let kind = PrimitiveKind::from_name(name).unwrap();
            assert_eq!(kind.as_str(), name);
        }
        assert!(PrimitiveKind::from_name("my_bracket").is_none());
    }

    #[test]
    fn test_kind_predicates() {
        assert!(PrimitiveKind::Cube.is_geometric());
        assert!(PrimitiveKind::Union.is_boolean_op());
        assert!(PrimitiveKind::ModuleCall.is_module_call());
        assert!(!PrimitiveKind::Union.is_geometric());
    }

    #[test]
    fn test_normal_profiles() {
        assert_eq!(PrimitiveKind::Cuboid.normal_profile(), NormalProfile::BoxLike);
        assert_eq!(PrimitiveKind::Tube.normal_profile(), NormalProfile::CylinderLike);
        assert_eq!(PrimitiveKind::Spheroid.normal_profile(), NormalProfile::SphereLike);
        assert_eq!(PrimitiveKind::Torus.normal_profile(), NormalProfile::Other);
    }

    #[test]
    fn test_location_from_span_is_one_indexed() {
        let span = Span::zero();
        let loc = SourceLocation::from_span(span);
        assert_eq!(loc.start_line, 1);
        assert_eq!(loc.start_column, 1);
    }

    #[test]
    fn test_contains_line() {
        let loc = SourceLocation {
            start_line: 3,
            end_line: 5,
            start_column: 1,
            end_column: 10,
        };
        assert!(loc.contains_line(3));
        assert!(loc.contains_line(5));
        assert!(!loc.contains_line(2));
        assert!(!loc.contains_line(6));
    }

    #[test]
    fn test_bounds_contains_point() {
        let bounds = GeometricBounds {
            center: DVec3::new(10.0, 0.0, 0.0),
            dimensions: DVec3::new(2.0, 2.0, 2.0),
            transform: TransformMatrix::IDENTITY,
        };
        assert!(bounds.contains_point(DVec3::new(10.0, 0.0, 1.0)));
        assert!(!bounds.contains_point(DVec3::new(12.5, 0.0, 0.0)));
    }

    #[test]
    fn test_bounds_z_range() {
        let bounds = GeometricBounds {
            center: DVec3::new(0.0, 0.0, 5.0),
            dimensions: DVec3::new(1.0, 1.0, 10.0),
            transform: TransformMatrix::IDENTITY,
        };
        assert_eq!(bounds.z_range(), (0.0, 10.0));
    }
}
