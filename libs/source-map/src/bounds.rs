//! # Bounds and Transform Rules
//!
//! Primitive-specific rules for deriving a bounding box from call arguments,
//! and the matrices produced by transform calls.
//!
//! Every rule falls back to defaults when arguments are missing or
//! malformed; bounds derivation never fails.

use crate::args::{bool_of, number_of, vector_of, word_of, CallView};
use crate::matrix::TransformMatrix;
use crate::primitive::{GeometricBounds, PrimitiveKind};
use config::constants::DEFAULT_DIMENSION;
use glam::DVec3;

// =============================================================================
// BOUNDS
// =============================================================================

/// Compute world-space bounds for a geometric primitive call.
///
/// The local center from the shape rule is transformed by `world`;
/// dimensions stay in local space (rotation-aware bounding boxes are out
/// of scope for the matching heuristics).
pub fn primitive_bounds(
    kind: PrimitiveKind,
    call: &CallView<'_>,
    world: &TransformMatrix,
) -> GeometricBounds {
    let unit = DVec3::splat(DEFAULT_DIMENSION);
    let mut center = DVec3::ZERO;
    let mut dimensions = unit;

    match kind {
        PrimitiveKind::Cube => {
            dimensions = size_arg(call).unwrap_or(unit);
            // Centered unless explicitly told otherwise.
            let centered = call.arg("center", 1).and_then(bool_of).unwrap_or(true);
            if !centered {
                center = dimensions / 2.0;
            }
        }
        PrimitiveKind::Sphere | PrimitiveKind::Spheroid => {
            let r = call.arg("r", 0).and_then(number_of);
            let d = call.arg("d", 0).and_then(number_of);
            let radius = r.or(d.map(|d| d / 2.0)).unwrap_or(DEFAULT_DIMENSION);
            dimensions = DVec3::splat(radius * 2.0);
        }
        PrimitiveKind::Cylinder => {
            let h = call.arg("h", 0).and_then(number_of).unwrap_or(DEFAULT_DIMENSION);
            let radius = cylinder_radius(call);
            dimensions = DVec3::new(radius * 2.0, radius * 2.0, h);
            let centered = call.arg("center", 3).and_then(bool_of).unwrap_or(true);
            if !centered {
                center = DVec3::new(0.0, 0.0, h / 2.0);
            }
        }
        PrimitiveKind::Cyl => {
            let h = call
                .arg("h", 0)
                .and_then(number_of)
                .or_else(|| call.arg("l", 0).and_then(number_of))
                .unwrap_or(DEFAULT_DIMENSION);
            let radius = cyl_radius(call);
            dimensions = DVec3::new(radius * 2.0, radius * 2.0, h);
            center = DVec3::new(0.0, 0.0, anchor_z_offset(call, h));
        }
        PrimitiveKind::Cuboid => {
            dimensions = size_arg(call).unwrap_or(unit);
            center = DVec3::new(0.0, 0.0, anchor_z_offset(call, dimensions.z));
        }
        PrimitiveKind::Prismoid => {
            let size1 = call.arg("size1", 0).and_then(vector_of);
            let size2 = call.arg("size2", 1).and_then(vector_of);
            let h = call.arg("h", 2).and_then(number_of).unwrap_or(DEFAULT_DIMENSION);
            let max_x = size1
                .map(|v| v.x)
                .unwrap_or(DEFAULT_DIMENSION)
                .max(size2.map(|v| v.x).unwrap_or(DEFAULT_DIMENSION));
            let max_y = size1
                .map(|v| v.y)
                .unwrap_or(DEFAULT_DIMENSION)
                .max(size2.map(|v| v.y).unwrap_or(DEFAULT_DIMENSION));
            dimensions = DVec3::new(max_x, max_y, h);
            center = DVec3::new(0.0, 0.0, anchor_z_offset(call, h));
        }
        PrimitiveKind::Tube => {
            let h = call.arg("h", 0).and_then(number_of).unwrap_or(DEFAULT_DIMENSION);
            let od = call
                .arg("od", 1)
                .and_then(number_of)
                .or_else(|| call.arg("or", 1).and_then(number_of).map(|r| r * 2.0));
            let radius = od.map(|d| d / 2.0).unwrap_or(DEFAULT_DIMENSION);
            dimensions = DVec3::new(radius * 2.0, radius * 2.0, h);
            center = DVec3::new(0.0, 0.0, anchor_z_offset(call, h));
        }
        // No dimension rule: keep the unit fallback centered at the origin.
        _ => {}
    }

    GeometricBounds {
        center: world.transform_point(center),
        dimensions,
        transform: *world,
    }
}

/// Size argument accepting both a scalar (uniform) and a vector.
fn size_arg(call: &CallView<'_>) -> Option<DVec3> {
    let value = call.arg("size", 0)?;
    if let Some(n) = number_of(value) {
        return Some(DVec3::splat(n));
    }
    vector_of(value)
}

/// Cylinder radius: `r`, then `d / 2`, then the larger of `r1`/`r2`.
fn cylinder_radius(call: &CallView<'_>) -> f64 {
    if let Some(r) = call.arg("r", 1).and_then(number_of) {
        return r;
    }
    if let Some(d) = call.arg("d", 1).and_then(number_of) {
        return d / 2.0;
    }
    let r1 = call.arg("r1", 1).and_then(number_of);
    let r2 = call.arg("r2", 2).and_then(number_of);
    if r1.is_some() || r2.is_some() {
        return r1.unwrap_or(0.0).max(r2.unwrap_or(0.0));
    }
    DEFAULT_DIMENSION
}

/// BOSL2 cyl radius: `r`, `d / 2`, `max(r1, r2)`, `max(d1, d2) / 2`.
fn cyl_radius(call: &CallView<'_>) -> f64 {
    if let Some(r) = call.arg("r", 1).and_then(number_of) {
        return r;
    }
    if let Some(d) = call.arg("d", 1).and_then(number_of) {
        return d / 2.0;
    }
    let r1 = call.arg("r1", 1).and_then(number_of);
    let r2 = call.arg("r2", 2).and_then(number_of);
    if r1.is_some() || r2.is_some() {
        return r1.unwrap_or(0.0).max(r2.unwrap_or(0.0));
    }
    let d1 = call.arg("d1", 1).and_then(number_of);
    let d2 = call.arg("d2", 2).and_then(number_of);
    if d1.is_some() || d2.is_some() {
        return d1.unwrap_or(0.0).max(d2.unwrap_or(0.0)) / 2.0;
    }
    DEFAULT_DIMENSION
}

/// Z-center offset for a BOSL2 `anchor` argument.
///
/// `BOTTOM`/`BOT` put the origin at the base so the center sits at `+h/2`;
/// `TOP` mirrors that. Unrecognized anchors (edge/corner anchors, vector
/// anchors) fall back to centered.
fn anchor_z_offset(call: &CallView<'_>, height: f64) -> f64 {
    match call.named("anchor").and_then(word_of) {
        Some("BOTTOM") | Some("BOT") => height / 2.0,
        Some("TOP") => -height / 2.0,
        Some("CENTER") | Some("CTR") => 0.0,
        _ => 0.0,
    }
}

// =============================================================================
// TRANSFORMS
// =============================================================================

/// The matrix produced by a transform call, or `None` when the name is not
/// a transform.
///
/// Unreadable arguments yield the identity: the child geometry stays where
/// it is rather than disappearing.
///
/// `rotate(a, v)` with an arbitrary axis is approximated as a Z-axis
/// rotation of the same angle. This is a known simplification; the
/// matching heuristics tolerate it and fixtures depend on it.
pub fn transform_for_call(call: &CallView<'_>) -> Option<TransformMatrix> {
    let matrix = match call.name() {
        "translate" => call
            .arg("v", 0)
            .and_then(vector_of)
            .map(|v| TransformMatrix::translation(v.x, v.y, v.z)),
        "scale" => call.arg("v", 0).and_then(|value| {
            if let Some(n) = number_of(value) {
                return Some(TransformMatrix::scaling(n, n, n));
            }
            vector_of(value).map(|v| TransformMatrix::scaling(v.x, v.y, v.z))
        }),
        "rotate" => rotation_for_call(call),

        // BOSL2 single-axis translations
        "up" => axis_translation(call, "z", 0, DVec3::Z),
        "down" => axis_translation(call, "z", 0, -DVec3::Z),
        "right" => axis_translation(call, "x", 0, DVec3::X),
        "left" => axis_translation(call, "x", 0, -DVec3::X),
        "back" => axis_translation(call, "y", 0, DVec3::Y),
        "fwd" => axis_translation(call, "y", 0, -DVec3::Y),
        "move" => call
            .arg("v", 0)
            .and_then(vector_of)
            .map(|v| TransformMatrix::translation(v.x, v.y, v.z)),

        // BOSL2 single-axis rotations
        "xrot" => call
            .arg("a", 0)
            .and_then(number_of)
            .map(|a| TransformMatrix::rotation_euler(a, 0.0, 0.0)),
        "yrot" => call
            .arg("a", 0)
            .and_then(number_of)
            .map(|a| TransformMatrix::rotation_euler(0.0, a, 0.0)),
        "zrot" => call
            .arg("a", 0)
            .and_then(number_of)
            .map(|a| TransformMatrix::rotation_euler(0.0, 0.0, a)),

        // BOSL2 single-axis scales
        "xscale" => call
            .arg("x", 0)
            .and_then(number_of)
            .map(|v| TransformMatrix::scaling(v, 1.0, 1.0)),
        "yscale" => call
            .arg("y", 0)
            .and_then(number_of)
            .map(|v| TransformMatrix::scaling(1.0, v, 1.0)),
        "zscale" => call
            .arg("z", 0)
            .and_then(number_of)
            .map(|v| TransformMatrix::scaling(1.0, 1.0, v)),

        // Recognized transforms with no modeled matrix: children still
        // nest under them, positioned as-is.
        "mirror" | "multmatrix" | "resize" | "xflip" | "yflip" | "zflip" => None,

        _ => return None,
    };
    Some(matrix.unwrap_or(TransformMatrix::IDENTITY))
}

fn axis_translation(
    call: &CallView<'_>,
    name: &str,
    position: usize,
    direction: DVec3,
) -> Option<TransformMatrix> {
    call.arg(name, position).and_then(number_of).map(|amount| {
        let v = direction * amount;
        TransformMatrix::translation(v.x, v.y, v.z)
    })
}

/// `rotate([x, y, z])`, `rotate(a)`, or the axis form `rotate(a, v)`.
fn rotation_for_call(call: &CallView<'_>) -> Option<TransformMatrix> {
    let a = call.arg("a", 0);
    let v = call.arg("v", 1);

    if let (Some(angle), Some(axis)) = (a.and_then(number_of), v) {
        if vector_of(axis).is_some() {
            // Arbitrary-axis rotation collapsed to Z; see function docs.
            return Some(TransformMatrix::rotation_euler(0.0, 0.0, angle));
        }
    }
    if let Some(angles) = a.and_then(vector_of) {
        return Some(TransformMatrix::rotation_euler(angles.x, angles.y, angles.z));
    }
    a.and_then(number_of)
        .map(|angle| TransformMatrix::rotation_euler(0.0, 0.0, angle))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn call_bounds(source: &str) -> GeometricBounds {
        let cst = scad_parser::parse(source);
        assert!(cst.is_ok(), "errors: {:?}", cst.errors);
        let call = CallView::from_node(&cst.root.children[0]).unwrap();
        let kind = PrimitiveKind::from_name(call.name()).unwrap();
        primitive_bounds(kind, &call, &TransformMatrix::IDENTITY)
    }

    fn call_transform(source: &str) -> TransformMatrix {
        let cst = scad_parser::parse(source);
        assert!(cst.is_ok(), "errors: {:?}", cst.errors);
        let call = CallView::from_node(&cst.root.children[0]).unwrap();
        transform_for_call(&call).unwrap()
    }

    #[test]
    fn test_cube_vector_size_centered_by_default() {
        let bounds = call_bounds("cube([10, 20, 30]);");
        assert_eq!(bounds.center, DVec3::ZERO);
        assert_eq!(bounds.dimensions, DVec3::new(10.0, 20.0, 30.0));
    }

    #[test]
    fn test_cube_scalar_size() {
        let bounds = call_bounds("cube(4);");
        assert_eq!(bounds.dimensions, DVec3::splat(4.0));
    }

    #[test]
    fn test_cube_off_center_flag() {
        let bounds = call_bounds("cube([10, 20, 30], center=false);");
        assert_eq!(bounds.center, DVec3::new(5.0, 10.0, 15.0));
    }

    #[test]
    fn test_sphere_radius_from_diameter() {
        let bounds = call_bounds("sphere(d=10);");
        assert_eq!(bounds.dimensions, DVec3::splat(10.0));
    }

    #[test]
    fn test_cylinder_taper_uses_larger_radius() {
        let bounds = call_bounds("cylinder(h=8, r1=2, r2=5);");
        assert_eq!(bounds.dimensions, DVec3::new(10.0, 10.0, 8.0));
    }

    #[test]
    fn test_cylinder_off_center_shifts_up() {
        let bounds = call_bounds("cylinder(h=8, r=2, center=false);");
        assert_eq!(bounds.center, DVec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn test_cyl_anchor_bottom() {
        let bounds = call_bounds("cyl(h=10, d=6, anchor=BOTTOM);");
        assert_eq!(bounds.center, DVec3::new(0.0, 0.0, 5.0));
        assert_eq!(bounds.dimensions, DVec3::new(6.0, 6.0, 10.0));
    }

    #[test]
    fn test_cyl_anchor_top() {
        let bounds = call_bounds("cyl(h=10, r=3, anchor=TOP);");
        assert_eq!(bounds.center, DVec3::new(0.0, 0.0, -5.0));
    }

    #[test]
    fn test_cyl_unknown_anchor_stays_centered() {
        let bounds = call_bounds("cyl(h=10, r=3, anchor=LEFT);");
        assert_eq!(bounds.center, DVec3::ZERO);
    }

    #[test]
    fn test_cyl_diameter_pair() {
        let bounds = call_bounds("cyl(h=4, d1=2, d2=8);");
        assert_eq!(bounds.dimensions, DVec3::new(8.0, 8.0, 4.0));
    }

    #[test]
    fn test_cuboid_centered() {
        let bounds = call_bounds("cuboid([4, 6, 8]);");
        assert_eq!(bounds.center, DVec3::ZERO);
        assert_eq!(bounds.dimensions, DVec3::new(4.0, 6.0, 8.0));
    }

    #[test]
    fn test_prismoid_takes_larger_footprint() {
        let bounds = call_bounds("prismoid(size1=[10, 4], size2=[6, 8], h=5);");
        assert_eq!(bounds.dimensions, DVec3::new(10.0, 8.0, 5.0));
    }

    #[test]
    fn test_tube_outer_diameter() {
        let bounds = call_bounds("tube(h=12, od=10, id=6);");
        assert_eq!(bounds.dimensions, DVec3::new(10.0, 10.0, 12.0));
    }

    #[test]
    fn test_unknown_shape_unit_fallback() {
        let bounds = call_bounds("torus(r_maj=10, r_min=2);");
        assert_eq!(bounds.dimensions, DVec3::splat(1.0));
        assert_eq!(bounds.center, DVec3::ZERO);
    }

    #[test]
    fn test_malformed_size_falls_back() {
        let bounds = call_bounds("cube(size=width);");
        assert_eq!(bounds.dimensions, DVec3::splat(1.0));
    }

    #[test]
    fn test_translate_matrix() {
        let m = call_transform("translate([1, 2, 3]) cube(1);");
        assert_eq!(m.transform_point(DVec3::ZERO), DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_scale_scalar() {
        let m = call_transform("scale(2) cube(1);");
        assert_eq!(
            m.transform_point(DVec3::new(1.0, 1.0, 1.0)),
            DVec3::new(2.0, 2.0, 2.0)
        );
    }

    #[test]
    fn test_directional_shorthands() {
        assert_eq!(
            call_transform("up(5) cube(1);").transform_point(DVec3::ZERO),
            DVec3::new(0.0, 0.0, 5.0)
        );
        assert_eq!(
            call_transform("down(5) cube(1);").transform_point(DVec3::ZERO),
            DVec3::new(0.0, 0.0, -5.0)
        );
        assert_eq!(
            call_transform("left(2) cube(1);").transform_point(DVec3::ZERO),
            DVec3::new(-2.0, 0.0, 0.0)
        );
        assert_eq!(
            call_transform("fwd(3) cube(1);").transform_point(DVec3::ZERO),
            DVec3::new(0.0, -3.0, 0.0)
        );
    }

    #[test]
    fn test_zrot_shorthand() {
        let m = call_transform("zrot(90) cube(1);");
        let p = m.transform_point(DVec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_euler_vector() {
        let m = call_transform("rotate([0, 0, 180]) cube(1);");
        let p = m.transform_point(DVec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_axis_form_collapses_to_z() {
        let m = call_transform("rotate(90, [1, 0, 0]) cube(1);");
        let p = m.transform_point(DVec3::new(1.0, 0.0, 0.0));
        // Approximated as a Z rotation regardless of the given axis.
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mirror_is_identity() {
        let m = call_transform("mirror([1, 0, 0]) cube(1);");
        assert_eq!(m, TransformMatrix::IDENTITY);
    }

    #[test]
    fn test_non_transform_is_none() {
        let cst = scad_parser::parse("cube(1);");
        let call = CallView::from_node(&cst.root.children[0]).unwrap();
        assert!(transform_for_call(&call).is_none());
    }
}
