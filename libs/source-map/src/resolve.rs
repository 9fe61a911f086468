//! # Match Resolution
//!
//! Maps a code cursor or a 3D click onto the most likely authoring
//! primitive. Both entry points are pure functions over the current
//! primitive list; a miss is an ordinary `None`, never an error, and the
//! caller clears highlight state.
//!
//! Click resolution scores every geometric primitive with a weighted sum
//! of four signals (distance, containment, normal alignment, proximity)
//! and prefers module call sites over shapes nested inside module
//! definitions — the user edits call sites, not library internals.

use crate::primitive::{MappedPrimitive, NormalProfile};
use config::constants::{
    BOOLEAN_OP_SCORE, CYLINDER_CAP_THRESHOLD, DEGENERATE_DIRECTION_EPSILON, MATCH_THRESHOLD,
    NEUTRAL_NORMAL_SCORE, WEIGHT_CONTAINMENT, WEIGHT_DISTANCE, WEIGHT_NORMAL, WEIGHT_PROXIMITY,
};
use glam::DVec3;

// =============================================================================
// LINE LOOKUP
// =============================================================================

/// Find the most specific primitive whose source span contains `line`
/// (1-indexed).
///
/// The smallest span wins; among equal spans, the one earlier in traversal
/// order.
///
/// ## Example
///
/// ```rust
/// use scad_source_map::{analyze, resolve::find_primitive_by_line};
///
/// let result = analyze("cube(1);\nsphere(2);");
/// let hit = find_primitive_by_line(2, &result.primitives).unwrap();
/// assert!(hit.id.starts_with("sphere"));
/// ```
pub fn find_primitive_by_line(
    line: u32,
    primitives: &[MappedPrimitive],
) -> Option<&MappedPrimitive> {
    let mut containing: Vec<&MappedPrimitive> = primitives
        .iter()
        .filter(|p| p.location.contains_line(line))
        .collect();

    if containing.is_empty() {
        return None;
    }

    // Stable sort keeps traversal order among equal spans.
    containing.sort_by_key(|p| p.location.line_span());
    Some(containing[0])
}

// =============================================================================
// CLICK LOOKUP
// =============================================================================

/// Resolve a 3D click (position + surface normal) to a primitive.
///
/// Resolution order:
/// 1. the best-scoring geometric primitive above the acceptance threshold,
///    redirected to its module call site when it lives inside a module
///    definition;
/// 2. a module call chosen by the click's normalized Z position within the
///    model's overall Z extent (line order approximates stacking order in
///    typical sequential models);
/// 3. the first boolean operation;
/// 4. no match.
pub fn find_best_matching_primitive<'a>(
    world_position: DVec3,
    normal: DVec3,
    _face_vertices: &[DVec3],
    primitives: &'a [MappedPrimitive],
) -> Option<&'a MappedPrimitive> {
    if primitives.is_empty() {
        return None;
    }

    let geometric: Vec<&MappedPrimitive> =
        primitives.iter().filter(|p| p.kind.is_geometric()).collect();
    let module_calls: Vec<&MappedPrimitive> = primitives
        .iter()
        .filter(|p| p.kind.is_module_call())
        .collect();
    let boolean_ops: Vec<&MappedPrimitive> = primitives
        .iter()
        .filter(|p| p.kind.is_boolean_op())
        .collect();

    // Best geometric candidate; earliest wins on a tie.
    let mut best: Option<(&MappedPrimitive, f64)> = None;
    for &primitive in &geometric {
        let score = match_score(world_position, normal, primitive);
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((primitive, score));
        }
    }

    if let Some((primitive, score)) = best {
        if score > MATCH_THRESHOLD {
            if let Some(parent) = primitive.parent_module_id.as_deref() {
                if let Some(call) = module_calls
                    .iter()
                    .find(|mc| mc.module_name() == Some(parent))
                    .copied()
                {
                    return Some(call);
                }
            }
            return Some(primitive);
        }
    }

    if let Some(call) = fallback_module_call(world_position, &geometric, &module_calls) {
        return Some(call);
    }

    boolean_ops.first().copied()
}

/// Z-position heuristic over module calls when no geometric primitive
/// clears the threshold.
fn fallback_module_call<'a>(
    world_position: DVec3,
    geometric: &[&MappedPrimitive],
    module_calls: &[&'a MappedPrimitive],
) -> Option<&'a MappedPrimitive> {
    if module_calls.is_empty() {
        return None;
    }

    let mut sorted: Vec<&MappedPrimitive> = module_calls.to_vec();
    sorted.sort_by_key(|p| p.location.start_line);

    // Normalize the click's Z within the model's overall Z extent.
    let mut min_z = f64::INFINITY;
    let mut max_z = f64::NEG_INFINITY;
    for p in geometric {
        let (lo, hi) = p.bounds.z_range();
        min_z = min_z.min(lo);
        max_z = max_z.max(hi);
    }

    if min_z < max_z && sorted.len() > 1 {
        let normalized = (world_position.z - min_z) / (max_z - min_z);
        let index = ((normalized * sorted.len() as f64).floor() as isize)
            .clamp(0, sorted.len() as isize - 1) as usize;
        return Some(sorted[index]);
    }

    Some(sorted[0])
}

// =============================================================================
// SCORING
// =============================================================================

/// Weighted match score of a click against one geometric primitive.
///
/// Boolean operations never reach this function; they carry the flat
/// [`BOOLEAN_OP_SCORE`] instead.
fn match_score(position: DVec3, normal: DVec3, primitive: &MappedPrimitive) -> f64 {
    if primitive.kind.is_boolean_op() {
        return BOOLEAN_OP_SCORE;
    }

    let bounds = &primitive.bounds;
    let mut score = 0.0;

    // Distance: inverse of the click-to-center distance, normalized by the
    // primitive's largest dimension so big parts are not penalized.
    let dist = position.distance(bounds.center);
    let max_dim = bounds.max_dimension();
    let normalized = if max_dim > 0.0 { dist / max_dim } else { dist };
    let distance_score = 1.0 / (1.0 + normalized);
    score += distance_score * WEIGHT_DISTANCE;

    // Containment: full weight iff the click is inside the half-extents.
    if bounds.contains_point(position) {
        score += WEIGHT_CONTAINMENT;
    }

    // Normal alignment, by shape family.
    let normal_score = match primitive.kind.normal_profile() {
        NormalProfile::BoxLike => normal.abs().max_element(),
        NormalProfile::CylinderLike => {
            if normal.z.abs() > CYLINDER_CAP_THRESHOLD {
                1.0
            } else {
                normal.truncate().length()
            }
        }
        NormalProfile::SphereLike => {
            let to_click = position - bounds.center;
            let magnitude = to_click.length();
            if magnitude < DEGENERATE_DIRECTION_EPSILON {
                0.0
            } else {
                normal.dot(to_click / magnitude).abs()
            }
        }
        NormalProfile::Other => NEUTRAL_NORMAL_SCORE,
    };
    score += normal_score * WEIGHT_NORMAL;

    // Proximity: the distance signal again, reinforcing nearby matches.
    score += distance_score * WEIGHT_PROXIMITY;

    score
}

// =============================================================================
// TESTS
// =============================================================================
