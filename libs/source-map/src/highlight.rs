//! # Highlight State
//!
//! The value shared between the 3D viewer and the code panel. Exactly one
//! origin (viewer pick or code cursor) is set per update; the resolved
//! primitive rides along when a match was found. State is rebuilt wholesale
//! on every event — no history, no partial updates.

use crate::primitive::MappedPrimitive;
use crate::resolve::{find_best_matching_primitive, find_primitive_by_line};
use glam::DVec3;
use serde::{Deserialize, Serialize};

// =============================================================================
// PICK INPUTS
// =============================================================================

/// A click in the 3D viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerPick {
    /// Index of the mesh face that was hit.
    pub face_index: u32,
    /// World-space intersection point.
    pub world_position: DVec3,
    /// Surface normal at the intersection.
    pub normal: DVec3,
    /// Vertices of the hit face.
    pub face_vertices: Vec<DVec3>,
}

// =============================================================================
// HIGHLIGHT STATE
// =============================================================================

/// Highlight origin: the viewer side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerHighlight {
    /// Face that was clicked.
    pub face_index: u32,
    /// World-space click position.
    pub world_position: DVec3,
    /// Id of the matched primitive, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primitive_id: Option<String>,
}

/// Highlight origin: the code side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeHighlight {
    /// Cursor line (1-indexed).
    pub line_number: u32,
    /// Id of the matched primitive, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primitive_id: Option<String>,
}

/// The bidirectional highlight value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightState {
    /// Set when the highlight originated from a 3D click.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_viewer: Option<ViewerHighlight>,
    /// Set when the highlight originated from the code cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_code: Option<CodeHighlight>,
    /// The resolved primitive, absent on a miss.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlighted_primitive: Option<MappedPrimitive>,
}

impl HighlightState {
    /// Cleared state, used when a pick misses everything.
    pub fn cleared() -> Self {
        Self::default()
    }

    /// Resolve a viewer click against the current primitive list.
    pub fn from_viewer_pick(pick: &ViewerPick, primitives: &[MappedPrimitive]) -> Self {
        let matched = find_best_matching_primitive(
            pick.world_position,
            pick.normal,
            &pick.face_vertices,
            primitives,
        );
        Self {
            from_viewer: Some(ViewerHighlight {
                face_index: pick.face_index,
                world_position: pick.world_position,
                primitive_id: matched.map(|p| p.id.clone()),
            }),
            from_code: None,
            highlighted_primitive: matched.cloned(),
        }
    }

    /// Resolve a code-cursor position against the current primitive list.
    pub fn from_code_cursor(line_number: u32, primitives: &[MappedPrimitive]) -> Self {
        let matched = find_primitive_by_line(line_number, primitives);
        Self {
            from_viewer: None,
            from_code: Some(CodeHighlight {
                line_number,
                primitive_id: matched.map(|p| p.id.clone()),
            }),
            highlighted_primitive: matched.cloned(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;

    #[test]
    fn test_viewer_pick_sets_only_viewer_origin() {
        let result = analyze("cube([4, 4, 4]);");
        let pick = ViewerPick {
            face_index: 2,
            world_position: DVec3::new(0.0, 0.0, 1.0),
            normal: DVec3::Z,
            face_vertices: vec![],
        };
        let state = HighlightState::from_viewer_pick(&pick, &result.primitives);

        assert!(state.from_viewer.is_some());
        assert!(state.from_code.is_none());
        let highlighted = state.highlighted_primitive.unwrap();
        assert!(highlighted.id.starts_with("cube"));
        assert_eq!(
            state.from_viewer.unwrap().primitive_id.as_deref(),
            Some(highlighted.id.as_str())
        );
    }

    #[test]
    fn test_code_cursor_sets_only_code_origin() {
        let result = analyze("cube(1);\nsphere(2);");
        let state = HighlightState::from_code_cursor(2, &result.primitives);

        assert!(state.from_code.is_some());
        assert!(state.from_viewer.is_none());
        assert!(state
            .highlighted_primitive
            .as_ref()
            .unwrap()
            .id
            .starts_with("sphere"));
    }

    #[test]
    fn test_miss_keeps_origin_but_no_primitive() {
        let result = analyze("cube(1);");
        let state = HighlightState::from_code_cursor(40, &result.primitives);

        assert!(state.from_code.is_some());
        assert!(state.highlighted_primitive.is_none());
        assert!(state.from_code.unwrap().primitive_id.is_none());
    }

    #[test]
    fn test_cleared_state_is_empty() {
        let state = HighlightState::cleared();
        assert!(state.from_viewer.is_none());
        assert!(state.from_code.is_none());
        assert!(state.highlighted_primitive.is_none());
    }
}
