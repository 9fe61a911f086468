//! # SCAD Source Map
//!
//! Bidirectional source mapping between OpenSCAD code and 3D geometry.
//!
//! ## Architecture
//!
//! ```text
//! Source → scad-parser (CST) → extract (MappedPrimitive list) → resolve
//!                                                               ↕
//!                                                    viewer picks / cursor
//! ```
//!
//! The engine is pure and stateless: each parse replaces the previous
//! primitive list wholesale, and both resolvers are plain functions over
//! that list. Parsing and matching fail soft — broken source yields a
//! partial list plus errors, and an unresolvable click is a `None`, so the
//! interactive UI always stays live.
//!
//! ## Example
//!
//! ```rust
//! use scad_source_map::{analyze, resolve::find_best_matching_primitive};
//! use glam::DVec3;
//!
//! let result = analyze("translate([10, 0, 0]) cube([2, 2, 2]);");
//! let hit = find_best_matching_primitive(
//!     DVec3::new(10.0, 0.0, 1.0),
//!     DVec3::Z,
//!     &[],
//!     &result.primitives,
//! );
//! assert!(hit.unwrap().id.starts_with("cube"));
//! ```

pub mod args;
pub mod bounds;
pub mod extract;
pub mod highlight;
pub mod matrix;
pub mod primitive;
pub mod resolve;

// Re-export public API
pub use extract::{analyze, TransformStack};
pub use highlight::{HighlightState, ViewerPick};
pub use matrix::TransformMatrix;
pub use primitive::{
    AnalysisResult, GeometricBounds, MappedPrimitive, PrimitiveKind, SourceLocation,
};
pub use resolve::{find_best_matching_primitive, find_primitive_by_line};
