//! # Transform Matrices
//!
//! Row-major 4x4 affine transforms used to place primitives in world space.
//!
//! Matrices are immutable: every operation returns a new matrix. Composition
//! order is parent-to-child — the parent transform is the left operand when
//! applying a child transform within the parent frame.
//!
//! ## Example
//!
//! ```rust
//! use scad_source_map::matrix::TransformMatrix;
//! use glam::DVec3;
//!
//! let m = TransformMatrix::translation(10.0, 0.0, 0.0);
//! let p = m.transform_point(DVec3::ZERO);
//! assert_eq!(p, DVec3::new(10.0, 0.0, 0.0));
//! ```

use glam::DVec3;
use serde::{Deserialize, Serialize};

// =============================================================================
// TRANSFORM MATRIX
// =============================================================================

/// A 4x4 affine transform, row-major.
///
/// The bottom row is assumed to stay `[0, 0, 0, 1]`; point transformation
/// ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformMatrix([f64; 16]);

impl TransformMatrix {
    /// The identity transform.
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Create a matrix from raw row-major elements.
    pub const fn from_elements(elements: [f64; 16]) -> Self {
        Self(elements)
    }

    /// The identity transform.
    pub const fn identity() -> Self {
        Self::IDENTITY
    }

    /// Matrix product `self · other`.
    ///
    /// Not commutative: when composing "apply child transform within parent
    /// frame", the parent is `self`.
    pub fn multiply(&self, other: &Self) -> Self {
        let a = &self.0;
        let b = &other.0;
        let mut out = [0.0; 16];
        for row in 0..4 {
            for col in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a[row * 4 + k] * b[k * 4 + col];
                }
                out[row * 4 + col] = sum;
            }
        }
        Self(out)
    }

    /// Translation by `(x, y, z)`.
    pub const fn translation(x: f64, y: f64, z: f64) -> Self {
        Self([
            1.0, 0.0, 0.0, x, //
            0.0, 1.0, 0.0, y, //
            0.0, 0.0, 1.0, z, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Scale by `(x, y, z)`.
    pub const fn scaling(x: f64, y: f64, z: f64) -> Self {
        Self([
            x, 0.0, 0.0, 0.0, //
            0.0, y, 0.0, 0.0, //
            0.0, 0.0, z, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    /// Euler rotation, angles in degrees, combined as `Rz · Ry · Rx`
    /// (X applied first).
    pub fn rotation_euler(x_deg: f64, y_deg: f64, z_deg: f64) -> Self {
        let (sx, cx) = x_deg.to_radians().sin_cos();
        let (sy, cy) = y_deg.to_radians().sin_cos();
        let (sz, cz) = z_deg.to_radians().sin_cos();

        Self([
            cy * cz,
            sx * sy * cz - cx * sz,
            cx * sy * cz + sx * sz,
            0.0,
            cy * sz,
            sx * sy * sz + cx * cz,
            cx * sy * sz - sx * cz,
            0.0,
            -sy,
            sx * cy,
            cx * cy,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ])
    }

    /// Apply the affine part of the transform to a point.
    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        let m = &self.0;
        DVec3::new(
            m[0] * point.x + m[1] * point.y + m[2] * point.z + m[3],
            m[4] * point.x + m[5] * point.y + m[6] * point.z + m[7],
            m[8] * point.x + m[9] * point.y + m[10] * point.z + m[11],
        )
    }

    /// The raw row-major elements.
    pub const fn as_array(&self) -> &[f64; 16] {
        &self.0
    }
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// =============================================================================
// TESTS
// =============================================================================
