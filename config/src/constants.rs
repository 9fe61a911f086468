//! # Configuration Constants
//!
//! Centralized constants for the source-mapping engine and workflow pipeline.
//! Match-resolver weights, geometry fallbacks, and pipeline bounds are all
//! defined here.
//!
//! ## Categories
//!
//! - **Match Scoring**: Weights and threshold for click-to-code resolution
//! - **Geometry**: Fallback dimensions and classification tolerances
//! - **Pipeline**: Image preprocessing defaults and verification bounds

// =============================================================================
// MATCH SCORING CONSTANTS
// =============================================================================

/// Weight of the distance signal in the click-match score.
///
/// The distance signal is `1 / (1 + d)` where `d` is the click-to-center
/// distance normalized by the primitive's largest bounding dimension.
///
/// The four weights sum to 1.0. They are empirically tuned values; treat
/// them as configuration rather than something to re-derive.
///
/// # Example
///
/// ```rust
/// use config::constants::{WEIGHT_DISTANCE, WEIGHT_CONTAINMENT, WEIGHT_NORMAL, WEIGHT_PROXIMITY};
///
/// let total = WEIGHT_DISTANCE + WEIGHT_CONTAINMENT + WEIGHT_NORMAL + WEIGHT_PROXIMITY;
/// assert!((total - 1.0).abs() < 1e-12);
/// ```
pub const WEIGHT_DISTANCE: f64 = 0.30;

/// Weight of the containment signal in the click-match score.
///
/// Awarded in full when the click point lies inside the primitive's
/// axis-aligned half-extents around its center, zero otherwise.
pub const WEIGHT_CONTAINMENT: f64 = 0.30;

/// Weight of the normal-alignment signal in the click-match score.
///
/// The normal signal is shape-specific: axis dominance for box-like shapes,
/// cap/lateral split for cylinder-like shapes, radial alignment for
/// sphere-like shapes, and a flat neutral value for everything else.
pub const WEIGHT_NORMAL: f64 = 0.25;

/// Weight of the proximity signal in the click-match score.
///
/// Reuses the distance signal as deliberate reinforcement of nearby matches.
pub const WEIGHT_PROXIMITY: f64 = 0.15;

/// Minimum combined score for a geometric primitive to win a click.
///
/// Below this the resolver falls back to module calls, then to boolean
/// operations, then reports no match.
///
/// # Example
///
/// ```rust
/// use config::constants::MATCH_THRESHOLD;
///
/// let best_score = 0.22;
/// let accepted = best_score > MATCH_THRESHOLD;
/// assert!(!accepted);
/// ```
pub const MATCH_THRESHOLD: f64 = 0.3;

/// Flat score assigned to boolean-operation primitives.
///
/// Boolean ops are excluded from weighted scoring and kept only as a
/// last-resort fallback target.
pub const BOOLEAN_OP_SCORE: f64 = 0.1;

/// Neutral normal-alignment score for shapes without a specific profile.
pub const NEUTRAL_NORMAL_SCORE: f64 = 0.5;

/// Threshold on `|normal.z|` above which a cylinder click counts as an
/// end-cap hit rather than a lateral-surface hit.
pub const CYLINDER_CAP_THRESHOLD: f64 = 0.9;

// =============================================================================
// GEOMETRY CONSTANTS
// =============================================================================

/// Fallback edge length for primitives whose arguments could not be read.
///
/// The extractor prioritizes availability over precision: malformed or
/// unrecognized argument shapes produce a unit-sized bound instead of an
/// error.
///
/// # Example
///
/// ```rust
/// use config::constants::DEFAULT_DIMENSION;
///
/// let dims = [DEFAULT_DIMENSION; 3];
/// assert_eq!(dims, [1.0, 1.0, 1.0]);
/// ```
pub const DEFAULT_DIMENSION: f64 = 1.0;

/// Minimum vector magnitude treated as non-degenerate when normalizing
/// the center-to-click direction for sphere normal scoring.
pub const DEGENERATE_DIRECTION_EPSILON: f64 = 1e-3;

/// Epsilon for floating-point comparisons in geometry tests and bounds
/// checks.
pub const GEOMETRY_EPSILON: f64 = 1e-9;

// =============================================================================
// PIPELINE CONSTANTS
// =============================================================================

/// Default maximum image dimension (pixels) after preprocessing.
///
/// Chosen to match the optimal input size of current vision models; larger
/// images are downscaled before being sent to the provider.
pub const DEFAULT_IMAGE_MAX_DIMENSION: u32 = 1568;

/// Default JPEG quality (1-100) for preprocessed images.
pub const DEFAULT_IMAGE_QUALITY: u8 = 85;

/// Default bound on render-and-verify iterations.
///
/// The verification loop regenerates code at most this many times before
/// surfacing the last result to the user.
///
/// # Example
///
/// ```rust
/// use config::constants::DEFAULT_MAX_VERIFICATION_ITERATIONS;
///
/// let mut attempts = 0;
/// while attempts < DEFAULT_MAX_VERIFICATION_ITERATIONS {
///     attempts += 1;
/// }
/// assert_eq!(attempts, 3);
/// ```
pub const DEFAULT_MAX_VERIFICATION_ITERATIONS: u32 = 3;

/// Timeout in seconds for a single AI-provider call.
///
/// The engine never blocks unboundedly on a remote service; a call that
/// exceeds this is treated as a step failure.
pub const PROVIDER_TIMEOUT_SECS: u64 = 120;

/// Maximum completion tokens requested for vision analysis calls.
pub const VISION_ANALYSIS_MAX_TOKENS: u32 = 4096;

/// Maximum completion tokens requested for code generation calls.
pub const CODE_GENERATION_MAX_TOKENS: u32 = 8192;

/// Maximum completion tokens requested for verification comparison calls.
pub const VERIFICATION_MAX_TOKENS: u32 = 2048;

/// Similarity score (0-100) below which a verification result is treated
/// as a poor match and the accept option is demoted.
pub const POOR_MATCH_SCORE: u32 = 30;

/// Similarity score (0-100) below which a verification result is treated
/// as only a fair match.
pub const FAIR_MATCH_SCORE: u32 = 60;
