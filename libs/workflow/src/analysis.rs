//! # Structured Model Outputs
//!
//! The JSON shapes the vision-to-code pipeline expects back from its AI
//! calls: the structured image description and the render-comparison
//! report. Parsing is lenient — every field defaults — and a response that
//! is not JSON at all degrades to a low-confidence fallback instead of
//! failing the step.

use config::constants::{FAIR_MATCH_SCORE, POOR_MATCH_SCORE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// VISION ANALYSIS
// =============================================================================

/// What kind of image the model believes it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    TechnicalDrawing,
    Sketch,
    Photo,
    CadScreenshot,
    #[default]
    Unknown,
}

/// Self-reported confidence of the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

/// Shape-level outline of the object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryOutline {
    pub primary_shapes: Vec<String>,
    pub operations: Vec<String>,
    pub features: Vec<String>,
}

/// Overall object dimensions in millimeters, where estimable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallDimensions {
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
}

/// Dimension estimates: the overall envelope plus named features.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionEstimates {
    pub overall: Option<OverallDimensions>,
    pub features: BTreeMap<String, f64>,
}

/// Structured description of the requested object, produced by the vision
/// analysis step and reviewed by the user before code generation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionAnalysis {
    pub image_type: ImageType,
    pub description: String,
    pub geometry: GeometryOutline,
    pub dimensions: DimensionEstimates,
    pub confidence: Confidence,
    pub ambiguities: Vec<String>,
    /// Shape-library vocabulary the code generator should reach for.
    #[serde(rename = "openscad_vocabulary")]
    pub vocabulary: Vec<String>,
}

impl VisionAnalysis {
    /// Fallback when the model response is not parseable JSON: carry the
    /// raw text as the description, flagged low-confidence.
    pub fn fallback(raw: &str) -> Self {
        Self {
            description: raw.chars().take(500).collect(),
            confidence: Confidence::Low,
            ambiguities: vec!["Failed to parse structured output from the vision model".to_string()],
            vocabulary: vec!["cuboid".to_string(), "cyl".to_string()],
            ..Self::default()
        }
    }
}

// =============================================================================
// VERIFICATION REPORT
// =============================================================================

/// Qualitative match grade from the comparison model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    Excellent,
    Good,
    #[default]
    Fair,
    Poor,
}

/// What the comparison model recommends doing next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    #[default]
    Proceed,
    MinorAdjustment,
    MajorRevision,
}

/// Per-aspect comparison detail.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchDetails {
    pub proportions_match: bool,
    pub features_match: bool,
    pub dimensions_match: bool,
}

/// Result of comparing the rendered model against the original image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationReport {
    pub match_quality: MatchQuality,
    pub discrepancies: Vec<String>,
    pub recommendation: Recommendation,
    /// 0-100.
    pub similarity_score: u32,
    pub details: MatchDetails,
}

impl Default for VerificationReport {
    fn default() -> Self {
        Self {
            match_quality: MatchQuality::Fair,
            discrepancies: Vec::new(),
            recommendation: Recommendation::Proceed,
            similarity_score: 50,
            details: MatchDetails::default(),
        }
    }
}

impl VerificationReport {
    /// Fallback when the comparison response is not parseable JSON.
    pub fn fallback() -> Self {
        Self {
            match_quality: MatchQuality::Poor,
            discrepancies: vec!["Failed to parse comparison results".to_string()],
            ..Self::default()
        }
    }

    /// A match too poor to accept without a warning.
    pub fn is_poor(&self) -> bool {
        self.match_quality == MatchQuality::Poor
            || self.similarity_score < POOR_MATCH_SCORE
            || self.recommendation == Recommendation::MajorRevision
    }

    /// A partial match that likely needs adjustment.
    pub fn is_fair(&self) -> bool {
        self.match_quality == MatchQuality::Fair
            || (self.similarity_score >= POOR_MATCH_SCORE
                && self.similarity_score < FAIR_MATCH_SCORE)
    }
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

/// Strip a leading/trailing markdown code fence from a model response.
pub fn strip_code_fences(content: &str) -> &str {
    let mut s = content.trim();
    for prefix in ["```json", "```openscad", "```scad", "```"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest;
            break;
        }
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Parse a vision-analysis response, degrading to the fallback on invalid
/// JSON.
pub fn parse_vision_analysis(content: &str) -> VisionAnalysis {
    serde_json::from_str(strip_code_fences(content))
        .unwrap_or_else(|_| VisionAnalysis::fallback(content))
}

/// Parse a verification response, degrading to the fallback on invalid
/// JSON.
pub fn parse_verification_report(content: &str) -> VerificationReport {
    serde_json::from_str(strip_code_fences(content))
        .unwrap_or_else(|_| VerificationReport::fallback())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```scad\ncube(1);\n```"), "cube(1);");
        assert_eq!(strip_code_fences("plain"), "plain");
        assert_eq!(strip_code_fences("```\nx\n```"), "x");
    }

    #[test]
    fn test_parse_partial_analysis_fills_defaults() {
        let analysis = parse_vision_analysis(
            r#"{"image_type": "photo", "description": "a mug", "confidence": "high"}"#,
        );
        assert_eq!(analysis.image_type, ImageType::Photo);
        assert_eq!(analysis.description, "a mug");
        assert_eq!(analysis.confidence, Confidence::High);
        assert!(analysis.geometry.primary_shapes.is_empty());
        assert!(analysis.vocabulary.is_empty());
    }

    #[test]
    fn test_parse_analysis_fallback() {
        let analysis = parse_vision_analysis("The object appears to be a mug with a handle.");
        assert_eq!(analysis.confidence, Confidence::Low);
        assert!(analysis.description.starts_with("The object"));
        assert_eq!(analysis.ambiguities.len(), 1);
    }

    #[test]
    fn test_parse_fenced_analysis() {
        let analysis =
            parse_vision_analysis("```json\n{\"description\": \"a bracket\"}\n```");
        assert_eq!(analysis.description, "a bracket");
    }

    #[test]
    fn test_parse_verification_report() {
        let report = parse_verification_report(
            r#"{"match_quality": "good", "similarity_score": 82, "recommendation": "proceed", "discrepancies": []}"#,
        );
        assert_eq!(report.match_quality, MatchQuality::Good);
        assert_eq!(report.similarity_score, 82);
        assert!(!report.is_poor());
    }

    #[test]
    fn test_verification_fallback_is_poor() {
        let report = parse_verification_report("I could not compare these images.");
        assert_eq!(report.match_quality, MatchQuality::Poor);
        assert!(report.is_poor());
    }

    #[test]
    fn test_poor_match_thresholds() {
        let mut report = VerificationReport {
            similarity_score: 25,
            ..VerificationReport::default()
        };
        assert!(report.is_poor());

        report.similarity_score = 45;
        assert!(!report.is_poor());
        assert!(report.is_fair());

        report.recommendation = Recommendation::MajorRevision;
        assert!(report.is_poor());
    }
}
