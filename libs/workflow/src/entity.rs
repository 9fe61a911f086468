//! # Workflow Entities
//!
//! The persisted data model of the workflow engine: workflows, their
//! append-only step records, inflection points, and the configuration tree
//! that parameterizes a run.
//!
//! A workflow's `state` is an opaque JSON blob owned by the concrete
//! pipeline; the engine persists and hands it back without interpreting it.

use chrono::{DateTime, Utc};
use config::constants::{
    DEFAULT_IMAGE_MAX_DIMENSION, DEFAULT_IMAGE_QUALITY, DEFAULT_MAX_VERIFICATION_ITERATIONS,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// STATUS ENUMS
// =============================================================================

/// Workflow lifecycle status.
///
/// ```text
/// pending → running ⇄ awaiting_input → { completed | failed | cancelled }
/// ```
///
/// The `running ⇄ awaiting_input` cycle repeats once per inflection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    AwaitingInput,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    /// Terminal states admit no further transitions.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Snake-case name, matching the serialized form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Preprocessing,
    AiCall,
    InflectionPoint,
    Postprocessing,
    Verification,
}

/// Step lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Registered workflow kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowType {
    /// Image(s) → structured description → OpenSCAD code, with optional
    /// render-and-verify loop.
    #[serde(rename = "vision-to-code")]
    VisionToCode,
}

// =============================================================================
// WORKFLOW
// =============================================================================

/// A long-running, checkpointed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub workflow_type: WorkflowType,
    pub status: WorkflowStatus,
    /// Name of the step currently (or last) executing.
    pub current_step: Option<String>,
    pub config: WorkflowConfig,
    /// Opaque pipeline-owned state, persisted after every step so a fresh
    /// invocation can resume from it.
    pub state: Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a new workflow in `pending` state.
    pub fn new(workflow_type: WorkflowType, config: WorkflowConfig, state: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_type,
            status: WorkflowStatus::Pending,
            current_step: None,
            config,
            state,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// WORKFLOW STEP
// =============================================================================

/// One execution record. Steps are append-only: a retry creates a new
/// record, never re-runs an existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub name: String,
    pub step_type: StepType,
    pub status: StepStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub model_used: Option<String>,
    pub prompt_version: Option<String>,
    pub tokens_used: Option<u32>,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    /// Create a step record in `running` state, timestamped now.
    pub fn started(workflow_id: Uuid, name: &str, step_type: StepType, input: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            name: name.to_string(),
            step_type,
            status: StepStatus::Running,
            input,
            output: None,
            error: None,
            model_used: None,
            prompt_version: None,
            tokens_used: None,
            duration_ms: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Create an already-finalized `skipped` record.
    pub fn skipped(workflow_id: Uuid, name: &str, reason: &str) -> Self {
        let mut step = Self::started(
            workflow_id,
            name,
            StepType::Preprocessing,
            Value::Null,
        );
        step.status = StepStatus::Skipped;
        step.output = Some(serde_json::json!({ "reason": reason }));
        step.completed_at = Some(Utc::now());
        step
    }
}

// =============================================================================
// INFLECTION POINT
// =============================================================================

/// A checkpoint where execution suspends pending a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflectionPoint {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub step_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    /// Arbitrary JSON for UI display: images, code previews, comparisons.
    pub context: Value,
    pub options: Vec<InflectionOption>,
    pub user_choice: Option<String>,
    pub user_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl InflectionPoint {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Check whether `choice_id` names one of the offered options.
    pub fn has_option(&self, choice_id: &str) -> bool {
        self.options.iter().any(|o| o.id == choice_id)
    }
}

/// One selectable choice at an inflection point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflectionOption {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub action: InflectionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<OptionVariant>,
}

impl InflectionOption {
    pub fn new(id: &str, label: &str, action: InflectionAction) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: None,
            action,
            variant: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_variant(mut self, variant: OptionVariant) -> Self {
        self.variant = Some(variant);
        self
    }
}

/// What selecting an option means for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InflectionAction {
    Proceed,
    ProceedWithCode { code: String },
    Restart { from_step: Option<String> },
    Modify { requires_feedback: bool },
    Cancel,
    Verify,
    UseDifferentModel { model_tier: ModelTier },
}

/// Visual emphasis of an option button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionVariant {
    Default,
    Primary,
    Destructive,
    Outline,
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Quality/cost tier used to pick models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Best,
    Balanced,
    Fast,
    Experimental,
}

/// What a model is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Vision,
    CodeGeneration,
    Verification,
}

/// Model selection: a tier plus optional per-role overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub tier: ModelTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_generation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
}

impl ModelConfig {
    /// Resolve the model id for a role: explicit override first, then the
    /// tier default.
    pub fn model_for(&self, role: ModelRole) -> &str {
        let override_id = match role {
            ModelRole::Vision => self.vision.as_deref(),
            ModelRole::CodeGeneration => self.code_generation.as_deref(),
            ModelRole::Verification => self.verification.as_deref(),
        };
        override_id.unwrap_or_else(|| tier_default(self.tier, role))
    }
}

/// Default model id per tier and role.
fn tier_default(tier: ModelTier, role: ModelRole) -> &'static str {
    match (tier, role) {
        (ModelTier::Best, _) => "anthropic/claude-sonnet-4",
        (ModelTier::Balanced, _) => "google/gemini-2.5-flash",
        (ModelTier::Fast, _) => "google/gemini-2.0-flash-lite",
        (ModelTier::Experimental, _) => "qwen/qwen2.5-vl-72b-instruct",
    }
}

/// Prompt template selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Template version, e.g. `"v2.0"`.
    pub version: String,
}

/// Image preprocessing options for vision inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub enabled: bool,
    pub max_dimension: u32,
    pub format: ImageFormat,
    /// JPEG quality, 1-100.
    pub quality: u8,
    pub enhance: bool,
}

/// Target image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

/// Whether the pipeline pauses for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflectionPointsConfig {
    pub enabled: bool,
}

/// Render-and-verify loop options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub max_iterations: u32,
}

/// The full per-workflow configuration tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub models: ModelConfig,
    pub prompts: PromptConfig,
    pub preprocessing: PreprocessingConfig,
    pub inflection_points: InflectionPointsConfig,
    pub verification: VerificationConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            models: ModelConfig {
                tier: ModelTier::Balanced,
                vision: None,
                code_generation: None,
                verification: None,
            },
            prompts: PromptConfig {
                version: "v2.0".to_string(),
            },
            preprocessing: PreprocessingConfig {
                enabled: true,
                max_dimension: DEFAULT_IMAGE_MAX_DIMENSION,
                format: ImageFormat::Jpeg,
                quality: DEFAULT_IMAGE_QUALITY,
                enhance: false,
            },
            inflection_points: InflectionPointsConfig { enabled: true },
            verification: VerificationConfig {
                enabled: false,
                max_iterations: DEFAULT_MAX_VERIFICATION_ITERATIONS,
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(!WorkflowStatus::AwaitingInput.is_terminal());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_new_workflow_is_pending() {
        let w = Workflow::new(
            WorkflowType::VisionToCode,
            WorkflowConfig::default(),
            Value::Null,
        );
        assert_eq!(w.status, WorkflowStatus::Pending);
        assert!(w.current_step.is_none());
        assert!(w.error.is_none());
    }

    #[test]
    fn test_skipped_step_is_finalized() {
        let step = WorkflowStep::skipped(Uuid::new_v4(), "preprocess_images", "disabled");
        assert_eq!(step.status, StepStatus::Skipped);
        assert!(step.completed_at.is_some());
        assert_eq!(step.output.as_ref().unwrap()["reason"], "disabled");
    }

    #[test]
    fn test_model_override_beats_tier() {
        let config = ModelConfig {
            tier: ModelTier::Fast,
            vision: Some("custom/vision-model".to_string()),
            code_generation: None,
            verification: None,
        };
        assert_eq!(config.model_for(ModelRole::Vision), "custom/vision-model");
        assert_eq!(
            config.model_for(ModelRole::CodeGeneration),
            "google/gemini-2.0-flash-lite"
        );
    }

    #[test]
    fn test_inflection_option_lookup() {
        let point = InflectionPoint {
            id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            title: "Review".to_string(),
            description: None,
            context: Value::Null,
            options: vec![
                InflectionOption::new("proceed", "Looks Good", InflectionAction::Proceed),
                InflectionOption::new("cancel", "Cancel", InflectionAction::Cancel),
            ],
            user_choice: None,
            user_feedback: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        assert!(point.has_option("proceed"));
        assert!(!point.has_option("retry"));
        assert!(!point.is_resolved());
    }

    #[test]
    fn test_status_serde_round_trip() {
        let json = serde_json::to_string(&WorkflowStatus::AwaitingInput).unwrap();
        assert_eq!(json, "\"awaiting_input\"");
        let back: WorkflowStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WorkflowStatus::AwaitingInput);
    }

    #[test]
    fn test_action_serde_is_tagged() {
        let action = InflectionAction::Modify {
            requires_feedback: true,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "modify");
        assert_eq!(json["requires_feedback"], true);
    }

    #[test]
    fn test_default_config() {
        let config = WorkflowConfig::default();
        assert!(config.inflection_points.enabled);
        assert!(!config.verification.enabled);
        assert_eq!(config.verification.max_iterations, 3);
        assert_eq!(config.preprocessing.max_dimension, 1568);
    }
}
