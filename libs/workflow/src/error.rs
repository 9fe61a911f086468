//! # Workflow Errors
//!
//! Pipeline steps fail hard: every failure either terminates the workflow
//! visibly or is retried by an explicit higher-level action. Nothing is
//! swallowed.

use crate::entity::WorkflowStatus;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the workflow engine and pipelines.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("store error: {0}")]
    Store(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("step not found: {0}")]
    StepNotFound(Uuid),

    #[error("inflection point not found: {0}")]
    InflectionPointNotFound(Uuid),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider call timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("image '{image_id}' unavailable: {message}")]
    ImageUnavailable { image_id: String, message: String },

    #[error("unknown choice '{0}'")]
    UnknownChoice(String),

    #[error("unknown step to resume from: {0}")]
    UnknownResumeStep(String),

    #[error("workflow cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Shorthand for store-layer failures.
    pub fn store<E: std::fmt::Display>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Shorthand for provider-layer failures.
    pub fn provider<E: std::fmt::Display>(e: E) -> Self {
        Self::Provider(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_display() {
        let e = WorkflowError::InvalidTransition {
            from: WorkflowStatus::Completed,
            to: WorkflowStatus::Running,
        };
        assert_eq!(
            e.to_string(),
            "invalid status transition: completed -> running"
        );
    }

    #[test]
    fn test_step_failed_display() {
        let e = WorkflowError::StepFailed {
            step: "code_generation".to_string(),
            message: "model unavailable".to_string(),
        };
        assert!(e.to_string().contains("code_generation"));
        assert!(e.to_string().contains("model unavailable"));
    }
}
