//! # Workflow Events
//!
//! Discrete event objects emitted on every state transition and step
//! completion, suitable for incremental delivery to a subscribed client as
//! newline-delimited JSON over a chunked response.
//!
//! Emission is fire-and-forget and always happens *after* persistence: a
//! client that misses events reconstructs state from the stored workflow
//! and step records. The channel is never the source of truth.

use crate::entity::{InflectionPoint, Workflow, WorkflowStep, WorkflowType};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

// =============================================================================
// EVENTS
// =============================================================================

/// Why a screenshot is being requested from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotPurpose {
    Verification,
    Comparison,
}

/// A single streamed workflow event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    #[serde(rename = "workflow.started")]
    Started {
        workflow_id: Uuid,
        workflow_type: WorkflowType,
    },

    #[serde(rename = "workflow.step.started")]
    StepStarted { step: WorkflowStep },

    #[serde(rename = "workflow.step.progress")]
    StepProgress {
        step_id: Uuid,
        /// 0-100.
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "workflow.step.completed")]
    StepCompleted { step: WorkflowStep },

    #[serde(rename = "workflow.inflection_point")]
    InflectionPointRaised { inflection_point: InflectionPoint },

    #[serde(rename = "workflow.screenshot_requested")]
    ScreenshotRequested {
        workflow_id: Uuid,
        step_id: Uuid,
        purpose: ScreenshotPurpose,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    #[serde(rename = "workflow.completed")]
    Completed { workflow: Workflow },

    #[serde(rename = "workflow.failed")]
    Failed {
        workflow_id: Uuid,
        error: String,
        recoverable: bool,
        recovery_options: Vec<String>,
    },

    #[serde(rename = "workflow.cancelled")]
    Cancelled {
        workflow_id: Uuid,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Serialize an event as one NDJSON line (newline included).
pub fn to_ndjson_line(event: &WorkflowEvent) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}

// =============================================================================
// EVENT SINK
// =============================================================================

/// Fire-and-forget sender side of the event stream.
///
/// A sink with no subscriber (or one whose subscriber hung up) silently
/// drops events; the pipeline must never stall on delivery.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<WorkflowEvent>>,
}

impl EventSink {
    /// A connected sink plus its subscriber end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink with no subscriber; every emit is a no-op.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Emit an event. Send failures are ignored by design.
    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{StepType, WorkflowStep};
    use serde_json::Value;

    #[test]
    fn test_ndjson_line_shape() {
        let event = WorkflowEvent::Failed {
            workflow_id: Uuid::nil(),
            error: "boom".to_string(),
            recoverable: true,
            recovery_options: vec!["retry".to_string()],
        };
        let line = to_ndjson_line(&event).unwrap();
        assert!(line.ends_with('\n'));
        assert!(!line[..line.len() - 1].contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "workflow.failed");
        assert_eq!(value["error"], "boom");
    }

    #[test]
    fn test_event_round_trip() {
        let step = WorkflowStep::started(Uuid::new_v4(), "vision_analysis", StepType::AiCall, Value::Null);
        let event = WorkflowEvent::StepStarted { step: step.clone() };
        let json = serde_json::to_string(&event).unwrap();
        let back: WorkflowEvent = serde_json::from_str(&json).unwrap();
        match back {
            WorkflowEvent::StepStarted { step: s } => assert_eq!(s.id, step.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(WorkflowEvent::Started {
            workflow_id: Uuid::nil(),
            workflow_type: crate::entity::WorkflowType::VisionToCode,
        });
        sink.emit(WorkflowEvent::Cancelled {
            workflow_id: Uuid::nil(),
            reason: None,
        });

        assert!(matches!(rx.recv().await, Some(WorkflowEvent::Started { .. })));
        assert!(matches!(rx.recv().await, Some(WorkflowEvent::Cancelled { .. })));
    }

    #[test]
    fn test_disconnected_sink_does_not_panic() {
        let sink = EventSink::disconnected();
        sink.emit(WorkflowEvent::Cancelled {
            workflow_id: Uuid::nil(),
            reason: Some("no subscriber".to_string()),
        });
    }

    #[test]
    fn test_dropped_subscriber_is_tolerated() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(WorkflowEvent::Cancelled {
            workflow_id: Uuid::nil(),
            reason: None,
        });
    }
}
