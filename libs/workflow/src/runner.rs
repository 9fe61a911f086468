//! # Step Runner
//!
//! Sequences the steps of one workflow: persists a step record around every
//! executor invocation, transitions workflow status, raises and resolves
//! inflection points, and emits the event stream.
//!
//! Ordering guarantees: a step's persisted completion always precedes the
//! next step's start, and every event is emitted only after the state it
//! announces has been persisted — a reconnecting client can reconstruct
//! everything from storage.
//!
//! Cancellation is cooperative: the token is checked before each step and
//! handed to provider calls for best-effort aborts.

use crate::entity::{
    InflectionOption, InflectionPoint, StepStatus, StepType, Workflow, WorkflowConfig,
    WorkflowStatus, WorkflowStep,
};
use crate::error::WorkflowError;
use crate::event::{EventSink, WorkflowEvent};
use crate::store::WorkflowStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

// =============================================================================
// PIPELINE TRAIT
// =============================================================================

/// A concrete workflow implementation driven by a [`StepRunner`].
#[async_trait]
pub trait Pipeline: Send {
    /// Run from the beginning (or from persisted state on a fresh
    /// invocation). Returns when the workflow reaches a terminal state or
    /// suspends at an inflection point.
    async fn execute(&mut self) -> Result<(), WorkflowError>;

    /// Continue after an inflection point resolution, starting from the
    /// step after the one that requested it.
    async fn resume_from(
        &mut self,
        step_name: &str,
        choice: &str,
        feedback: Option<&str>,
    ) -> Result<(), WorkflowError>;
}

// =============================================================================
// STEP RESULTS
// =============================================================================

/// Bookkeeping recorded alongside a step's output.
#[derive(Debug, Clone, Default)]
pub struct StepMeta {
    pub model_used: Option<String>,
    pub prompt_version: Option<String>,
    pub tokens_used: Option<u32>,
}

/// What a step executor hands back.
#[derive(Debug, Clone)]
pub struct StepOutcome<T> {
    pub output: T,
    pub meta: StepMeta,
}

impl<T> StepOutcome<T> {
    /// Outcome without metadata.
    pub fn of(output: T) -> Self {
        Self {
            output,
            meta: StepMeta::default(),
        }
    }

    pub fn with_meta(output: T, meta: StepMeta) -> Self {
        Self { output, meta }
    }
}

/// Context handed to a step executor.
#[derive(Clone)]
pub struct StepContext {
    pub workflow_id: Uuid,
    pub step_id: Uuid,
    /// The workflow's persisted state blob at step start.
    pub state: Value,
    pub events: EventSink,
    /// Best-effort abort signal for in-flight external calls.
    pub cancel: CancellationToken,
}

impl StepContext {
    /// Emit a progress event for this step.
    pub fn progress(&self, progress: u8, message: &str) {
        self.events.emit(WorkflowEvent::StepProgress {
            step_id: self.step_id,
            progress,
            message: Some(message.to_string()),
        });
    }
}

/// Everything a pipeline needs to show the user at an inflection point.
#[derive(Debug, Clone)]
pub struct InflectionPointRequest {
    pub title: String,
    pub description: Option<String>,
    pub context: Value,
    pub options: Vec<InflectionOption>,
}

/// A resolved inflection point plus the step that requested it.
#[derive(Debug, Clone)]
pub struct ResolvedInflection {
    pub step_name: String,
    pub point: InflectionPoint,
}

// =============================================================================
// STEP RUNNER
// =============================================================================

/// Drives one workflow instance against a store and an event sink.
pub struct StepRunner {
    store: Arc<dyn WorkflowStore>,
    events: EventSink,
    workflow: Workflow,
    cancel: CancellationToken,
}

impl StepRunner {
    /// Create a runner for an already-persisted workflow.
    pub fn new(store: Arc<dyn WorkflowStore>, events: EventSink, workflow: Workflow) -> Self {
        Self {
            store,
            events,
            workflow,
            cancel: CancellationToken::new(),
        }
    }

    /// The workflow being driven.
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// The workflow's configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.workflow.config
    }

    /// Mutable configuration, for in-run adjustments like a tier upgrade.
    pub fn config_mut(&mut self) -> &mut WorkflowConfig {
        &mut self.workflow.config
    }

    /// Clone of the event sink, for progress emission inside executors.
    pub fn events(&self) -> EventSink {
        self.events.clone()
    }

    /// Clone of the cancellation token, for handing to provider calls.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check the cooperative cancellation flag.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.workflow.status == WorkflowStatus::Cancelled
    }

    // =========================================================================
    // STATUS
    // =========================================================================

    /// Transition to `running` and announce the workflow start.
    pub async fn begin(&mut self) -> Result<(), WorkflowError> {
        self.set_status(WorkflowStatus::Running, None).await?;
        self.events.emit(WorkflowEvent::Started {
            workflow_id: self.workflow.id,
            workflow_type: self.workflow.workflow_type,
        });
        Ok(())
    }

    async fn set_status(
        &mut self,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<(), WorkflowError> {
        self.store
            .update_workflow_status(self.workflow.id, status, error.clone())
            .await?;
        self.workflow.status = status;
        self.workflow.error = error;
        self.workflow.updated_at = Utc::now();
        Ok(())
    }

    /// Replace the persisted pipeline state.
    pub async fn update_state(&mut self, state: Value) -> Result<(), WorkflowError> {
        self.store
            .update_workflow_state(self.workflow.id, state.clone())
            .await?;
        self.workflow.state = state;
        Ok(())
    }

    // =========================================================================
    // STEPS
    // =========================================================================

    /// Create and persist a step record in `running` state.
    pub async fn start_step(
        &mut self,
        name: &str,
        step_type: StepType,
        input: Value,
    ) -> Result<WorkflowStep, WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let step = WorkflowStep::started(self.workflow.id, name, step_type, input);
        self.store.insert_step(&step).await?;
        self.store.set_current_step(self.workflow.id, name).await?;
        self.workflow.current_step = Some(name.to_string());

        info!(workflow = %self.workflow.id, step = name, "step started");
        self.events.emit(WorkflowEvent::StepStarted { step: step.clone() });
        Ok(step)
    }

    /// Finalize a step as completed.
    pub async fn complete_step(
        &self,
        step: &mut WorkflowStep,
        output: Value,
        meta: StepMeta,
    ) -> Result<(), WorkflowError> {
        step.status = StepStatus::Completed;
        step.output = Some(output);
        step.model_used = meta.model_used;
        step.prompt_version = meta.prompt_version;
        step.tokens_used = meta.tokens_used;
        step.completed_at = Some(Utc::now());
        step.duration_ms = Some(
            (Utc::now() - step.created_at).num_milliseconds().max(0) as u64,
        );
        self.store.update_step(step).await?;

        info!(workflow = %self.workflow.id, step = %step.name, "step completed");
        self.events
            .emit(WorkflowEvent::StepCompleted { step: step.clone() });
        Ok(())
    }

    /// Finalize a step as failed.
    pub async fn fail_step(
        &self,
        step: &mut WorkflowStep,
        message: &str,
    ) -> Result<(), WorkflowError> {
        step.status = StepStatus::Failed;
        step.error = Some(message.to_string());
        step.completed_at = Some(Utc::now());
        step.duration_ms = Some(
            (Utc::now() - step.created_at).num_milliseconds().max(0) as u64,
        );
        self.store.update_step(step).await?;

        warn!(workflow = %self.workflow.id, step = %step.name, error = message, "step failed");
        self.events
            .emit(WorkflowEvent::StepCompleted { step: step.clone() });
        Ok(())
    }

    /// Record a step as skipped, already finalized.
    pub async fn skip_step(&self, name: &str, reason: &str) -> Result<(), WorkflowError> {
        let step = WorkflowStep::skipped(self.workflow.id, name, reason);
        self.store.insert_step(&step).await?;
        info!(workflow = %self.workflow.id, step = name, reason, "step skipped");
        Ok(())
    }

    /// Run one step: persist the record, execute, finalize, return the
    /// executor's output for chaining into the next step.
    ///
    /// The executor receives a [`StepContext`] carrying the workflow's
    /// persisted state blob. An executor error finalizes the step as failed
    /// and propagates as [`WorkflowError::StepFailed`]; earlier completed
    /// step records are untouched. Workflow-level failure handling belongs
    /// to the pipeline's top-level error path.
    pub async fn run_step<T, F, Fut>(
        &mut self,
        name: &str,
        step_type: StepType,
        input: Value,
        executor: F,
    ) -> Result<T, WorkflowError>
    where
        T: Serialize,
        F: FnOnce(StepContext) -> Fut,
        Fut: Future<Output = Result<StepOutcome<T>, WorkflowError>>,
    {
        let mut step = self.start_step(name, step_type, input).await?;
        let context = StepContext {
            workflow_id: self.workflow.id,
            step_id: step.id,
            state: self.workflow.state.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        };

        match executor(context).await {
            Ok(outcome) => {
                let output = serde_json::to_value(&outcome.output)?;
                self.complete_step(&mut step, output, outcome.meta).await?;
                Ok(outcome.output)
            }
            Err(e) => {
                let message = e.to_string();
                self.fail_step(&mut step, &message).await?;
                Err(WorkflowError::StepFailed {
                    step: name.to_string(),
                    message,
                })
            }
        }
    }

    // =========================================================================
    // INFLECTION POINTS
    // =========================================================================

    /// Persist an inflection point for `step`, suspend the workflow, and
    /// announce the pending decision.
    ///
    /// The calling pipeline must return afterwards — there is no blocking
    /// wait. Resumption arrives as a separate external call through
    /// [`StepRunner::resolve_inflection_point`].
    pub async fn request_inflection_point(
        &mut self,
        step: &mut WorkflowStep,
        request: InflectionPointRequest,
    ) -> Result<InflectionPoint, WorkflowError> {
        step.step_type = StepType::InflectionPoint;
        self.store.update_step(step).await?;

        let point = InflectionPoint {
            id: Uuid::new_v4(),
            workflow_id: self.workflow.id,
            step_id: step.id,
            title: request.title,
            description: request.description,
            context: request.context,
            options: request.options,
            user_choice: None,
            user_feedback: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.store.insert_inflection_point(&point).await?;
        self.set_status(WorkflowStatus::AwaitingInput, None).await?;

        info!(workflow = %self.workflow.id, step = %step.name, title = %point.title,
            "awaiting decision");
        self.events.emit(WorkflowEvent::InflectionPointRaised {
            inflection_point: point.clone(),
        });
        Ok(point)
    }

    /// Suspend without an inflection point row (e.g. awaiting an external
    /// artifact such as a render screenshot).
    pub async fn suspend(&mut self) -> Result<(), WorkflowError> {
        self.set_status(WorkflowStatus::AwaitingInput, None).await
    }

    /// Record the user's decision and transition back to `running`.
    ///
    /// Returns the name of the step that requested the point so the
    /// pipeline can dispatch its resume logic.
    pub async fn resolve_inflection_point(
        &mut self,
        point_id: Uuid,
        choice: &str,
        feedback: Option<String>,
    ) -> Result<ResolvedInflection, WorkflowError> {
        if self.workflow.status.is_terminal() {
            return Err(WorkflowError::InvalidTransition {
                from: self.workflow.status,
                to: WorkflowStatus::Running,
            });
        }

        let mut point = self.store.fetch_inflection_point(point_id).await?;
        if !point.options.is_empty() && !point.has_option(choice) {
            return Err(WorkflowError::UnknownChoice(choice.to_string()));
        }

        point.user_choice = Some(choice.to_string());
        point.user_feedback = feedback;
        point.resolved_at = Some(Utc::now());
        self.store.update_inflection_point(&point).await?;

        let step = self.store.fetch_step(point.step_id).await?;
        self.set_status(WorkflowStatus::Running, None).await?;

        info!(workflow = %self.workflow.id, step = %step.name, choice, "decision recorded");
        Ok(ResolvedInflection {
            step_name: step.name,
            point,
        })
    }

    // =========================================================================
    // TERMINAL TRANSITIONS
    // =========================================================================

    /// Complete the workflow successfully.
    pub async fn complete_workflow(&mut self) -> Result<(), WorkflowError> {
        self.set_status(WorkflowStatus::Completed, None).await?;
        info!(workflow = %self.workflow.id, "workflow completed");
        self.events.emit(WorkflowEvent::Completed {
            workflow: self.workflow.clone(),
        });
        Ok(())
    }

    /// Fail the workflow, retaining the originating error message.
    pub async fn fail_workflow(
        &mut self,
        message: &str,
        recoverable: bool,
        recovery_options: Vec<String>,
    ) -> Result<(), WorkflowError> {
        self.set_status(WorkflowStatus::Failed, Some(message.to_string()))
            .await?;
        error!(workflow = %self.workflow.id, error = message, "workflow failed");
        self.events.emit(WorkflowEvent::Failed {
            workflow_id: self.workflow.id,
            error: message.to_string(),
            recoverable,
            recovery_options,
        });
        Ok(())
    }

    /// Cancel the workflow from any non-terminal state.
    ///
    /// Trips the cancellation token first so in-flight provider calls see
    /// the abort signal; remote calls are not guaranteed to stop.
    pub async fn cancel_workflow(
        &mut self,
        reason: Option<String>,
    ) -> Result<(), WorkflowError> {
        if self.workflow.status.is_terminal() {
            return Err(WorkflowError::InvalidTransition {
                from: self.workflow.status,
                to: WorkflowStatus::Cancelled,
            });
        }

        self.cancel.cancel();
        self.set_status(WorkflowStatus::Cancelled, reason.clone())
            .await?;
        info!(workflow = %self.workflow.id, "workflow cancelled");
        self.events.emit(WorkflowEvent::Cancelled {
            workflow_id: self.workflow.id,
            reason,
        });
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
