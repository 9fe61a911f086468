//! # Workflow Store
//!
//! Persistence boundary of the engine. The trait mirrors the typed tables
//! the system runs against in production (`workflows`, `workflow_steps`,
//! `inflection_points`); the engine only ever needs get/put/append
//! operations keyed by id.
//!
//! [`MemoryStore`] is the reference implementation, used in tests and as
//! documentation of the expected semantics. Each workflow owns a distinct
//! row, so concurrent workflows need no cross-workflow locking.

use crate::entity::{InflectionPoint, Workflow, WorkflowStatus, WorkflowStep};
use crate::error::WorkflowError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Typed persistence operations the engine depends on.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a new workflow row.
    async fn insert_workflow(&self, workflow: &Workflow) -> Result<(), WorkflowError>;

    /// Fetch a workflow by id.
    async fn fetch_workflow(&self, id: Uuid) -> Result<Workflow, WorkflowError>;

    /// Update a workflow's status and error message.
    async fn update_workflow_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<(), WorkflowError>;

    /// Replace a workflow's opaque state blob.
    async fn update_workflow_state(&self, id: Uuid, state: Value) -> Result<(), WorkflowError>;

    /// Record the name of the step currently executing.
    async fn set_current_step(&self, id: Uuid, step_name: &str) -> Result<(), WorkflowError>;

    /// Append a step record.
    async fn insert_step(&self, step: &WorkflowStep) -> Result<(), WorkflowError>;

    /// Overwrite a step record (finalization).
    async fn update_step(&self, step: &WorkflowStep) -> Result<(), WorkflowError>;

    /// Fetch a step by id.
    async fn fetch_step(&self, id: Uuid) -> Result<WorkflowStep, WorkflowError>;

    /// Completed steps of a workflow, oldest first.
    async fn completed_steps(&self, workflow_id: Uuid)
        -> Result<Vec<WorkflowStep>, WorkflowError>;

    /// Insert an inflection point.
    async fn insert_inflection_point(
        &self,
        point: &InflectionPoint,
    ) -> Result<(), WorkflowError>;

    /// Overwrite an inflection point (resolution).
    async fn update_inflection_point(
        &self,
        point: &InflectionPoint,
    ) -> Result<(), WorkflowError>;

    /// Fetch an inflection point by id.
    async fn fetch_inflection_point(&self, id: Uuid) -> Result<InflectionPoint, WorkflowError>;

    /// The most recent unresolved inflection point of a workflow, if any.
    async fn pending_inflection_point(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<InflectionPoint>, WorkflowError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Default)]
struct Tables {
    workflows: HashMap<Uuid, Workflow>,
    steps: HashMap<Uuid, WorkflowStep>,
    /// Step insertion order, for ordered listings.
    step_order: Vec<Uuid>,
    points: HashMap<Uuid, InflectionPoint>,
    point_order: Vec<Uuid>,
}

/// In-memory store backed by `RwLock`-guarded maps.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All step records of a workflow in insertion order, any status.
    /// Test-support helper beyond the trait surface.
    pub async fn steps_for(&self, workflow_id: Uuid) -> Vec<WorkflowStep> {
        let tables = self.tables.read().await;
        tables
            .step_order
            .iter()
            .filter_map(|id| tables.steps.get(id))
            .filter(|s| s.workflow_id == workflow_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_workflow(&self, workflow: &Workflow) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        tables.workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn fetch_workflow(&self, id: Uuid) -> Result<Workflow, WorkflowError> {
        let tables = self.tables.read().await;
        tables
            .workflows
            .get(&id)
            .cloned()
            .ok_or(WorkflowError::WorkflowNotFound(id))
    }

    async fn update_workflow_status(
        &self,
        id: Uuid,
        status: WorkflowStatus,
        error: Option<String>,
    ) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        let workflow = tables
            .workflows
            .get_mut(&id)
            .ok_or(WorkflowError::WorkflowNotFound(id))?;
        workflow.status = status;
        workflow.error = error;
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn update_workflow_state(&self, id: Uuid, state: Value) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        let workflow = tables
            .workflows
            .get_mut(&id)
            .ok_or(WorkflowError::WorkflowNotFound(id))?;
        workflow.state = state;
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn set_current_step(&self, id: Uuid, step_name: &str) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        let workflow = tables
            .workflows
            .get_mut(&id)
            .ok_or(WorkflowError::WorkflowNotFound(id))?;
        workflow.current_step = Some(step_name.to_string());
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_step(&self, step: &WorkflowStep) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        tables.steps.insert(step.id, step.clone());
        tables.step_order.push(step.id);
        Ok(())
    }

    async fn update_step(&self, step: &WorkflowStep) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        if !tables.steps.contains_key(&step.id) {
            return Err(WorkflowError::StepNotFound(step.id));
        }
        tables.steps.insert(step.id, step.clone());
        Ok(())
    }

    async fn fetch_step(&self, id: Uuid) -> Result<WorkflowStep, WorkflowError> {
        let tables = self.tables.read().await;
        tables
            .steps
            .get(&id)
            .cloned()
            .ok_or(WorkflowError::StepNotFound(id))
    }

    async fn completed_steps(
        &self,
        workflow_id: Uuid,
    ) -> Result<Vec<WorkflowStep>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(tables
            .step_order
            .iter()
            .filter_map(|id| tables.steps.get(id))
            .filter(|s| {
                s.workflow_id == workflow_id
                    && s.status == crate::entity::StepStatus::Completed
            })
            .cloned()
            .collect())
    }

    async fn insert_inflection_point(
        &self,
        point: &InflectionPoint,
    ) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        tables.points.insert(point.id, point.clone());
        tables.point_order.push(point.id);
        Ok(())
    }

    async fn update_inflection_point(
        &self,
        point: &InflectionPoint,
    ) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        if !tables.points.contains_key(&point.id) {
            return Err(WorkflowError::InflectionPointNotFound(point.id));
        }
        tables.points.insert(point.id, point.clone());
        Ok(())
    }

    async fn fetch_inflection_point(
        &self,
        id: Uuid,
    ) -> Result<InflectionPoint, WorkflowError> {
        let tables = self.tables.read().await;
        tables
            .points
            .get(&id)
            .cloned()
            .ok_or(WorkflowError::InflectionPointNotFound(id))
    }

    async fn pending_inflection_point(
        &self,
        workflow_id: Uuid,
    ) -> Result<Option<InflectionPoint>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(tables
            .point_order
            .iter()
            .rev()
            .filter_map(|id| tables.points.get(id))
            .find(|p| p.workflow_id == workflow_id && !p.is_resolved())
            .cloned())
    }
}

// =============================================================================
// TESTS
// =============================================================================
