use crate::state_machine::StepState;
use crate::template::StepDeclaration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single unit of work within an execution, bound to a registered
/// producer via `step_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub execution_id: Uuid,
    /// Key into the producer registry
    pub step_type: String,
    pub status: StepState,
    /// Last reported progress, 0-100, monotone within a generation pass
    pub progress: u8,
    /// Context tags this step consumes
    pub requires: Vec<String>,
    /// Context tag this step writes
    pub produces: String,
    /// Whether the owning execution survives this step's final failure
    pub skippable: bool,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Declaration position within the template, used as the final dispatch
    /// tie-break
    pub template_order: u32,
    pub estimated_duration_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Step {
    /// Instantiate a step from a template declaration.
    pub fn from_declaration(
        execution_id: Uuid,
        order: u32,
        declaration: &StepDeclaration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_type: declaration.step_type.clone(),
            status: StepState::Pending,
            progress: 0,
            requires: declaration.requires.clone(),
            produces: declaration.produces.clone(),
            skippable: declaration.skippable,
            retry_count: 0,
            max_retries: declaration.max_retries,
            template_order: order,
            estimated_duration_secs: declaration.estimated_duration_secs,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Whether this step will make no further state changes in this
    /// generation pass. A failed step is settled only once its retry
    /// budget is exhausted.
    pub fn is_settled(&self) -> bool {
        match self.status {
            StepState::Completed | StepState::Skipped | StepState::Blocked => true,
            StepState::Failed => self.retry_count >= self.max_retries,
            StepState::Pending | StepState::Running => false,
        }
    }

    /// Whether another retry is available after a failure.
    pub fn retry_available(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Reset mutable fields for a fresh generation pass (rework).
    pub fn reset_for_rework(&mut self) {
        self.status = StepState::Pending;
        self.progress = 0;
        self.retry_count = 0;
        self.started_at = None;
        self.finished_at = None;
        self.result = None;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration() -> StepDeclaration {
        StepDeclaration::new("market_analysis", &[], "analysis")
            .with_max_retries(2)
            .with_estimated_duration_secs(30)
    }

    #[test]
    fn test_from_declaration() {
        let execution_id = Uuid::new_v4();
        let step = Step::from_declaration(execution_id, 3, &declaration());

        assert_eq!(step.execution_id, execution_id);
        assert_eq!(step.step_type, "market_analysis");
        assert_eq!(step.status, StepState::Pending);
        assert_eq!(step.produces, "analysis");
        assert_eq!(step.template_order, 3);
        assert_eq!(step.max_retries, 2);
        assert_eq!(step.estimated_duration_secs, 30);
    }

    #[test]
    fn test_settledness() {
        let mut step = Step::from_declaration(Uuid::new_v4(), 0, &declaration());
        assert!(!step.is_settled());

        step.status = StepState::Failed;
        step.retry_count = 1;
        assert!(!step.is_settled(), "failed with retries left is not settled");

        step.retry_count = 2;
        assert!(step.is_settled(), "failed with exhausted budget is settled");

        step.status = StepState::Completed;
        assert!(step.is_settled());
    }

    #[test]
    fn test_reset_for_rework() {
        let mut step = Step::from_declaration(Uuid::new_v4(), 0, &declaration());
        step.status = StepState::Completed;
        step.progress = 100;
        step.retry_count = 2;
        step.result = Some(serde_json::json!({"text": "draft"}));

        step.reset_for_rework();
        assert_eq!(step.status, StepState::Pending);
        assert_eq!(step.progress, 0);
        assert_eq!(step.retry_count, 0);
        assert!(step.result.is_none());
    }
}
