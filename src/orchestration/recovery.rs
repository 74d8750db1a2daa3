//! # Restart Recovery
//!
//! On engine start, any step left `running` in the state store belongs to a
//! producer invocation that died with the previous process. The deliverable
//! is the idempotency boundary:
//!
//! - a `ready` deliverable for the step means the work committed — the step
//!   is marked `completed` directly and is never re-invoked;
//! - no deliverable means the invocation is assumed non-committed — the
//!   step is reset to `pending` with its retry count unchanged;
//! - a non-`ready` deliverable is a resume conflict: the step is surfaced
//!   as `failed` for manual intervention, never silently overwritten.

use crate::error::Result;
use crate::models::DeliverableStatus;
use crate::state_machine::StepState;
use crate::store::StateStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of what recovery did, for startup logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecoveryReport {
    /// Steps reset from `running` back to `pending`
    pub reset_to_pending: usize,
    /// Steps completed directly from an existing ready deliverable
    pub completed_from_deliverable: usize,
    /// Steps failed with a resume conflict
    pub conflicts: usize,
}

/// Reconcile interrupted producer invocations against the deliverable
/// idempotency boundary.
pub async fn recover(store: &Arc<dyn StateStore>) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    for mut step in store.running_steps().await? {
        match store.deliverable_for_step(step.id).await? {
            Some(deliverable) if deliverable.status == DeliverableStatus::Ready => {
                step.status = StepState::Completed;
                step.progress = 100;
                step.finished_at = Some(Utc::now());
                // Dependents read the artifact reference through the
                // step's produces tag once the bag is rebuilt
                step.result = Some(serde_json::json!({
                    "deliverable_id": deliverable.id,
                    "location": deliverable.location,
                }));
                store.update_step(&step).await?;
                report.completed_from_deliverable += 1;
                info!(
                    step_id = %step.id,
                    execution_id = %step.execution_id,
                    "Recovered step from committed deliverable"
                );
            }
            Some(deliverable) => {
                step.status = StepState::Failed;
                // Exhaust the budget: a conflicted step needs manual
                // intervention, not another producer invocation
                step.retry_count = step.max_retries;
                step.finished_at = Some(Utc::now());
                step.error = Some(format!(
                    "resume conflict: deliverable {} is {} but not ready",
                    deliverable.id, deliverable.status
                ));
                store.update_step(&step).await?;
                report.conflicts += 1;
                warn!(
                    step_id = %step.id,
                    deliverable_id = %deliverable.id,
                    "Resume conflict, step requires manual intervention"
                );
            }
            None => {
                step.status = StepState::Pending;
                step.started_at = None;
                store.update_step(&step).await?;
                report.reset_to_pending += 1;
            }
        }
    }

    if report != RecoveryReport::default() {
        info!(
            reset = report.reset_to_pending,
            recovered = report.completed_from_deliverable,
            conflicts = report.conflicts,
            "♻️  Recovery pass reconciled interrupted steps"
        );
    }

    Ok(report)
}
