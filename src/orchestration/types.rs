//! # Orchestration Types
//!
//! Shared types for the scheduling loop: internal signals, completion
//! reports, and the caller-facing status views.

use crate::models::{Deliverable, Execution, Step};
use crate::registry::StepOutput;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Internal message consumed by the single scheduling loop.
///
/// Every state change funnels through one of these, so the scheduling tick
/// is serialized by construction and re-entrant scheduling cannot occur.
#[derive(Debug)]
pub enum SchedulerSignal {
    /// A new execution was accepted and awaits planning
    ExecutionCreated(Uuid),
    /// A worker slot finished a producer invocation
    StepFinished(StepCompletion),
    /// A producer reported intermediate progress
    StepProgress {
        execution_id: Uuid,
        step_id: Uuid,
        progress: u8,
    },
    /// A failed step's backoff delay has elapsed
    RetryDue { execution_id: Uuid, step_id: Uuid },
    /// Caller requested cancellation
    CancelRequested(Uuid),
    /// External approval action on a draft
    ApprovalReceived(Uuid),
    /// External rejection action on a draft
    RejectionReceived { execution_id: Uuid, reason: String },
    /// Re-evaluate an execution (startup recovery)
    Tick(Uuid),
    /// Stop the scheduling loop
    Shutdown,
}

/// Completion report delivered by the worker pool.
#[derive(Debug)]
pub struct StepCompletion {
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub outcome: CompletionOutcome,
    pub duration_ms: u64,
}

/// Terminal result of a single producer invocation.
#[derive(Debug)]
pub enum CompletionOutcome {
    Success(StepOutput),
    /// Producer-reported error or an enforced timeout; both follow the
    /// same retry path
    Failure { message: String, timed_out: bool },
    /// The slot observed cancellation; `forced` when the producer ignored
    /// the signal past the grace period
    Cancelled { forced: bool },
}

/// Full status snapshot for one execution, served by the query interface.
#[derive(Debug, Clone)]
pub struct ExecutionView {
    pub execution: Execution,
    /// Derived, never stored: estimated-duration-weighted mean of step
    /// progress
    pub progress: u8,
    pub steps: Vec<Step>,
    pub deliverables: Vec<Deliverable>,
}

/// Engine health snapshot.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub active_executions: usize,
    pub running_steps: usize,
    pub available_slots: usize,
    pub registered_producers: usize,
}

/// A dispatch candidate paired with its execution's ordering keys.
#[derive(Debug, Clone)]
pub struct CandidateStep {
    pub step: Step,
    pub priority: u8,
    pub execution_created_at: DateTime<Utc>,
}

/// Execution progress as the estimated-duration-weighted mean of step
/// progress. An execution with zero steps has progress 0.
pub fn weighted_progress(steps: &[Step]) -> u8 {
    if steps.is_empty() {
        return 0;
    }
    let mut weighted_sum: u64 = 0;
    let mut total_weight: u64 = 0;
    for step in steps {
        // A zero estimate still deserves representation in the aggregate
        let weight = step.estimated_duration_secs.max(1);
        weighted_sum += u64::from(step.progress) * weight;
        total_weight += weight;
    }
    (weighted_sum / total_weight).min(100) as u8
}
