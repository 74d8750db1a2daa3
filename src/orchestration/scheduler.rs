//! # Dispatch Planner
//!
//! Runnable-candidate ordering and selection for a scheduling tick. The
//! engine collects candidates (pending steps whose requires set is fully
//! present in their execution's context bag, owned by a dispatchable
//! execution); this module applies the ordering and invariants:
//!
//! 1. execution priority, descending
//! 2. execution creation time, ascending (FIFO tie-break)
//! 3. declared order within the package template
//!
//! and enforces at most one running step per execution — cross-execution
//! parallelism is where the concurrency benefit lies, while serializing
//! within an execution keeps per-request progress deterministic and
//! auditable.

use super::types::CandidateStep;
use crate::models::Step;
use std::collections::HashSet;
use uuid::Uuid;

pub struct DispatchPlanner;

impl DispatchPlanner {
    /// Select the steps to dispatch this tick.
    ///
    /// `busy_executions` are executions that already have a running step;
    /// `free_slots` bounds the selection to currently available worker
    /// capacity. Candidates beyond the bound stay pending and are
    /// reconsidered on the next tick.
    pub fn plan(
        mut candidates: Vec<CandidateStep>,
        busy_executions: &HashSet<Uuid>,
        free_slots: usize,
    ) -> Vec<Step> {
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.execution_created_at.cmp(&b.execution_created_at))
                .then(a.step.template_order.cmp(&b.step.template_order))
        });

        let mut claimed: HashSet<Uuid> = busy_executions.clone();
        let mut selected = Vec::new();

        for candidate in candidates {
            if selected.len() >= free_slots {
                break;
            }
            if claimed.contains(&candidate.step.execution_id) {
                continue;
            }
            claimed.insert(candidate.step.execution_id);
            selected.push(candidate.step);
        }

        selected
    }
}
