//! # Step State Machine
//!
//! Pure transition table for individual steps. Dependency gating (a step
//! may only start once every required context tag exists) is expressed as
//! an explicit guard so the dispatch path can assert it on every start.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::StepEvent;
use super::states::StepState;

/// Stateless transition logic for steps.
pub struct StepStateMachine;

impl StepStateMachine {
    /// Determine the target state for an event, or reject the transition.
    pub fn determine_target_state(
        current: StepState,
        event: &StepEvent,
    ) -> StateMachineResult<StepState> {
        let target = match (current, event) {
            (StepState::Pending, StepEvent::Start) => StepState::Running,

            (StepState::Running, StepEvent::Complete(_)) => StepState::Completed,
            // Resumability shortcut: a pending step whose ready deliverable
            // already exists is completed without another invocation
            (StepState::Pending, StepEvent::Complete(_)) => StepState::Completed,
            (StepState::Running, StepEvent::Fail(_)) => StepState::Failed,

            // Retry re-enqueues an exhausted-but-not-final failure
            (StepState::Failed, StepEvent::Retry) => StepState::Pending,

            // Cancellation skips work that has not finished
            (StepState::Pending, StepEvent::Skip) => StepState::Skipped,
            (StepState::Running, StepEvent::Skip) => StepState::Skipped,
            (StepState::Failed, StepEvent::Skip) => StepState::Skipped,

            // Upstream final failure blocks dependents that never ran
            (StepState::Pending, StepEvent::Block) => StepState::Blocked,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Guard for `pending → running`: every required tag must already be in
    /// the execution's context bag.
    pub fn check_dependency_guard(
        requires: &[String],
        available: impl Fn(&str) -> bool,
    ) -> StateMachineResult<()> {
        for tag in requires {
            if !available(tag) {
                return Err(StateMachineError::GuardFailed(format!(
                    "required context tag '{tag}' has not been produced"
                )));
            }
        }
        Ok(())
    }
}
