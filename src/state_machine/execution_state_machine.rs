//! # Execution State Machine
//!
//! Pure transition table for the execution lifecycle. The engine owns all
//! persistence and side effects; this module only answers "given this state
//! and this event, what is the next state" so the table stays independently
//! testable.

use super::errors::{StateMachineError, StateMachineResult};
use super::events::ExecutionEvent;
use super::states::ExecutionState;

/// Stateless transition logic for executions.
pub struct ExecutionStateMachine;

impl ExecutionStateMachine {
    /// Determine the target state for an event, or reject the transition.
    pub fn determine_target_state(
        current: ExecutionState,
        event: &ExecutionEvent,
    ) -> StateMachineResult<ExecutionState> {
        let target = match (current, event) {
            (ExecutionState::Queued, ExecutionEvent::Plan) => ExecutionState::Planning,
            (ExecutionState::Planning, ExecutionEvent::Start) => ExecutionState::Generating,

            (ExecutionState::Generating, ExecutionEvent::Validate) => ExecutionState::Validating,
            (ExecutionState::Validating, ExecutionEvent::MarkReady) => ExecutionState::DraftReady,

            (ExecutionState::DraftReady, ExecutionEvent::Approve) => ExecutionState::Approved,
            (ExecutionState::Approved, ExecutionEvent::Deliver) => ExecutionState::Delivered,

            // Rework loop
            (ExecutionState::DraftReady, ExecutionEvent::Reject(_)) => ExecutionState::Rejected,
            (ExecutionState::Rejected, ExecutionEvent::Rework) => ExecutionState::Generating,

            // Any non-terminal state can fail or be cancelled
            (state, ExecutionEvent::Fail(_)) if !state.is_terminal() => ExecutionState::Failed,
            (state, ExecutionEvent::Cancel) if !state.is_terminal() => ExecutionState::Cancelled,

            (from, event) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Guard for `planning → generating`: an execution with zero steps can
    /// never make progress and must stay in planning.
    pub fn check_start_guard(step_count: usize) -> StateMachineResult<()> {
        if step_count == 0 {
            return Err(StateMachineError::GuardFailed(
                "execution has no steps and cannot leave planning".to_string(),
            ));
        }
        Ok(())
    }

    /// Guard for `rejected → generating`: rework cycles are bounded.
    pub fn check_rework_guard(rework_count: u32, max_rework_cycles: u32) -> StateMachineResult<()> {
        if rework_count > max_rework_cycles {
            return Err(StateMachineError::GuardFailed(format!(
                "rework cycle limit exceeded ({rework_count} > {max_rework_cycles})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(current: ExecutionState, event: ExecutionEvent) -> ExecutionState {
        ExecutionStateMachine::determine_target_state(current, &event).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let mut state = ExecutionState::Queued;
        for event in [
            ExecutionEvent::Plan,
            ExecutionEvent::Start,
            ExecutionEvent::Validate,
            ExecutionEvent::MarkReady,
            ExecutionEvent::Approve,
            ExecutionEvent::Deliver,
        ] {
            state = step(state, event);
        }
        assert_eq!(state, ExecutionState::Delivered);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_rework_loop() {
        let state = step(
            ExecutionState::DraftReady,
            ExecutionEvent::Reject("tone is off".to_string()),
        );
        assert_eq!(state, ExecutionState::Rejected);
        assert_eq!(
            step(state, ExecutionEvent::Rework),
            ExecutionState::Generating
        );
    }

    #[test]
    fn test_fail_and_cancel_from_any_non_terminal() {
        for from in [
            ExecutionState::Queued,
            ExecutionState::Planning,
            ExecutionState::Generating,
            ExecutionState::Validating,
            ExecutionState::DraftReady,
            ExecutionState::Approved,
            ExecutionState::Rejected,
        ] {
            assert_eq!(
                step(from, ExecutionEvent::Fail("boom".to_string())),
                ExecutionState::Failed
            );
            assert_eq!(step(from, ExecutionEvent::Cancel), ExecutionState::Cancelled);
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for from in [
            ExecutionState::Delivered,
            ExecutionState::Failed,
            ExecutionState::Cancelled,
        ] {
            assert!(ExecutionStateMachine::determine_target_state(
                from,
                &ExecutionEvent::Cancel
            )
            .is_err());
            assert!(ExecutionStateMachine::determine_target_state(
                from,
                &ExecutionEvent::Fail("late".to_string())
            )
            .is_err());
        }
    }

    #[test]
    fn test_invalid_transitions() {
        // Cannot approve before validation passed
        assert!(ExecutionStateMachine::determine_target_state(
            ExecutionState::Generating,
            &ExecutionEvent::Approve
        )
        .is_err());

        // Cannot deliver without approval
        assert!(ExecutionStateMachine::determine_target_state(
            ExecutionState::DraftReady,
            &ExecutionEvent::Deliver
        )
        .is_err());
    }

    #[test]
    fn test_start_guard_rejects_zero_steps() {
        assert!(ExecutionStateMachine::check_start_guard(0).is_err());
        assert!(ExecutionStateMachine::check_start_guard(3).is_ok());
    }

    #[test]
    fn test_rework_guard() {
        assert!(ExecutionStateMachine::check_rework_guard(1, 3).is_ok());
        assert!(ExecutionStateMachine::check_rework_guard(3, 3).is_ok());
        assert!(ExecutionStateMachine::check_rework_guard(4, 3).is_err());
    }
}
