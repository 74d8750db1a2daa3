//! # State Machine Module
//!
//! Execution and step lifecycle management as pure transition tables plus
//! explicit guards. Persistence and event publication happen in the
//! orchestration engine; everything in here is synchronous and side-effect
//! free.

pub mod errors;
pub mod events;
pub mod execution_state_machine;
pub mod states;
pub mod step_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::{ExecutionEvent, StepEvent};
pub use execution_state_machine::ExecutionStateMachine;
pub use states::{ExecutionState, StepState};
pub use step_state_machine::StepStateMachine;
