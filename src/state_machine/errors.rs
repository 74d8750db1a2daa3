use thiserror::Error;

/// Errors raised by the execution and step state machines
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("Invalid transition from {from:?} via {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Guard rejected transition: {0}")]
    GuardFailed(String),

    #[error("Internal state machine error: {0}")]
    Internal(String),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
