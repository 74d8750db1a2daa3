use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events that can trigger execution state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    /// Steps have been instantiated from the template
    Plan,
    /// Begin dispatching steps
    Start,
    /// All steps settled, begin post-condition checks
    Validate,
    /// Post-conditions passed
    MarkReady,
    /// External approval action
    Approve,
    /// Delivery of the approved draft
    Deliver,
    /// External rejection action with a reason
    Reject(String),
    /// Re-open a rejected execution for another generation pass
    Rework,
    /// Unrecoverable failure with an error message
    Fail(String),
    /// Caller-initiated cancellation
    Cancel,
}

impl ExecutionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Start => "start",
            Self::Validate => "validate",
            Self::MarkReady => "mark_ready",
            Self::Approve => "approve",
            Self::Deliver => "deliver",
            Self::Reject(_) => "reject",
            Self::Rework => "rework",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Events that can trigger step state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StepEvent {
    /// Dispatch the step to a worker slot
    Start,
    /// Mark step as complete with optional results
    Complete(Option<Value>),
    /// Mark step as failed with error message
    Fail(String),
    /// Re-enqueue a failed step after its backoff delay
    Retry,
    /// Skip the step (cancellation, or skippable upstream failure)
    Skip,
    /// Block the step (a required upstream tag will never be produced)
    Block,
}

impl StepEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Block => "block",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Extract results if this is a completion event
    pub fn results(&self) -> Option<&Value> {
        match self {
            Self::Complete(results) => results.as_ref(),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }

    /// Create a completion event with results
    pub fn complete_with_results(results: Value) -> Self {
        Self::Complete(Some(results))
    }
}
