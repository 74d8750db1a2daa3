use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution lifecycle states.
///
/// The happy path runs `queued → planning → generating → validating →
/// draft_ready → approved → delivered`. A rejection re-opens the execution
/// for a bounded number of rework cycles; `delivered`, `failed` and
/// `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Execution created, steps not yet instantiated from the template
    Queued,
    /// Dependency graph built, steps instantiated as pending
    Planning,
    /// Engine is actively dispatching steps
    Generating,
    /// All steps settled; post-conditions are being checked
    Validating,
    /// Validation passed; awaiting external approval
    DraftReady,
    /// Approval received, delivery in flight
    Approved,
    /// External rejection received; a rework cycle may follow
    Rejected,
    /// Terminal success
    Delivered,
    /// Terminal failure
    Failed,
    /// Terminal caller-initiated cancellation
    Cancelled,
}

impl ExecutionState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed | Self::Cancelled)
    }

    /// Check if the engine may dispatch steps in this state
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Generating)
    }

    /// Check if this state accepts an external approval/rejection action
    pub fn awaits_review(&self) -> bool {
        matches!(self, Self::DraftReady)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Planning => write!(f, "planning"),
            Self::Generating => write!(f, "generating"),
            Self::Validating => write!(f, "validating"),
            Self::DraftReady => write!(f, "draft_ready"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "planning" => Ok(Self::Planning),
            "generating" => Ok(Self::Generating),
            "validating" => Ok(Self::Validating),
            "draft_ready" => Ok(Self::DraftReady),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid execution state: {s}")),
        }
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::Queued
    }
}

/// Step lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting for dependencies and a worker slot
    Pending,
    /// A producer invocation is in flight
    Running,
    /// Producer finished successfully
    Completed,
    /// Producer failed; may still be retried until the budget is exhausted
    Failed,
    /// Never ran: execution cancelled, or a skippable upstream failure
    Skipped,
    /// Unreachable: an upstream producer of a required tag finally failed
    Blocked,
}

impl StepState {
    /// Check if this step will never run again within this generation pass
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Blocked)
    }

    /// Check if this is an active state (a producer invocation is in flight)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "blocked" => Ok(Self::Blocked),
            _ => Err(format!("Invalid step state: {s}")),
        }
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::Pending
    }
}
