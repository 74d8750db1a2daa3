//! # System Constants
//!
//! Event names and operational defaults shared across the orchestration
//! engine. Event names follow the `subject.action` convention so that
//! subscribers can filter with simple prefix matching.

/// Lifecycle events published through the [`crate::events::EventPublisher`]
/// and persisted as durable event records.
pub mod events {
    // Execution lifecycle events
    pub const EXECUTION_CREATED: &str = "execution.created";
    pub const EXECUTION_PLANNED: &str = "execution.planned";
    pub const EXECUTION_GENERATING: &str = "execution.generating";
    pub const EXECUTION_VALIDATING: &str = "execution.validating";
    pub const EXECUTION_DRAFT_READY: &str = "execution.draft_ready";
    pub const EXECUTION_APPROVED: &str = "execution.approved";
    pub const EXECUTION_DELIVERED: &str = "execution.delivered";
    pub const EXECUTION_REJECTED: &str = "execution.rejected";
    pub const EXECUTION_REWORK_STARTED: &str = "execution.rework_started";
    pub const EXECUTION_FAILED: &str = "execution.failed";
    pub const EXECUTION_CANCELLED: &str = "execution.cancelled";

    // Step lifecycle events
    pub const STEP_STARTED: &str = "step.started";
    pub const STEP_PROGRESS: &str = "step.progress";
    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_RETRY_SCHEDULED: &str = "step.retry_scheduled";
    pub const STEP_SKIPPED: &str = "step.skipped";
    pub const STEP_BLOCKED: &str = "step.blocked";

    // Artifact events
    pub const DELIVERABLE_READY: &str = "deliverable.ready";
}

/// Operational defaults used by [`crate::config::EngineConfig`].
pub mod defaults {
    pub const MAX_CONCURRENT_STEPS: usize = 10;
    pub const MAX_RETRIES: u32 = 3;
    pub const BACKOFF_BASE_MS: u64 = 1000;
    pub const BACKOFF_MAX_MS: u64 = 60_000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const STEP_TIMEOUT_MS: u64 = 300_000;
    pub const CANCELLATION_GRACE_MS: u64 = 5_000;
    pub const MAX_REWORK_CYCLES: u32 = 3;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
    pub const MIN_PRIORITY: u8 = 1;
    pub const MAX_PRIORITY: u8 = 10;
}
