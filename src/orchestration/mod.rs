//! # Orchestration Core
//!
//! The scheduling loop, worker pool, retry policy and restart recovery.
//!
//! ## Architecture
//!
//! - [`engine::Engine`] — the public surface: submission, status queries,
//!   approval/rejection/cancellation, subscriptions.
//! - [`scheduler::DispatchPlanner`] — candidate ordering and selection for
//!   one scheduling tick.
//! - [`worker_pool::WorkerPool`] — bounded concurrent slots with timeout
//!   enforcement and cooperative cancellation.
//! - [`backoff::BackoffPolicy`] — capped exponential retry delays.
//! - [`recovery`] — deliverable-boundary reconciliation after a restart.

pub mod backoff;
pub mod engine;
pub mod recovery;
pub mod scheduler;
pub mod types;
pub mod worker_pool;

pub use backoff::BackoffPolicy;
pub use engine::Engine;
pub use recovery::{recover, RecoveryReport};
pub use scheduler::DispatchPlanner;
pub use types::{
    weighted_progress, CandidateStep, CompletionOutcome, EngineStats, ExecutionView,
    SchedulerSignal, StepCompletion,
};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
