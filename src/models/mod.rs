//! # Data Model
//!
//! The four durable record kinds the engine persists — executions, steps,
//! deliverables and events — plus the submission request type. All records
//! serialize with serde and round-trip through any [`crate::store::StateStore`]
//! implementation.

pub mod deliverable;
pub mod event;
pub mod execution;
pub mod step;

pub use deliverable::{Deliverable, DeliverableStatus, NewDeliverable};
pub use event::EventRecord;
pub use execution::{Execution, ExecutionRequest};
pub use step::Step;
