//! # Event System
//!
//! Durable lifecycle events plus real-time broadcast fan-out.

pub mod publisher;

pub use publisher::{EventPublisher, ExecutionSubscription, PublishError};
