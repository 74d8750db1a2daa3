#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Maestro Core
//!
//! Asynchronous multi-step orchestration engine for AI content requests.
//!
//! ## Overview
//!
//! Maestro accepts a unit of work — a single ad-hoc request or a bundled
//! package spanning multiple business domains (property analytics, client
//! management, content generation, strategy generation) — decomposes it
//! into an ordered sequence of steps with data dependencies, executes
//! those steps with bounded concurrency, tracks progress and failure at
//! both step and request granularity, and streams real-time status to
//! observers.
//!
//! ## Correctness guarantees
//!
//! - **Ordering**: within one execution, steps observe strict sequential
//!   consistency — at most one step runs at a time, and a step never
//!   starts before every context tag it requires has been produced.
//! - **Idempotent retry**: a ready deliverable is the idempotency
//!   boundary; a step that committed one is never re-invoked.
//! - **Resumability**: on restart, interrupted steps are reconciled
//!   against the deliverable boundary and re-enter scheduling.
//! - **Derived progress**: execution progress is always recomputed from
//!   step progress, weighted by estimated duration — it cannot drift.
//!
//! ## Module Organization
//!
//! - [`models`] - The four durable record kinds plus submission requests
//! - [`state_machine`] - Execution and step lifecycle transition tables
//! - [`store`] - Persistence boundary (in-memory and Postgres)
//! - [`context`] - Append-only per-execution context bags
//! - [`template`] - Package template store with publish-time validation
//! - [`registry`] - Producer registration and resolution
//! - [`orchestration`] - The engine, scheduler, worker pool and recovery
//! - [`events`] - Durable events with broadcast fan-out
//! - [`config`] - Engine configuration
//! - [`error`] - Crate-level error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maestro_core::config::EngineConfig;
//! use maestro_core::models::ExecutionRequest;
//! use maestro_core::orchestration::Engine;
//! use maestro_core::registry::ProducerRegistry;
//! use maestro_core::store::InMemoryStateStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ProducerRegistry::new());
//! // registry.register("listing_copy", Arc::new(MyCopyProducer));
//!
//! let engine = Engine::start(
//!     EngineConfig::default(),
//!     Arc::new(InMemoryStateStore::new()),
//!     registry,
//! )
//! .await?;
//!
//! let id = engine
//!     .create_execution(
//!         ExecutionRequest::new("Spring campaign", "3-bed colonial on Elm St")
//!             .with_content_type("listing_copy")
//!             .with_priority(8),
//!     )
//!     .await?;
//!
//! let view = engine.get_execution(id).await?;
//! println!("status={} progress={}", view.execution.status, view.progress);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;
pub mod store;
pub mod template;

pub use config::{BackoffConfig, EngineConfig};
pub use error::{EngineError, Result};
pub use models::{Deliverable, DeliverableStatus, EventRecord, Execution, ExecutionRequest, Step};
pub use orchestration::{Engine, EngineStats, ExecutionView};
pub use registry::{ProducerRegistry, StepProducer};
pub use state_machine::{ExecutionState, StepState};
pub use store::{ExecutionFilter, InMemoryStateStore, StateStore};
pub use template::{PackageTemplate, StepDeclaration, TemplateStore};
