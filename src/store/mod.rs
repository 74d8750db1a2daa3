//! # Execution State Store
//!
//! The pure persistence boundary: durable records of every execution, its
//! steps, deliverables, context values and lifecycle events. The engine is
//! the only writer; producers only ever see immutable snapshots.
//!
//! Two implementations ship with the crate: [`InMemoryStateStore`] for
//! embedded use and tests, and the Postgres-backed store behind the
//! `postgres` feature.

use crate::models::{Deliverable, EventRecord, Execution, Step};
use crate::state_machine::ExecutionState;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStateStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStateStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Query filter for execution listings.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub status: Option<ExecutionState>,
    pub limit: Option<usize>,
}

impl ExecutionFilter {
    pub fn by_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn by_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ExecutionState) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check a record against every set predicate.
    pub fn matches(&self, execution: &Execution) -> bool {
        if let Some(user_id) = &self.user_id {
            if &execution.user_id != user_id {
                return false;
            }
        }
        if let Some(tenant_id) = &self.tenant_id {
            if &execution.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if execution.status != status {
                return false;
            }
        }
        true
    }
}

/// Durable record storage for the orchestration engine.
///
/// All four record kinds are independently queryable by execution id.
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    // Executions
    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError>;
    async fn update_execution(&self, execution: &Execution) -> Result<(), StoreError>;
    async fn get_execution(&self, id: Uuid) -> Result<Option<Execution>, StoreError>;
    async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, StoreError>;
    /// Every execution in a non-terminal state, for scheduling and recovery.
    async fn active_executions(&self) -> Result<Vec<Execution>, StoreError>;

    // Steps
    async fn insert_steps(&self, steps: &[Step]) -> Result<(), StoreError>;
    async fn update_step(&self, step: &Step) -> Result<(), StoreError>;
    async fn get_step(&self, id: Uuid) -> Result<Option<Step>, StoreError>;
    /// Steps of an execution in template order.
    async fn steps_for_execution(&self, execution_id: Uuid) -> Result<Vec<Step>, StoreError>;
    /// Every step left `running`, across all executions (restart recovery).
    async fn running_steps(&self) -> Result<Vec<Step>, StoreError>;

    // Context bag write-through
    async fn append_context(
        &self,
        execution_id: Uuid,
        tag: &str,
        value: &Value,
    ) -> Result<(), StoreError>;
    async fn load_context(&self, execution_id: Uuid)
        -> Result<HashMap<String, Value>, StoreError>;
    /// Replace the persisted context wholesale (rework reset).
    async fn clear_context(&self, execution_id: Uuid) -> Result<(), StoreError>;

    // Deliverables
    async fn insert_deliverable(&self, deliverable: &Deliverable) -> Result<(), StoreError>;
    async fn deliverables_for_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<Deliverable>, StoreError>;
    async fn deliverable_for_step(&self, step_id: Uuid) -> Result<Option<Deliverable>, StoreError>;

    // Events
    async fn append_event(&self, event: &EventRecord) -> Result<(), StoreError>;
    async fn events_for_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<EventRecord>, StoreError>;
}
