//! In-memory state store for embedded engines and tests.
//!
//! Restart recovery is still exercisable against this store by handing the
//! same `Arc<InMemoryStateStore>` to a fresh engine instance.

use super::{ExecutionFilter, StateStore, StoreError};
use crate::models::{Deliverable, EventRecord, Execution, Step};
use crate::state_machine::StepState;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStateStore {
    executions: DashMap<Uuid, Execution>,
    steps: DashMap<Uuid, Step>,
    /// Step ids per execution, in template order
    execution_steps: DashMap<Uuid, Vec<Uuid>>,
    context: DashMap<Uuid, HashMap<String, Value>>,
    deliverables: DashMap<Uuid, Deliverable>,
    step_deliverables: DashMap<Uuid, Uuid>,
    events: DashMap<Uuid, Vec<EventRecord>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        if self.executions.contains_key(&execution.id) {
            return Err(StoreError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        self.executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), StoreError> {
        match self.executions.get_mut(&execution.id) {
            Some(mut entry) => {
                *entry = execution.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "execution",
                id: execution.id,
            }),
        }
    }

    async fn get_execution(&self, id: Uuid) -> Result<Option<Execution>, StoreError> {
        Ok(self.executions.get(&id).map(|entry| entry.clone()))
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<Execution>, StoreError> {
        let mut matches: Vec<Execution> = self
            .executions
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|execution| execution.created_at);
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn active_executions(&self) -> Result<Vec<Execution>, StoreError> {
        let mut active: Vec<Execution> = self
            .executions
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .map(|entry| entry.value().clone())
            .collect();
        active.sort_by_key(|execution| execution.created_at);
        Ok(active)
    }

    async fn insert_steps(&self, steps: &[Step]) -> Result<(), StoreError> {
        for step in steps {
            self.steps.insert(step.id, step.clone());
            self.execution_steps
                .entry(step.execution_id)
                .or_default()
                .push(step.id);
        }
        Ok(())
    }

    async fn update_step(&self, step: &Step) -> Result<(), StoreError> {
        match self.steps.get_mut(&step.id) {
            Some(mut entry) => {
                *entry = step.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "step",
                id: step.id,
            }),
        }
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<Step>, StoreError> {
        Ok(self.steps.get(&id).map(|entry| entry.clone()))
    }

    async fn steps_for_execution(&self, execution_id: Uuid) -> Result<Vec<Step>, StoreError> {
        let ids = self
            .execution_steps
            .get(&execution_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        let mut steps = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(step) = self.steps.get(&id) {
                steps.push(step.clone());
            }
        }
        Ok(steps)
    }

    async fn running_steps(&self) -> Result<Vec<Step>, StoreError> {
        Ok(self
            .steps
            .iter()
            .filter(|entry| entry.status == StepState::Running)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn append_context(
        &self,
        execution_id: Uuid,
        tag: &str,
        value: &Value,
    ) -> Result<(), StoreError> {
        let mut bag = self.context.entry(execution_id).or_default();
        if bag.contains_key(tag) {
            return Err(StoreError::Conflict(format!(
                "context tag '{tag}' already written for execution {execution_id}"
            )));
        }
        bag.insert(tag.to_string(), value.clone());
        Ok(())
    }

    async fn load_context(
        &self,
        execution_id: Uuid,
    ) -> Result<HashMap<String, Value>, StoreError> {
        Ok(self
            .context
            .get(&execution_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }

    async fn clear_context(&self, execution_id: Uuid) -> Result<(), StoreError> {
        self.context.remove(&execution_id);
        Ok(())
    }

    async fn insert_deliverable(&self, deliverable: &Deliverable) -> Result<(), StoreError> {
        if self.step_deliverables.contains_key(&deliverable.step_id) {
            return Err(StoreError::Conflict(format!(
                "step {} already has a deliverable",
                deliverable.step_id
            )));
        }
        self.step_deliverables
            .insert(deliverable.step_id, deliverable.id);
        self.deliverables.insert(deliverable.id, deliverable.clone());
        Ok(())
    }

    async fn deliverables_for_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<Deliverable>, StoreError> {
        let mut matches: Vec<Deliverable> = self
            .deliverables
            .iter()
            .filter(|entry| entry.execution_id == execution_id)
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|deliverable| deliverable.created_at);
        Ok(matches)
    }

    async fn deliverable_for_step(
        &self,
        step_id: Uuid,
    ) -> Result<Option<Deliverable>, StoreError> {
        Ok(self
            .step_deliverables
            .get(&step_id)
            .and_then(|id| self.deliverables.get(&id))
            .map(|entry| entry.clone()))
    }

    async fn append_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        self.events
            .entry(event.execution_id)
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn events_for_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<EventRecord>, StoreError> {
        Ok(self
            .events
            .get(&execution_id)
            .map(|entry| entry.clone())
            .unwrap_or_default())
    }
}
