//! # Context Bag
//!
//! Per-execution append-only key-value accumulator. Steps write the tag
//! they produce and read the tags they require; a tag, once written, is
//! immutable for the rest of the execution's life, so any reader always
//! sees a fully-formed value and write-write races cannot exist.
//!
//! Producers never touch the live bag. The dispatch path carves an
//! immutable [`ContextSnapshot`] out of it, covering exactly the step's
//! `requires` set plus the execution's submission payload.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("context tag '{tag}' was already written for execution {execution_id}")]
    TagAlreadyWritten { execution_id: Uuid, tag: String },

    #[error("required context tag '{tag}' is missing for execution {execution_id}")]
    MissingTag { execution_id: Uuid, tag: String },
}

/// Append-only per-execution accumulator.
#[derive(Debug)]
pub struct ContextBag {
    execution_id: Uuid,
    values: RwLock<HashMap<String, Value>>,
}

impl ContextBag {
    pub fn new(execution_id: Uuid) -> Self {
        Self {
            execution_id,
            values: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild a bag from persisted values (restart recovery).
    pub fn from_values(execution_id: Uuid, values: HashMap<String, Value>) -> Self {
        Self {
            execution_id,
            values: RwLock::new(values),
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Append a tag. Rejects overwrites: tags are immutable once written.
    pub fn insert(&self, tag: impl Into<String>, value: Value) -> Result<(), ContextError> {
        let tag = tag.into();
        let mut values = self.values.write();
        if values.contains_key(&tag) {
            return Err(ContextError::TagAlreadyWritten {
                execution_id: self.execution_id,
                tag,
            });
        }
        values.insert(tag, value);
        Ok(())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.values.read().contains_key(tag)
    }

    pub fn get(&self, tag: &str) -> Option<Value> {
        self.values.read().get(tag).cloned()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Immutable snapshot restricted to the given tags. Fails if any tag is
    /// absent — the dispatch guard must have let an unready step through.
    pub fn snapshot(&self, tags: &[String]) -> Result<ContextSnapshot, ContextError> {
        let values = self.values.read();
        let mut slice = HashMap::with_capacity(tags.len());
        for tag in tags {
            match values.get(tag) {
                Some(value) => {
                    slice.insert(tag.clone(), value.clone());
                }
                None => {
                    return Err(ContextError::MissingTag {
                        execution_id: self.execution_id,
                        tag: tag.clone(),
                    })
                }
            }
        }
        Ok(ContextSnapshot {
            values: Arc::new(slice),
        })
    }

    /// Immutable snapshot of every tag currently in the bag.
    pub fn snapshot_all(&self) -> ContextSnapshot {
        ContextSnapshot {
            values: Arc::new(self.values.read().clone()),
        }
    }
}

/// Read-only view over context values handed to a producer invocation.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    values: Arc<HashMap<String, Value>>,
}

impl ContextSnapshot {
    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.values.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.values.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
