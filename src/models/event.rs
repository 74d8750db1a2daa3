use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An immutable, append-only record of a state transition, persisted for
/// durability and fanned out to live subscribers.
///
/// Events are a convenience stream, not the source of truth: a subscriber
/// that reconnects resynchronizes via the status query interface instead of
/// replaying missed events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    /// Dotted event name from [`crate::constants::events`]
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(execution_id: Uuid, event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}
