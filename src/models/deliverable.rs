use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of an output artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Generating,
    Ready,
    Failed,
}

impl fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generating => write!(f, "generating"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for DeliverableStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(Self::Generating),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid deliverable status: {s}")),
        }
    }
}

/// A persisted output artifact produced by a completed step: a document,
/// image or report reference. A `ready` deliverable is the idempotency
/// boundary for producer re-invocation and is never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    /// Artifact kind, e.g. "document", "image", "report"
    pub kind: String,
    /// Storage reference for the artifact body
    pub location: String,
    /// Optional reference to a rendered preview
    pub preview: Option<String>,
    pub status: DeliverableStatus,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Artifact declaration returned by a producer on successful completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeliverable {
    pub kind: String,
    pub location: String,
    pub preview: Option<String>,
    pub metadata: Value,
}

impl NewDeliverable {
    pub fn new(kind: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            location: location.into(),
            preview: None,
            metadata: Value::Null,
        }
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Materialize as a ready deliverable owned by the given step.
    pub fn into_deliverable(self, execution_id: Uuid, step_id: Uuid) -> Deliverable {
        Deliverable {
            id: Uuid::new_v4(),
            execution_id,
            step_id,
            kind: self.kind,
            location: self.location,
            preview: self.preview,
            status: DeliverableStatus::Ready,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}
