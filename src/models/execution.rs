use crate::constants::defaults;
use crate::state_machine::ExecutionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A tracked unit of orchestrated work: an ad-hoc request or an
/// instantiated package.
///
/// Progress is intentionally absent from this record. It is always derived
/// from the execution's steps (estimated-duration-weighted mean) so it can
/// never drift from step-level truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub title: String,
    /// Free-form request payload supplied by the caller
    pub content: String,
    pub content_type: String,
    /// Template snapshot this execution was instantiated from, if any
    pub template_id: Option<Uuid>,
    /// Caller-supplied brand/voice metadata passed through to producers
    pub brand_context: Value,
    pub status: ExecutionState,
    /// Scheduling priority, 1-10, higher dispatches sooner
    pub priority: u8,
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Completed reject/rework cycles
    pub rework_count: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Build a freshly queued execution from a submission request.
    pub fn from_request(request: ExecutionRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            tenant_id: request.tenant_id,
            title: request.title,
            content: request.content,
            content_type: request.content_type,
            template_id: request.template_id,
            brand_context: request.brand_context,
            status: ExecutionState::Queued,
            priority: request
                .priority
                .clamp(defaults::MIN_PRIORITY, defaults::MAX_PRIORITY),
            estimated_completion: None,
            rework_count: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Submission payload accepted by the engine.
///
/// `template_id = None` produces an ad-hoc execution with a single step
/// whose type is the request's `content_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub template_id: Option<Uuid>,
    pub user_id: String,
    pub tenant_id: String,
    pub title: String,
    pub content: String,
    pub content_type: String,
    pub priority: u8,
    pub brand_context: Value,
}

impl ExecutionRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            template_id: None,
            user_id: "anonymous".to_string(),
            tenant_id: "default".to_string(),
            title: title.into(),
            content: content.into(),
            content_type: "text".to_string(),
            priority: 5,
            brand_context: Value::Null,
        }
    }

    pub fn with_template(mut self, template_id: Uuid) -> Self {
        self.template_id = Some(template_id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_brand_context(mut self, brand_context: Value) -> Self {
        self.brand_context = brand_context;
        self
    }
}
