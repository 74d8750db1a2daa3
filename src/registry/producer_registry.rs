//! # Producer Registry
//!
//! Capability-tagged registry mapping step type names to producer
//! implementations. Domain modules (property analytics, client management,
//! content generation, strategy generation) register their producers
//! against string keys at process startup, which keeps the engine free of
//! hard-coded branching on step type.

use crate::context::ContextSnapshot;
use crate::models::NewDeliverable;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

/// Error surface of a producer invocation. Timeouts are raised by the
/// worker pool and follow the same retry path as producer-reported errors.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("step execution failed: {0}")]
    Execution(String),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Successful producer result: the context value written under the step's
/// `produces` tag, plus an optional artifact declaration.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub value: Value,
    pub deliverable: Option<NewDeliverable>,
}

impl StepOutput {
    pub fn value(value: Value) -> Self {
        Self {
            value,
            deliverable: None,
        }
    }

    pub fn with_deliverable(mut self, deliverable: NewDeliverable) -> Self {
        self.deliverable = Some(deliverable);
        self
    }
}

/// Static producer metadata consulted at registration and scheduling time.
#[derive(Debug, Clone)]
pub struct ProducerMetadata {
    pub description: String,
    pub estimated_duration_secs: u64,
}

impl Default for ProducerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            estimated_duration_secs: 60,
        }
    }
}

/// Streams 0-100 progress from a long-running producer into the engine's
/// aggregate. Reports are fire-and-forget.
#[derive(Clone)]
pub struct ProgressHandle {
    report_fn: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressHandle {
    pub fn new(report_fn: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            report_fn: Arc::new(report_fn),
        }
    }

    /// A handle that discards reports, for tests and ad-hoc invocations.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, progress: u8) {
        (self.report_fn)(progress.min(100));
    }
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressHandle")
    }
}

/// Cooperative cancellation signal observed by producers. A producer that
/// ignores it is forcibly reclaimed after the configured grace period.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl CancelSignal {
    pub fn new(receiver: watch::Receiver<bool>) -> Self {
        Self {
            receiver,
            _keepalive: None,
        }
    }

    /// A signal that never fires, for tests and ad-hoc invocations.
    pub fn never() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            receiver,
            _keepalive: Some(Arc::new(sender)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolve once cancellation is requested. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow() {
                return;
            }
            if receiver.changed().await.is_err() {
                // Sender dropped without cancelling; stay pending forever
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything a producer invocation receives: identifiers, the attempt
/// number, an immutable input snapshot, and the progress/cancellation
/// handles. Producers never see live mutable engine state.
#[derive(Debug, Clone)]
pub struct ProducerContext {
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub step_type: String,
    /// 0 for the first invocation, then the retry count
    pub attempt: u32,
    /// Submission payload of the owning execution
    pub request_content: String,
    /// Caller-supplied brand/voice metadata
    pub brand_context: Value,
    /// Immutable slice of the context bag covering the step's requires set
    pub inputs: ContextSnapshot,
    pub progress: ProgressHandle,
    pub cancellation: CancelSignal,
}

/// The external domain logic a step invokes to do real work.
///
/// Producers must be side-effect-idempotent with respect to deliverable
/// creation: a re-invocation after a crash must be safe unless a ready
/// deliverable already exists for the step, in which case the engine never
/// re-invokes at all.
#[async_trait::async_trait]
pub trait StepProducer: Send + Sync {
    /// Execute the step against an immutable context snapshot.
    async fn execute(&self, context: ProducerContext) -> Result<StepOutput, ProducerError>;

    /// Static metadata for scheduling estimates.
    fn metadata(&self) -> ProducerMetadata {
        ProducerMetadata::default()
    }
}

/// Registry statistics for health surfaces.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_producers: usize,
    pub step_types: Vec<String>,
}

/// Thread-safe step type → producer mapping.
pub struct ProducerRegistry {
    producers: DashMap<String, Arc<dyn StepProducer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self {
            producers: DashMap::new(),
        }
    }

    /// Register a producer under a step type key. Re-registering a key
    /// replaces the previous producer.
    pub fn register(&self, step_type: impl Into<String>, producer: Arc<dyn StepProducer>) {
        let step_type = step_type.into();
        if self.producers.insert(step_type.clone(), producer).is_some() {
            debug!(step_type = %step_type, "Replaced existing producer registration");
        } else {
            info!(step_type = %step_type, "Registered step producer");
        }
    }

    pub fn resolve(&self, step_type: &str) -> Option<Arc<dyn StepProducer>> {
        self.producers.get(step_type).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.producers.contains_key(step_type)
    }

    pub fn stats(&self) -> RegistryStats {
        let mut step_types: Vec<String> =
            self.producers.iter().map(|entry| entry.key().clone()).collect();
        step_types.sort();
        RegistryStats {
            total_producers: step_types.len(),
            step_types,
        }
    }
}

impl Default for ProducerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
