//! Shared support for engine integration tests: scripted producers, engine
//! construction and status polling.

use maestro_core::config::{BackoffConfig, EngineConfig};
use maestro_core::models::NewDeliverable;
use maestro_core::orchestration::{Engine, ExecutionView};
use maestro_core::registry::{
    ProducerContext, ProducerError, ProducerRegistry, StepOutput, StepProducer,
};
use maestro_core::state_machine::ExecutionState;
use maestro_core::store::{InMemoryStateStore, StateStore};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Callback observing each invocation, for ordering/concurrency assertions.
pub type InvokeHook = Arc<dyn Fn(&ProducerContext) + Send + Sync>;

/// A scripted producer: fails a configured number of times, sleeps, emits
/// deliverables, observes cancellation, and counts its invocations.
pub struct ScriptedProducer {
    pub invocations: Arc<AtomicUsize>,
    fail_times: usize,
    sleep: Duration,
    observe_cancel: bool,
    deliverable_location: Option<String>,
    progress_reports: Vec<u8>,
    on_invoke: Option<InvokeHook>,
    on_finish: Option<InvokeHook>,
}

impl ScriptedProducer {
    pub fn succeeding() -> Self {
        Self {
            invocations: Arc::new(AtomicUsize::new(0)),
            fail_times: 0,
            sleep: Duration::from_millis(0),
            observe_cancel: false,
            deliverable_location: None,
            progress_reports: Vec::new(),
            on_invoke: None,
            on_finish: None,
        }
    }

    /// Fail the first `times` invocations, then succeed.
    pub fn failing_first(times: usize) -> Self {
        Self {
            fail_times: times,
            ..Self::succeeding()
        }
    }

    pub fn sleeping(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn observing_cancel(mut self) -> Self {
        self.observe_cancel = true;
        self
    }

    pub fn with_deliverable(mut self, location: impl Into<String>) -> Self {
        self.deliverable_location = Some(location.into());
        self
    }

    /// Stream these progress values before finishing.
    pub fn reporting(mut self, reports: Vec<u8>) -> Self {
        self.progress_reports = reports;
        self
    }

    pub fn on_invoke(mut self, hook: InvokeHook) -> Self {
        self.on_invoke = Some(hook);
        self
    }

    pub fn on_finish(mut self, hook: InvokeHook) -> Self {
        self.on_finish = Some(hook);
        self
    }

    pub fn invocation_counter(&self) -> Arc<AtomicUsize> {
        self.invocations.clone()
    }
}

#[async_trait::async_trait]
impl StepProducer for ScriptedProducer {
    async fn execute(&self, context: ProducerContext) -> Result<StepOutput, ProducerError> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.on_invoke {
            hook(&context);
        }

        for report in &self.progress_reports {
            context.progress.report(*report);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        if !self.sleep.is_zero() {
            if self.observe_cancel {
                tokio::select! {
                    _ = tokio::time::sleep(self.sleep) => {}
                    _ = context.cancellation.cancelled() => {
                        if let Some(hook) = &self.on_finish {
                            hook(&context);
                        }
                        return Err(ProducerError::Execution("cancelled".to_string()));
                    }
                }
            } else {
                tokio::time::sleep(self.sleep).await;
            }
        }

        if let Some(hook) = &self.on_finish {
            hook(&context);
        }

        if invocation < self.fail_times {
            return Err(ProducerError::Execution(format!(
                "scripted failure on invocation {invocation}"
            )));
        }

        let mut output = StepOutput::value(json!({
            "step_type": context.step_type,
            "attempt": context.attempt,
        }));
        if let Some(location) = &self.deliverable_location {
            output = output
                .with_deliverable(NewDeliverable::new("document", location.clone()));
        }
        Ok(output)
    }
}

/// Fast-cycling configuration so retry/backoff tests finish quickly.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        max_concurrent_steps: 4,
        backoff: BackoffConfig {
            base_ms: 5,
            max_ms: 50,
            multiplier: 2.0,
            jitter: false,
        },
        step_timeout_ms: 5_000,
        cancellation_grace_ms: 100,
        ..EngineConfig::default()
    }
}

/// Start an engine over a fresh in-memory store.
pub async fn start_engine(
    config: EngineConfig,
    registry: Arc<ProducerRegistry>,
) -> (Engine, Arc<InMemoryStateStore>) {
    let store = Arc::new(InMemoryStateStore::new());
    let engine = Engine::start(config, store.clone() as Arc<dyn StateStore>, registry)
        .await
        .expect("engine should start");
    (engine, store)
}

/// Poll until the execution reaches the expected status, panicking with the
/// last observed view after a generous deadline.
pub async fn wait_for_status(
    engine: &Engine,
    execution_id: Uuid,
    status: ExecutionState,
) -> ExecutionView {
    wait_until(engine, execution_id, |view| view.execution.status == status).await
}

pub async fn wait_until(
    engine: &Engine,
    execution_id: Uuid,
    predicate: impl Fn(&ExecutionView) -> bool,
) -> ExecutionView {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let view = engine
            .get_execution(execution_id)
            .await
            .expect("execution should exist");
        if predicate(&view) {
            return view;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for execution {execution_id}: status={} progress={} steps={:?}",
                view.execution.status,
                view.progress,
                view.steps
                    .iter()
                    .map(|step| (step.step_type.clone(), step.status))
                    .collect::<Vec<_>>()
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
