//! # Worker Pool
//!
//! Bounded set of concurrent execution slots that invoke step producers.
//!
//! A global semaphore caps concurrency across all executions; an optional
//! per-tenant semaphore prevents one tenant from starving the rest. Each
//! invocation runs under an enforced timeout and races a cancellation
//! signal: a cancelled producer gets a grace period to abort cooperatively
//! before its slot is forcibly reclaimed.
//!
//! Dispatch is fire-and-forget — the scheduling tick never blocks on a
//! producer. Completion is reported back through the scheduler channel.

use super::types::{CompletionOutcome, SchedulerSignal, StepCompletion};
use crate::models::Step;
use crate::registry::{CancelSignal, ProducerContext, StepProducer};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub max_concurrent_steps: usize,
    pub per_tenant_slots: Option<usize>,
    pub step_timeout: Duration,
    pub cancellation_grace: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: crate::constants::defaults::MAX_CONCURRENT_STEPS,
            per_tenant_slots: None,
            step_timeout: Duration::from_millis(crate::constants::defaults::STEP_TIMEOUT_MS),
            cancellation_grace: Duration::from_millis(
                crate::constants::defaults::CANCELLATION_GRACE_MS,
            ),
        }
    }
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    global_slots: Arc<Semaphore>,
    tenant_slots: DashMap<String, Arc<Semaphore>>,
    cancellations: Arc<DashMap<Uuid, watch::Sender<bool>>>,
    completions: mpsc::UnboundedSender<SchedulerSignal>,
}

impl WorkerPool {
    pub fn new(
        config: WorkerPoolConfig,
        completions: mpsc::UnboundedSender<SchedulerSignal>,
    ) -> Self {
        let global_slots = Arc::new(Semaphore::new(config.max_concurrent_steps));
        Self {
            config,
            global_slots,
            tenant_slots: DashMap::new(),
            cancellations: Arc::new(DashMap::new()),
            completions,
        }
    }

    /// Currently free global slots.
    pub fn available_slots(&self) -> usize {
        self.global_slots.available_permits()
    }

    /// Fire-and-forget a producer invocation for an already-Running step.
    ///
    /// The context's cancellation signal is wired up here; everything else
    /// (immutable input snapshot, progress handle) comes from the caller.
    pub fn submit(
        &self,
        step: &Step,
        tenant_id: &str,
        producer: Arc<dyn StepProducer>,
        mut context: ProducerContext,
    ) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        context.cancellation = CancelSignal::new(cancel_rx.clone());
        self.cancellations.insert(step.id, cancel_tx);

        let execution_id = step.execution_id;
        let step_id = step.id;
        let step_type = step.step_type.clone();
        let global_slots = self.global_slots.clone();
        let tenant_semaphore = self.tenant_semaphore(tenant_id);
        let step_timeout = self.config.step_timeout;
        let grace = self.config.cancellation_grace;
        let completions = self.completions.clone();
        let cancellations = self.cancellations.clone();

        tokio::spawn(async move {
            let global_permit = match global_slots.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            let tenant_permit = match &tenant_semaphore {
                Some(semaphore) => match semaphore.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            debug!(
                execution_id = %execution_id,
                step_id = %step_id,
                step_type = %step_type,
                "Worker slot acquired, invoking producer"
            );

            let started = Instant::now();
            let outcome = tokio::select! {
                invocation = timeout(step_timeout, producer.execute(context)) => {
                    match invocation {
                        Ok(Ok(output)) => CompletionOutcome::Success(output),
                        Ok(Err(error)) => CompletionOutcome::Failure {
                            message: error.to_string(),
                            timed_out: false,
                        },
                        Err(_) => CompletionOutcome::Failure {
                            message: format!(
                                "producer exceeded its {}ms budget",
                                step_timeout.as_millis()
                            ),
                            timed_out: true,
                        },
                    }
                }
                _ = cancelled_past_grace(cancel_rx, grace) => {
                    warn!(
                        step_id = %step_id,
                        grace_ms = grace.as_millis() as u64,
                        "Producer ignored cancellation, reclaiming slot"
                    );
                    CompletionOutcome::Cancelled { forced: true }
                }
            };

            // Release the slot before reporting: the completion handler's
            // next tick must observe the freed capacity
            drop(tenant_permit);
            drop(global_permit);
            cancellations.remove(&step_id);

            let completion = StepCompletion {
                execution_id,
                step_id,
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            if completions
                .send(SchedulerSignal::StepFinished(completion))
                .is_err()
            {
                warn!(step_id = %step_id, "Scheduler channel closed, dropping completion");
            }
        });
    }

    /// Signal cooperative cancellation to a running invocation.
    pub fn cancel(&self, step_id: Uuid) {
        if let Some(entry) = self.cancellations.get(&step_id) {
            let _ = entry.value().send(true);
        }
    }

    fn tenant_semaphore(&self, tenant_id: &str) -> Option<Arc<Semaphore>> {
        let slots = self.config.per_tenant_slots?;
        Some(
            self.tenant_slots
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(slots)))
                .clone(),
        )
    }
}

/// Resolve once cancellation has been requested and the grace period has
/// elapsed. Never resolves if cancellation is never requested.
async fn cancelled_past_grace(mut cancel_rx: watch::Receiver<bool>, grace: Duration) {
    loop {
        if *cancel_rx.borrow() {
            break;
        }
        if cancel_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
    tokio::time::sleep(grace).await;
}
