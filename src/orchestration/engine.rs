//! # Orchestration Engine
//!
//! The state machine owner and scheduler: accepts submissions, instantiates
//! steps from package templates, selects runnable work, dispatches it to
//! the worker pool, applies retry/backoff, aggregates progress and drives
//! executions to a terminal state.
//!
//! ## Serialized scheduling
//!
//! Every state change funnels through a single scheduling loop consuming
//! [`SchedulerSignal`] messages — execution created, step finished, retry
//! due, cancel/approve/reject. One active scheduling pass at a time means
//! the same runnable step can never be double-dispatched, while the steps
//! it dispatches run in parallel on the worker pool.
//!
//! ## Ownership
//!
//! The engine is an explicit instance owning its state store handle,
//! context bags, template store and worker pool. Nothing is ambient or
//! global, so tests and multi-engine deployments construct as many
//! instances as they need.

use super::backoff::BackoffPolicy;
use super::recovery;
use super::scheduler::DispatchPlanner;
use super::types::{
    CandidateStep, CompletionOutcome, EngineStats, ExecutionView, SchedulerSignal, StepCompletion,
    weighted_progress,
};
use super::worker_pool::{WorkerPool, WorkerPoolConfig};
use crate::config::EngineConfig;
use crate::constants::events;
use crate::context::ContextBag;
use crate::error::{EngineError, Result};
use crate::events::{EventPublisher, ExecutionSubscription};
use crate::models::{EventRecord, Execution, ExecutionRequest, Step};
use crate::registry::{CancelSignal, ProducerContext, ProducerRegistry, ProgressHandle, StepOutput};
use crate::state_machine::{
    ExecutionEvent, ExecutionState, ExecutionStateMachine, StepEvent, StepState, StepStateMachine,
};
use crate::store::{ExecutionFilter, StateStore};
use crate::template::{StepDeclaration, TemplateStore};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// The orchestration engine. Cheap to share: all public methods take
/// `&self` and proxy into the serialized scheduling loop.
pub struct Engine {
    inner: Arc<EngineInner>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<dyn StateStore>,
    registry: Arc<ProducerRegistry>,
    templates: Arc<TemplateStore>,
    publisher: EventPublisher,
    pool: WorkerPool,
    backoff: BackoffPolicy,
    /// Live context bags for non-terminal executions
    bags: DashMap<Uuid, Arc<ContextBag>>,
    /// execution id → currently running step id
    busy: DashMap<Uuid, Uuid>,
    signal_tx: mpsc::UnboundedSender<SchedulerSignal>,
}

impl Engine {
    /// Build an engine over the given store and producer registry, run the
    /// restart-recovery pass, and start the scheduling loop.
    pub async fn start(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        registry: Arc<ProducerRegistry>,
    ) -> Result<Self> {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let publisher = EventPublisher::new(config.event_channel_capacity);
        let pool = WorkerPool::new(
            WorkerPoolConfig {
                max_concurrent_steps: config.max_concurrent_steps,
                per_tenant_slots: config.per_tenant_slots,
                step_timeout: config.step_timeout(),
                cancellation_grace: config.cancellation_grace(),
            },
            signal_tx.clone(),
        );
        let templates = Arc::new(TemplateStore::new(registry.clone()));
        let backoff = BackoffPolicy::from_config(&config.backoff);

        let recovery_report = recovery::recover(&store).await?;
        debug!(?recovery_report, "Startup recovery complete");

        // Rebuild live context bags for every non-terminal execution
        let active = store.active_executions().await?;
        let bags = DashMap::new();
        let contexts = futures::future::try_join_all(
            active
                .iter()
                .map(|execution| store.load_context(execution.id)),
        )
        .await?;
        for (execution, context) in active.iter().zip(contexts) {
            bags.insert(
                execution.id,
                Arc::new(ContextBag::from_values(execution.id, context)),
            );
        }

        let inner = Arc::new(EngineInner {
            config,
            store,
            registry,
            templates,
            publisher,
            pool,
            backoff,
            bags,
            busy: DashMap::new(),
            signal_tx: signal_tx.clone(),
        });

        let loop_inner = inner.clone();
        let loop_handle = tokio::spawn(async move {
            run_loop(loop_inner, signal_rx).await;
        });

        // Re-enter every surviving execution into the scheduling loop
        for execution in active {
            let signal = match execution.status {
                ExecutionState::Queued => SchedulerSignal::ExecutionCreated(execution.id),
                _ => SchedulerSignal::Tick(execution.id),
            };
            let _ = signal_tx.send(signal);
        }

        info!(
            max_concurrent_steps = inner.config.max_concurrent_steps,
            "🚀 Orchestration engine started"
        );

        Ok(Self {
            inner,
            loop_handle: Mutex::new(Some(loop_handle)),
        })
    }

    /// Stop the scheduling loop. In-flight producer invocations finish on
    /// the runtime but no further scheduling occurs.
    pub async fn shutdown(&self) {
        let _ = self.inner.signal_tx.send(SchedulerSignal::Shutdown);
        if let Some(handle) = self.loop_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Accept a submission. Always returns without waiting for any step to
    /// run: progress is observed through the status query and event
    /// interfaces.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn create_execution(&self, request: ExecutionRequest) -> Result<Uuid> {
        match request.template_id {
            Some(template_id) => {
                // Surface an unknown template to the caller immediately
                self.inner.templates.resolve(template_id)?;
            }
            None => {
                if !self.inner.registry.contains(&request.content_type) {
                    return Err(EngineError::RegistryError(format!(
                        "no producer registered for ad-hoc content type '{}'",
                        request.content_type
                    )));
                }
            }
        }

        let execution = Execution::from_request(request);
        let execution_id = execution.id;
        self.inner.store.insert_execution(&execution).await?;
        self.inner
            .publish_event(
                execution_id,
                events::EXECUTION_CREATED,
                json!({
                    "title": execution.title,
                    "priority": execution.priority,
                    "tenant_id": execution.tenant_id,
                }),
            )
            .await?;

        self.send(SchedulerSignal::ExecutionCreated(execution_id))?;
        info!(execution_id = %execution_id, "Accepted execution");
        Ok(execution_id)
    }

    /// Request cancellation. Pending steps are skipped immediately; a
    /// running step is signalled and forcibly reclaimed after the grace
    /// period if it does not abort.
    pub async fn cancel_execution(&self, execution_id: Uuid) -> Result<()> {
        let execution = self.require_execution(execution_id).await?;
        if execution.status.is_terminal() {
            return Err(EngineError::StateTransitionError(format!(
                "execution {execution_id} is already {}",
                execution.status
            )));
        }
        self.send(SchedulerSignal::CancelRequested(execution_id))
    }

    /// Approve a draft, driving the execution to `delivered`.
    pub async fn approve_execution(&self, execution_id: Uuid) -> Result<()> {
        self.require_reviewable(execution_id).await?;
        self.send(SchedulerSignal::ApprovalReceived(execution_id))
    }

    /// Reject a draft, re-opening it for a bounded rework cycle.
    pub async fn reject_execution(&self, execution_id: Uuid, reason: impl Into<String>) -> Result<()> {
        self.require_reviewable(execution_id).await?;
        self.send(SchedulerSignal::RejectionReceived {
            execution_id,
            reason: reason.into(),
        })
    }

    /// Full status snapshot: execution, derived progress, steps and
    /// deliverables.
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<ExecutionView> {
        let execution = self.require_execution(execution_id).await?;
        let steps = self.inner.store.steps_for_execution(execution_id).await?;
        let deliverables = self
            .inner
            .store
            .deliverables_for_execution(execution_id)
            .await?;
        Ok(ExecutionView {
            progress: weighted_progress(&steps),
            execution,
            steps,
            deliverables,
        })
    }

    pub async fn list_executions(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>> {
        Ok(self.inner.store.list_executions(filter).await?)
    }

    /// Durable event history for one execution, oldest first.
    pub async fn execution_events(&self, execution_id: Uuid) -> Result<Vec<EventRecord>> {
        Ok(self.inner.store.events_for_execution(execution_id).await?)
    }

    /// Subscribe to all lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.inner.publisher.subscribe()
    }

    /// Subscribe to one execution's lifecycle events.
    pub fn subscribe_execution(&self, execution_id: Uuid) -> ExecutionSubscription {
        self.inner.publisher.subscribe_execution(execution_id)
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.inner.templates
    }

    pub fn registry(&self) -> &Arc<ProducerRegistry> {
        &self.inner.registry
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        let active = self.inner.store.active_executions().await?;
        Ok(EngineStats {
            active_executions: active.len(),
            running_steps: self.inner.busy.len(),
            available_slots: self.inner.pool.available_slots(),
            registered_producers: self.inner.registry.stats().total_producers,
        })
    }

    fn send(&self, signal: SchedulerSignal) -> Result<()> {
        self.inner
            .signal_tx
            .send(signal)
            .map_err(|_| EngineError::OrchestrationError("scheduling loop stopped".to_string()))
    }

    async fn require_execution(&self, execution_id: Uuid) -> Result<Execution> {
        self.inner
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| {
                EngineError::ValidationError(format!("execution {execution_id} not found"))
            })
    }

    async fn require_reviewable(&self, execution_id: Uuid) -> Result<()> {
        let execution = self.require_execution(execution_id).await?;
        if !execution.status.awaits_review() {
            return Err(EngineError::StateTransitionError(format!(
                "execution {execution_id} is {}, not awaiting review",
                execution.status
            )));
        }
        Ok(())
    }
}

/// The single serialized scheduling loop. Handler errors are logged and do
/// not stop the loop; submission callers never see an error after
/// acceptance.
async fn run_loop(inner: Arc<EngineInner>, mut signal_rx: mpsc::UnboundedReceiver<SchedulerSignal>) {
    while let Some(signal) = signal_rx.recv().await {
        let result = match signal {
            SchedulerSignal::ExecutionCreated(id) => inner.handle_execution_created(id).await,
            SchedulerSignal::StepFinished(completion) => {
                inner.handle_step_finished(completion).await
            }
            SchedulerSignal::StepProgress {
                execution_id,
                step_id,
                progress,
            } => inner.handle_step_progress(execution_id, step_id, progress).await,
            SchedulerSignal::RetryDue {
                execution_id,
                step_id,
            } => inner.handle_retry_due(execution_id, step_id).await,
            SchedulerSignal::CancelRequested(id) => inner.handle_cancel(id).await,
            SchedulerSignal::ApprovalReceived(id) => inner.handle_approval(id).await,
            SchedulerSignal::RejectionReceived {
                execution_id,
                reason,
            } => inner.handle_rejection(execution_id, reason).await,
            SchedulerSignal::Tick(id) => inner.handle_tick(id).await,
            SchedulerSignal::Shutdown => {
                info!("Scheduling loop shutting down");
                break;
            }
        };

        if let Err(err) = result {
            error!(error = %err, "Scheduling pass failed");
        }
    }
}

impl EngineInner {
    // ---- signal handlers -------------------------------------------------

    async fn handle_execution_created(&self, execution_id: Uuid) -> Result<()> {
        let Some(mut execution) = self.store.get_execution(execution_id).await? else {
            warn!(execution_id = %execution_id, "Created signal for unknown execution");
            return Ok(());
        };
        if execution.status != ExecutionState::Queued {
            warn!(execution_id = %execution_id, status = %execution.status, "Ignoring duplicate planning request");
            return Ok(());
        }

        let declarations = self.declarations_for(&execution)?;
        let steps: Vec<Step> = declarations
            .iter()
            .enumerate()
            .map(|(order, declaration)| {
                Step::from_declaration(execution_id, order as u32, declaration)
            })
            .collect();
        self.store.insert_steps(&steps).await?;
        self.bags
            .insert(execution_id, Arc::new(ContextBag::new(execution_id)));

        let total_secs: u64 = steps.iter().map(|step| step.estimated_duration_secs).sum();
        execution.estimated_completion =
            Some(Utc::now() + chrono::Duration::seconds(total_secs as i64));

        self.transition_execution(
            &mut execution,
            ExecutionEvent::Plan,
            json!({"step_count": steps.len()}),
        )
        .await?;

        ExecutionStateMachine::check_start_guard(steps.len())?;
        self.transition_execution(&mut execution, ExecutionEvent::Start, json!({}))
            .await?;

        self.tick_all().await
    }

    async fn handle_step_progress(
        &self,
        execution_id: Uuid,
        step_id: Uuid,
        progress: u8,
    ) -> Result<()> {
        let Some(mut step) = self.store.get_step(step_id).await? else {
            return Ok(());
        };
        if step.status != StepState::Running {
            return Ok(());
        }

        // Progress never regresses once reported
        let clamped = progress.min(100).max(step.progress);
        if clamped == step.progress {
            return Ok(());
        }
        step.progress = clamped;
        self.store.update_step(&step).await?;

        let steps = self.store.steps_for_execution(execution_id).await?;
        self.publish_event(
            execution_id,
            events::STEP_PROGRESS,
            json!({
                "step_id": step_id,
                "step_progress": clamped,
                "execution_progress": weighted_progress(&steps),
            }),
        )
        .await
    }

    async fn handle_step_finished(&self, completion: StepCompletion) -> Result<()> {
        let StepCompletion {
            execution_id,
            step_id,
            outcome,
            duration_ms,
        } = completion;

        if self
            .busy
            .get(&execution_id)
            .map(|entry| *entry.value() == step_id)
            .unwrap_or(false)
        {
            self.busy.remove(&execution_id);
        }

        let Some(mut execution) = self.store.get_execution(execution_id).await? else {
            return Ok(());
        };
        let Some(mut step) = self.store.get_step(step_id).await? else {
            return Ok(());
        };
        if step.status != StepState::Running {
            debug!(step_id = %step_id, status = %step.status, "Stale completion, ignoring");
            return Ok(());
        }

        debug!(
            execution_id = %execution_id,
            step_id = %step_id,
            duration_ms = duration_ms,
            "Processing step completion"
        );

        if execution.status.is_terminal() {
            // The execution ended while the producer was in flight. Keep a
            // committed result, skip everything else.
            match outcome {
                CompletionOutcome::Success(output) => {
                    self.complete_step(&execution, &mut step, output).await?;
                }
                _ => {
                    self.apply_step_event(&mut step, StepEvent::Skip).await?;
                }
            }
            return Ok(());
        }

        match outcome {
            CompletionOutcome::Success(output) => {
                self.complete_step(&execution, &mut step, output).await?;
                self.maybe_finalize(&mut execution).await?;
            }
            CompletionOutcome::Failure { message, timed_out } => {
                if step.retry_available() {
                    self.schedule_retry(&execution, &mut step, message, timed_out)
                        .await?;
                } else {
                    self.fail_step_finally(&mut execution, &mut step, message)
                        .await?;
                }
            }
            CompletionOutcome::Cancelled { forced } => {
                warn!(step_id = %step_id, forced = forced, "Step slot cancelled");
                self.apply_step_event(&mut step, StepEvent::Skip).await?;
            }
        }

        self.tick_all().await
    }

    async fn handle_retry_due(&self, execution_id: Uuid, step_id: Uuid) -> Result<()> {
        let Some(execution) = self.store.get_execution(execution_id).await? else {
            return Ok(());
        };
        let Some(mut step) = self.store.get_step(step_id).await? else {
            return Ok(());
        };
        if step.status != StepState::Failed {
            return Ok(());
        }

        if execution.status.is_terminal() {
            self.apply_step_event(&mut step, StepEvent::Skip).await?;
            return Ok(());
        }

        self.apply_step_event(&mut step, StepEvent::Retry).await?;
        self.tick_all().await
    }

    async fn handle_cancel(&self, execution_id: Uuid) -> Result<()> {
        let Some(mut execution) = self.store.get_execution(execution_id).await? else {
            return Ok(());
        };
        if execution.status.is_terminal() {
            return Ok(());
        }

        self.transition_execution(&mut execution, ExecutionEvent::Cancel, json!({}))
            .await?;

        for mut step in self.store.steps_for_execution(execution_id).await? {
            match step.status {
                StepState::Pending => {
                    self.apply_step_event(&mut step, StepEvent::Skip).await?;
                }
                StepState::Failed if !step.is_settled() => {
                    // Awaiting a retry that will never be granted
                    self.apply_step_event(&mut step, StepEvent::Skip).await?;
                }
                StepState::Running => {
                    // Cooperative: the slot observes the signal, or is
                    // reclaimed after the grace period
                    self.pool.cancel(step.id);
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn handle_approval(&self, execution_id: Uuid) -> Result<()> {
        let Some(mut execution) = self.store.get_execution(execution_id).await? else {
            return Ok(());
        };
        if execution.status != ExecutionState::DraftReady {
            warn!(execution_id = %execution_id, status = %execution.status, "Approval for non-reviewable execution");
            return Ok(());
        }

        self.transition_execution(&mut execution, ExecutionEvent::Approve, json!({}))
            .await?;
        self.transition_execution(&mut execution, ExecutionEvent::Deliver, json!({}))
            .await?;
        info!(execution_id = %execution_id, "Execution delivered");
        Ok(())
    }

    async fn handle_rejection(&self, execution_id: Uuid, reason: String) -> Result<()> {
        let Some(mut execution) = self.store.get_execution(execution_id).await? else {
            return Ok(());
        };
        if execution.status != ExecutionState::DraftReady {
            warn!(execution_id = %execution_id, status = %execution.status, "Rejection for non-reviewable execution");
            return Ok(());
        }

        execution.rework_count += 1;
        let cycle = execution.rework_count;
        self.transition_execution(
            &mut execution,
            ExecutionEvent::Reject(reason.clone()),
            json!({"reason": reason, "cycle": cycle}),
        )
        .await?;

        if ExecutionStateMachine::check_rework_guard(
            execution.rework_count,
            self.config.max_rework_cycles,
        )
        .is_err()
        {
            self.transition_execution(
                &mut execution,
                ExecutionEvent::fail_with_error(format!(
                    "rework cycle limit ({}) exceeded",
                    self.config.max_rework_cycles
                )),
                json!({}),
            )
            .await?;
            return Ok(());
        }

        // A rejection discards the working draft: fresh steps, fresh bag.
        // Deliverables from prior passes are retained.
        for mut step in self.store.steps_for_execution(execution_id).await? {
            step.reset_for_rework();
            self.store.update_step(&step).await?;
        }
        self.store.clear_context(execution_id).await?;
        self.bags
            .insert(execution_id, Arc::new(ContextBag::new(execution_id)));

        let cycle = execution.rework_count;
        self.transition_execution(
            &mut execution,
            ExecutionEvent::Rework,
            json!({"cycle": cycle}),
        )
        .await?;

        self.tick_all().await
    }

    async fn handle_tick(&self, execution_id: Uuid) -> Result<()> {
        // Startup re-entry: an execution that crashed between planning and
        // generating still holds instantiated steps
        if let Some(mut execution) = self.store.get_execution(execution_id).await? {
            if execution.status == ExecutionState::Planning {
                let steps = self.store.steps_for_execution(execution_id).await?;
                if ExecutionStateMachine::check_start_guard(steps.len()).is_ok() {
                    self.transition_execution(&mut execution, ExecutionEvent::Start, json!({}))
                        .await?;
                }
            }
        }
        self.tick_all().await
    }

    // ---- scheduling tick -------------------------------------------------

    /// One scheduling pass: reconcile every dispatchable execution, collect
    /// runnable candidates, order them, and dispatch up to the free worker
    /// capacity.
    async fn tick_all(&self) -> Result<()> {
        // Capacity from the loop's own accounting: the semaphore is the
        // enforcement backstop, but its permits are acquired asynchronously
        // by spawned tasks and would transiently over-report free slots
        let free_slots = self
            .config
            .max_concurrent_steps
            .saturating_sub(self.busy.len());
        let active = self.store.active_executions().await?;

        let busy: HashSet<Uuid> = self.busy.iter().map(|entry| *entry.key()).collect();
        let mut candidates: Vec<CandidateStep> = Vec::new();

        for mut execution in active {
            if !execution.status.is_dispatchable() {
                continue;
            }

            let mut steps = self.store.steps_for_execution(execution.id).await?;
            let bag = self.bag_for(execution.id);

            self.reconcile_steps(&execution, &mut steps, &bag).await?;

            if self.maybe_finalize_with(&mut execution, &steps).await? {
                continue;
            }

            for step in &steps {
                let runnable = step.status == StepState::Pending
                    && step.requires.iter().all(|tag| bag.contains(tag));
                if runnable {
                    candidates.push(CandidateStep {
                        step: step.clone(),
                        priority: execution.priority,
                        execution_created_at: execution.created_at,
                    });
                }
            }
        }

        if candidates.is_empty() || free_slots == 0 {
            return Ok(());
        }

        let selected = DispatchPlanner::plan(candidates, &busy, free_slots);
        for step in selected {
            self.dispatch_step(step).await?;
        }
        Ok(())
    }

    /// Block pending steps whose requires set can no longer be satisfied,
    /// and complete pending steps that already committed a ready
    /// deliverable in a previous life.
    async fn reconcile_steps(
        &self,
        execution: &Execution,
        steps: &mut [Step],
        bag: &Arc<ContextBag>,
    ) -> Result<()> {
        // Heal the bag: a completed step's produces tag must be readable by
        // dependents even when the step completed in a previous process
        // life (recovery shortcut)
        for step in steps.iter() {
            if step.status == StepState::Completed && !bag.contains(&step.produces) {
                let value = step.result.clone().unwrap_or(Value::Null);
                bag.insert(step.produces.clone(), value.clone())?;
                if let Err(err) = self
                    .store
                    .append_context(execution.id, &step.produces, &value)
                    .await
                {
                    debug!(error = %err, tag = %step.produces, "Context already durable");
                }
            }
        }

        // Idempotency boundary: a pending step with a ready deliverable is
        // never re-invoked
        for step in steps.iter_mut() {
            if step.status != StepState::Pending {
                continue;
            }
            if let Some(deliverable) = self.store.deliverable_for_step(step.id).await? {
                if deliverable.status == crate::models::DeliverableStatus::Ready {
                    info!(step_id = %step.id, "Skipping re-invocation, deliverable already committed");
                    self.complete_step(
                        execution,
                        step,
                        StepOutput::value(json!({
                            "deliverable_id": deliverable.id,
                            "location": deliverable.location,
                        })),
                    )
                    .await?;
                }
            }
        }

        self.block_unsatisfiable(steps, bag).await
    }

    /// Cascade `blocked` transitively: a tag whose producing step is
    /// settled without completing will never appear in the bag, so every
    /// pending step waiting on it is unreachable.
    async fn block_unsatisfiable(
        &self,
        steps: &mut [Step],
        bag: &Arc<ContextBag>,
    ) -> Result<()> {
        loop {
            let dead_tags: HashSet<String> = steps
                .iter()
                .filter(|step| step.is_settled() && step.status != StepState::Completed)
                .map(|step| step.produces.clone())
                .collect();

            let mut changed = false;
            for step in steps.iter_mut() {
                if step.status != StepState::Pending {
                    continue;
                }
                let unsatisfiable = step
                    .requires
                    .iter()
                    .any(|tag| !bag.contains(tag) && dead_tags.contains(tag));
                if unsatisfiable {
                    self.apply_step_event(step, StepEvent::Block).await?;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Ok(())
    }

    async fn dispatch_step(&self, mut step: Step) -> Result<()> {
        let Some(execution) = self.store.get_execution(step.execution_id).await? else {
            return Ok(());
        };
        let bag = self.bag_for(execution.id);

        // Invariant check on every dispatch: never start a step whose
        // requires set is not fully present
        StepStateMachine::check_dependency_guard(&step.requires, |tag| bag.contains(tag))?;

        let Some(producer) = self.registry.resolve(&step.step_type) else {
            // Unregistered producers cannot be retried into existence
            let mut execution = execution;
            step.retry_count = step.max_retries;
            self.apply_step_event(&mut step, StepEvent::Start).await?;
            let fail_reason =
                format!("no producer registered for step type '{}'", step.step_type);
            self.fail_step_finally(
                &mut execution,
                &mut step,
                fail_reason,
            )
            .await?;
            return Ok(());
        };

        let snapshot = bag.snapshot(&step.requires)?;

        self.apply_step_event(&mut step, StepEvent::Start).await?;
        self.busy.insert(execution.id, step.id);

        let progress_tx = self.signal_tx.clone();
        let (execution_id, step_id) = (execution.id, step.id);
        let context = ProducerContext {
            execution_id,
            step_id,
            step_type: step.step_type.clone(),
            attempt: step.retry_count,
            request_content: execution.content.clone(),
            brand_context: execution.brand_context.clone(),
            inputs: snapshot,
            progress: ProgressHandle::new(move |progress| {
                let _ = progress_tx.send(SchedulerSignal::StepProgress {
                    execution_id,
                    step_id,
                    progress,
                });
            }),
            cancellation: CancelSignal::never(), // wired up by the pool
        };

        self.pool
            .submit(&step, &execution.tenant_id, producer, context);
        Ok(())
    }

    // ---- step outcome processing ----------------------------------------

    async fn complete_step(
        &self,
        execution: &Execution,
        step: &mut Step,
        output: StepOutput,
    ) -> Result<()> {
        let bag = self.bag_for(execution.id);
        if !bag.contains(&step.produces) {
            bag.insert(step.produces.clone(), output.value.clone())?;
            if let Err(err) = self
                .store
                .append_context(execution.id, &step.produces, &output.value)
                .await
            {
                warn!(error = %err, tag = %step.produces, "Context write-through conflict");
            }
        }

        step.result = Some(output.value);
        self.apply_step_event(step, StepEvent::Complete(None)).await?;

        if let Some(declaration) = output.deliverable {
            // Never create a second deliverable for the same step id
            if self.store.deliverable_for_step(step.id).await?.is_none() {
                let deliverable = declaration.into_deliverable(execution.id, step.id);
                self.store.insert_deliverable(&deliverable).await?;
                self.publish_event(
                    execution.id,
                    events::DELIVERABLE_READY,
                    json!({
                        "deliverable_id": deliverable.id,
                        "step_id": step.id,
                        "kind": deliverable.kind,
                        "location": deliverable.location,
                    }),
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn schedule_retry(
        &self,
        execution: &Execution,
        step: &mut Step,
        message: String,
        timed_out: bool,
    ) -> Result<()> {
        step.retry_count += 1;
        step.error = Some(message.clone());
        self.apply_step_event(step, StepEvent::fail_with_error(message))
            .await?;

        let delay = self
            .backoff
            .delay_for(step.retry_count, step.id.as_u128() as u64);
        self.publish_event(
            execution.id,
            events::STEP_RETRY_SCHEDULED,
            json!({
                "step_id": step.id,
                "retry_count": step.retry_count,
                "delay_ms": delay.as_millis() as u64,
                "timed_out": timed_out,
            }),
        )
        .await?;

        let signal_tx = self.signal_tx.clone();
        let (execution_id, step_id) = (execution.id, step.id);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signal_tx.send(SchedulerSignal::RetryDue {
                execution_id,
                step_id,
            });
        });
        Ok(())
    }

    async fn fail_step_finally(
        &self,
        execution: &mut Execution,
        step: &mut Step,
        message: String,
    ) -> Result<()> {
        step.error = Some(message.clone());
        self.apply_step_event(step, StepEvent::fail_with_error(message.clone()))
            .await?;

        // Dependents become unreachable immediately, whether or not the
        // execution survives this failure
        let bag = self.bag_for(execution.id);
        let mut steps = self.store.steps_for_execution(execution.id).await?;
        self.block_unsatisfiable(&mut steps, &bag).await?;

        if !step.skippable {
            self.transition_execution(
                execution,
                ExecutionEvent::fail_with_error(format!(
                    "step '{}' failed permanently: {message}",
                    step.step_type
                )),
                json!({"failed_step_id": step.id}),
            )
            .await?;
        }
        Ok(())
    }

    /// If every step is settled, run validation and move the execution to
    /// `draft_ready` (or `failed`). Returns whether finalization happened.
    async fn maybe_finalize(&self, execution: &mut Execution) -> Result<bool> {
        let steps = self.store.steps_for_execution(execution.id).await?;
        self.maybe_finalize_with(execution, &steps).await
    }

    async fn maybe_finalize_with(
        &self,
        execution: &mut Execution,
        steps: &[Step],
    ) -> Result<bool> {
        if execution.status != ExecutionState::Generating {
            return Ok(false);
        }
        if steps.is_empty() || !steps.iter().all(Step::is_settled) {
            return Ok(false);
        }

        // A finally-failed non-skippable step fails the execution; the
        // failure path normally handles this, recovery conflicts land here
        if let Some(failed) = steps
            .iter()
            .find(|step| step.status == StepState::Failed && !step.skippable)
        {
            let message = failed
                .error
                .clone()
                .unwrap_or_else(|| "step failed permanently".to_string());
            self.transition_execution(
                execution,
                ExecutionEvent::fail_with_error(format!(
                    "step '{}' failed permanently: {message}",
                    failed.step_type
                )),
                json!({"failed_step_id": failed.id}),
            )
            .await?;
            return Ok(true);
        }

        self.transition_execution(execution, ExecutionEvent::Validate, json!({}))
            .await?;

        // Post-conditions: every artifact recorded for this execution must
        // have reached `ready`
        let deliverables = self
            .store
            .deliverables_for_execution(execution.id)
            .await?;
        if let Some(broken) = deliverables
            .iter()
            .find(|deliverable| deliverable.status != crate::models::DeliverableStatus::Ready)
        {
            self.transition_execution(
                execution,
                ExecutionEvent::fail_with_error(format!(
                    "validation failed: deliverable {} is {}",
                    broken.id, broken.status
                )),
                json!({"deliverable_id": broken.id}),
            )
            .await?;
            return Ok(true);
        }

        self.transition_execution(
            execution,
            ExecutionEvent::MarkReady,
            json!({"progress": weighted_progress(steps)}),
        )
        .await?;
        info!(execution_id = %execution.id, "Draft ready for review");
        Ok(true)
    }

    // ---- shared helpers --------------------------------------------------

    fn declarations_for(&self, execution: &Execution) -> Result<Vec<StepDeclaration>> {
        match execution.template_id {
            Some(template_id) => Ok(self.templates.resolve(template_id)?.steps.clone()),
            None => {
                // Ad-hoc submission: a singleton step keyed by content type
                let estimated = self
                    .registry
                    .resolve(&execution.content_type)
                    .map(|producer| producer.metadata().estimated_duration_secs)
                    .unwrap_or(60);
                Ok(vec![StepDeclaration::new(
                    execution.content_type.clone(),
                    &[],
                    "content",
                )
                .with_max_retries(self.config.default_max_retries)
                .with_estimated_duration_secs(estimated)])
            }
        }
    }

    fn bag_for(&self, execution_id: Uuid) -> Arc<ContextBag> {
        self.bags
            .entry(execution_id)
            .or_insert_with(|| Arc::new(ContextBag::new(execution_id)))
            .clone()
    }

    /// Apply a step transition, persist it, and publish the matching event.
    async fn apply_step_event(&self, step: &mut Step, event: StepEvent) -> Result<()> {
        let target = StepStateMachine::determine_target_state(step.status, &event)?;
        step.status = target;
        match target {
            StepState::Running => {
                step.started_at = Some(Utc::now());
                step.error = None;
            }
            StepState::Completed => {
                step.progress = 100;
                step.finished_at = Some(Utc::now());
            }
            StepState::Failed | StepState::Skipped | StepState::Blocked => {
                step.finished_at = Some(Utc::now());
            }
            StepState::Pending => {
                step.started_at = None;
                step.finished_at = None;
            }
        }
        self.store.update_step(step).await?;

        let event_type = match target {
            StepState::Running => events::STEP_STARTED,
            StepState::Completed => events::STEP_COMPLETED,
            StepState::Failed => events::STEP_FAILED,
            StepState::Skipped => events::STEP_SKIPPED,
            StepState::Blocked => events::STEP_BLOCKED,
            StepState::Pending => {
                // Retry re-enqueue; the retry_scheduled event already told
                // subscribers about the failure
                return Ok(());
            }
        };
        self.publish_event(
            step.execution_id,
            event_type,
            json!({
                "step_id": step.id,
                "step_type": step.step_type,
                "retry_count": step.retry_count,
                "error": step.error,
            }),
        )
        .await
    }

    /// Apply an execution transition, persist it, and publish the matching
    /// event.
    async fn transition_execution(
        &self,
        execution: &mut Execution,
        event: ExecutionEvent,
        mut payload: Value,
    ) -> Result<()> {
        let target = ExecutionStateMachine::determine_target_state(execution.status, &event)?;

        if let Some(message) = event.error_message() {
            execution.error = Some(message.to_string());
        }
        match target {
            ExecutionState::Generating => {
                if execution.started_at.is_none() {
                    execution.started_at = Some(Utc::now());
                }
            }
            ExecutionState::Delivered | ExecutionState::Failed | ExecutionState::Cancelled => {
                execution.completed_at = Some(Utc::now());
            }
            _ => {}
        }
        execution.status = target;
        self.store.update_execution(execution).await?;

        let event_type = match &event {
            ExecutionEvent::Plan => events::EXECUTION_PLANNED,
            ExecutionEvent::Start => events::EXECUTION_GENERATING,
            ExecutionEvent::Validate => events::EXECUTION_VALIDATING,
            ExecutionEvent::MarkReady => events::EXECUTION_DRAFT_READY,
            ExecutionEvent::Approve => events::EXECUTION_APPROVED,
            ExecutionEvent::Deliver => events::EXECUTION_DELIVERED,
            ExecutionEvent::Reject(_) => events::EXECUTION_REJECTED,
            ExecutionEvent::Rework => events::EXECUTION_REWORK_STARTED,
            ExecutionEvent::Fail(_) => events::EXECUTION_FAILED,
            ExecutionEvent::Cancel => events::EXECUTION_CANCELLED,
        };
        if let Value::Object(map) = &mut payload {
            map.insert("status".to_string(), json!(target.to_string()));
            if let Some(error) = &execution.error {
                map.entry("error".to_string()).or_insert_with(|| json!(error));
            }
        }
        self.publish_event(execution.id, event_type, payload).await
    }

    /// Persist an event record, then broadcast it to live subscribers.
    async fn publish_event(
        &self,
        execution_id: Uuid,
        event_type: &str,
        payload: Value,
    ) -> Result<()> {
        let record = EventRecord::new(execution_id, event_type, payload);
        self.store.append_event(&record).await?;
        self.publisher.publish(record)?;
        Ok(())
    }
}
