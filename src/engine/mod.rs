//! Flow lifecycle and orchestration.
//!
//! [`FlowEngine`] drives flow instances through their lifecycle: start,
//! execute, pause, resume, cancel, delete and query. It owns the wiring
//! between the state machine, the middleware chain, the compensation stack,
//! sub-flow composition and the store. The engine itself is stateless; every
//! operation loads the instance, advances it, and writes it back.
//!
//! Concurrency: different flow ids may be driven in parallel without
//! coordination. For any single flow id the engine assumes one operation at
//! a time; enforcing that is the caller's job. The execute idempotency
//! no-op is the intended mitigation for concurrent retries of the same
//! event.

mod compensation;
mod error;
mod middleware;
mod options;
mod subflow;

pub use error::{Error, Result};
pub use middleware::{Middleware, MiddlewareContext, Next};
pub use options::{ExecuteOptions, ExecuteResult, StartOptions};

use crate::core::{
    FlowDefinition, FlowInstance, FlowStatus, HistoryRecord, StateNode, StateRef,
};
use crate::machine::{StateMachine, TransitionError, TransitionOutcome};
use crate::storage::FlowStore;
use async_trait::async_trait;
use chrono::Utc;
use middleware::TerminalStep;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Error message used when a flow is cancelled administratively.
const CANCELLED_BY_USER: &str = "Flow cancelled by user";

/// Engine tuning knobs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Cadence at which `wait_for_sub_flow` polls the store.
    pub subflow_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            subflow_poll_interval: Duration::from_millis(100),
        }
    }
}

/// Orchestrates flow instances of one definition over a store.
///
/// The engine is generic over the storage type `S`, allowing
/// monomorphization over concrete backends instead of vtable dispatch.
pub struct FlowEngine<S: FlowStore> {
    definition: Arc<FlowDefinition>,
    machine: StateMachine,
    store: Arc<S>,
    middleware: Vec<Arc<dyn Middleware>>,
    config: EngineConfig,
}

impl<S: FlowStore> FlowEngine<S> {
    pub fn new(definition: Arc<FlowDefinition>, store: Arc<S>) -> Self {
        Self::with_config(definition, store, EngineConfig::default())
    }

    pub fn with_config(
        definition: Arc<FlowDefinition>,
        store: Arc<S>,
        config: EngineConfig,
    ) -> Self {
        let machine = StateMachine::new(Arc::clone(&definition));
        Self {
            definition,
            machine,
            store,
            middleware: Vec::new(),
            config,
        }
    }

    pub fn definition(&self) -> &Arc<FlowDefinition> {
        &self.definition
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Append a middleware to the chain. The first registered middleware is
    /// outermost. Returns `self` for chaining.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Drop every registered middleware.
    pub fn clear_middleware(&mut self) -> &mut Self {
        self.middleware.clear();
        self
    }

    /// Create a new flow instance, or return the one already bound to the
    /// start idempotency key.
    pub async fn start(&self, options: StartOptions) -> Result<FlowInstance> {
        self.start_with_parent(options, None).await
    }

    pub(crate) async fn start_with_parent(
        &self,
        options: StartOptions,
        parent_flow_id: Option<String>,
    ) -> Result<FlowInstance> {
        if let Some(key) = &options.idempotency_key {
            if let Some(existing) = self.store.flow_id_for_key(key).await? {
                debug!(key = %key, flow_id = %existing, "start key already bound, returning existing flow");
                return self
                    .store
                    .get(&existing)
                    .await?
                    .ok_or(Error::FlowNotFound(existing));
            }
        }

        let flow_id = options
            .flow_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.store.exists(&flow_id).await? {
            return Err(Error::DuplicateFlow(flow_id));
        }
        if let Some(key) = &options.idempotency_key {
            self.store.save_idempotency_key(key, &flow_id).await?;
        }

        let mut context = options.context.unwrap_or_default();
        let initial = self.definition.initial_state();
        let initial_node = self
            .definition
            .state(initial)
            .expect("definition validated at construction");

        // Run the entry hooks of the initial state: for a parallel initial,
        // each region's initial state in declaration order. An entry failure
        // fails the flow but the instance is still persisted.
        let mut entry_error: Option<TransitionError> = None;
        let current_state = match initial_node {
            StateNode::Parallel(parallel) => {
                let mut names = Vec::with_capacity(parallel.regions.len());
                for region in &parallel.regions {
                    match self
                        .machine
                        .enter_initial(&region.initial_state, &mut context)
                        .await
                    {
                        Ok(leaf) => names.push(leaf),
                        Err(error) => {
                            if entry_error.is_none() {
                                entry_error = Some(error);
                            }
                            names.push(region.initial_state.clone());
                        }
                    }
                }
                StateRef::Parallel(names)
            }
            _ => match self.machine.enter_initial(initial, &mut context).await {
                Ok(leaf) => StateRef::Single(leaf),
                Err(error) => {
                    entry_error = Some(error);
                    StateRef::Single(initial.to_string())
                }
            },
        };

        let mut instance = FlowInstance::new(
            flow_id,
            self.definition.id(),
            self.definition.version(),
            current_state,
            context,
        );
        instance.parent_flow_id = parent_flow_id;

        if let Some(error) = entry_error {
            warn!(flow_id = %instance.flow_id, %error, "initial entry failed");
            instance.fail(error.to_string());
        } else if self.is_final_ref(&instance.current_state) {
            instance.status = FlowStatus::Completed;
        }

        info!(
            flow_id = %instance.flow_id,
            definition = %instance.definition_id,
            state = %instance.current_state,
            status = %instance.status,
            "flow started"
        );
        self.store.save(&instance).await?;
        Ok(instance)
    }

    /// Drive the flow one event forward through the middleware chain and
    /// the state machine.
    ///
    /// Execution failures are not raised: they produce a result with
    /// `success == false` after the compensation procedure has run.
    /// Operational errors (unknown flow, wrong status, storage) are raised.
    pub async fn execute(&self, flow_id: &str, options: ExecuteOptions) -> Result<ExecuteResult> {
        let Some(mut instance) = self.store.get(flow_id).await? else {
            return Err(Error::FlowNotFound(flow_id.to_string()));
        };

        // Idempotency guard: a bound execute-key makes this call a no-op
        // success carrying the current state.
        if let Some(key) = &options.idempotency_key {
            if self.store.has_idempotency_key(key).await? {
                debug!(flow_id, key = %key, "execute key already bound, returning no-op");
                let record = HistoryRecord {
                    from: instance.current_state.clone(),
                    to: instance.current_state.clone(),
                    event: options.event.clone(),
                    timestamp: Utc::now(),
                };
                return Ok(ExecuteResult {
                    success: true,
                    state: instance,
                    transition: Some(record),
                    error: None,
                    compensated: false,
                    attempts: 0,
                });
            }
            self.store.save_idempotency_key(key, flow_id).await?;
        }

        if let Some(data) = &options.data {
            instance
                .context
                .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut mctx = MiddlewareContext {
            flow_id: flow_id.to_string(),
            event: options.event.clone(),
            flow_state: instance,
            options: options.clone(),
            start_time: Instant::now(),
        };

        // The chain is rebuilt per execute; middleware registered after this
        // call starts does not apply to it.
        let chain = self.middleware.clone();
        let terminal = CoreStep { engine: self };
        let outcome = Next::new(&chain, &terminal).run(&mut mctx).await;

        match outcome {
            Ok(result) => Ok(result),
            Err(Error::Transition(error)) => {
                warn!(flow_id, %error, "execution failed, unwinding compensations");
                let (state, compensated) =
                    self.run_compensation(flow_id, &error.to_string()).await?;
                Ok(ExecuteResult {
                    success: false,
                    state,
                    transition: None,
                    error: Some(error),
                    compensated,
                    attempts: 0,
                })
            }
            Err(other) => Err(other),
        }
    }

    /// The terminus of the middleware chain: load the latest persisted
    /// state, dispatch the transition, persist on success.
    async fn execute_core(&self, mctx: &mut MiddlewareContext) -> Result<ExecuteResult> {
        let Some(mut instance) = self.store.get(&mctx.flow_id).await? else {
            return Err(Error::FlowNotFound(mctx.flow_id.clone()));
        };
        // The status check runs here rather than before the chain so that a
        // middleware pausing or cancelling the flow is observed.
        if instance.status != FlowStatus::Active {
            return Err(Error::NotActive {
                flow_id: instance.flow_id.clone(),
                status: instance.status,
                required: "active",
            });
        }

        // The middleware-visible context is authoritative: it carries the
        // merged event data and any mutations middleware made before `next`.
        instance.context = mctx.flow_state.context.clone();

        let event = mctx.event.clone();
        let old_state = instance.current_state.clone();

        let (new_state, attempts) = match &old_state {
            StateRef::Single(state) => {
                match self
                    .machine
                    .execute_transition(state, &event, &mut instance.context)
                    .await
                {
                    TransitionOutcome::Success(success) => {
                        (self.expand_target(&success.to), success.attempts)
                    }
                    TransitionOutcome::Failure(failure) => {
                        return Err(self.persist_failed_context(instance, failure.error).await);
                    }
                }
            }
            StateRef::Parallel(regions) => {
                let dispatched = self
                    .dispatch_parallel(regions, &event, mctx.options.target_region, &mut instance)
                    .await;
                match dispatched {
                    Ok(result) => result,
                    Err(error) => return Err(error),
                }
            }
        };

        let record = HistoryRecord {
            from: old_state,
            to: new_state.clone(),
            event: event.clone(),
            timestamp: Utc::now(),
        };
        instance.history.push(record.clone());
        instance.current_state = new_state;

        if self.is_final_ref(&instance.current_state) {
            instance.status = FlowStatus::Completed;
            info!(flow_id = %instance.flow_id, state = %instance.current_state, "flow completed");
        }

        instance.touch();
        self.store.save(&instance).await?;
        debug!(
            flow_id = %instance.flow_id,
            from = %record.from,
            to = %record.to,
            event = %record.event,
            "transition recorded"
        );

        Ok(ExecuteResult {
            success: true,
            state: instance,
            transition: Some(record),
            error: None,
            compensated: false,
            attempts,
        })
    }

    /// Parallel dispatch: targeted when a region index is given, broadcast
    /// otherwise. Broadcast treats failing regions as "did not accept" and
    /// succeeds when at least one region moved.
    async fn dispatch_parallel(
        &self,
        regions: &[String],
        event: &str,
        target_region: Option<usize>,
        instance: &mut FlowInstance,
    ) -> std::result::Result<(StateRef, u32), Error> {
        let mut new_regions = regions.to_vec();

        if let Some(index) = target_region {
            if index >= regions.len() {
                return Err(Error::Transition(TransitionError::InvalidRegion {
                    index,
                    regions: regions.len(),
                }));
            }
            return match self
                .machine
                .execute_transition(&regions[index], event, &mut instance.context)
                .await
            {
                TransitionOutcome::Success(success) => {
                    if self.is_parallel_state(&success.to) {
                        let error = TransitionError::NestedParallel { state: success.to };
                        return Err(self
                            .persist_failed_context(instance.clone(), error)
                            .await);
                    }
                    new_regions[index] = success.to;
                    Ok((StateRef::Parallel(new_regions), success.attempts))
                }
                TransitionOutcome::Failure(failure) => Err(self
                    .persist_failed_context(instance.clone(), failure.error)
                    .await),
            };
        }

        let mut accepted = false;
        let mut attempts = 0;
        for (index, region_state) in regions.iter().enumerate() {
            match self
                .machine
                .execute_transition(region_state, event, &mut instance.context)
                .await
            {
                TransitionOutcome::Success(success) => {
                    if self.is_parallel_state(&success.to) {
                        let error = TransitionError::NestedParallel { state: success.to };
                        return Err(self
                            .persist_failed_context(instance.clone(), error)
                            .await);
                    }
                    new_regions[index] = success.to;
                    accepted = true;
                    attempts = attempts.max(success.attempts);
                }
                TransitionOutcome::Failure(failure) => {
                    debug!(
                        region = index,
                        state = %region_state,
                        event,
                        error = %failure.error,
                        "region did not accept event"
                    );
                }
            }
        }

        if !accepted {
            let error = TransitionError::NoRegionAccepted {
                event: event.to_string(),
            };
            return Err(self.persist_failed_context(instance.clone(), error).await);
        }

        Ok((StateRef::Parallel(new_regions), attempts))
    }

    /// Persist context mutations made by a failed transition attempt so the
    /// compensation path sees the latest context, then wrap the error.
    async fn persist_failed_context(
        &self,
        mut instance: FlowInstance,
        error: TransitionError,
    ) -> Error {
        instance.touch();
        if let Err(storage_error) = self.store.save(&instance).await {
            return Error::Storage(storage_error);
        }
        Error::Transition(error)
    }

    /// Move an active flow to `paused`.
    pub async fn pause(&self, flow_id: &str) -> Result<FlowInstance> {
        let mut instance = self.get_flow(flow_id).await?;
        if instance.status != FlowStatus::Active {
            return Err(Error::NotActive {
                flow_id: flow_id.to_string(),
                status: instance.status,
                required: "active",
            });
        }
        instance.status = FlowStatus::Paused;
        instance.touch();
        self.store.save(&instance).await?;
        info!(flow_id, "flow paused");
        Ok(instance)
    }

    /// Move a paused flow back to `active`.
    pub async fn resume(&self, flow_id: &str) -> Result<FlowInstance> {
        let mut instance = self.get_flow(flow_id).await?;
        if instance.status != FlowStatus::Paused {
            return Err(Error::NotActive {
                flow_id: flow_id.to_string(),
                status: instance.status,
                required: "paused",
            });
        }
        instance.status = FlowStatus::Active;
        instance.touch();
        self.store.save(&instance).await?;
        info!(flow_id, "flow resumed");
        Ok(instance)
    }

    /// Force a non-completed flow to `failed`, optionally unwinding its
    /// compensation stack first.
    pub async fn cancel(&self, flow_id: &str, trigger_compensation: bool) -> Result<FlowInstance> {
        let instance = self.get_flow(flow_id).await?;
        if instance.status == FlowStatus::Completed {
            return Err(Error::NotActive {
                flow_id: flow_id.to_string(),
                status: instance.status,
                required: "a non-completed status",
            });
        }

        info!(flow_id, trigger_compensation, "flow cancelled");
        if trigger_compensation {
            let (state, _) = self.run_compensation(flow_id, CANCELLED_BY_USER).await?;
            Ok(state)
        } else {
            let mut instance = instance;
            instance.fail(CANCELLED_BY_USER);
            self.store.save(&instance).await?;
            Ok(instance)
        }
    }

    /// Read-only snapshot of a flow.
    pub async fn get_flow(&self, flow_id: &str) -> Result<FlowInstance> {
        self.store
            .get(flow_id)
            .await?
            .ok_or_else(|| Error::FlowNotFound(flow_id.to_string()))
    }

    /// Snapshots of every flow matching the filter.
    pub async fn list_flows(&self, filter: &crate::storage::FlowFilter) -> Result<Vec<FlowInstance>> {
        Ok(self.store.list(filter).await?)
    }

    /// Deduplicated union of the event names available from the current
    /// state, or from every active region for parallel flows.
    pub async fn get_possible_transitions(&self, flow_id: &str) -> Result<Vec<String>> {
        let instance = self.get_flow(flow_id).await?;
        let mut events: Vec<String> = Vec::new();
        for name in instance.current_state.names() {
            for event in self.machine.events_from(name) {
                if !events.contains(&event) {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }

    /// Delete the flow and, best-effort, every sub-flow it references.
    pub async fn delete(&self, flow_id: &str) -> Result<()> {
        self.delete_recursive(flow_id).await
    }

    fn delete_recursive<'a>(
        &'a self,
        flow_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let Some(instance) = self.store.get(flow_id).await? else {
                return Err(Error::FlowNotFound(flow_id.to_string()));
            };
            for sub in &instance.sub_flows {
                if let Err(error) = self.delete_recursive(&sub.sub_flow_id).await {
                    debug!(
                        flow_id,
                        sub_flow_id = %sub.sub_flow_id,
                        %error,
                        "failed deleting sub-flow, continuing"
                    );
                }
            }
            self.store.delete(flow_id).await?;
            info!(flow_id, "flow deleted");
            Ok(())
        })
    }

    fn is_final_ref(&self, state: &StateRef) -> bool {
        state.names().all(|name| self.machine.is_final(name))
    }

    fn is_parallel_state(&self, name: &str) -> bool {
        matches!(self.definition.state(name), Some(StateNode::Parallel(_)))
    }

    /// A transition landing on a parallel state expands to its regions'
    /// initial states, in region declaration order.
    fn expand_target(&self, to: &str) -> StateRef {
        match self.definition.state(to) {
            Some(StateNode::Parallel(parallel)) => StateRef::Parallel(
                parallel
                    .regions
                    .iter()
                    .map(|region| region.initial_state.clone())
                    .collect(),
            ),
            _ => StateRef::Single(to.to_string()),
        }
    }
}

/// Adapter placing the core execute step at the tail of the chain.
struct CoreStep<'e, S: FlowStore> {
    engine: &'e FlowEngine<S>,
}

#[async_trait]
impl<S: FlowStore> TerminalStep for CoreStep<'_, S> {
    async fn call(&self, ctx: &mut MiddlewareContext) -> Result<ExecuteResult> {
        self.engine.execute_core(ctx).await
    }
}
