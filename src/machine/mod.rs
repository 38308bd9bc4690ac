//! Single-step transition executor.
//!
//! Given `(state, event, context)`, the [`StateMachine`] resolves one
//! transition and executes its exit/action/validate/entry sequence, retrying
//! the whole sequence according to the transition's retry policy. It knows
//! nothing about persistence, parallel dispatch or compensation; those live
//! in the engine.

mod error;

pub use error::{HookPhase, TransitionError};

use crate::core::{Context, FlowDefinition, StateNode, Transition};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one `execute_transition` call.
#[derive(Clone, Debug)]
pub enum TransitionOutcome {
    Success(TransitionSuccess),
    Failure(TransitionFailure),
}

impl TransitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionOutcome::Success(_))
    }
}

/// A transition that ran to completion.
#[derive(Clone, Debug)]
pub struct TransitionSuccess {
    pub from: String,
    /// Resolved target state; compound targets resolve to their leaf.
    pub to: String,
    pub event: String,
    /// Number of attempts executed, first try included.
    pub attempts: u32,
}

/// A transition that failed. The state does not move: `to == from`.
#[derive(Clone, Debug)]
pub struct TransitionFailure {
    pub from: String,
    pub event: String,
    pub error: TransitionError,
    /// Number of attempts executed; zero when no candidate matched.
    pub attempts: u32,
}

/// The transition executor for one flow definition.
#[derive(Clone)]
pub struct StateMachine {
    definition: Arc<FlowDefinition>,
}

impl StateMachine {
    pub fn new(definition: Arc<FlowDefinition>) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &Arc<FlowDefinition> {
        &self.definition
    }

    /// True iff the state completes the flow: a final atomic state, or a
    /// compound state flagged final. Parallel states complete through their
    /// regions, never directly.
    pub fn is_final(&self, state: &str) -> bool {
        self.definition
            .state(state)
            .map(StateNode::is_final)
            .unwrap_or(false)
    }

    /// Event names of every transition leaving `state`, in declaration
    /// order: the state's own list first, then the global table.
    pub fn events_from(&self, state: &str) -> Vec<String> {
        let mut events = Vec::new();
        if let Some(node) = self.definition.state(state) {
            events.extend(node.transitions().iter().map(|t| t.event.clone()));
        }
        events.extend(
            self.definition
                .global_transitions_from(state)
                .iter()
                .map(|t| t.event.clone()),
        );
        events
    }

    /// Resolve and execute a single transition for `event` out of
    /// `current_state`, mutating `ctx` along the path taken.
    pub async fn execute_transition(
        &self,
        current_state: &str,
        event: &str,
        ctx: &mut Context,
    ) -> TransitionOutcome {
        let Some(transition) = self.resolve(current_state, event, ctx).await else {
            return TransitionOutcome::Failure(TransitionFailure {
                from: current_state.to_string(),
                event: event.to_string(),
                error: TransitionError::NoTransition {
                    state: current_state.to_string(),
                    event: event.to_string(),
                },
                attempts: 0,
            });
        };

        debug!(
            from = current_state,
            to = %transition.to,
            event,
            "transition selected"
        );

        let policy = transition.retry.unwrap_or_default();
        let mut attempt: u32 = 0;

        loop {
            match self.attempt_sequence(current_state, &transition, ctx).await {
                Ok(resolved_to) => {
                    return TransitionOutcome::Success(TransitionSuccess {
                        from: current_state.to_string(),
                        to: resolved_to,
                        event: event.to_string(),
                        attempts: attempt + 1,
                    });
                }
                Err(error) => {
                    if error.is_retryable() {
                        if let Some(delay) = policy.delay_for_attempt(attempt) {
                            debug!(
                                from = current_state,
                                event,
                                attempt = attempt + 1,
                                ?delay,
                                %error,
                                "transition attempt failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                            continue;
                        }
                    }

                    warn!(
                        from = current_state,
                        event,
                        attempts = attempt + 1,
                        %error,
                        "transition failed"
                    );

                    // Definition-level error hook; its own failures are
                    // swallowed.
                    if let Some(on_error) = self.definition.on_error() {
                        if let Err(hook_error) = on_error(ctx).await {
                            warn!(%hook_error, "on_error hook failed; ignoring");
                        }
                    }

                    return TransitionOutcome::Failure(TransitionFailure {
                        from: current_state.to_string(),
                        event: event.to_string(),
                        error,
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }

    /// Run the entry side of occupying `state` without a transition: used
    /// when a flow starts. Compound states resolve through their initial
    /// sub-state, running each traversed compound's entry hook; returns the
    /// resolved leaf name.
    pub async fn enter_initial(
        &self,
        state: &str,
        ctx: &mut Context,
    ) -> Result<String, TransitionError> {
        let (leaf, node) = self.resolve_compound_chain(state, ctx).await?;
        self.run_hook(node.on_entry(), HookPhase::Entry, &leaf, ctx)
            .await?;
        Ok(leaf)
    }

    /// First candidate matching the event whose guard is absent or truthy.
    /// Candidates come from the state's own list, then the global table. A
    /// guard that fails to evaluate skips its candidate.
    async fn resolve(&self, current_state: &str, event: &str, ctx: &Context) -> Option<Transition> {
        let own = self
            .definition
            .state(current_state)
            .map(StateNode::transitions)
            .unwrap_or(&[]);
        let global = self.definition.global_transitions_from(current_state);

        for transition in own.iter().chain(global) {
            if transition.event != event {
                continue;
            }
            match &transition.guard {
                None => return Some(transition.clone()),
                Some(guard) => match guard(ctx).await {
                    Ok(true) => return Some(transition.clone()),
                    Ok(false) => continue,
                    Err(error) => {
                        debug!(
                            from = current_state,
                            event,
                            error = %error,
                            "guard evaluation failed, skipping candidate"
                        );
                        continue;
                    }
                },
            }
        }

        None
    }

    /// One attempt of the retried unit: exit, action, validate, entry.
    async fn attempt_sequence(
        &self,
        source: &str,
        transition: &Transition,
        ctx: &mut Context,
    ) -> Result<String, TransitionError> {
        if let Some(node) = self.definition.state(source) {
            self.run_hook(node.on_exit(), HookPhase::Exit, source, ctx)
                .await?;
        }

        if let Some(action) = &transition.action {
            if let Err(message) = action(ctx).await {
                return Err(TransitionError::Hook {
                    phase: HookPhase::Action,
                    state: source.to_string(),
                    message,
                });
            }
        }

        let (leaf, node) = self.resolve_compound_chain(&transition.to, ctx).await?;

        if let Some(validation) = node.validation() {
            match (validation.predicate)(ctx).await {
                crate::core::Verdict::Pass => {}
                crate::core::Verdict::Fail => {
                    let message = validation
                        .error_message
                        .clone()
                        .unwrap_or_else(|| format!("validation failed for state '{leaf}'"));
                    return Err(TransitionError::ValidationFailed {
                        state: leaf.clone(),
                        message,
                    });
                }
                crate::core::Verdict::Reject(message) => {
                    return Err(TransitionError::ValidationFailed {
                        state: leaf.clone(),
                        message,
                    });
                }
            }
        }

        self.run_hook(node.on_entry(), HookPhase::Entry, &leaf, ctx)
            .await?;

        Ok(leaf)
    }

    /// Walk `initial_sub_state` chains, running each traversed compound's
    /// entry hook, until a non-compound leaf is reached.
    async fn resolve_compound_chain(
        &self,
        target: &str,
        ctx: &mut Context,
    ) -> Result<(String, StateNode), TransitionError> {
        let mut name = target.to_string();
        loop {
            let node = self
                .definition
                .state(&name)
                .expect("definition validated at construction")
                .clone();

            match node {
                StateNode::Compound(compound) => {
                    self.run_hook(
                        compound.on_entry.as_ref(),
                        HookPhase::Entry,
                        &compound.name,
                        ctx,
                    )
                    .await?;
                    name = compound.initial_sub_state.clone();
                }
                other => return Ok((name, other)),
            }
        }
    }

    async fn run_hook(
        &self,
        hook: Option<&crate::core::Hook>,
        phase: HookPhase,
        state: &str,
        ctx: &mut Context,
    ) -> Result<(), TransitionError> {
        if let Some(hook) = hook {
            hook(ctx).await.map_err(|message| TransitionError::Hook {
                phase,
                state: state.to_string(),
                message,
            })?;
        }
        Ok(())
    }
}
