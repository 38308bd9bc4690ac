//! Core data model for the praxis workflow engine.
//!
//! This module holds the types shared by every layer:
//!
//! # Configuration
//! - [`FlowDefinition`]: immutable, validated flow configuration
//! - [`StateNode`]: closed sum over atomic, parallel and compound states
//! - [`Transition`], [`Validation`], [`Region`]: the edges and annotations
//! - [`RetryPolicy`]: per-transition retry schedule
//!
//! # Runtime state
//! - [`FlowInstance`]: one live execution with context, history,
//!   compensations and sub-flow references
//! - [`StateRef`]: single-or-parallel current state
//! - [`FlowStatus`]: lifecycle status
//!
//! # Callables
//! - [`Hook`], [`Guard`], [`Validator`]: opaque callables over the flow
//!   [`Context`], wrapped from plain closures via [`hook`], [`guard`],
//!   [`validator`] and friends

mod context;
mod definition;
mod error;
mod instance;
mod retry;

pub use context::{
    guard, hook, noop_hook, try_guard, try_hook, validator, Context, Guard, GuardFuture, Hook,
    HookFuture, Validator, ValidatorFuture, Verdict,
};
pub use definition::{
    AtomicState, CompoundState, FlowDefinition, FlowDefinitionBuilder, ParallelState, Region,
    StateNode, Transition, Validation,
};
pub use error::{DefinitionError, Result};
pub use instance::{
    CompensationEntry, FlowError, FlowInstance, FlowStatus, HistoryRecord, StateRef, SubFlowRef,
};
pub use retry::{Backoff, RetryPolicy};
