//! Praxis: durable workflow execution for Rust
//!
//! `praxis` (πρᾶξις, Greek for "action, doing") is a workflow engine built
//! around a hierarchical/parallel state-machine model. A declarative
//! [`FlowDefinition`] describes states, transitions, guards, actions, retry,
//! validation and compensation; the [`FlowEngine`] runs long-lived flow
//! instances against it, advancing each in response to externally delivered
//! events and persisting every observable step through a pluggable
//! [`FlowStore`].
//!
//! # Features
//!
//! - **Durable instances**: every state advance, history record and
//!   compensation entry is written back to the store
//! - **Exactly-once effect under retries**: start and execute idempotency
//!   keys turn replays into no-ops
//! - **Saga compensation**: recorded undo actions unwind in reverse order
//!   when a flow fails
//! - **Parallel regions and compound states**: one flow can occupy several
//!   states at once, or nest sub-machines
//! - **Middleware**: each event execution runs through a user-supplied
//!   onion of before/after hooks
//! - **Sub-flows**: flows start and await child flows linked by
//!   back-reference
//!
//! # Quick Start
//!
//! ```
//! use praxis::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let definition = Arc::new(
//!     FlowDefinition::builder("order", 1)
//!         .initial_state("pending")
//!         .state(
//!             AtomicState::new("pending")
//!                 .with_transition(Transition::new("APPROVE", "approved")),
//!         )
//!         .state(AtomicState::final_state("approved"))
//!         .build()?,
//! );
//!
//! let store = Arc::new(InMemoryFlowStore::new());
//! let engine = FlowEngine::new(definition, store);
//!
//! let mut context = Context::new();
//! context.insert("order_id".into(), "12345".into());
//! let flow = engine.start(StartOptions::new().with_context(context)).await?;
//!
//! let result = engine
//!     .execute(&flow.flow_id, ExecuteOptions::new("APPROVE"))
//!     .await?;
//! assert!(result.success);
//! assert_eq!(result.state.status, FlowStatus::Completed);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! Each module hides a design decision likely to change on its own:
//!
//! - [`core`]: the data model: definitions, instances, retry, callables
//! - [`machine`]: single-step transition execution (resolution, hooks, retry)
//! - [`engine`]: lifecycle orchestration, middleware, compensation, sub-flows
//! - [`storage`]: the persistence contract and the in-memory reference store
//!
//! # Concurrency Model
//!
//! Different flow ids advance in parallel with no coordination; the store
//! must tolerate that. For a single flow id the engine assumes one writer at
//! a time; enforcement (a per-flow lock or queue) is the caller's job, and
//! the execute idempotency no-op is the designed mitigation for concurrent
//! retries of the same event.

pub mod core;
pub mod engine;
pub mod machine;
pub mod storage;

// Re-export the types most applications touch.
pub use crate::core::{
    guard, hook, try_guard, try_hook, validator, AtomicState, Backoff, CompoundState, Context,
    FlowDefinition, FlowInstance, FlowStatus, ParallelState, Region, RetryPolicy, StateRef,
    Transition, Validation, Verdict,
};
pub use crate::engine::{
    EngineConfig, ExecuteOptions, ExecuteResult, FlowEngine, Middleware, MiddlewareContext, Next,
    StartOptions,
};
pub use crate::machine::{StateMachine, TransitionError, TransitionOutcome};
pub use crate::storage::{FlowFilter, FlowStore, InMemoryFlowStore};

/// Prelude module for convenient glob imports.
///
/// ```
/// use praxis::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{
        guard, hook, try_guard, try_hook, validator, AtomicState, Backoff, CompoundState, Context,
        FlowDefinition, FlowStatus, ParallelState, Region, RetryPolicy, StateRef, Transition,
        Validation, Verdict,
    };
    pub use crate::engine::{
        ExecuteOptions, ExecuteResult, FlowEngine, Middleware, MiddlewareContext, Next,
        StartOptions,
    };
    pub use crate::storage::{FlowFilter, FlowStore, InMemoryFlowStore};
}
