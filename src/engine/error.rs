use crate::core::FlowStatus;
use crate::machine::TransitionError;
use crate::storage::StorageError;
use thiserror::Error;

/// Engine layer error type.
///
/// Operational errors (not-found, duplicate, wrong status, timeout) are
/// raised to the caller and never mutate flow state. Execution errors reach
/// the caller only wrapped in an [`ExecuteResult`](super::ExecuteResult)
/// after the compensation path has run; the `Transition` variant exists so
/// the middleware chain can carry them out of the core step.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The flow id is not in the store.
    #[error("flow not found: {0}")]
    FlowNotFound(String),

    /// A flow with this id already exists on `start`.
    #[error("flow already exists: {0}")]
    DuplicateFlow(String),

    /// The operation requires a different lifecycle status.
    #[error("flow '{flow_id}' is {status}, operation requires {required}")]
    NotActive {
        flow_id: String,
        status: FlowStatus,
        required: &'static str,
    },

    /// Waiting for a sub-flow exceeded its budget.
    #[error("timed out after {timeout_ms}ms waiting for sub-flow '{sub_flow_id}'")]
    SubFlowTimeout {
        sub_flow_id: String,
        timeout_ms: u64,
    },

    /// A flow asked to wait on itself.
    #[error("flow '{0}' cannot wait on itself")]
    SelfWait(String),

    /// An execution error travelling through the middleware chain.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, Error>;
