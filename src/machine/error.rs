use std::fmt;
use thiserror::Error;

/// Phase of the exit/action/validate/entry sequence a hook failure
/// originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookPhase {
    Exit,
    Action,
    Entry,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            HookPhase::Exit => "exit",
            HookPhase::Action => "action",
            HookPhase::Entry => "entry",
        };
        f.write_str(phase)
    }
}

/// Execution errors: failures produced while advancing a flow.
///
/// Unlike operational errors, these are never raised to the caller. They are
/// captured in the transition result, drive the compensation path and end up
/// persisted in the instance's `error` field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransitionError {
    /// No candidate transition fires for the event from the current state.
    #[error("no transition for event '{event}' from state '{state}'")]
    NoTransition { state: String, event: String },

    /// A broadcast parallel event was accepted by zero regions.
    #[error("no region accepted event '{event}'")]
    NoRegionAccepted { event: String },

    /// A targeted region index is out of range.
    #[error("target region {index} out of range for {regions} region(s)")]
    InvalidRegion { index: usize, regions: usize },

    /// A region transition targets a parallel state.
    #[error("region transition targets nested parallel state '{state}'")]
    NestedParallel { state: String },

    /// The target state's validation predicate returned non-true.
    #[error("validation failed entering '{state}': {message}")]
    ValidationFailed { state: String, message: String },

    /// An exit hook, transition action or entry hook failed.
    #[error("{phase} hook failed at '{state}': {message}")]
    Hook {
        phase: HookPhase,
        state: String,
        message: String,
    },
}

impl TransitionError {
    /// Whether retrying the transition can change the outcome.
    ///
    /// Only hook and validation failures are retried; structural errors
    /// (no transition, region problems) are permanent for a given event.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransitionError::ValidationFailed { .. } | TransitionError::Hook { .. }
        )
    }
}
