//! Call options and results for the engine's public operations.

use crate::core::{Context, FlowInstance, HistoryRecord};
use crate::machine::TransitionError;

/// Options for [`FlowEngine::start`](super::FlowEngine::start).
#[derive(Clone, Debug, Default)]
pub struct StartOptions {
    /// Caller-supplied flow id; generated when absent.
    pub flow_id: Option<String>,
    /// Initial context; empty when absent.
    pub context: Option<Context>,
    /// Start-key: binds this key to the created flow, making replays return
    /// the same instance.
    pub idempotency_key: Option<String>,
}

impl StartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow_id(mut self, flow_id: impl Into<String>) -> Self {
        self.flow_id = Some(flow_id.into());
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Options for [`FlowEngine::execute`](super::FlowEngine::execute).
#[derive(Clone, Debug)]
pub struct ExecuteOptions {
    /// Event to deliver.
    pub event: String,
    /// Data shallow-merged into the flow context before execution.
    pub data: Option<Context>,
    /// Execute-key: a bound key turns this call into a success no-op.
    pub idempotency_key: Option<String>,
    /// Zero-based region index for targeted parallel dispatch. Absent means
    /// broadcast to every region.
    pub target_region: Option<usize>,
}

impl ExecuteOptions {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: None,
            idempotency_key: None,
            target_region: None,
        }
    }

    pub fn with_data(mut self, data: Context) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_target_region(mut self, index: usize) -> Self {
        self.target_region = Some(index);
        self
    }
}

/// Result of one `execute` call.
///
/// `execute` always returns a result object for execution failures; the
/// caller distinguishes compensation only by inspecting `compensated`.
#[derive(Clone, Debug)]
pub struct ExecuteResult {
    pub success: bool,
    /// Snapshot of the instance after the operation.
    pub state: FlowInstance,
    /// The transition taken; a replayed idempotency key yields a no-op
    /// record with `from == to`.
    pub transition: Option<HistoryRecord>,
    /// The execution error, when `success` is false.
    pub error: Option<TransitionError>,
    /// True iff compensation actions existed and ran.
    pub compensated: bool,
    /// Attempts executed by the state machine, first try included. Zero for
    /// no-op replays and for failures that never reached a transition.
    pub attempts: u32,
}
