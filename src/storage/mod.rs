//! Persistence contract for flow instances and idempotency bindings.
//!
//! The engine consumes only the [`FlowStore`] trait; backends decide how
//! instances are laid out at rest. [`InMemoryFlowStore`] is the reference
//! implementation used in tests and single-process deployments.

mod error;
mod memory;

pub use error::{Result, StorageError};
pub use memory::InMemoryFlowStore;

use crate::core::{Context, FlowInstance, FlowStatus, StateRef};
use async_trait::async_trait;

/// Current-state criterion of a [`FlowFilter`].
///
/// Matching is set-membership over the flow's occupied states: a single
/// requested state matches if the flow's current state (or any active
/// region) contains it; a list matches if every requested state is present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateFilter {
    One(String),
    All(Vec<String>),
}

impl StateFilter {
    fn matches(&self, current: &StateRef) -> bool {
        match self {
            StateFilter::One(state) => current.contains(state),
            StateFilter::All(states) => states.iter().all(|s| current.contains(s)),
        }
    }
}

/// Conjunction of optional criteria for [`FlowStore::list`].
#[derive(Clone, Debug, Default)]
pub struct FlowFilter {
    pub status: Option<FlowStatus>,
    pub definition_id: Option<String>,
    pub version: Option<u32>,
    pub parent_flow_id: Option<String>,
    pub current_state: Option<StateFilter>,
}

impl FlowFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: FlowStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_definition_id(mut self, definition_id: impl Into<String>) -> Self {
        self.definition_id = Some(definition_id.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_parent_flow_id(mut self, parent_flow_id: impl Into<String>) -> Self {
        self.parent_flow_id = Some(parent_flow_id.into());
        self
    }

    pub fn with_current_state(mut self, state: impl Into<String>) -> Self {
        self.current_state = Some(StateFilter::One(state.into()));
        self
    }

    pub fn with_current_states(mut self, states: Vec<String>) -> Self {
        self.current_state = Some(StateFilter::All(states));
        self
    }

    /// Whether the instance satisfies every present criterion.
    ///
    /// Shared by backends so filter semantics cannot drift between them.
    pub fn matches(&self, instance: &FlowInstance) -> bool {
        if let Some(status) = self.status {
            if instance.status != status {
                return false;
            }
        }
        if let Some(definition_id) = &self.definition_id {
            if &instance.definition_id != definition_id {
                return false;
            }
        }
        if let Some(version) = self.version {
            if instance.version != version {
                return false;
            }
        }
        if let Some(parent) = &self.parent_flow_id {
            if instance.parent_flow_id.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(state) = &self.current_state {
            if !state.matches(&instance.current_state) {
                return false;
            }
        }
        true
    }
}

/// Trait for flow persistence backends.
///
/// All reads return snapshots independent of the stored representation and
/// all writes atomically replace the prior value for that `flow_id`.
/// Implementations must be thread-safe; the engine may operate on different
/// flow ids concurrently.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Create or overwrite the instance keyed by its `flow_id`.
    async fn save(&self, instance: &FlowInstance) -> Result<()>;

    /// Snapshot of the instance, or `None` when absent.
    async fn get(&self, flow_id: &str) -> Result<Option<FlowInstance>>;

    /// Remove the instance. No-op when absent.
    async fn delete(&self, flow_id: &str) -> Result<()>;

    async fn exists(&self, flow_id: &str) -> Result<bool>;

    /// Snapshots of every instance matching the filter conjunction.
    async fn list(&self, filter: &FlowFilter) -> Result<Vec<FlowInstance>>;

    /// Whether the idempotency key is already bound.
    async fn has_idempotency_key(&self, key: &str) -> Result<bool>;

    /// Bind a key to a flow id. Keys are write-once from the engine's
    /// viewpoint; rebinding is not defined.
    async fn save_idempotency_key(&self, key: &str, flow_id: &str) -> Result<()>;

    /// The flow id a key is bound to, if any.
    async fn flow_id_for_key(&self, key: &str) -> Result<Option<String>>;

    /// All flows whose context contains every given key/value pair exactly.
    ///
    /// Optional; backends without an efficient context index may leave the
    /// default `Unsupported` error in place.
    async fn query_by_context(&self, query: &Context) -> Result<Vec<FlowInstance>> {
        let _ = query;
        Err(StorageError::Unsupported("query_by_context".to_string()))
    }
}

// Allow type-erased stores to be passed where a concrete one is expected.
#[async_trait]
impl FlowStore for Box<dyn FlowStore> {
    async fn save(&self, instance: &FlowInstance) -> Result<()> {
        (**self).save(instance).await
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowInstance>> {
        (**self).get(flow_id).await
    }

    async fn delete(&self, flow_id: &str) -> Result<()> {
        (**self).delete(flow_id).await
    }

    async fn exists(&self, flow_id: &str) -> Result<bool> {
        (**self).exists(flow_id).await
    }

    async fn list(&self, filter: &FlowFilter) -> Result<Vec<FlowInstance>> {
        (**self).list(filter).await
    }

    async fn has_idempotency_key(&self, key: &str) -> Result<bool> {
        (**self).has_idempotency_key(key).await
    }

    async fn save_idempotency_key(&self, key: &str, flow_id: &str) -> Result<()> {
        (**self).save_idempotency_key(key, flow_id).await
    }

    async fn flow_id_for_key(&self, key: &str) -> Result<Option<String>> {
        (**self).flow_id_for_key(key).await
    }

    async fn query_by_context(&self, query: &Context) -> Result<Vec<FlowInstance>> {
        (**self).query_by_context(query).await
    }
}
