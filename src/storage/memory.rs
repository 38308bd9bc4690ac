use super::{FlowFilter, FlowStore, Result};
use crate::core::{Context, FlowInstance};
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory flow store backed by DashMap for concurrent access.
///
/// Two maps: `flow_id -> instance` and `idempotency key -> flow_id`.
/// Reads return clones and writes store clones, so mutating a returned
/// snapshot can never corrupt stored state. Compensation actions inside a
/// snapshot share the stored `Arc` callables, which is safe because
/// callables are immutable.
///
/// This backend does not serialize callables; flows do not survive a
/// process restart.
#[derive(Default)]
pub struct InMemoryFlowStore {
    flows: DashMap<String, FlowInstance>,
    idempotency_keys: DashMap<String, String>,
}

impl InMemoryFlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored flows. Test and diagnostics helper.
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[async_trait]
impl FlowStore for InMemoryFlowStore {
    async fn save(&self, instance: &FlowInstance) -> Result<()> {
        self.flows
            .insert(instance.flow_id.clone(), instance.clone());
        Ok(())
    }

    async fn get(&self, flow_id: &str) -> Result<Option<FlowInstance>> {
        Ok(self.flows.get(flow_id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, flow_id: &str) -> Result<()> {
        self.flows.remove(flow_id);
        Ok(())
    }

    async fn exists(&self, flow_id: &str) -> Result<bool> {
        Ok(self.flows.contains_key(flow_id))
    }

    async fn list(&self, filter: &FlowFilter) -> Result<Vec<FlowInstance>> {
        let mut matching: Vec<FlowInstance> = self
            .flows
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn has_idempotency_key(&self, key: &str) -> Result<bool> {
        Ok(self.idempotency_keys.contains_key(key))
    }

    async fn save_idempotency_key(&self, key: &str, flow_id: &str) -> Result<()> {
        self.idempotency_keys
            .insert(key.to_string(), flow_id.to_string());
        Ok(())
    }

    async fn flow_id_for_key(&self, key: &str) -> Result<Option<String>> {
        Ok(self.idempotency_keys.get(key).map(|entry| entry.clone()))
    }

    async fn query_by_context(&self, query: &Context) -> Result<Vec<FlowInstance>> {
        let matching = self
            .flows
            .iter()
            .filter(|entry| {
                query
                    .iter()
                    .all(|(key, value)| entry.value().context.get(key) == Some(value))
            })
            .map(|entry| entry.value().clone())
            .collect();
        Ok(matching)
    }
}
