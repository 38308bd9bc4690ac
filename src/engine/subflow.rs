//! Sub-flow composition: parent to child linkage and completion waiting.
//!
//! Sub-flows are independent top-level instances in the store; the parent
//! holds back-references, never ownership. The child receives a copy of the
//! parent's context unless the caller supplies its own.

use super::error::{Error, Result};
use super::options::StartOptions;
use super::FlowEngine;
use crate::core::{FlowDefinition, FlowInstance, FlowStatus, SubFlowRef};
use crate::storage::FlowStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

impl<S: FlowStore> FlowEngine<S> {
    /// Start a child instance of `sub_definition` over the same store,
    /// record the back-reference on the parent, and return the child.
    pub async fn start_sub_flow(
        &self,
        parent_flow_id: &str,
        sub_definition: Arc<FlowDefinition>,
        options: StartOptions,
    ) -> Result<FlowInstance> {
        let mut parent = self.get_flow(parent_flow_id).await?;

        let sub_engine: FlowEngine<S> = FlowEngine::with_config(
            sub_definition,
            Arc::clone(self.store()),
            self.config().clone(),
        );

        // The parent's context is copied by value, never shared.
        let options = if options.context.is_none() {
            options.with_context(parent.context.clone())
        } else {
            options
        };

        let child = sub_engine
            .start_with_parent(options, Some(parent.flow_id.clone()))
            .await?;

        parent.sub_flows.push(SubFlowRef {
            sub_flow_id: child.flow_id.clone(),
            definition_id: child.definition_id.clone(),
            started_in_state: parent.current_state.label(),
            status: child.status,
            started_at: child.created_at,
            completed_at: None,
            result: None,
        });
        parent.touch();
        self.store().save(&parent).await?;

        info!(
            parent = parent_flow_id,
            child = %child.flow_id,
            definition = %child.definition_id,
            "sub-flow started"
        );
        Ok(child)
    }

    /// Poll until the child reaches a terminal status, then mirror it onto
    /// the parent's matching sub-flow record. Returns the terminal child.
    ///
    /// Fails with `SubFlowTimeout` when the budget elapses first, and
    /// defensively rejects waiting on the parent itself.
    pub async fn wait_for_sub_flow(
        &self,
        parent_flow_id: &str,
        sub_flow_id: &str,
        timeout: Option<Duration>,
    ) -> Result<FlowInstance> {
        if parent_flow_id == sub_flow_id {
            return Err(Error::SelfWait(parent_flow_id.to_string()));
        }
        // The parent must exist before anything is awaited.
        self.get_flow(parent_flow_id).await?;

        let poll_interval = self.config().subflow_poll_interval;
        let poll = async {
            loop {
                let child = self
                    .store()
                    .get(sub_flow_id)
                    .await?
                    .ok_or_else(|| Error::FlowNotFound(sub_flow_id.to_string()))?;
                if child.status.is_terminal() {
                    return Ok::<FlowInstance, Error>(child);
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        let child = match timeout {
            Some(limit) => tokio::time::timeout(limit, poll).await.map_err(|_| {
                Error::SubFlowTimeout {
                    sub_flow_id: sub_flow_id.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
            })??,
            None => poll.await?,
        };

        let mut parent = self.get_flow(parent_flow_id).await?;
        if let Some(reference) = parent
            .sub_flows
            .iter_mut()
            .find(|r| r.sub_flow_id == sub_flow_id)
        {
            reference.status = child.status;
            reference.completed_at = Some(Utc::now());
            if child.status == FlowStatus::Completed {
                reference.result = Some(child.context.clone());
            }
            parent.touch();
            self.store().save(&parent).await?;
        }

        info!(
            parent = parent_flow_id,
            child = sub_flow_id,
            status = %child.status,
            "sub-flow finished"
        );
        Ok(child)
    }
}
