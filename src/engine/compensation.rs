//! The compensation (saga) stack: recording and failure-driven unwinding.
//!
//! Compensations are appended in call order and executed strictly in
//! reverse. Entries are never popped; they stay on the instance for audit.

use super::error::Result;
use super::FlowEngine;
use crate::core::{CompensationEntry, FlowInstance, FlowStatus, Hook};
use crate::storage::FlowStore;
use chrono::Utc;
use tracing::{debug, info, warn};

impl<S: FlowStore> FlowEngine<S> {
    /// Push an undo action onto the flow's compensation stack, labeled with
    /// the current state.
    ///
    /// Recording is permitted in any status, including `completed`; an entry
    /// recorded after completion can never execute but remains auditable.
    pub async fn record_compensation(
        &self,
        flow_id: &str,
        action: Hook,
        description: Option<String>,
    ) -> Result<FlowInstance> {
        let mut instance = self.get_flow(flow_id).await?;
        let entry = CompensationEntry {
            state_label: instance.current_state.label(),
            action,
            timestamp: Utc::now(),
            description,
        };
        debug!(flow_id, state = %entry.state_label, "compensation recorded");
        instance.compensations.push(entry);
        instance.touch();
        self.store().save(&instance).await?;
        Ok(instance)
    }

    /// The failure-driven compensation procedure.
    ///
    /// With an empty stack the flow simply fails. Otherwise the flow moves
    /// to `compensating`, every recorded action runs in reverse order with
    /// the current context (individual action failures are logged and
    /// ignored), and the flow fails with the reason suffixed
    /// `" (compensated)"`. Returns the final instance and whether any
    /// compensations ran.
    pub(crate) async fn run_compensation(
        &self,
        flow_id: &str,
        reason: &str,
    ) -> Result<(FlowInstance, bool)> {
        let mut instance = self.get_flow(flow_id).await?;

        if instance.compensations.is_empty() {
            instance.fail(reason);
            self.store().save(&instance).await?;
            return Ok((instance, false));
        }

        instance.status = FlowStatus::Compensating;
        instance.touch();
        if let Err(storage_error) = self.store().save(&instance).await {
            // Infrastructure failure inside the procedure itself: report it
            // instead of the original reason, without claiming compensation.
            warn!(flow_id, %storage_error, "could not persist compensating status");
            instance.fail(format!("Compensation failed: {storage_error}"));
            self.store().save(&instance).await?;
            return Ok((instance, false));
        }

        info!(
            flow_id,
            entries = instance.compensations.len(),
            "running compensations in reverse order"
        );

        let entries: Vec<CompensationEntry> =
            instance.compensations.iter().rev().cloned().collect();
        for entry in &entries {
            if let Err(error) = (entry.action)(&mut instance.context).await {
                warn!(
                    flow_id,
                    state = %entry.state_label,
                    %error,
                    "compensation action failed, continuing"
                );
            }
        }

        instance.fail(format!("{reason} (compensated)"));
        self.store().save(&instance).await?;
        Ok((instance, true))
    }
}
