//! The mutable runtime state of one flow execution.

use super::context::{noop_hook, Context, Hook};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a flow instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Active,
    Paused,
    Compensating,
    Completed,
    Failed,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Active => "active",
            FlowStatus::Paused => "paused",
            FlowStatus::Compensating => "compensating",
            FlowStatus::Completed => "completed",
            FlowStatus::Failed => "failed",
        }
    }

    /// True for the statuses a flow can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Failed)
    }
}

impl FromStr for FlowStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(FlowStatus::Active),
            "paused" => Ok(FlowStatus::Paused),
            "compensating" => Ok(FlowStatus::Compensating),
            "completed" => Ok(FlowStatus::Completed),
            "failed" => Ok(FlowStatus::Failed),
            other => Err(format!("invalid flow status: {other}")),
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state a flow currently occupies: a single name, or one name per
/// active parallel region.
///
/// Serializes untagged, so a single state persists as a string and a
/// parallel state as a list of strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    Single(String),
    Parallel(Vec<String>),
}

impl StateRef {
    pub fn is_parallel(&self) -> bool {
        matches!(self, StateRef::Parallel(_))
    }

    /// The single state name, if this is not a parallel reference.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            StateRef::Single(name) => Some(name),
            StateRef::Parallel(_) => None,
        }
    }

    /// The per-region state names, if this is a parallel reference.
    pub fn as_regions(&self) -> Option<&[String]> {
        match self {
            StateRef::Single(_) => None,
            StateRef::Parallel(regions) => Some(regions),
        }
    }

    /// All occupied state names, one for single, one per region otherwise.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        match self {
            StateRef::Single(name) => std::slice::from_ref(name).iter(),
            StateRef::Parallel(regions) => regions.iter(),
        }
        .map(String::as_str)
    }

    pub fn contains(&self, state: &str) -> bool {
        self.names().any(|name| name == state)
    }

    /// Human-readable label: the name itself, or the region names joined
    /// with commas. Used for compensation records and error states.
    pub fn label(&self) -> String {
        match self {
            StateRef::Single(name) => name.clone(),
            StateRef::Parallel(regions) => regions.join(","),
        }
    }
}

impl From<&str> for StateRef {
    fn from(name: &str) -> Self {
        StateRef::Single(name.to_string())
    }
}

impl From<String> for StateRef {
    fn from(name: String) -> Self {
        StateRef::Single(name)
    }
}

impl From<Vec<String>> for StateRef {
    fn from(regions: Vec<String>) -> Self {
        StateRef::Parallel(regions)
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One successful transition, as recorded in the instance history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub from: StateRef,
    pub to: StateRef,
    pub event: String,
    pub timestamp: DateTime<Utc>,
}

/// A recorded undo action, pinned to the state it was recorded in.
///
/// The action itself is an opaque callable and is skipped on serialization;
/// a deserialized entry carries a no-op in its place. Stores that need
/// durable compensations must map actions to named registered identifiers.
#[derive(Clone, Serialize, Deserialize)]
pub struct CompensationEntry {
    pub state_label: String,
    #[serde(skip, default = "noop_hook")]
    pub action: Hook,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
}

impl fmt::Debug for CompensationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensationEntry")
            .field("state_label", &self.state_label)
            .field("timestamp", &self.timestamp)
            .field("description", &self.description)
            .finish()
    }
}

/// Back-reference from a parent flow to a child it started.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubFlowRef {
    pub sub_flow_id: String,
    pub definition_id: String,
    /// Label of the parent's current state when the child was started.
    pub started_in_state: String,
    pub status: FlowStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// The child's final context, when it completed successfully.
    pub result: Option<Context>,
}

/// The failure recorded on an instance whose status is `failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowError {
    pub message: String,
    /// Label of the state the flow occupied when it failed.
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

/// One live execution of a flow definition.
///
/// Instances are exclusively owned by the store; the engine holds one only
/// for the duration of a single operation and writes mutations back
/// explicitly. `history` and `compensations` are append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowInstance {
    pub flow_id: String,
    pub definition_id: String,
    pub version: u32,
    pub current_state: StateRef,
    pub context: Context,
    pub status: FlowStatus,
    pub history: Vec<HistoryRecord>,
    pub compensations: Vec<CompensationEntry>,
    pub sub_flows: Vec<SubFlowRef>,
    pub parent_flow_id: Option<String>,
    pub error: Option<FlowError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowInstance {
    /// A fresh active instance with empty history, compensations and
    /// sub-flow list.
    pub fn new(
        flow_id: impl Into<String>,
        definition_id: impl Into<String>,
        version: u32,
        current_state: StateRef,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            flow_id: flow_id.into(),
            definition_id: definition_id.into(),
            version,
            current_state,
            context,
            status: FlowStatus::Active,
            history: Vec::new(),
            compensations: Vec::new(),
            sub_flows: Vec::new(),
            parent_flow_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump the modification timestamp. Call before persisting a mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Record a failure and move the instance to `failed`.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = FlowStatus::Failed;
        self.error = Some(FlowError {
            message: message.into(),
            state: self.current_state.label(),
            timestamp: Utc::now(),
        });
        self.touch();
    }
}
