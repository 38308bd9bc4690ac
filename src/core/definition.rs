//! The immutable flow configuration model.
//!
//! A [`FlowDefinition`] describes states, transitions, guards, actions,
//! retry and validation declaratively. Definitions are built through
//! [`FlowDefinitionBuilder`], which enforces the referential invariants
//! (initial state exists, every transition target exists, compound children
//! and region members exist) so the executor never has to re-check them.

use super::context::{Guard, Hook, Validator};
use super::error::{DefinitionError, Result};
use super::retry::RetryPolicy;
use std::collections::HashMap;
use std::fmt;

/// An edge labelled by an event, with optional guard, action and retry.
#[derive(Clone)]
pub struct Transition {
    /// Event name this transition reacts to.
    pub event: String,
    /// Target state name.
    pub to: String,
    /// Optional predicate; the transition only fires when it returns true.
    pub guard: Option<Guard>,
    /// Optional action run between the source's exit and target validation.
    pub action: Option<Hook>,
    /// Retry policy for the whole exit/action/validate/entry sequence.
    pub retry: Option<RetryPolicy>,
}

impl Transition {
    pub fn new(event: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            to: to.into(),
            guard: None,
            action: None,
            retry: None,
        }
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action(mut self, action: Hook) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_retry(mut self, retry: impl Into<RetryPolicy>) -> Self {
        self.retry = Some(retry.into());
        self
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("event", &self.event)
            .field("to", &self.to)
            .field("guard", &self.guard.as_ref().map(|_| "<guard>"))
            .field("action", &self.action.as_ref().map(|_| "<action>"))
            .field("retry", &self.retry)
            .finish()
    }
}

/// A validation attached to a state, evaluated before the state is entered.
#[derive(Clone)]
pub struct Validation {
    pub predicate: Validator,
    /// Message used when the predicate fails without supplying its own.
    pub error_message: Option<String>,
}

impl Validation {
    pub fn new(predicate: Validator) -> Self {
        Self {
            predicate,
            error_message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validation")
            .field("error_message", &self.error_message)
            .finish()
    }
}

/// One concurrently active sub-axis of a parallel state.
#[derive(Clone, Debug)]
pub struct Region {
    pub name: String,
    /// State this region occupies when the parallel state is entered.
    pub initial_state: String,
    /// Atomic-state names belonging to this region.
    pub states: Vec<String>,
}

impl Region {
    pub fn new(
        name: impl Into<String>,
        initial_state: impl Into<String>,
        states: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            initial_state: initial_state.into(),
            states,
        }
    }
}

/// A plain state, optionally final.
#[derive(Clone, Default)]
pub struct AtomicState {
    pub name: String,
    pub is_final: bool,
    pub transitions: Vec<Transition>,
    pub on_entry: Option<Hook>,
    pub on_exit: Option<Hook>,
    pub validation: Option<Validation>,
}

impl AtomicState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// An atomic state whose entry completes the flow.
    pub fn final_state(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_final: true,
            ..Self::default()
        }
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_on_entry(mut self, hook: Hook) -> Self {
        self.on_entry = Some(hook);
        self
    }

    pub fn with_on_exit(mut self, hook: Hook) -> Self {
        self.on_exit = Some(hook);
        self
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }
}

/// A state with concurrently active regions.
#[derive(Clone, Default)]
pub struct ParallelState {
    pub name: String,
    pub regions: Vec<Region>,
    pub transitions: Vec<Transition>,
    pub on_entry: Option<Hook>,
    pub on_exit: Option<Hook>,
}

impl ParallelState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.regions.push(region);
        self
    }

    pub fn with_transition(mut self, transition: Transition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_on_entry(mut self, hook: Hook) -> Self {
        self.on_entry = Some(hook);
        self
    }

    pub fn with_on_exit(mut self, hook: Hook) -> Self {
        self.on_exit = Some(hook);
        self
    }
}

/// A state containing a nested sub-machine with its own initial state.
#[derive(Clone, Default)]
pub struct CompoundState {
    pub name: String,
    pub initial_sub_state: String,
    pub child_states: Vec<String>,
    pub is_final: bool,
    pub on_entry: Option<Hook>,
    pub on_exit: Option<Hook>,
}

impl CompoundState {
    pub fn new(name: impl Into<String>, initial_sub_state: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_sub_state: initial_sub_state.into(),
            ..Self::default()
        }
    }

    pub fn with_children(mut self, child_states: Vec<String>) -> Self {
        self.child_states = child_states;
        self
    }

    pub fn with_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn with_on_entry(mut self, hook: Hook) -> Self {
        self.on_entry = Some(hook);
        self
    }

    pub fn with_on_exit(mut self, hook: Hook) -> Self {
        self.on_exit = Some(hook);
        self
    }
}

/// A state node: a closed sum over the three state kinds.
#[derive(Clone)]
pub enum StateNode {
    Atomic(AtomicState),
    Parallel(ParallelState),
    Compound(CompoundState),
}

impl StateNode {
    pub fn name(&self) -> &str {
        match self {
            StateNode::Atomic(s) => &s.name,
            StateNode::Parallel(s) => &s.name,
            StateNode::Compound(s) => &s.name,
        }
    }

    /// True iff entering this state (alone, or in every region for parallel
    /// flows) completes the flow.
    pub fn is_final(&self) -> bool {
        match self {
            StateNode::Atomic(s) => s.is_final,
            StateNode::Parallel(_) => false,
            StateNode::Compound(s) => s.is_final,
        }
    }

    /// The state's own transition list. Compound states rely solely on the
    /// global transition table.
    pub fn transitions(&self) -> &[Transition] {
        match self {
            StateNode::Atomic(s) => &s.transitions,
            StateNode::Parallel(s) => &s.transitions,
            StateNode::Compound(_) => &[],
        }
    }

    pub fn on_entry(&self) -> Option<&Hook> {
        match self {
            StateNode::Atomic(s) => s.on_entry.as_ref(),
            StateNode::Parallel(s) => s.on_entry.as_ref(),
            StateNode::Compound(s) => s.on_entry.as_ref(),
        }
    }

    pub fn on_exit(&self) -> Option<&Hook> {
        match self {
            StateNode::Atomic(s) => s.on_exit.as_ref(),
            StateNode::Parallel(s) => s.on_exit.as_ref(),
            StateNode::Compound(s) => s.on_exit.as_ref(),
        }
    }

    pub fn validation(&self) -> Option<&Validation> {
        match self {
            StateNode::Atomic(s) => s.validation.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateNode::Atomic(s) => f
                .debug_struct("Atomic")
                .field("name", &s.name)
                .field("is_final", &s.is_final)
                .field("transitions", &s.transitions.len())
                .finish(),
            StateNode::Parallel(s) => f
                .debug_struct("Parallel")
                .field("name", &s.name)
                .field("regions", &s.regions.len())
                .finish(),
            StateNode::Compound(s) => f
                .debug_struct("Compound")
                .field("name", &s.name)
                .field("initial_sub_state", &s.initial_sub_state)
                .field("is_final", &s.is_final)
                .finish(),
        }
    }
}

impl From<AtomicState> for StateNode {
    fn from(s: AtomicState) -> Self {
        StateNode::Atomic(s)
    }
}

impl From<ParallelState> for StateNode {
    fn from(s: ParallelState) -> Self {
        StateNode::Parallel(s)
    }
}

impl From<CompoundState> for StateNode {
    fn from(s: CompoundState) -> Self {
        StateNode::Compound(s)
    }
}

/// An immutable, validated flow definition.
#[derive(Clone)]
pub struct FlowDefinition {
    id: String,
    version: u32,
    initial_state: String,
    states: HashMap<String, StateNode>,
    global_transitions: HashMap<String, Vec<Transition>>,
    on_error: Option<Hook>,
}

impl FlowDefinition {
    pub fn builder(id: impl Into<String>, version: u32) -> FlowDefinitionBuilder {
        FlowDefinitionBuilder {
            id: id.into(),
            version,
            initial_state: None,
            states: Vec::new(),
            global_transitions: Vec::new(),
            on_error: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn state(&self, name: &str) -> Option<&StateNode> {
        self.states.get(name)
    }

    /// Entries of the global transition table whose `from` matches.
    pub fn global_transitions_from(&self, from: &str) -> &[Transition] {
        self.global_transitions
            .get(from)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Definition-level error hook, invoked once retries are exhausted.
    pub fn on_error(&self) -> Option<&Hook> {
        self.on_error.as_ref()
    }
}

impl fmt::Debug for FlowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowDefinition")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("initial_state", &self.initial_state)
            .field("states", &self.states.len())
            .finish()
    }
}

/// Builder enforcing the configuration invariants.
pub struct FlowDefinitionBuilder {
    id: String,
    version: u32,
    initial_state: Option<String>,
    states: Vec<StateNode>,
    global_transitions: Vec<(String, Transition)>,
    on_error: Option<Hook>,
}

impl FlowDefinitionBuilder {
    pub fn initial_state(mut self, name: impl Into<String>) -> Self {
        self.initial_state = Some(name.into());
        self
    }

    pub fn state(mut self, node: impl Into<StateNode>) -> Self {
        self.states.push(node.into());
        self
    }

    /// Register a transition in the global table, keyed by source state.
    pub fn global_transition(mut self, from: impl Into<String>, transition: Transition) -> Self {
        self.global_transitions.push((from.into(), transition));
        self
    }

    pub fn on_error(mut self, hook: Hook) -> Self {
        self.on_error = Some(hook);
        self
    }

    pub fn build(self) -> Result<FlowDefinition> {
        let mut states: HashMap<String, StateNode> = HashMap::with_capacity(self.states.len());
        for node in self.states {
            if node.name().is_empty() {
                return Err(DefinitionError::EmptyStateName);
            }
            let name = node.name().to_string();
            if states.insert(name.clone(), node).is_some() {
                return Err(DefinitionError::DuplicateState(name));
            }
        }

        let initial_state = self.initial_state.unwrap_or_default();
        if !states.contains_key(&initial_state) {
            return Err(DefinitionError::UnknownInitialState(initial_state));
        }

        for node in states.values() {
            for t in node.transitions() {
                if !states.contains_key(&t.to) {
                    return Err(DefinitionError::UnknownTransitionTarget {
                        from: node.name().to_string(),
                        event: t.event.clone(),
                        to: t.to.clone(),
                    });
                }
            }

            match node {
                StateNode::Compound(c) => {
                    if !states.contains_key(&c.initial_sub_state) {
                        return Err(DefinitionError::UnknownChildState {
                            compound: c.name.clone(),
                            child: c.initial_sub_state.clone(),
                        });
                    }
                    for child in &c.child_states {
                        if !states.contains_key(child) {
                            return Err(DefinitionError::UnknownChildState {
                                compound: c.name.clone(),
                                child: child.clone(),
                            });
                        }
                    }
                }
                StateNode::Parallel(p) => {
                    for region in &p.regions {
                        if !states.contains_key(&region.initial_state) {
                            return Err(DefinitionError::UnknownRegionState {
                                state: p.name.clone(),
                                region: region.name.clone(),
                                referenced: region.initial_state.clone(),
                            });
                        }
                        for referenced in &region.states {
                            if !states.contains_key(referenced) {
                                return Err(DefinitionError::UnknownRegionState {
                                    state: p.name.clone(),
                                    region: region.name.clone(),
                                    referenced: referenced.clone(),
                                });
                            }
                        }
                    }
                }
                StateNode::Atomic(_) => {}
            }
        }

        let mut global_transitions: HashMap<String, Vec<Transition>> = HashMap::new();
        for (from, t) in self.global_transitions {
            if !states.contains_key(&from) {
                return Err(DefinitionError::UnknownTransitionSource(from));
            }
            if !states.contains_key(&t.to) {
                return Err(DefinitionError::UnknownTransitionTarget {
                    from,
                    event: t.event.clone(),
                    to: t.to.clone(),
                });
            }
            global_transitions.entry(from).or_default().push(t);
        }

        Ok(FlowDefinition {
            id: self.id,
            version: self.version,
            initial_state,
            states,
            global_transitions,
            on_error: self.on_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_state() -> FlowDefinitionBuilder {
        FlowDefinition::builder("order", 1)
            .initial_state("pending")
            .state(AtomicState::new("pending").with_transition(Transition::new("APPROVE", "approved")))
            .state(AtomicState::final_state("approved"))
    }

    #[test]
    fn builds_a_minimal_definition() {
        let def = two_state().build().unwrap();
        assert_eq!(def.id(), "order");
        assert_eq!(def.version(), 1);
        assert_eq!(def.initial_state(), "pending");
        assert!(def.state("pending").is_some());
        assert!(def.state("approved").unwrap().is_final());
        assert!(def.state("missing").is_none());
    }

    #[test]
    fn rejects_unknown_initial_state() {
        let err = FlowDefinition::builder("f", 1)
            .initial_state("nowhere")
            .state(AtomicState::new("somewhere"))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::UnknownInitialState("nowhere".into()));
    }

    #[test]
    fn rejects_unknown_transition_target() {
        let err = FlowDefinition::builder("f", 1)
            .initial_state("a")
            .state(AtomicState::new("a").with_transition(Transition::new("GO", "b")))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnknownTransitionTarget { ref to, .. } if to == "b"
        ));
    }

    #[test]
    fn rejects_duplicate_and_empty_state_names() {
        let err = FlowDefinition::builder("f", 1)
            .initial_state("a")
            .state(AtomicState::new("a"))
            .state(AtomicState::new("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateState("a".into()));

        let err = FlowDefinition::builder("f", 1)
            .initial_state("a")
            .state(AtomicState::new(""))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::EmptyStateName);
    }

    #[test]
    fn rejects_dangling_compound_children() {
        let err = FlowDefinition::builder("f", 1)
            .initial_state("outer")
            .state(CompoundState::new("outer", "inner"))
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownChildState { .. }));
    }

    #[test]
    fn rejects_dangling_region_states() {
        let err = FlowDefinition::builder("f", 1)
            .initial_state("both")
            .state(
                ParallelState::new("both")
                    .with_region(Region::new("r1", "missing", vec![])),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownRegionState { .. }));
    }

    #[test]
    fn global_transitions_are_keyed_by_source() {
        let def = two_state()
            .global_transition("approved", Transition::new("REOPEN", "pending"))
            .build()
            .unwrap();
        assert_eq!(def.global_transitions_from("approved").len(), 1);
        assert_eq!(def.global_transitions_from("approved")[0].event, "REOPEN");
        assert!(def.global_transitions_from("pending").is_empty());
    }

    #[test]
    fn rejects_global_transition_from_unknown_state() {
        let err = two_state()
            .global_transition("ghost", Transition::new("X", "approved"))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::UnknownTransitionSource("ghost".into()));
    }

    #[test]
    fn compound_states_expose_no_local_transitions() {
        let def = FlowDefinition::builder("f", 1)
            .initial_state("inner")
            .state(AtomicState::new("inner"))
            .state(CompoundState::new("outer", "inner").with_children(vec!["inner".into()]))
            .build()
            .unwrap();
        assert!(def.state("outer").unwrap().transitions().is_empty());
    }
}
