// Metro
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! State graph representation.
//!
//! A graph is a tree of named states rooted at an unnamed root state. Each
//! state may declare sub-states, transitions, operations and lifecycle
//! triggers. Mutators are used exclusively by graph builders at build time;
//! once handed to a state machine (behind an `Arc`) the graph is treated as
//! immutable.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::StateError;

/// Identifier of a state within its owning [`StateGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateId(usize);

/// A named method invocation bound to a state or transition.
///
/// When no explicit method name is declared the operation name doubles as the
/// method name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    pub method: Option<String>,
}

impl Operation {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), method: None }
    }

    pub fn with_method(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self { name: name.into(), method: Some(method.into()) }
    }

    /// The method invoked against the instance.
    pub fn method_name(&self) -> &str {
        self.method.as_deref().unwrap_or(&self.name)
    }
}

/// A state transition: a target state reference plus an optional method
/// invoked against the instance when the transition fires.
///
/// The target is stored as a state reference and resolved at apply time
/// relative to the state that owns the transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub target: String,
    pub method: Option<String>,
}

impl Transition {
    pub fn new(target: impl Into<String>) -> Self {
        Self { target: target.into(), method: None }
    }

    pub fn with_method(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self { target: target.into(), method: Some(method.into()) }
    }
}

/// Action bound to a lifecycle trigger.
///
/// Exactly one of an inline transition, an inline operation, a reference to a
/// named transition (`Apply`) or a reference to a named operation (`Exec`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Transition(Transition),
    Operation(Operation),
    Apply(String),
    Exec(String),
}

/// Lifecycle trigger categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerEvent {
    Initialization,
    Termination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateNode {
    name: String,
    parent: Option<usize>,
    terminal: bool,
    children: Vec<usize>,
    transitions: Vec<(String, Transition)>,
    operations: Vec<(String, Operation)>,
    initializer: Option<Action>,
    terminator: Option<Action>,
}

impl StateNode {
    fn new(name: String, parent: Option<usize>, terminal: bool) -> Self {
        Self {
            name,
            parent,
            terminal,
            children: Vec::new(),
            transitions: Vec::new(),
            operations: Vec::new(),
            initializer: None,
            terminator: None,
        }
    }
}

/// Immutable tree of named states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateGraph {
    states: Vec<StateNode>,
}

impl Default for StateGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGraph {
    /// The root state of every graph.
    pub const ROOT: StateId = StateId(0);

    /// Create a graph holding a single non-terminal root state.
    pub fn new() -> Self {
        Self { states: vec![StateNode::new(String::new(), None, false)] }
    }

    /// Create a graph holding a single terminal root state. Used for
    /// components with no lifecycle activity.
    pub fn null_graph() -> Self {
        Self { states: vec![StateNode::new(String::new(), None, true)] }
    }

    /// Default graph for startable components: `started` and `stopped`
    /// sub-states, initialization into `started` via `start`, a terminator
    /// into `stopped` via `stop`, and `stop`/`start` transitions between the
    /// two states.
    pub fn startable() -> Self {
        let mut graph = Self::new();
        let started = graph.add_state(Self::ROOT, "started").expect("fresh graph");
        let stopped = graph.add_state(Self::ROOT, "stopped").expect("fresh graph");
        graph
            .set_initialization(
                Self::ROOT,
                Action::Transition(Transition::with_method("started", "start")),
            )
            .expect("fresh graph");
        graph
            .set_terminator(started, Action::Transition(Transition::with_method("stopped", "stop")))
            .expect("fresh graph");
        graph
            .add_transition(started, "stop", Transition::with_method("stopped", "stop"))
            .expect("fresh graph");
        graph
            .add_transition(stopped, "start", Transition::with_method("started", "start"))
            .expect("fresh graph");
        graph
    }

    /// Default graph for executable components: a root whose initialization
    /// trigger invokes `execute` once without changing state.
    pub fn executable() -> Self {
        let mut graph = Self::new();
        graph
            .set_initialization(Self::ROOT, Action::Operation(Operation::new("execute")))
            .expect("fresh graph");
        graph
    }

    //---------------------------------------------------------------------
    // build-time mutators
    //---------------------------------------------------------------------

    /// Add a non-terminal sub-state under `parent`.
    pub fn add_state(&mut self, parent: StateId, name: &str) -> Result<StateId, StateError> {
        self.insert_state(parent, name, false)
    }

    /// Add a terminal sub-state under `parent`. Terminal states refuse
    /// sub-states, transitions, operations and triggers.
    pub fn add_terminal_state(&mut self, parent: StateId, name: &str) -> Result<StateId, StateError> {
        self.insert_state(parent, name, true)
    }

    fn insert_state(&mut self, parent: StateId, name: &str, terminal: bool) -> Result<StateId, StateError> {
        self.check_mutable(parent)?;
        let siblings = &self.states[parent.0].children;
        if siblings.iter().any(|&c| self.states[c].name == name) {
            return Err(StateError::DuplicateKey { key: name.to_string(), state: self.path(parent) });
        }
        let id = self.states.len();
        self.states.push(StateNode::new(name.to_string(), Some(parent.0), terminal));
        self.states[parent.0].children.push(id);
        Ok(StateId(id))
    }

    /// Declare a named transition on a state. Transition keys are unique
    /// within the owning state; a transition with the same key as one in an
    /// ancestor state takes precedence during resolution.
    pub fn add_transition(&mut self, state: StateId, key: &str, transition: Transition) -> Result<(), StateError> {
        self.check_mutable(state)?;
        let node = &self.states[state.0];
        if node.transitions.iter().any(|(k, _)| k == key) {
            return Err(StateError::DuplicateKey { key: key.to_string(), state: self.path(state) });
        }
        self.states[state.0].transitions.push((key.to_string(), transition));
        Ok(())
    }

    /// Declare a named operation on a state. Operations do not modify the
    /// current state; they are dynamic methods exposed while the owning state
    /// is part of the active state chain.
    pub fn add_operation(&mut self, state: StateId, key: &str, operation: Operation) -> Result<(), StateError> {
        self.check_mutable(state)?;
        let node = &self.states[state.0];
        if node.operations.iter().any(|(k, _)| k == key) {
            return Err(StateError::DuplicateKey { key: key.to_string(), state: self.path(state) });
        }
        self.states[state.0].operations.push((key.to_string(), operation));
        Ok(())
    }

    /// Declare the initialization trigger of a state.
    pub fn set_initialization(&mut self, state: StateId, action: Action) -> Result<(), StateError> {
        self.check_mutable(state)?;
        if self.states[state.0].initializer.is_some() {
            return Err(StateError::TriggerAlreadySet { role: "initialization", state: self.path(state) });
        }
        self.states[state.0].initializer = Some(action);
        Ok(())
    }

    /// Declare the termination trigger of a state.
    pub fn set_terminator(&mut self, state: StateId, action: Action) -> Result<(), StateError> {
        self.check_mutable(state)?;
        if self.states[state.0].terminator.is_some() {
            return Err(StateError::TriggerAlreadySet { role: "termination", state: self.path(state) });
        }
        self.states[state.0].terminator = Some(action);
        Ok(())
    }

    fn check_mutable(&self, state: StateId) -> Result<(), StateError> {
        if self.states[state.0].terminal {
            Err(StateError::TerminalState { state: self.path(state) })
        } else {
            Ok(())
        }
    }

    //---------------------------------------------------------------------
    // read access
    //---------------------------------------------------------------------

    pub fn name(&self, state: StateId) -> &str {
        &self.states[state.0].name
    }

    pub fn is_terminal(&self, state: StateId) -> bool {
        self.states[state.0].terminal
    }

    pub fn parent(&self, state: StateId) -> Option<StateId> {
        self.states[state.0].parent.map(StateId)
    }

    pub fn children(&self, state: StateId) -> impl Iterator<Item = StateId> + '_ {
        self.states[state.0].children.iter().copied().map(StateId)
    }

    /// Absolute path of a state, `/` for the root.
    pub fn path(&self, state: StateId) -> String {
        let mut segments = Vec::new();
        let mut cursor = state.0;
        loop {
            let node = &self.states[cursor];
            match node.parent {
                Some(parent) => {
                    segments.push(node.name.as_str());
                    cursor = parent;
                }
                None => break,
            }
        }
        if segments.is_empty() {
            "/".to_string()
        } else {
            segments.reverse();
            format!("/{}", segments.join("/"))
        }
    }

    /// Resolve a state reference relative to `base`.
    ///
    /// Grammar: a leading `/` addresses from the root, a leading `../`
    /// addresses relative to the parent, `a/b` descends a composite path,
    /// and a plain name searches the base state's children first and then
    /// each ancestor's children in order.
    pub fn find_state(&self, base: StateId, target: &str) -> Result<StateId, StateError> {
        if let Some(rest) = target.strip_prefix('/') {
            if rest.is_empty() {
                return Ok(Self::ROOT);
            }
            return self.descend(Self::ROOT, rest, target);
        }
        if let Some(rest) = target.strip_prefix("../") {
            let parent = self.parent(base).ok_or_else(|| StateError::UnknownState {
                name: target.to_string(),
                state: self.path(base),
            })?;
            return self.find_state(parent, rest);
        }
        if let Some((head, rest)) = target.split_once('/') {
            let state = self.find_state(base, head)?;
            return self.descend(state, rest, target);
        }

        // plain name: children of the base state, then each ancestor's
        // children in order
        let mut cursor = Some(base);
        while let Some(state) = cursor {
            if let Some(child) = self.child_by_name(state, target) {
                return Ok(child);
            }
            cursor = self.parent(state);
        }
        Err(StateError::UnknownState { name: target.to_string(), state: self.path(base) })
    }

    /// Strict descent: every segment must name a direct child.
    fn descend(&self, base: StateId, rest: &str, original: &str) -> Result<StateId, StateError> {
        let mut cursor = base;
        for segment in rest.split('/') {
            cursor = self.child_by_name(cursor, segment).ok_or_else(|| StateError::UnknownState {
                name: original.to_string(),
                state: self.path(base),
            })?;
        }
        Ok(cursor)
    }

    fn child_by_name(&self, state: StateId, name: &str) -> Option<StateId> {
        self.states[state.0]
            .children
            .iter()
            .copied()
            .find(|&c| self.states[c].name == name)
            .map(StateId)
    }

    /// Resolve a transition key along the active state chain. The search
    /// proceeds from the supplied state upwards until the root is reached;
    /// transitions logically closer to the current state take precedence.
    /// Returns the owning state together with the transition.
    pub fn resolve_transition(&self, from: StateId, key: &str) -> Result<(StateId, &Transition), StateError> {
        let mut cursor = Some(from);
        while let Some(state) = cursor {
            if let Some((_, transition)) = self.states[state.0].transitions.iter().find(|(k, _)| k == key) {
                return Ok((state, transition));
            }
            cursor = self.parent(state);
        }
        Err(StateError::UnknownTransition { name: key.to_string(), state: self.path(from) })
    }

    /// Resolve an operation key along the active state chain, with the same
    /// override-by-proximity semantics as [`resolve_transition`].
    ///
    /// [`resolve_transition`]: StateGraph::resolve_transition
    pub fn resolve_operation(&self, from: StateId, key: &str) -> Result<(StateId, &Operation), StateError> {
        let mut cursor = Some(from);
        while let Some(state) = cursor {
            if let Some((_, operation)) = self.states[state.0].operations.iter().find(|(k, _)| k == key) {
                return Ok((state, operation));
            }
            cursor = self.parent(state);
        }
        Err(StateError::UnknownOperation { name: key.to_string(), state: self.path(from) })
    }

    /// Locate the most immediate trigger action for an event category
    /// relative to a state, searching the state itself and then each
    /// ancestor. Returns the owning state together with the action.
    pub fn trigger_action(&self, from: StateId, event: TriggerEvent) -> Option<(StateId, &Action)> {
        let mut cursor = Some(from);
        while let Some(state) = cursor {
            let node = &self.states[state.0];
            let action = match event {
                TriggerEvent::Initialization => node.initializer.as_ref(),
                TriggerEvent::Termination => node.terminator.as_ref(),
            };
            if let Some(action) = action {
                return Some((state, action));
            }
            cursor = self.parent(state);
        }
        None
    }

    /// Names of the transitions available from a state: local keys plus
    /// ancestor keys not shadowed by a closer declaration.
    pub fn transition_names(&self, from: StateId) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = Some(from);
        while let Some(state) = cursor {
            for (key, _) in &self.states[state.0].transitions {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            cursor = self.parent(state);
        }
        names
    }

    /// Validate graph integrity: every transition target and every trigger
    /// reference must resolve relative to its owning state.
    pub fn validate(&self) -> Result<(), StateError> {
        for (index, node) in self.states.iter().enumerate() {
            let id = StateId(index);
            for (_, transition) in &node.transitions {
                self.find_state(id, &transition.target)?;
            }
            for action in node.initializer.iter().chain(node.terminator.iter()) {
                match action {
                    Action::Transition(transition) => {
                        self.find_state(id, &transition.target)?;
                    }
                    Action::Operation(_) => {}
                    Action::Apply(key) => {
                        let (owner, transition) = self.resolve_transition(id, key)?;
                        self.find_state(owner, &transition.target)?;
                    }
                    Action::Exec(key) => {
                        self.resolve_operation(id, key)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for StateGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_state(graph: &StateGraph, f: &mut fmt::Formatter<'_>, state: StateId, offset: usize) -> fmt::Result {
            let pad = "  ".repeat(offset);
            let name = if graph.name(state).is_empty() { "(root)" } else { graph.name(state) };
            write!(f, "{pad}state: {name}")?;
            if graph.is_terminal(state) {
                write!(f, " (terminal)")?;
            }
            writeln!(f)?;
            let node = &graph.states[state.0];
            for (key, transition) in &node.transitions {
                writeln!(f, "{pad}  transition:{key} --> {}", transition.target)?;
            }
            for (key, _) in &node.operations {
                writeln!(f, "{pad}  operation:{key}")?;
            }
            for child in graph.children(state) {
                write_state(graph, f, child, offset + 1)?;
            }
            Ok(())
        }
        write_state(self, f, Self::ROOT, 0)
    }
}
