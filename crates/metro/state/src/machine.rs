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

//! State machine execution.
//!
//! A machine tracks a current state within an immutable [`StateGraph`] and
//! drives instances through it: initialization and termination trigger
//! chains, explicit transition application and operation execution. The
//! machine never touches instances directly other than through the
//! [`Instance`] trait.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::errors::{InvocationError, StateError};
use crate::graph::{Action, StateGraph, StateId, Transition, TriggerEvent};

/// A runtime instance the machine drives through its lifecycle. Methods are
/// addressed by name, so a single implementation can serve any graph.
pub trait Instance: Send + Sync {
    fn invoke(&self, method: &str) -> Result<(), InvocationError>;
}

impl std::fmt::Debug for dyn Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Instance")
    }
}

/// Notification payload describing a completed state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// Absolute path of the state the machine left.
    pub from: String,
    /// Absolute path of the state the machine entered.
    pub to: String,
}

/// Observer of machine state changes.
pub trait StateListener: Send + Sync {
    fn state_changed(&self, change: &StateChange);
}

/// Result of applying a named transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The machine moved to a new state, invoking the transition method if
    /// one was declared.
    Transitioned { from: String, to: String },
    /// The transition target was already the current state. No method was
    /// invoked and no notification was raised.
    Unchanged,
}

/// Thread-safe state machine over an immutable graph.
pub struct StateMachine {
    graph: Arc<StateGraph>,
    current: RwLock<StateId>,
    active: AtomicBool,
    disposed: AtomicBool,
    listeners: Mutex<Vec<Weak<dyn StateListener>>>,
}

/// A trigger action resolved against the graph, ready to run.
enum Resolved {
    Transition(StateId, Transition),
    Operation(String),
}

impl StateMachine {
    pub fn new(graph: Arc<StateGraph>) -> Self {
        Self {
            graph,
            current: RwLock::new(StateGraph::ROOT),
            active: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn graph(&self) -> &Arc<StateGraph> {
        &self.graph
    }

    /// Absolute path of the current state.
    pub fn current_state(&self) -> String {
        self.graph.path(*self.current.read())
    }

    /// Whether initialization has completed and termination has not run.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Names of the transitions currently exposed by the active state chain.
    pub fn transition_names(&self) -> Vec<String> {
        self.graph.transition_names(*self.current.read())
    }

    pub fn add_state_listener(&self, listener: &Arc<dyn StateListener>) {
        self.listeners.lock().push(Arc::downgrade(listener));
    }

    pub fn remove_state_listener(&self, listener: &Arc<dyn StateListener>) {
        self.listeners
            .lock()
            .retain(|entry| entry.upgrade().map_or(true, |held| !Arc::ptr_eq(&held, listener)));
    }

    /// Execute the initialization trigger chain.
    ///
    /// Starting at the current state, the most immediate initialization
    /// trigger is resolved and fired; transition actions move the machine and
    /// continue the chain from the new state, operation actions invoke their
    /// method and end the chain. A transition whose target is the current
    /// state ends the chain without invoking anything. Re-entering a state
    /// already visited during this chain aborts with a recursion error.
    ///
    /// Returns the path of the state reached.
    pub fn initialize(&self, instance: &dyn Instance) -> Result<String, StateError> {
        self.check_disposed()?;
        let mut visited: Vec<String> = Vec::new();
        loop {
            let current = *self.current.read();
            let path = self.graph.path(current);
            if visited.contains(&path) {
                visited.push(path);
                return Err(StateError::RecursiveInitialization { trace: visited });
            }
            visited.push(path);

            let Some((owner, action)) = self.graph.trigger_action(current, TriggerEvent::Initialization)
            else {
                break;
            };
            if !self.run_action(owner, action, current, instance)? {
                break;
            }
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(self.current_state())
    }

    /// Apply a named transition to the supplied instance.
    ///
    /// Resolution failures leave the current state untouched. When the
    /// resolved target is already the current state the call is a no-op:
    /// nothing is invoked, no listeners fire, and
    /// [`TransitionOutcome::Unchanged`] is returned.
    pub fn apply(&self, key: &str, instance: &dyn Instance) -> Result<TransitionOutcome, StateError> {
        self.check_disposed()?;
        let current = *self.current.read();
        let (owner, transition) = self.graph.resolve_transition(current, key)?;
        let transition = transition.clone();
        let target = self.graph.find_state(owner, &transition.target)?;
        if target == current {
            return Ok(TransitionOutcome::Unchanged);
        }
        let from = self.graph.path(current);
        if let Some(method) = &transition.method {
            self.invoke(instance, current, method)?;
        }
        self.set_state(target);
        Ok(TransitionOutcome::Transitioned { from, to: self.graph.path(target) })
    }

    /// Execute a named operation against the supplied instance. Operations
    /// never change the current state.
    pub fn execute(&self, key: &str, instance: &dyn Instance) -> Result<(), StateError> {
        self.check_disposed()?;
        let current = *self.current.read();
        let (_, operation) = self.graph.resolve_operation(current, key)?;
        let method = operation.method_name().to_string();
        self.invoke(instance, current, &method)
    }

    /// Execute the termination trigger chain, then deactivate the machine.
    ///
    /// Mirrors [`initialize`] with termination triggers. A machine that was
    /// never activated terminates as a no-op.
    ///
    /// [`initialize`]: StateMachine::initialize
    pub fn terminate(&self, instance: &dyn Instance) -> Result<(), StateError> {
        self.check_disposed()?;
        if !self.is_active() {
            return Ok(());
        }
        let mut visited: Vec<String> = Vec::new();
        loop {
            let current = *self.current.read();
            let path = self.graph.path(current);
            if visited.contains(&path) {
                visited.push(path);
                return Err(StateError::RecursiveTermination { trace: visited });
            }
            visited.push(path);

            let Some((owner, action)) = self.graph.trigger_action(current, TriggerEvent::Termination)
            else {
                break;
            };
            if !self.run_action(owner, action, current, instance)? {
                break;
            }
        }
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Return the machine to the graph root, notifying listeners if the
    /// root was not already current.
    pub fn reset(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.set_state(StateGraph::ROOT);
        self.active.store(false, Ordering::SeqCst);
    }

    /// Release the machine. Disposal is idempotent; any subsequent lifecycle
    /// call fails with [`StateError::Disposed`].
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.listeners.lock().clear();
        self.active.store(false, Ordering::SeqCst);
    }

    //---------------------------------------------------------------------
    // internals
    //---------------------------------------------------------------------

    /// Run a resolved trigger action. Returns `true` when the chain should
    /// continue from the new state.
    fn run_action(
        &self,
        owner: StateId,
        action: &Action,
        current: StateId,
        instance: &dyn Instance,
    ) -> Result<bool, StateError> {
        let resolved = match action {
            Action::Transition(transition) => Resolved::Transition(owner, transition.clone()),
            Action::Apply(key) => {
                let (owner, transition) = self.graph.resolve_transition(current, key)?;
                Resolved::Transition(owner, transition.clone())
            }
            Action::Operation(operation) => Resolved::Operation(operation.method_name().to_string()),
            Action::Exec(key) => {
                let (_, operation) = self.graph.resolve_operation(current, key)?;
                Resolved::Operation(operation.method_name().to_string())
            }
        };
        match resolved {
            Resolved::Operation(method) => {
                self.invoke(instance, current, &method)?;
                Ok(false)
            }
            Resolved::Transition(owner, transition) => {
                let target = self.graph.find_state(owner, &transition.target)?;
                if target == current {
                    return Ok(false);
                }
                if let Some(method) = &transition.method {
                    self.invoke(instance, current, method)?;
                }
                self.set_state(target);
                Ok(true)
            }
        }
    }

    fn invoke(&self, instance: &dyn Instance, state: StateId, method: &str) -> Result<(), StateError> {
        instance.invoke(method).map_err(|source| StateError::Invocation {
            state: self.graph.path(state),
            action: method.to_string(),
            source,
        })
    }

    fn set_state(&self, target: StateId) {
        let mut current = self.current.write();
        if *current == target {
            return;
        }
        let change = StateChange { from: self.graph.path(*current), to: self.graph.path(target) };
        *current = target;
        drop(current);
        debug!(from = %change.from, to = %change.to, "state changed");
        let mut listeners = self.listeners.lock();
        listeners.retain(|entry| entry.upgrade().is_some());
        let held: Vec<_> = listeners.iter().filter_map(Weak::upgrade).collect();
        drop(listeners);
        for listener in held {
            listener.state_changed(&change);
        }
    }

    fn check_disposed(&self) -> Result<(), StateError> {
        if self.disposed.load(Ordering::SeqCst) {
            Err(StateError::Disposed)
        } else {
            Ok(())
        }
    }
}
