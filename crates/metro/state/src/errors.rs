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

//! Error taxonomy of the state graph and state machine.

use thiserror::Error;

/// Error raised by an [`Instance`](crate::Instance) method invocation.
pub type InvocationError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building a state graph or driving a state machine.
#[derive(Debug, Error)]
pub enum StateError {
    /// A state name failed to resolve relative to a base state.
    #[error("state [{name}] does not exist relative to state [{state}]")]
    UnknownState { name: String, state: String },

    /// A transition key failed to resolve along the active state chain.
    #[error("unable to resolve a transition named [{name}] relative to the state [{state}]")]
    UnknownTransition { name: String, state: String },

    /// An operation key failed to resolve along the active state chain.
    #[error("unable to resolve an operation named [{name}] relative to the state [{state}]")]
    UnknownOperation { name: String, state: String },

    /// A sibling state, transition or operation key is already assigned.
    #[error("duplicate key [{key}] within state [{state}]")]
    DuplicateKey { key: String, state: String },

    /// Attempted to add sub-states, transitions, operations or triggers to a
    /// terminal state.
    #[error("cannot modify terminal state [{state}]")]
    TerminalState { state: String },

    /// An initialization or termination trigger is already declared.
    #[error("{role} trigger already set on state [{state}]")]
    TriggerAlreadySet { role: &'static str, state: String },

    /// The initialization trigger chain revisited a state.
    #[error("initialization sequence aborted, recursive path: {}", trace.join(" --> "))]
    RecursiveInitialization { trace: Vec<String> },

    /// The termination trigger chain revisited a state.
    #[error("termination sequence aborted, recursive path: {}", trace.join(" --> "))]
    RecursiveTermination { trace: Vec<String> },

    /// A bound action raised an error during invocation against the instance.
    #[error("method [{action}] raised an error in state [{state}]")]
    Invocation {
        state: String,
        action: String,
        #[source]
        source: InvocationError,
    },

    /// The state machine has been disposed.
    #[error("state machine has been disposed")]
    Disposed,
}
