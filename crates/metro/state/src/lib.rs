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

//! State graph and state machine engine.
//!
//! A [`StateGraph`] is an immutable tree of named states carrying transitions,
//! operations and lifecycle triggers. A [`StateMachine`] walks the active
//! state chain of a graph against a live [`Instance`], driving initialization
//! and termination trigger chains and applying named transitions with
//! override-by-proximity resolution.

pub mod errors;
pub mod graph;
pub mod machine;

pub use errors::{InvocationError, StateError};
pub use graph::{Action, Operation, StateGraph, StateId, Transition, TriggerEvent};
pub use machine::{Instance, StateChange, StateListener, StateMachine, TransitionOutcome};
