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

//! Runtime control errors.

use thiserror::Error;

use metro_model::ModelError;
use metro_state::{InvocationError, StateError};

#[derive(Debug, Error)]
pub enum ControlError {
    /// A directive referenced a classname the registry does not know.
    #[error("unknown component type [{classname}]")]
    UnknownType { classname: String },

    /// A type requires a context entry the deployment does not supply.
    #[error("component [{component}] is missing the required context entry [{key}]")]
    MissingContextEntry { component: String, key: String },

    /// Part dependencies form a cycle. The trace lists the parts involved.
    #[error("cyclic dependency in container [{container}] involving: {}", trace.join(", "))]
    CyclicDependency { container: String, trace: Vec<String> },

    /// Two parts or context entries share a key.
    #[error("duplicate key [{key}] in [{scope}]")]
    DuplicateKey { key: String, scope: String },

    /// No part or ancestor part exports the requested service.
    #[error("no provider for service [{classname}] relative to component [{component}]")]
    ServiceNotFound { classname: String, component: String },

    /// A context lookup used a key the component does not declare.
    #[error("unknown context key [{key}] on component [{component}]")]
    UnknownKey { key: String, component: String },

    /// A context entry exists but is not of the kind the caller asked for.
    #[error("context entry [{key}] on component [{component}] does not resolve to a {expected}")]
    EntryKindMismatch {
        key: String,
        component: String,
        expected: &'static str,
    },

    /// A provider part failed while its container was commissioning.
    #[error("container [{container}] failed to commission provider [{provider}]")]
    ProviderUnavailable {
        container: String,
        provider: String,
        #[source]
        source: Box<ControlError>,
    },

    /// A client reached a component outside its available window.
    #[error("component [{component}] is not available")]
    Unavailable { component: String },

    /// An instance raised an error while a call was delegated to it.
    #[error("delegated invocation failed on component [{component}]")]
    Delegation {
        component: String,
        #[source]
        source: InvocationError,
    },

    /// The handler has been disposed.
    #[error("component [{component}] has been disposed")]
    Disposed { component: String },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
