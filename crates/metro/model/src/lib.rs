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

//! Component meta-model.
//!
//! Directives are declared deployment data: what components exist, how they
//! nest, and what values feed their contexts. Descriptors are declared type
//! data: the services a class exposes, the context entries it requires and
//! the lifecycle activity it exhibits. The runtime combines both to build
//! handlers.

pub mod descriptor;
pub mod directive;
pub mod errors;
pub mod policies;

pub use descriptor::{Activity, EntryDescriptor, ServiceDescriptor, TypeDescriptor};
pub use directive::{
    CategoryDirective, ComponentDirective, ContextDirective, ContextEntry, PartsDirective, Value,
};
pub use errors::ModelError;
pub use policies::{ActivationPolicy, CollectionPolicy, LifestylePolicy};
