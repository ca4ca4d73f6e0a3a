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

//! Component runtime.
//!
//! Turns deployment directives and registered types into a live handler
//! tree, orders container parts by their declared dependencies, and drives
//! component lifecycles through their state machines. Clients reach
//! components through availability-gated appliances.

pub mod appliance;
pub mod context;
pub mod controller;
pub mod dependency;
pub mod errors;
pub mod handler;
pub mod parts;
pub mod registry;

pub use appliance::Appliance;
pub use context::{ContextMap, ContextValue};
pub use controller::{ComponentController, ResolvePolicy};
pub use dependency::DependencyGraph;
pub use errors::ControlError;
pub use handler::{AvailabilityListener, ComponentHandler};
pub use parts::PartsTable;
pub use registry::{IncarnationContext, Lifecycle, TypeRegistry};
