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

//! Runtime context resolution.
//!
//! A context map binds the entry keys a component consumes to their runtime
//! values. Literal entries resolve immediately; key and lookup entries
//! resolve lazily against the handler tree, so providers only incarnate when
//! a consumer actually pulls the entry.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use metro_model::{ContextEntry, Value};
use metro_state::Instance;

use crate::errors::ControlError;
use crate::handler::ComponentHandler;

/// A resolved context entry.
pub enum ContextValue {
    Literal(Value),
    Service(Arc<dyn Instance>),
}

/// Entry keys bound to their resolution strategy for one handler.
pub struct ContextMap {
    component: String,
    owner: Weak<ComponentHandler>,
    entries: BTreeMap<String, ContextEntry>,
}

impl ContextMap {
    pub(crate) fn new(component: &str, owner: Weak<ComponentHandler>, entries: BTreeMap<String, ContextEntry>) -> Self {
        Self { component: component.to_string(), owner, entries }
    }

    pub fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolve an entry to its runtime value.
    pub fn value(&self, key: &str) -> Result<ContextValue, ControlError> {
        let entry = self.entries.get(key).ok_or_else(|| ControlError::UnknownKey {
            key: key.to_string(),
            component: self.component.clone(),
        })?;
        match entry {
            ContextEntry::Value(value) => Ok(ContextValue::Literal(value.clone())),
            ContextEntry::Key(name) => {
                let provider = self.provider_by_name(name)?;
                Ok(ContextValue::Service(provider.resolve_instance()?))
            }
            ContextEntry::Lookup(classname) => {
                let owner = self.owner()?;
                let provider = owner.lookup(classname).ok_or_else(|| ControlError::ServiceNotFound {
                    classname: classname.clone(),
                    component: self.component.clone(),
                })?;
                Ok(ContextValue::Service(provider.resolve_instance()?))
            }
            // anonymous component entries are rewritten to part references
            // while the handler tree is assembled
            ContextEntry::Component(_) => Err(ControlError::UnknownKey {
                key: key.to_string(),
                component: self.component.clone(),
            }),
        }
    }

    /// Convenience accessor for literal entries.
    pub fn literal(&self, key: &str) -> Result<Value, ControlError> {
        match self.value(key)? {
            ContextValue::Literal(value) => Ok(value),
            ContextValue::Service(_) => Err(self.kind_mismatch(key, "value")),
        }
    }

    /// Convenience accessor for service entries.
    pub fn service(&self, key: &str) -> Result<Arc<dyn Instance>, ControlError> {
        match self.value(key)? {
            ContextValue::Service(instance) => Ok(instance),
            ContextValue::Literal(_) => Err(self.kind_mismatch(key, "service")),
        }
    }

    fn kind_mismatch(&self, key: &str, expected: &'static str) -> ControlError {
        ControlError::EntryKindMismatch {
            key: key.to_string(),
            component: self.component.clone(),
            expected,
        }
    }

    /// A part reference resolves against the owner's own parts first, then
    /// against its siblings.
    fn provider_by_name(&self, name: &str) -> Result<Arc<ComponentHandler>, ControlError> {
        let owner = self.owner()?;
        if let Some(part) = owner.part(name) {
            return Ok(part);
        }
        if let Some(parent) = owner.parent() {
            if let Some(sibling) = parent.part(name) {
                return Ok(sibling);
            }
        }
        Err(ControlError::UnknownKey { key: name.to_string(), component: self.component.clone() })
    }

    fn owner(&self) -> Result<Arc<ComponentHandler>, ControlError> {
        self.owner
            .upgrade()
            .ok_or_else(|| ControlError::Disposed { component: self.component.clone() })
    }
}
