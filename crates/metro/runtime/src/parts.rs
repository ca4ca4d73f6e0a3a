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

//! Container part bookkeeping.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::errors::ControlError;
use crate::handler::ComponentHandler;

/// Named child handlers of a container, in declaration order.
#[derive(Default)]
pub struct PartsTable {
    entries: RwLock<Vec<(String, Arc<ComponentHandler>)>>,
}

impl PartsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, name: &str, handler: Arc<ComponentHandler>, scope: &str) -> Result<(), ControlError> {
        let mut entries = self.entries.write();
        if entries.iter().any(|(n, _)| n == name) {
            return Err(ControlError::DuplicateKey { key: name.to_string(), scope: scope.to_string() });
        }
        entries.push((name.to_string(), handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ComponentHandler>> {
        self.entries.read().iter().find(|(n, _)| n == name).map(|(_, h)| h.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn handlers(&self) -> Vec<Arc<ComponentHandler>> {
        self.entries.read().iter().map(|(_, h)| h.clone()).collect()
    }

    /// Handlers whose type exports the requested service classname.
    pub fn candidates(&self, classname: &str) -> Vec<Arc<ComponentHandler>> {
        self.entries
            .read()
            .iter()
            .filter(|(_, h)| h.descriptor().exports(classname))
            .map(|(_, h)| h.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
