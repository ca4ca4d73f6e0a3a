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

//! Deployment directives.
//!
//! A component directive names a component, binds it to a type and declares
//! its policies, context entries and nested parts. Directives are pure data;
//! resolution of lookups and sibling keys happens in the runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ModelError;
use crate::policies::{ActivationPolicy, CollectionPolicy, LifestylePolicy};

/// A literal context value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// One declared context entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContextEntry {
    /// A literal value.
    Value(Value),
    /// A service looked up in the enclosing container by classname.
    Lookup(String),
    /// An anonymous nested component supplying the entry.
    Component(Box<ComponentDirective>),
    /// The service of a named sibling part.
    Key(String),
}

/// Context entries keyed by entry name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDirective {
    entries: BTreeMap<String, ContextEntry>,
}

impl ContextDirective {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, entry: ContextEntry) -> Result<(), ModelError> {
        if self.entries.contains_key(key) {
            return Err(ModelError::DuplicateKey { key: key.to_string(), scope: "context".to_string() });
        }
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ContextEntry> {
        self.entries.get(key)
    }

    /// Like [`get`](Self::get), reporting a miss as an error.
    pub fn entry(&self, key: &str) -> Result<&ContextEntry, ModelError> {
        self.entries
            .get(key)
            .ok_or_else(|| ModelError::UnknownKey { key: key.to_string(), scope: "context".to_string() })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Logging category assignment for a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDirective {
    pub name: String,
    pub priority: String,
}

/// Nested component declarations, keyed by component name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartsDirective {
    components: Vec<ComponentDirective>,
}

impl PartsDirective {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, component: ComponentDirective) -> Result<(), ModelError> {
        if self.components.iter().any(|c| c.name == component.name) {
            return Err(ModelError::DuplicateKey { key: component.name, scope: "parts".to_string() });
        }
        self.components.push(component);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ComponentDirective> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Like [`get`](Self::get), reporting a miss as an error.
    pub fn part(&self, name: &str) -> Result<&ComponentDirective, ModelError> {
        self.components
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ModelError::UnknownKey { key: name.to_string(), scope: "parts".to_string() })
    }

    /// Directives in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDirective> {
        self.components.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }
}

/// Declared deployment of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDirective {
    pub name: String,
    pub classname: String,
    #[serde(default)]
    pub lifestyle: LifestylePolicy,
    #[serde(default)]
    pub collection: CollectionPolicy,
    #[serde(default)]
    pub activation: ActivationPolicy,
    #[serde(default)]
    pub categories: Vec<CategoryDirective>,
    #[serde(default)]
    pub context: ContextDirective,
    #[serde(default)]
    pub parts: PartsDirective,
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
}

impl ComponentDirective {
    pub fn new(name: &str, classname: &str) -> Self {
        Self {
            name: name.to_string(),
            classname: classname.to_string(),
            lifestyle: LifestylePolicy::default(),
            collection: CollectionPolicy::default(),
            activation: ActivationPolicy::default(),
            categories: Vec::new(),
            context: ContextDirective::new(),
            parts: PartsDirective::new(),
            configuration: None,
        }
    }

    pub fn with_lifestyle(mut self, lifestyle: LifestylePolicy) -> Self {
        self.lifestyle = lifestyle;
        self
    }

    pub fn with_collection(mut self, collection: CollectionPolicy) -> Self {
        self.collection = collection;
        self
    }

    pub fn with_activation(mut self, activation: ActivationPolicy) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_entry(mut self, key: &str, entry: ContextEntry) -> Result<Self, ModelError> {
        self.context.set(key, entry)?;
        Ok(self)
    }

    pub fn with_part(mut self, part: ComponentDirective) -> Result<Self, ModelError> {
        self.parts.add(part)?;
        Ok(self)
    }

    pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = Some(configuration);
        self
    }
}
