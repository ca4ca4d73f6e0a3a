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

//! Type descriptors.

use serde::{Deserialize, Serialize};

use metro_state::StateGraph;

/// A service contract a type exports, addressed by classname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub classname: String,
}

impl ServiceDescriptor {
    pub fn new(classname: &str) -> Self {
        Self { classname: classname.to_string() }
    }

    pub fn matches(&self, classname: &str) -> bool {
        self.classname == classname
    }
}

/// A context entry a type consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDescriptor {
    pub key: String,
    pub classname: String,
    #[serde(default)]
    pub optional: bool,
}

impl EntryDescriptor {
    pub fn required(key: &str, classname: &str) -> Self {
        Self { key: key.to_string(), classname: classname.to_string(), optional: false }
    }

    pub fn optional(key: &str, classname: &str) -> Self {
        Self { key: key.to_string(), classname: classname.to_string(), optional: true }
    }
}

/// Intrinsic lifecycle activity of a type, used to select a default state
/// graph when none is declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    #[default]
    None,
    Startable,
    Executable,
}

/// Declared capabilities of a component type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub classname: String,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(default)]
    pub context: Vec<EntryDescriptor>,
    #[serde(default)]
    pub threadsafe: bool,
    #[serde(default)]
    pub activity: Activity,
    /// Explicit graph overriding the activity-derived default.
    #[serde(default)]
    pub state_graph: Option<StateGraph>,
}

impl TypeDescriptor {
    pub fn new(classname: &str) -> Self {
        Self {
            classname: classname.to_string(),
            services: Vec::new(),
            context: Vec::new(),
            threadsafe: false,
            activity: Activity::None,
            state_graph: None,
        }
    }

    pub fn with_service(mut self, classname: &str) -> Self {
        self.services.push(ServiceDescriptor::new(classname));
        self
    }

    pub fn with_entry(mut self, entry: EntryDescriptor) -> Self {
        self.context.push(entry);
        self
    }

    pub fn threadsafe(mut self) -> Self {
        self.threadsafe = true;
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activity = activity;
        self
    }

    pub fn with_state_graph(mut self, graph: StateGraph) -> Self {
        self.state_graph = Some(graph);
        self
    }

    /// Whether the type exports a service matching the classname.
    pub fn exports(&self, classname: &str) -> bool {
        self.services.iter().any(|s| s.matches(classname))
    }

    /// Entries the runtime must be able to satisfy before construction.
    pub fn required_entries(&self) -> impl Iterator<Item = &EntryDescriptor> {
        self.context.iter().filter(|e| !e.optional)
    }

    /// The graph driving instances of this type: the declared graph when
    /// present, otherwise a default derived from the activity.
    pub fn lifecycle_graph(&self) -> StateGraph {
        match &self.state_graph {
            Some(graph) => graph.clone(),
            None => match self.activity {
                Activity::None => StateGraph::null_graph(),
                Activity::Startable => StateGraph::startable(),
                Activity::Executable => StateGraph::executable(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports_matches_by_classname() {
        let descriptor = TypeDescriptor::new("acme.Server").with_service("acme.Service");
        assert!(descriptor.exports("acme.Service"));
        assert!(!descriptor.exports("acme.Other"));
    }

    #[test]
    fn test_required_entries_skip_optional() {
        let descriptor = TypeDescriptor::new("acme.Server")
            .with_entry(EntryDescriptor::required("store", "acme.Store"))
            .with_entry(EntryDescriptor::optional("cache", "acme.Cache"));
        let keys: Vec<_> = descriptor.required_entries().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["store"]);
    }

    #[test]
    fn test_lifecycle_graph_derived_from_activity() {
        let startable = TypeDescriptor::new("acme.Server").with_activity(Activity::Startable);
        let graph = startable.lifecycle_graph();
        assert!(graph.find_state(StateGraph::ROOT, "started").is_ok());

        let passive = TypeDescriptor::new("acme.Value");
        assert!(passive.lifecycle_graph().is_terminal(StateGraph::ROOT));
    }

    #[test]
    fn test_explicit_graph_wins_over_activity() {
        let mut graph = StateGraph::new();
        graph.add_state(StateGraph::ROOT, "custom").unwrap();
        let descriptor = TypeDescriptor::new("acme.Server")
            .with_activity(Activity::Startable)
            .with_state_graph(graph);
        assert!(descriptor.lifecycle_graph().find_state(StateGraph::ROOT, "custom").is_ok());
    }
}
