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

//! Part dependency ordering.
//!
//! Containers commission their parts providers-first and decommission them in
//! the exact reverse order. The ordering is deterministic: parts with no
//! pending providers are emitted in registration order.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::errors::ControlError;

/// Directed dependency graph over part names. Edges run from provider to
/// consumer.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    registration: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a part. Registration order breaks ties during ordering.
    pub fn add_node(&mut self, name: &str) {
        if self.nodes.contains_key(name) {
            return;
        }
        let index = self.graph.add_node(name.to_string());
        self.nodes.insert(name.to_string(), index);
        self.registration.push(name.to_string());
    }

    /// Record that `consumer` depends on `provider`. Both parts must be
    /// registered.
    pub fn add_dependency(&mut self, consumer: &str, provider: &str, container: &str) -> Result<(), ControlError> {
        let provider_index = *self.nodes.get(provider).ok_or_else(|| ControlError::UnknownKey {
            key: provider.to_string(),
            component: container.to_string(),
        })?;
        let consumer_index = *self.nodes.get(consumer).ok_or_else(|| ControlError::UnknownKey {
            key: consumer.to_string(),
            component: container.to_string(),
        })?;
        if !self.graph.contains_edge(provider_index, consumer_index) {
            self.graph.add_edge(provider_index, consumer_index, ());
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.registration.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registration.is_empty()
    }

    /// Startup order: every part appears after all of its providers. A cycle
    /// yields an error tracing the parts that could not be ordered.
    pub fn startup_order(&self, container: &str) -> Result<Vec<String>, ControlError> {
        let mut pending: HashMap<&str, usize> = HashMap::new();
        for name in &self.registration {
            let index = self.nodes[name];
            let providers = self.graph.neighbors_directed(index, petgraph::Direction::Incoming).count();
            pending.insert(name.as_str(), providers);
        }

        let mut order = Vec::with_capacity(self.registration.len());
        while order.len() < self.registration.len() {
            let mut progressed = false;
            for name in &self.registration {
                if pending.get(name.as_str()).copied() != Some(0) {
                    continue;
                }
                pending.remove(name.as_str());
                order.push(name.clone());
                progressed = true;
                let index = self.nodes[name];
                for consumer in self.graph.neighbors_directed(index, petgraph::Direction::Outgoing) {
                    if let Some(count) = pending.get_mut(self.graph[consumer].as_str()) {
                        *count -= 1;
                    }
                }
            }
            if !progressed {
                let trace: Vec<String> = self
                    .registration
                    .iter()
                    .filter(|name| pending.contains_key(name.as_str()))
                    .cloned()
                    .collect();
                return Err(ControlError::CyclicDependency { container: container.to_string(), trace });
            }
        }
        Ok(order)
    }

    /// Shutdown order: the exact reverse of [`startup_order`].
    ///
    /// [`startup_order`]: DependencyGraph::startup_order
    pub fn shutdown_order(&self, container: &str) -> Result<Vec<String>, ControlError> {
        let mut order = self.startup_order(container)?;
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(names: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for name in names {
            graph.add_node(name);
        }
        graph
    }

    #[test]
    fn test_independent_parts_keep_registration_order() {
        let graph = graph_of(&["c", "a", "b"]);
        assert_eq!(graph.startup_order("/").unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_providers_precede_consumers() {
        let mut graph = graph_of(&["app", "store", "cache"]);
        graph.add_dependency("app", "store", "/").unwrap();
        graph.add_dependency("app", "cache", "/").unwrap();
        graph.add_dependency("cache", "store", "/").unwrap();
        assert_eq!(graph.startup_order("/").unwrap(), vec!["store", "cache", "app"]);
    }

    #[test]
    fn test_shutdown_is_exact_reverse_of_startup() {
        let mut graph = graph_of(&["app", "store", "cache"]);
        graph.add_dependency("app", "store", "/").unwrap();
        graph.add_dependency("cache", "store", "/").unwrap();
        let mut startup = graph.startup_order("/").unwrap();
        startup.reverse();
        assert_eq!(graph.shutdown_order("/").unwrap(), startup);
    }

    #[test]
    fn test_cycle_reported_with_trace() {
        let mut graph = graph_of(&["a", "b", "c"]);
        graph.add_dependency("a", "b", "/").unwrap();
        graph.add_dependency("b", "a", "/").unwrap();
        let err = graph.startup_order("/").unwrap_err();
        match err {
            ControlError::CyclicDependency { trace, .. } => {
                assert_eq!(trace, vec!["a", "b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_dependency_on_unregistered_part_rejected() {
        let mut graph = graph_of(&["a"]);
        let err = graph.add_dependency("a", "ghost", "/").unwrap_err();
        assert!(matches!(err, ControlError::UnknownKey { .. }));
    }
}
