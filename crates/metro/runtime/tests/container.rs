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

//! End-to-end container lifecycle coverage: assembly validation, ordered
//! commissioning and decommissioning, rollback on provider failure and
//! appliance availability windows.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;

use metro_model::{
    Activity, ComponentDirective, ContextEntry, EntryDescriptor, TypeDescriptor,
};
use metro_runtime::{
    Appliance, ComponentController, ComponentHandler, ControlError, IncarnationContext, Lifecycle,
    ResolvePolicy, TypeRegistry,
};
use metro_state::{
    Action, Instance, InvocationError, StateError, StateGraph, Transition, TransitionOutcome,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Shared record of every method invocation, as `<path>.<method>`.
#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, path: &str, method: &str) {
        self.0.lock().push(format!("{path}.{method}"));
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn clear(&self) {
        self.0.lock().clear();
    }
}

struct Recorder {
    path: String,
    journal: Journal,
    failing: Vec<String>,
}

impl Instance for Recorder {
    fn invoke(&self, method: &str) -> Result<(), InvocationError> {
        self.journal.record(&self.path, method);
        if self.failing.iter().any(|m| m == method) {
            return Err(format!("{method} failed on {}", self.path).into());
        }
        Ok(())
    }
}

/// Builds recorders wired to a shared journal; selected (path, method) pairs
/// are set up to fail.
#[derive(Default)]
struct RecorderLifecycle {
    journal: Journal,
    failures: Vec<(String, String)>,
}

impl RecorderLifecycle {
    fn new(journal: &Journal) -> Self {
        Self { journal: journal.clone(), failures: Vec::new() }
    }

    fn failing(journal: &Journal, path: &str, method: &str) -> Self {
        Self { journal: journal.clone(), failures: vec![(path.to_string(), method.to_string())] }
    }
}

impl Lifecycle for RecorderLifecycle {
    fn incarnate(&self, context: &IncarnationContext<'_>) -> Result<Arc<dyn Instance>, ControlError> {
        let failing = self
            .failures
            .iter()
            .filter(|(path, _)| path == context.path)
            .map(|(_, method)| method.clone())
            .collect();
        Ok(Arc::new(Recorder {
            path: context.path.to_string(),
            journal: self.journal.clone(),
            failing,
        }))
    }
}

fn registry_with(lifecycle: RecorderLifecycle) -> Arc<TypeRegistry> {
    let lifecycle: Arc<dyn Lifecycle> = Arc::new(lifecycle);
    let registry = Arc::new(TypeRegistry::new());
    registry.register(
        TypeDescriptor::new("test.Container").with_activity(Activity::Startable),
        lifecycle.clone(),
    );
    registry.register(
        TypeDescriptor::new("test.Service")
            .with_service("test.Provider")
            .with_activity(Activity::Startable),
        lifecycle.clone(),
    );
    registry.register(
        TypeDescriptor::new("test.Worker")
            .with_entry(EntryDescriptor::required("provider", "test.Provider"))
            .with_activity(Activity::Startable),
        lifecycle.clone(),
    );
    registry.register(
        TypeDescriptor::new("test.Task").with_activity(Activity::Executable),
        lifecycle,
    );
    registry
}

/// store <- cache <- app, all under one container.
fn container_directive() -> Result<ComponentDirective, ControlError> {
    let directive = ComponentDirective::new("root", "test.Container")
        .with_part(ComponentDirective::new("store", "test.Service"))?
        .with_part(
            ComponentDirective::new("cache", "test.Service")
                .with_entry("backing", ContextEntry::Key("store".to_string()))?,
        )?
        .with_part(
            ComponentDirective::new("app", "test.Worker")
                .with_entry("provider", ContextEntry::Key("cache".to_string()))?
                .with_entry("fallback", ContextEntry::Key("store".to_string()))?,
        )?;
    Ok(directive)
}

fn establish(journal: &Journal) -> Result<Arc<ComponentHandler>> {
    let registry = registry_with(RecorderLifecycle::new(journal));
    Ok(ComponentHandler::establish(&registry, container_directive()?)?)
}

#[test]
fn test_commissioning_brings_providers_up_first() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let handler = establish(&journal)?;
    let controller = ComponentController::new();

    controller.initialize(&handler)?;
    assert!(handler.is_commissioned());
    assert!(handler.is_available());
    assert_eq!(
        journal.entries(),
        vec!["/root/store.start", "/root/cache.start", "/root/app.start", "/root.start"]
    );
    Ok(())
}

#[test]
fn test_decommissioning_stops_parts_before_container() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let handler = establish(&journal)?;
    let controller = ComponentController::new();

    controller.initialize(&handler)?;
    journal.clear();
    controller.terminate(&handler);

    assert!(!handler.is_commissioned());
    assert!(!handler.is_available());
    assert_eq!(
        journal.entries(),
        vec!["/root/app.stop", "/root/cache.stop", "/root/store.stop", "/root.stop"]
    );
    assert_eq!(handler.machine().current_state(), "/");
    Ok(())
}

#[test]
fn test_initialize_is_idempotent() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let handler = establish(&journal)?;
    let controller = ComponentController::new();

    controller.initialize(&handler)?;
    let commissioned = journal.entries();
    controller.initialize(&handler)?;
    assert_eq!(journal.entries(), commissioned);
    Ok(())
}

#[test]
fn test_cyclic_part_dependencies_fail_assembly() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let registry = registry_with(RecorderLifecycle::new(&journal));
    let directive = ComponentDirective::new("root", "test.Container")
        .with_part(
            ComponentDirective::new("a", "test.Service")
                .with_entry("peer", ContextEntry::Key("b".to_string()))?,
        )?
        .with_part(
            ComponentDirective::new("b", "test.Service")
                .with_entry("peer", ContextEntry::Key("a".to_string()))?,
        )?;

    let err = ComponentHandler::establish(&registry, directive).unwrap_err();
    match err {
        ControlError::CyclicDependency { container, trace } => {
            assert_eq!(container, "/root");
            assert_eq!(trace, vec!["a", "b"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn test_missing_required_entry_fails_assembly() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let registry = registry_with(RecorderLifecycle::new(&journal));
    let directive = ComponentDirective::new("root", "test.Container")
        .with_part(ComponentDirective::new("app", "test.Worker"))?;

    let err = ComponentHandler::establish(&registry, directive).unwrap_err();
    assert!(matches!(err, ControlError::MissingContextEntry { .. }));
    assert!(journal.entries().is_empty());
    Ok(())
}

#[test]
fn test_provider_failure_rolls_back_prepared_providers() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let registry = registry_with(RecorderLifecycle::failing(&journal, "/root/cache", "start"));
    let handler = ComponentHandler::establish(&registry, container_directive()?)?;
    let controller = ComponentController::new();

    let err = controller.initialize(&handler).unwrap_err();
    match err {
        ControlError::ProviderUnavailable { container, provider, .. } => {
            assert_eq!(container, "/root");
            assert_eq!(provider, "cache");
        }
        other => panic!("unexpected error: {other}"),
    }
    // store came up, cache failed, store was taken down again
    assert_eq!(journal.entries(), vec!["/root/store.start", "/root/cache.start", "/root/store.stop"]);
    assert!(!handler.is_commissioned());
    assert!(!handler.is_available());
    Ok(())
}

#[test]
fn test_unknown_transition_leaves_state_untouched() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let handler = establish(&journal)?;
    let controller = ComponentController::new();
    controller.initialize(&handler)?;

    let err = controller.apply(&handler, "reboot").unwrap_err();
    assert!(matches!(err, ControlError::State(StateError::UnknownTransition { .. })));
    assert_eq!(handler.machine().current_state(), "/started");
    Ok(())
}

#[test]
fn test_transition_to_current_state_is_a_noop() -> Result<()> {
    init_logging();
    let mut graph = StateGraph::new();
    let here = graph.add_state(StateGraph::ROOT, "here")?;
    graph.add_transition(here, "again", Transition::with_method("here", "touch"))?;
    graph.set_initialization(StateGraph::ROOT, Action::Transition(Transition::new("here")))?;

    let journal = Journal::default();
    let registry = registry_with(RecorderLifecycle::new(&journal));
    registry.register(
        TypeDescriptor::new("test.Loop").with_state_graph(graph),
        Arc::new(RecorderLifecycle::new(&journal)),
    );
    let handler = ComponentHandler::establish(&registry, ComponentDirective::new("loop", "test.Loop"))?;
    let controller = ComponentController::new();
    controller.initialize(&handler)?;
    journal.clear();

    let outcome = controller.apply(&handler, "again")?;
    assert_eq!(outcome, TransitionOutcome::Unchanged);
    assert!(journal.entries().is_empty());
    assert_eq!(handler.machine().current_state(), "/here");
    Ok(())
}

#[test]
fn test_executable_component_runs_once_on_commissioning() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let registry = registry_with(RecorderLifecycle::new(&journal));
    let handler = ComponentHandler::establish(&registry, ComponentDirective::new("task", "test.Task"))?;
    let controller = ComponentController::new();

    controller.initialize(&handler)?;
    assert_eq!(journal.entries(), vec!["/task.execute"]);
    assert_eq!(handler.machine().current_state(), "/");
    Ok(())
}

#[test]
fn test_appliance_tracks_the_availability_window() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let handler = establish(&journal)?;
    let controller = ComponentController::new();

    let appliance = controller.proxy(&handler)?;
    assert!(appliance.is_available());
    appliance.invoke("ping").unwrap();

    controller.terminate(&handler);
    assert!(!appliance.is_available());
    let err = appliance.invoke("ping").unwrap_err();
    assert!(err.to_string().contains("not available"));

    // the same appliance comes back once the component is re-commissioned
    controller.initialize(&handler)?;
    assert!(appliance.is_available());
    appliance.invoke("ping").unwrap();
    Ok(())
}

#[test]
fn test_released_appliance_rejects_calls_and_deregisters() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let handler = establish(&journal)?;
    let controller = ComponentController::new();

    let appliance = controller.proxy(&handler)?;
    let other = controller.proxy(&handler)?;
    assert_eq!(handler.availability_listener_count(), 2);

    controller.release(&appliance);
    assert_eq!(handler.availability_listener_count(), 1);
    assert!(!appliance.is_available());
    assert!(appliance.invoke("ping").is_err());

    // outstanding appliances are untouched
    assert!(other.is_available());
    other.invoke("ping").unwrap();
    Ok(())
}

#[test]
fn test_resolve_commissions_on_demand() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let handler = establish(&journal)?;
    let controller = ComponentController::new();

    let instance = controller.resolve(&handler, ResolvePolicy::Direct)?;
    assert!(handler.is_commissioned());
    instance.invoke("ping").unwrap();
    assert!(journal.entries().contains(&"/root.ping".to_string()));

    let isolated = controller.resolve(&handler, ResolvePolicy::Isolated)?;
    isolated.invoke("ping").unwrap();
    Ok(())
}

#[test]
fn test_appliance_exposes_component_services() -> Result<()> {
    init_logging();
    let journal = Journal::default();
    let registry = registry_with(RecorderLifecycle::new(&journal));
    let handler = ComponentHandler::establish(&registry, ComponentDirective::new("store", "test.Service"))?;
    let appliance = Appliance::new(&handler);
    assert!(appliance.handles("test.Provider"));
    assert!(!appliance.handles("test.Other"));
    assert_eq!(appliance.component(), "/store");
    Ok(())
}

#[test]
fn test_operations_execute_without_changing_state() -> Result<()> {
    init_logging();
    let mut graph = StateGraph::startable();
    graph.add_operation(StateGraph::ROOT, "report", metro_state::Operation::new("report"))?;

    let journal = Journal::default();
    let registry = registry_with(RecorderLifecycle::new(&journal));
    registry.register(
        TypeDescriptor::new("test.Monitored").with_state_graph(graph),
        Arc::new(RecorderLifecycle::new(&journal)),
    );
    let handler =
        ComponentHandler::establish(&registry, ComponentDirective::new("mon", "test.Monitored"))?;
    let controller = ComponentController::new();
    controller.initialize(&handler)?;

    controller.execute(&handler, "report")?;
    assert_eq!(handler.machine().current_state(), "/started");
    assert_eq!(journal.entries(), vec!["/mon.start", "/mon.report"]);
    Ok(())
}
