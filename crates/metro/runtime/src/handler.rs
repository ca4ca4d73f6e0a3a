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

//! Component handlers.
//!
//! A handler binds one deployment directive to its registered type and owns
//! everything the component needs at runtime: its context map, its child
//! parts, its dependency ordering, its state machine and the instances it
//! hands out. Handlers form a tree mirroring the directive hierarchy.

use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;

use metro_model::{CollectionPolicy, ComponentDirective, ContextEntry, LifestylePolicy, TypeDescriptor};
use metro_state::{Instance, StateMachine};

use crate::context::ContextMap;
use crate::dependency::DependencyGraph;
use crate::errors::ControlError;
use crate::parts::PartsTable;
use crate::registry::{IncarnationContext, Lifecycle, TypeRegistry};

/// Observer of a handler's availability window.
pub trait AvailabilityListener: Send + Sync {
    fn availability_changed(&self, available: bool);
}

/// How a slot retains the instance it produced.
enum Retained {
    Hard(Arc<dyn Instance>),
    Collectable(Weak<dyn Instance>),
}

impl Retained {
    fn get(&self) -> Option<Arc<dyn Instance>> {
        match self {
            Self::Hard(instance) => Some(instance.clone()),
            Self::Collectable(instance) => instance.upgrade(),
        }
    }
}

/// Instance storage per lifestyle policy.
enum InstanceHolder {
    Singleton(Mutex<Option<Retained>>),
    Thread(Mutex<HashMap<ThreadId, Retained>>),
    Transient(Mutex<Vec<Weak<dyn Instance>>>),
}

/// Runtime handler for one component.
pub struct ComponentHandler {
    name: String,
    path: String,
    directive: ComponentDirective,
    descriptor: TypeDescriptor,
    lifecycle: Arc<dyn Lifecycle>,
    registry: Arc<TypeRegistry>,
    parent: Weak<ComponentHandler>,
    parts: PartsTable,
    dependencies: Mutex<DependencyGraph>,
    context: ContextMap,
    machine: StateMachine,
    holder: InstanceHolder,
    primary: Mutex<Option<Arc<dyn Instance>>>,
    lifecycle_lock: Mutex<()>,
    commissioned: AtomicBool,
    available: AtomicBool,
    disposed: AtomicBool,
    listeners: Mutex<Vec<(u64, Weak<dyn AvailabilityListener>)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for ComponentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentHandler")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ComponentHandler {
    /// Build the handler tree for a top-level directive.
    pub fn establish(registry: &Arc<TypeRegistry>, directive: ComponentDirective) -> Result<Arc<Self>, ControlError> {
        Self::build(registry, directive, Weak::new(), "")
    }

    fn build(
        registry: &Arc<TypeRegistry>,
        directive: ComponentDirective,
        parent: Weak<Self>,
        parent_path: &str,
    ) -> Result<Arc<Self>, ControlError> {
        let descriptor = registry.descriptor(&directive.classname)?;
        let lifecycle = registry.lifecycle(&directive.classname)?;
        let path = format!("{parent_path}/{}", directive.name);

        for entry in descriptor.required_entries() {
            if directive.context.get(&entry.key).is_none() {
                return Err(ControlError::MissingContextEntry { component: path, key: entry.key.clone() });
            }
        }

        let graph = descriptor.lifecycle_graph();
        graph.validate()?;

        let holder = match directive.lifestyle {
            LifestylePolicy::Singleton => InstanceHolder::Singleton(Mutex::new(None)),
            LifestylePolicy::Thread => InstanceHolder::Thread(Mutex::new(HashMap::new())),
            LifestylePolicy::Transient => InstanceHolder::Transient(Mutex::new(Vec::new())),
        };

        // anonymous component entries become internal parts named after their
        // entry key; the map records the reference, populate() builds the part
        let entries: BTreeMap<String, ContextEntry> = directive
            .context
            .iter()
            .map(|(key, entry)| match entry {
                ContextEntry::Component(_) => (key.to_string(), ContextEntry::Key(key.to_string())),
                other => (key.to_string(), other.clone()),
            })
            .collect();

        let handler = Arc::new_cyclic(|weak: &Weak<Self>| Self {
            name: directive.name.clone(),
            context: ContextMap::new(&path, weak.clone(), entries),
            machine: StateMachine::new(Arc::new(graph)),
            path: path.clone(),
            directive,
            descriptor,
            lifecycle,
            registry: registry.clone(),
            parent,
            parts: PartsTable::new(),
            dependencies: Mutex::new(DependencyGraph::new()),
            holder,
            primary: Mutex::new(None),
            lifecycle_lock: Mutex::new(()),
            commissioned: AtomicBool::new(false),
            available: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        });
        Self::populate(&handler)?;
        debug!(path = %handler.path, class = %handler.directive.classname, "handler established");
        Ok(handler)
    }

    /// Second construction phase: children need a weak reference back to the
    /// handler, so they are only built once the handler itself exists.
    fn populate(handler: &Arc<Self>) -> Result<(), ControlError> {
        for (key, entry) in handler.directive.context.iter() {
            if let ContextEntry::Component(inner) = entry {
                let mut inner = (**inner).clone();
                inner.name = key.to_string();
                let child = Self::build(&handler.registry, inner, Arc::downgrade(handler), &handler.path)?;
                handler.parts.add(key, child, &handler.path)?;
            }
        }
        for part in handler.directive.parts.iter() {
            let child = Self::build(&handler.registry, part.clone(), Arc::downgrade(handler), &handler.path)?;
            handler.parts.add(&part.name, child, &handler.path)?;
        }

        let mut dependencies = DependencyGraph::new();
        for name in handler.parts.names() {
            dependencies.add_node(&name);
        }
        for part in handler.parts.handlers() {
            for (_, entry) in part.directive().context.iter() {
                match entry {
                    ContextEntry::Key(provider) => {
                        // a key entry satisfied by the part's own internal
                        // parts is not a sibling dependency
                        if part.part(provider).is_none()
                            && dependencies.contains(provider)
                            && provider != part.name()
                        {
                            dependencies.add_dependency(part.name(), provider, &handler.path)?;
                        }
                    }
                    ContextEntry::Lookup(classname) => {
                        for candidate in handler.parts.candidates(classname) {
                            if candidate.name() != part.name() {
                                dependencies.add_dependency(part.name(), candidate.name(), &handler.path)?;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        // cycles are fatal at assembly time, not at commissioning time
        dependencies.startup_order(&handler.path)?;
        *handler.dependencies.lock() = dependencies;
        Ok(())
    }

    //---------------------------------------------------------------------
    // structure
    //---------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn directive(&self) -> &ComponentDirective {
        &self.directive
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn parent(&self) -> Option<Arc<ComponentHandler>> {
        self.parent.upgrade()
    }

    pub fn part(&self, name: &str) -> Option<Arc<ComponentHandler>> {
        self.parts.get(name)
    }

    pub fn part_names(&self) -> Vec<String> {
        self.parts.names()
    }

    /// A handler is a container when it manages parts.
    pub fn is_container(&self) -> bool {
        !self.parts.is_empty()
    }

    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Find the nearest handler exporting a service classname: own parts
    /// first, then each enclosing container's parts.
    pub fn lookup(&self, classname: &str) -> Option<Arc<ComponentHandler>> {
        if let Some(candidate) = self.parts.candidates(classname).into_iter().next() {
            return Some(candidate);
        }
        self.parent().and_then(|parent| parent.lookup(classname))
    }

    pub(crate) fn startup_order(&self) -> Result<Vec<String>, ControlError> {
        self.dependencies.lock().startup_order(&self.path)
    }

    pub(crate) fn shutdown_order(&self) -> Result<Vec<String>, ControlError> {
        self.dependencies.lock().shutdown_order(&self.path)
    }

    //---------------------------------------------------------------------
    // instances
    //---------------------------------------------------------------------

    /// Resolve an instance under the component's lifestyle policy.
    pub fn resolve_instance(&self) -> Result<Arc<dyn Instance>, ControlError> {
        self.check_disposed()?;
        match &self.holder {
            InstanceHolder::Singleton(slot) => {
                let mut slot = slot.lock();
                if let Some(instance) = slot.as_ref().and_then(Retained::get) {
                    return Ok(instance);
                }
                let instance = self.incarnate()?;
                *slot = Some(self.retain(&instance));
                Ok(instance)
            }
            InstanceHolder::Thread(map) => {
                let thread = thread::current().id();
                let mut map = map.lock();
                if let Some(instance) = map.get(&thread).and_then(Retained::get) {
                    return Ok(instance);
                }
                let instance = self.incarnate()?;
                map.insert(thread, self.retain(&instance));
                Ok(instance)
            }
            InstanceHolder::Transient(list) => {
                let instance = self.incarnate()?;
                let mut list = list.lock();
                list.retain(|entry| entry.upgrade().is_some());
                list.push(Arc::downgrade(&instance));
                Ok(instance)
            }
        }
    }

    fn incarnate(&self) -> Result<Arc<dyn Instance>, ControlError> {
        let context = IncarnationContext {
            path: &self.path,
            context: &self.context,
            configuration: self.directive.configuration.as_ref(),
        };
        self.lifecycle.incarnate(&context)
    }

    /// Number of instances the holder can still reach. Collectable slots and
    /// transient instances drop out of the count once their clients let go.
    pub fn active_instances(&self) -> usize {
        match &self.holder {
            InstanceHolder::Singleton(slot) => {
                usize::from(slot.lock().as_ref().and_then(Retained::get).is_some())
            }
            InstanceHolder::Thread(map) => {
                map.lock().values().filter(|entry| entry.get().is_some()).count()
            }
            InstanceHolder::Transient(list) => {
                let mut list = list.lock();
                list.retain(|entry| entry.upgrade().is_some());
                list.len()
            }
        }
    }

    fn retain(&self, instance: &Arc<dyn Instance>) -> Retained {
        let hard = match self.directive.collection {
            CollectionPolicy::Hard => true,
            CollectionPolicy::Soft | CollectionPolicy::Weak => false,
            // the runtime pins top-level instances and lets nested ones go
            CollectionPolicy::System => self.parent.upgrade().is_none(),
        };
        if hard {
            Retained::Hard(instance.clone())
        } else {
            Retained::Collectable(Arc::downgrade(instance))
        }
    }

    pub(crate) fn primary(&self) -> Option<Arc<dyn Instance>> {
        self.primary.lock().clone()
    }

    pub(crate) fn set_primary(&self, instance: Option<Arc<dyn Instance>>) {
        *self.primary.lock() = instance;
    }

    //---------------------------------------------------------------------
    // lifecycle bookkeeping
    //---------------------------------------------------------------------

    pub(crate) fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle_lock.lock()
    }

    pub fn is_commissioned(&self) -> bool {
        self.commissioned.load(Ordering::SeqCst)
    }

    pub(crate) fn set_commissioned(&self, commissioned: bool) {
        self.commissioned.store(commissioned, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    pub(crate) fn set_available(&self, available: bool) {
        if self.available.swap(available, Ordering::SeqCst) == available {
            return;
        }
        let mut listeners = self.listeners.lock();
        listeners.retain(|(_, entry)| entry.upgrade().is_some());
        let held: Vec<_> = listeners.iter().filter_map(|(_, entry)| entry.upgrade()).collect();
        drop(listeners);
        for listener in held {
            listener.availability_changed(available);
        }
    }

    /// Register an availability listener. The returned token deregisters it.
    pub fn add_availability_listener(&self, listener: &Arc<dyn AvailabilityListener>) -> u64 {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().push((id, Arc::downgrade(listener)));
        id
    }

    pub fn remove_availability_listener(&self, id: u64) {
        self.listeners.lock().retain(|(held, _)| *held != id);
    }

    pub fn availability_listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|(_, entry)| entry.upgrade().is_some());
        listeners.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn check_disposed(&self) -> Result<(), ControlError> {
        if self.is_disposed() {
            Err(ControlError::Disposed { component: self.path.clone() })
        } else {
            Ok(())
        }
    }

    /// Release the handler and its parts. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        for part in self.parts.handlers() {
            part.dispose();
        }
        self.set_primary(None);
        self.machine.dispose();
        self.listeners.lock().clear();
        self.parts.clear();
        debug!(path = %self.path, "handler disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metro_model::{Activity, EntryDescriptor, Value};
    use metro_state::InvocationError;

    struct Probe;

    impl Instance for Probe {
        fn invoke(&self, _method: &str) -> Result<(), InvocationError> {
            Ok(())
        }
    }

    struct ProbeLifecycle;

    impl Lifecycle for ProbeLifecycle {
        fn incarnate(&self, _context: &IncarnationContext<'_>) -> Result<Arc<dyn Instance>, ControlError> {
            Ok(Arc::new(Probe))
        }
    }

    fn registry() -> Arc<TypeRegistry> {
        let registry = Arc::new(TypeRegistry::new());
        registry.register(
            TypeDescriptor::new("acme.Container").with_activity(Activity::Startable),
            Arc::new(ProbeLifecycle),
        );
        registry.register(
            TypeDescriptor::new("acme.Store").with_service("acme.StoreService"),
            Arc::new(ProbeLifecycle),
        );
        registry.register(
            TypeDescriptor::new("acme.App").with_entry(EntryDescriptor::required("store", "acme.StoreService")),
            Arc::new(ProbeLifecycle),
        );
        registry
    }

    fn container_directive() -> ComponentDirective {
        ComponentDirective::new("root", "acme.Container")
            .with_part(ComponentDirective::new("store", "acme.Store"))
            .unwrap()
            .with_part(
                ComponentDirective::new("app", "acme.App")
                    .with_entry("store", ContextEntry::Key("store".to_string()))
                    .unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn test_paths_follow_the_directive_hierarchy() {
        let handler = ComponentHandler::establish(&registry(), container_directive()).unwrap();
        assert_eq!(handler.path(), "/root");
        assert!(handler.is_container());
        let app = handler.part("app").unwrap();
        assert_eq!(app.path(), "/root/app");
        assert!(!app.is_container());
        assert_eq!(app.parent().unwrap().path(), "/root");
    }

    #[test]
    fn test_missing_required_entry_fails_assembly() {
        let directive = ComponentDirective::new("root", "acme.Container")
            .with_part(ComponentDirective::new("app", "acme.App"))
            .unwrap();
        let err = ComponentHandler::establish(&registry(), directive).unwrap_err();
        match err {
            ControlError::MissingContextEntry { component, key } => {
                assert_eq!(component, "/root/app");
                assert_eq!(key, "store");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_classname_fails_assembly() {
        let directive = ComponentDirective::new("root", "acme.Ghost");
        let err = ComponentHandler::establish(&registry(), directive).unwrap_err();
        assert!(matches!(err, ControlError::UnknownType { .. }));
    }

    #[test]
    fn test_key_entries_register_sibling_dependencies() {
        let handler = ComponentHandler::establish(&registry(), container_directive()).unwrap();
        assert_eq!(handler.startup_order().unwrap(), vec!["store", "app"]);
        assert_eq!(handler.shutdown_order().unwrap(), vec!["app", "store"]);
    }

    #[test]
    fn test_cyclic_sibling_dependencies_fail_assembly() {
        let registry = registry();
        registry.register(TypeDescriptor::new("acme.Peer"), Arc::new(ProbeLifecycle));
        let directive = ComponentDirective::new("root", "acme.Container")
            .with_part(
                ComponentDirective::new("a", "acme.Peer")
                    .with_entry("peer", ContextEntry::Key("b".to_string()))
                    .unwrap(),
            )
            .unwrap()
            .with_part(
                ComponentDirective::new("b", "acme.Peer")
                    .with_entry("peer", ContextEntry::Key("a".to_string()))
                    .unwrap(),
            )
            .unwrap();
        let err = ComponentHandler::establish(&registry, directive).unwrap_err();
        assert!(matches!(err, ControlError::CyclicDependency { .. }));
    }

    #[test]
    fn test_singleton_lifestyle_shares_one_instance() {
        let registry = registry();
        let directive = ComponentDirective::new("store", "acme.Store").with_lifestyle(LifestylePolicy::Singleton);
        let handler = ComponentHandler::establish(&registry, directive).unwrap();
        let first = handler.resolve_instance().unwrap();
        let second = handler.resolve_instance().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_transient_lifestyle_hands_out_fresh_instances() {
        let registry = registry();
        let directive = ComponentDirective::new("store", "acme.Store");
        let handler = ComponentHandler::establish(&registry, directive).unwrap();
        let first = handler.resolve_instance().unwrap();
        let second = handler.resolve_instance().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_active_instances_tracks_live_clients() {
        let registry = registry();
        let directive = ComponentDirective::new("store", "acme.Store");
        let handler = ComponentHandler::establish(&registry, directive).unwrap();
        assert_eq!(handler.active_instances(), 0);
        let first = handler.resolve_instance().unwrap();
        let second = handler.resolve_instance().unwrap();
        assert_eq!(handler.active_instances(), 2);
        drop(second);
        assert_eq!(handler.active_instances(), 1);
        drop(first);
        assert_eq!(handler.active_instances(), 0);
    }

    #[test]
    fn test_lookup_escalates_to_enclosing_container() {
        let handler = ComponentHandler::establish(&registry(), container_directive()).unwrap();
        let app = handler.part("app").unwrap();
        let provider = app.lookup("acme.StoreService").unwrap();
        assert_eq!(provider.path(), "/root/store");
        assert!(app.lookup("acme.Nothing").is_none());
    }

    #[test]
    fn test_anonymous_context_component_becomes_internal_part() {
        let registry = registry();
        let directive = ComponentDirective::new("app", "acme.App")
            .with_entry(
                "store",
                ContextEntry::Component(Box::new(ComponentDirective::new("ignored", "acme.Store"))),
            )
            .unwrap();
        let handler = ComponentHandler::establish(&registry, directive).unwrap();
        let internal = handler.part("store").unwrap();
        assert_eq!(internal.path(), "/app/store");
        let value = handler.context().value("store").unwrap();
        assert!(matches!(value, crate::context::ContextValue::Service(_)));
    }

    #[test]
    fn test_literal_context_entry_resolves() {
        let registry = registry();
        registry.register(TypeDescriptor::new("acme.Configured"), Arc::new(ProbeLifecycle));
        let directive = ComponentDirective::new("conf", "acme.Configured")
            .with_entry("port", ContextEntry::Value(Value::Int(8080)))
            .unwrap();
        let handler = ComponentHandler::establish(&registry, directive).unwrap();
        assert_eq!(handler.context().literal("port").unwrap(), Value::Int(8080));
    }

    #[test]
    fn test_entry_kind_mismatch_reported() {
        let handler = ComponentHandler::establish(&registry(), container_directive()).unwrap();
        let app = handler.part("app").unwrap();
        // "store" is a part reference, not a literal
        let err = app.context().literal("store").unwrap_err();
        assert!(matches!(err, ControlError::EntryKindMismatch { .. }));

        let registry = registry();
        registry.register(TypeDescriptor::new("acme.Configured"), Arc::new(ProbeLifecycle));
        let directive = ComponentDirective::new("conf", "acme.Configured")
            .with_entry("port", ContextEntry::Value(Value::Int(8080)))
            .unwrap();
        let conf = ComponentHandler::establish(&registry, directive).unwrap();
        let err = conf.context().service("port").unwrap_err();
        assert!(matches!(err, ControlError::EntryKindMismatch { .. }));
    }

    #[test]
    fn test_dispose_is_idempotent_and_cascades() {
        let handler = ComponentHandler::establish(&registry(), container_directive()).unwrap();
        let app = handler.part("app").unwrap();
        handler.dispose();
        handler.dispose();
        assert!(handler.is_disposed());
        assert!(app.is_disposed());
        assert!(matches!(handler.resolve_instance(), Err(ControlError::Disposed { .. })));
    }
}
