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

//! Component type registry.
//!
//! Maps classnames to type descriptors and the factories that build their
//! instances. Deployment directives reference types purely by classname;
//! the registry is how the runtime turns those references into code.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use metro_model::TypeDescriptor;
use metro_state::Instance;

use crate::context::ContextMap;
use crate::errors::ControlError;

/// Everything a factory may draw on while building an instance.
pub struct IncarnationContext<'a> {
    /// Absolute path of the handler requesting the instance.
    pub path: &'a str,
    /// Resolved context entries of the component.
    pub context: &'a ContextMap,
    /// Component configuration block, when declared.
    pub configuration: Option<&'a serde_json::Value>,
}

/// Factory for instances of one component type.
pub trait Lifecycle: Send + Sync {
    fn incarnate(&self, context: &IncarnationContext<'_>) -> Result<Arc<dyn Instance>, ControlError>;
}

struct Registration {
    descriptor: TypeDescriptor,
    lifecycle: Arc<dyn Lifecycle>,
}

/// Thread-safe classname registry.
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Registration>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type. A later registration for the same classname replaces
    /// the earlier one.
    pub fn register(&self, descriptor: TypeDescriptor, lifecycle: Arc<dyn Lifecycle>) {
        let classname = descriptor.classname.clone();
        self.types.write().insert(classname, Registration { descriptor, lifecycle });
    }

    pub fn contains(&self, classname: &str) -> bool {
        self.types.read().contains_key(classname)
    }

    pub fn descriptor(&self, classname: &str) -> Result<TypeDescriptor, ControlError> {
        self.types
            .read()
            .get(classname)
            .map(|r| r.descriptor.clone())
            .ok_or_else(|| ControlError::UnknownType { classname: classname.to_string() })
    }

    pub fn lifecycle(&self, classname: &str) -> Result<Arc<dyn Lifecycle>, ControlError> {
        self.types
            .read()
            .get(classname)
            .map(|r| r.lifecycle.clone())
            .ok_or_else(|| ControlError::UnknownType { classname: classname.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metro_state::InvocationError;

    struct Null;

    impl Instance for Null {
        fn invoke(&self, _method: &str) -> Result<(), InvocationError> {
            Ok(())
        }
    }

    struct NullLifecycle;

    impl Lifecycle for NullLifecycle {
        fn incarnate(&self, _context: &IncarnationContext<'_>) -> Result<Arc<dyn Instance>, ControlError> {
            Ok(Arc::new(Null))
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = TypeRegistry::new();
        registry.register(TypeDescriptor::new("acme.Widget"), Arc::new(NullLifecycle));
        assert!(registry.contains("acme.Widget"));
        assert_eq!(registry.descriptor("acme.Widget").unwrap().classname, "acme.Widget");
        registry.lifecycle("acme.Widget").unwrap();
    }

    #[test]
    fn test_unknown_classname_reported() {
        let registry = TypeRegistry::new();
        let err = registry.descriptor("acme.Ghost").unwrap_err();
        assert!(matches!(err, ControlError::UnknownType { .. }));
    }
}
