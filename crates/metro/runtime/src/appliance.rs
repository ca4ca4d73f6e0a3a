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

//! Client-facing appliances.
//!
//! An appliance is the indirection a client holds instead of a raw instance.
//! Calls delegate to the handler's current instance while the component is
//! available and fail cleanly outside that window. The appliance tracks the
//! window by listening to handler availability events, so a terminated and
//! re-commissioned component comes back to life behind the same appliance.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use metro_model::ServiceDescriptor;
use metro_state::{Instance, InvocationError};

use crate::errors::ControlError;
use crate::handler::{AvailabilityListener, ComponentHandler};

pub struct Appliance {
    component: String,
    handler: Weak<ComponentHandler>,
    services: Vec<ServiceDescriptor>,
    registration: Mutex<Option<u64>>,
    available: AtomicBool,
    disposed: AtomicBool,
}

impl Appliance {
    pub fn new(handler: &Arc<ComponentHandler>) -> Arc<Self> {
        let appliance = Arc::new(Self {
            component: handler.path().to_string(),
            handler: Arc::downgrade(handler),
            services: handler.descriptor().services.clone(),
            registration: Mutex::new(None),
            available: AtomicBool::new(handler.is_available()),
            disposed: AtomicBool::new(false),
        });
        let listener: Arc<dyn AvailabilityListener> = appliance.clone();
        let id = handler.add_availability_listener(&listener);
        *appliance.registration.lock() = Some(id);
        appliance
    }

    /// Path of the component behind this appliance.
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    pub fn handles(&self, classname: &str) -> bool {
        self.services.iter().any(|s| s.matches(classname))
    }

    pub fn is_available(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst) && self.available.load(Ordering::SeqCst)
    }

    /// Detach from the handler. Idempotent; a disposed appliance rejects all
    /// further calls.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let (Some(handler), Some(id)) = (self.handler.upgrade(), self.registration.lock().take()) {
            handler.remove_availability_listener(id);
        }
    }
}

impl AvailabilityListener for Appliance {
    fn availability_changed(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Instance for Appliance {
    fn invoke(&self, method: &str) -> Result<(), InvocationError> {
        if !self.is_available() {
            return Err(ControlError::Unavailable { component: self.component.clone() }.into());
        }
        let handler = self
            .handler
            .upgrade()
            .ok_or_else(|| ControlError::Disposed { component: self.component.clone() })?;
        let instance = handler.resolve_instance()?;
        instance.invoke(method).map_err(|source| {
            ControlError::Delegation { component: self.component.clone(), source }.into()
        })
    }
}
