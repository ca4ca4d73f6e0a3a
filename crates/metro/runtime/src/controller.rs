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

//! Component lifecycle control.
//!
//! The controller is stateless; all lifecycle state lives on the handlers it
//! drives. Commissioning a container brings its parts up providers-first,
//! then the container itself; decommissioning takes the parts down in
//! reverse startup order before the container's own termination chain runs.
//! Commissioning is transactional: if any provider fails, the providers that
//! already came up are taken down again in reverse order before the error is
//! reported. Decommissioning is best-effort and never short-circuits.

use std::sync::Arc;
use tracing::{info, warn};

use metro_state::{Instance, TransitionOutcome};

use crate::appliance::Appliance;
use crate::errors::ControlError;
use crate::handler::ComponentHandler;

/// How [`ComponentController::resolve`] exposes an instance to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePolicy {
    /// Hand out an availability-gated appliance.
    Isolated,
    /// Hand out the underlying instance.
    Direct,
}

#[derive(Default)]
pub struct ComponentController;

impl ComponentController {
    pub fn new() -> Self {
        Self
    }

    /// Commission a handler: parts providers-first, then the component's own
    /// initialization trigger chain. Idempotent once commissioned.
    pub fn initialize(&self, handler: &Arc<ComponentHandler>) -> Result<(), ControlError> {
        handler.check_disposed()?;
        let _guard = handler.lock_lifecycle();
        if handler.is_commissioned() {
            return Ok(());
        }

        let mut prepared: Vec<Arc<ComponentHandler>> = Vec::new();
        for name in handler.startup_order()? {
            let part = handler.part(&name).ok_or_else(|| ControlError::UnknownKey {
                key: name.clone(),
                component: handler.path().to_string(),
            })?;
            if let Err(source) = self.initialize(&part) {
                self.rollback(&prepared);
                return Err(ControlError::ProviderUnavailable {
                    container: handler.path().to_string(),
                    provider: name,
                    source: Box::new(source),
                });
            }
            prepared.push(part);
        }

        let primary = match handler.resolve_instance() {
            Ok(primary) => primary,
            Err(source) => {
                self.rollback(&prepared);
                return Err(source);
            }
        };
        if let Err(source) = handler.machine().initialize(primary.as_ref()) {
            self.rollback(&prepared);
            return Err(source.into());
        }

        handler.set_primary(Some(primary));
        handler.set_commissioned(true);
        handler.set_available(true);
        info!(path = %handler.path(), state = %handler.machine().current_state(), "component commissioned");
        Ok(())
    }

    /// Take already-prepared providers down again, most recent first.
    fn rollback(&self, prepared: &[Arc<ComponentHandler>]) {
        for part in prepared.iter().rev() {
            self.terminate(part);
        }
    }

    /// Apply a named transition to the component's primary instance.
    pub fn apply(&self, handler: &Arc<ComponentHandler>, transition: &str) -> Result<TransitionOutcome, ControlError> {
        let primary = self.primary(handler)?;
        Ok(handler.machine().apply(transition, primary.as_ref())?)
    }

    /// Execute a named operation against the component's primary instance.
    pub fn execute(&self, handler: &Arc<ComponentHandler>, operation: &str) -> Result<(), ControlError> {
        let primary = self.primary(handler)?;
        Ok(handler.machine().execute(operation, primary.as_ref())?)
    }

    /// Decommission a handler: its parts come down in reverse startup order
    /// first, then the component's own termination trigger chain runs.
    /// Failures are logged and the teardown continues; afterwards the
    /// machine sits at its graph root again.
    pub fn terminate(&self, handler: &Arc<ComponentHandler>) {
        if handler.is_disposed() {
            return;
        }
        let _guard = handler.lock_lifecycle();
        if !handler.is_commissioned() {
            return;
        }
        handler.set_available(false);

        match handler.shutdown_order() {
            Ok(order) => {
                for name in order {
                    if let Some(part) = handler.part(&name) {
                        self.terminate(&part);
                    }
                }
            }
            Err(error) => warn!(path = %handler.path(), %error, "shutdown ordering failed"),
        }

        if let Some(primary) = handler.primary() {
            if let Err(error) = handler.machine().terminate(primary.as_ref()) {
                warn!(path = %handler.path(), %error, "termination trigger failed");
            }
        }

        handler.machine().reset();
        handler.set_primary(None);
        handler.set_commissioned(false);
        info!(path = %handler.path(), "component decommissioned");
    }

    /// Resolve an instance for a client, commissioning on demand.
    pub fn resolve(&self, handler: &Arc<ComponentHandler>, policy: ResolvePolicy) -> Result<Arc<dyn Instance>, ControlError> {
        self.initialize(handler)?;
        match policy {
            ResolvePolicy::Direct => handler.resolve_instance(),
            ResolvePolicy::Isolated => {
                let appliance: Arc<dyn Instance> = Appliance::new(handler);
                Ok(appliance)
            }
        }
    }

    /// Hand out an availability-gated appliance, commissioning on demand.
    pub fn proxy(&self, handler: &Arc<ComponentHandler>) -> Result<Arc<Appliance>, ControlError> {
        self.initialize(handler)?;
        Ok(Appliance::new(handler))
    }

    /// Release an appliance handed out by [`proxy`] or [`resolve`].
    ///
    /// [`proxy`]: ComponentController::proxy
    /// [`resolve`]: ComponentController::resolve
    pub fn release(&self, appliance: &Appliance) {
        appliance.dispose();
    }

    fn primary(&self, handler: &Arc<ComponentHandler>) -> Result<Arc<dyn Instance>, ControlError> {
        self.initialize(handler)?;
        handler
            .primary()
            .ok_or_else(|| ControlError::Unavailable { component: handler.path().to_string() })
    }
}
