//! Work deferred until a render or revalidation pass finishes.

use anyhow::Result;
use core::fmt;
use log::debug;
use std::rc::Rc;

use super::Environment;
use crate::component::{ComponentManager, ComponentState};
use crate::destroyable::Destroy;
use crate::modifier::{ModifierManager, ModifierState};

/// Lifecycle hooks collected during one pass.
#[derive(Default)]
pub struct Transaction {
    created: Vec<(Rc<dyn ComponentManager>, ComponentState)>,
    updated: Vec<(Rc<dyn ComponentManager>, ComponentState)>,
    destructors: Vec<Rc<dyn Destroy>>,
    installs: Vec<(Rc<dyn ModifierManager>, ModifierState)>,
    updates: Vec<(Rc<dyn ModifierManager>, ModifierState)>,
}

impl Transaction {
    pub(super) fn did_create(&mut self, manager: Rc<dyn ComponentManager>, state: ComponentState) {
        self.created.push((manager, state));
    }

    pub(super) fn did_update(&mut self, manager: Rc<dyn ComponentManager>, state: ComponentState) {
        self.updated.push((manager, state));
    }

    pub(super) fn did_destroy(&mut self, destructor: Rc<dyn Destroy>) {
        self.destructors.push(destructor);
    }

    pub(super) fn install_modifier(&mut self, manager: Rc<dyn ModifierManager>, state: ModifierState) {
        self.installs.push((manager, state));
    }

    pub(super) fn update_modifier(&mut self, manager: Rc<dyn ModifierManager>, state: ModifierState) {
        self.updates.push((manager, state));
    }

    /// Run the hooks: component creation, component updates, deferred
    /// destruction, modifier installs, modifier updates.
    ///
    /// # Errors
    /// Stops at the first hook that fails.
    pub(super) fn commit(self, env: &Environment) -> Result<()> {
        debug!(target: "trellis::environment", "committing {self:?}");
        for (manager, state) in &self.created {
            manager.did_create(state)?;
        }
        for (manager, state) in &self.updated {
            manager.did_update(state)?;
        }
        for destructor in &self.destructors {
            destructor.did_destroy();
        }
        for (manager, state) in &self.installs {
            manager.install(env, state)?;
        }
        for (manager, state) in &self.updates {
            manager.update(env, state)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Transaction")
            .field("created", &self.created.len())
            .field("updated", &self.updated.len())
            .field("destructors", &self.destructors.len())
            .field("installs", &self.installs.len())
            .field("updates", &self.updates.len())
            .finish()
    }
}
