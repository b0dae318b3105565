//! Component and modifier lifecycle during revalidation.

use anyhow::Result;
use core::cell::Cell;
use log::debug;
use std::rc::Rc;
use trellis_validator::{Revision, Tag, validate_tag, value_for_tag};

use super::{UpdatingOpcode, UpdatingVm};
use crate::builder::LiveBlock;
use crate::component::{ComponentManager, ComponentState};
use crate::modifier::{ModifierManager, ModifierState};
use crate::vm::scope::DynamicScope;

/// Calls the manager's `update` hook when the instance's tag moves.
pub struct UpdateComponent {
    tag: Tag,
    last_revision: Cell<Revision>,
    state: ComponentState,
    manager: Rc<dyn ComponentManager>,
    dynamic_scope: Option<Rc<DynamicScope>>,
}

impl UpdateComponent {
    /// Watch `tag` for the instance `state`.
    pub fn new(
        tag: Tag,
        state: ComponentState,
        manager: Rc<dyn ComponentManager>,
        dynamic_scope: Option<Rc<DynamicScope>>,
    ) -> Rc<Self> {
        let last_revision = Cell::new(value_for_tag(&tag));
        Rc::new(Self {
            tag,
            last_revision,
            state,
            manager,
            dynamic_scope,
        })
    }
}

impl UpdatingOpcode for UpdateComponent {
    fn evaluate(self: Rc<Self>, _vm: &mut UpdatingVm) -> Result<()> {
        if validate_tag(&self.tag, self.last_revision.get()) {
            return Ok(());
        }
        self.last_revision.set(value_for_tag(&self.tag));
        self.manager.update(&self.state, self.dynamic_scope.as_ref())
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }
}

/// Reports the end of a layout's revalidation and queues `did_update`.
pub struct DidUpdateLayout {
    manager: Rc<dyn ComponentManager>,
    state: ComponentState,
    bounds: Rc<LiveBlock>,
}

impl DidUpdateLayout {
    /// Report for the instance `state` rendered into `bounds`.
    pub fn new(manager: Rc<dyn ComponentManager>, state: ComponentState, bounds: Rc<LiveBlock>) -> Rc<Self> {
        Rc::new(Self {
            manager,
            state,
            bounds,
        })
    }
}

impl UpdatingOpcode for DidUpdateLayout {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        self.manager.did_update_layout(&self.state, &self.bounds);
        vm.env().did_update(Rc::clone(&self.manager), Rc::clone(&self.state))
    }

    fn tag(&self) -> Tag {
        Tag::CONSTANT
    }
}

/// Queues a modifier update when its arguments change.
pub struct UpdateModifier {
    tag: Tag,
    last_revision: Cell<Revision>,
    manager: Rc<dyn ModifierManager>,
    state: ModifierState,
}

impl UpdateModifier {
    /// Watch `tag` for the modifier `state`.
    pub fn new(tag: Tag, manager: Rc<dyn ModifierManager>, state: ModifierState) -> Rc<Self> {
        let last_revision = Cell::new(value_for_tag(&tag));
        Rc::new(Self {
            tag,
            last_revision,
            manager,
            state,
        })
    }
}

impl UpdatingOpcode for UpdateModifier {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        if validate_tag(&self.tag, self.last_revision.get()) {
            return Ok(());
        }
        debug!(target: "trellis::updating", "scheduling a modifier update");
        self.last_revision.set(value_for_tag(&self.tag));
        vm.env()
            .schedule_update_modifier(Rc::clone(&self.manager), Rc::clone(&self.state))
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }
}
