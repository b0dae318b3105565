//! Components backed by a host object with lifecycle hooks.

use anyhow::{Result, anyhow};
use core::cell::Cell;
use std::rc::Rc;
use trellis_opcode_compiler::{Capabilities, Template};
use trellis_reference::{CapturedArguments, Reference, RootReference, Value};
use trellis_validator::Tag;

use super::{ComponentDefinition, ComponentManager, ComponentState};
use crate::destroyable::Destroy;
use crate::environment::Environment;
use crate::vm::arguments::Arguments;
use crate::vm::scope::DynamicScope;

/// A host component. Every hook but [`Component::this`] is optional.
pub trait Component {
    /// The value the layout sees as `this`.
    fn this(&self) -> Value;

    /// The component's first render was committed.
    fn did_create(&self) {}

    /// The arguments changed; `args` holds the new values.
    fn update(&self, _args: &CapturedArguments) {}

    /// A re-render that followed [`Component::update`] was committed.
    fn did_update(&self) {}

    /// The component is being torn down and is still in the DOM.
    fn will_destroy(&self) {}

    /// The teardown was committed.
    fn did_destroy(&self) {}
}

/// Builds a component from its invocation's arguments.
pub type ComponentFactory = Rc<dyn Fn(&CapturedArguments) -> Rc<dyn Component>>;

struct ClassState {
    component: Rc<dyn Component>,
    args: CapturedArguments,
    this: Reference,
    updated: Cell<bool>,
}

struct ComponentDestructor(Rc<dyn Component>);

impl Destroy for ComponentDestructor {
    fn will_destroy(&self) {
        self.0.will_destroy();
    }

    fn did_destroy(&self) {
        self.0.did_destroy();
    }
}

/// Creates one [`Component`] per invocation through a [`ComponentFactory`]
/// and forwards lifecycle events to it.
///
/// The definition's state must be the factory.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassComponentManager;

impl ClassComponentManager {
    /// A definition whose instances `factory` builds.
    pub fn definition(name: &str, layout: Rc<Template>, factory: ComponentFactory) -> Rc<ComponentDefinition> {
        ComponentDefinition::with_state(name, Rc::new(Self), Some(layout), Rc::new(factory))
    }

    fn state(state: &ComponentState) -> Result<Rc<ClassState>> {
        Rc::clone(state)
            .downcast::<ClassState>()
            .map_err(|_| anyhow!("state does not belong to a class component"))
    }
}

impl ComponentManager for ClassComponentManager {
    fn capabilities(&self, _definition: &ComponentDefinition) -> Capabilities {
        Capabilities {
            create_args: true,
            update_hook: true,
            create_instance: true,
            will_destroy: true,
            ..Capabilities::MINIMAL
        }
    }

    fn create(
        &self,
        env: &Environment,
        definition: &ComponentDefinition,
        args: Option<&Arguments>,
        _dynamic_scope: Option<&Rc<DynamicScope>>,
        _caller: Option<Reference>,
        _has_default_block: bool,
    ) -> Result<ComponentState> {
        let factory = Rc::clone(definition.state())
            .downcast::<ComponentFactory>()
            .map_err(|_| anyhow!("component {} has no factory", definition.name()))?;
        let args = args.map_or_else(|| CapturedArguments::new(Vec::new(), Vec::new()), Arguments::capture);
        let component = factory(&args);
        let this = RootReference::new(component.this(), env.path_delegate());
        Ok(Rc::new(ClassState {
            component,
            args,
            this,
            updated: Cell::new(false),
        }))
    }

    fn get_self(&self, state: &ComponentState) -> Result<Reference> {
        Ok(Rc::clone(&Self::state(state)?.this))
    }

    fn tag(&self, state: &ComponentState) -> Tag {
        Self::state(state).map_or(Tag::CONSTANT, |state| state.args.tag())
    }

    fn did_create(&self, state: &ComponentState) -> Result<()> {
        Self::state(state)?.component.did_create();
        Ok(())
    }

    fn update(&self, state: &ComponentState, _dynamic_scope: Option<&Rc<DynamicScope>>) -> Result<()> {
        let state = Self::state(state)?;
        state.component.update(&state.args);
        state.updated.set(true);
        Ok(())
    }

    fn did_update(&self, state: &ComponentState) -> Result<()> {
        let state = Self::state(state)?;
        if state.updated.replace(false) {
            state.component.did_update();
        }
        Ok(())
    }

    fn destructor(&self, state: &ComponentState) -> Option<Rc<dyn Destroy>> {
        let state = Self::state(state).ok()?;
        Some(Rc::new(ComponentDestructor(Rc::clone(&state.component))))
    }
}
