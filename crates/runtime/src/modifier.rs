//! Element modifiers: `<div {{on-resize this.measure}}>`.
//!
//! A modifier is created while its element's attributes are collected,
//! installed once the render transaction commits, updated when its
//! arguments change and destroyed with the block that owns the element.

use anyhow::{Result, anyhow};
use core::any::Any;
use core::cell::Cell;
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_reference::CapturedArguments;
use trellis_validator::Tag;

use crate::destroyable::Destroy;
use crate::environment::Environment;
use crate::vm::scope::DynamicScope;

/// Whatever a manager keeps per installed modifier.
pub type ModifierState = Rc<dyn Any>;

/// Creates and drives the modifiers of one kind.
pub trait ModifierManager {
    /// A modifier for `element`, not yet installed.
    ///
    /// # Errors
    /// Returns the manager's failure.
    fn create(
        &self,
        element: NodeId,
        definition: &Rc<dyn Any>,
        args: CapturedArguments,
        dynamic_scope: &Rc<DynamicScope>,
    ) -> Result<ModifierState>;

    /// What the modifier depends on.
    fn tag(&self, state: &ModifierState) -> Tag;

    /// Runs after the render that created the element commits.
    ///
    /// # Errors
    /// Returns the modifier's failure.
    fn install(&self, env: &Environment, state: &ModifierState) -> Result<()>;

    /// Runs after a revalidation in which [`Self::tag`] changed commits.
    ///
    /// # Errors
    /// Returns the modifier's failure.
    fn update(&self, env: &Environment, state: &ModifierState) -> Result<()>;

    /// Teardown for the modifier.
    fn destructor(&self, state: &ModifierState) -> Option<Rc<dyn Destroy>>;
}

/// A modifier the resolver knows.
pub struct ModifierDefinition {
    manager: Rc<dyn ModifierManager>,
    state: Rc<dyn Any>,
}

impl ModifierDefinition {
    /// A definition driven by `manager`, which receives `state` on create.
    pub fn new(manager: Rc<dyn ModifierManager>, state: Rc<dyn Any>) -> Rc<Self> {
        Rc::new(Self { manager, state })
    }

    /// A definition for a plain [`ElementModifier`].
    pub fn element(modifier: Rc<dyn ElementModifier>) -> Rc<Self> {
        Self::new(Rc::new(ElementModifierManager), Rc::new(modifier))
    }

    /// The manager.
    #[inline]
    pub const fn manager(&self) -> &Rc<dyn ModifierManager> {
        &self.manager
    }

    /// The manager-specific state.
    #[inline]
    pub const fn state(&self) -> &Rc<dyn Any> {
        &self.state
    }
}

/// A created modifier and its manager.
#[derive(Clone)]
pub struct ModifierInstance {
    /// The manager.
    pub manager: Rc<dyn ModifierManager>,
    /// What the manager created.
    pub state: ModifierState,
}

/// The simple modifier protocol: act on the element with the current
/// argument values.
pub trait ElementModifier {
    /// The element is in the DOM.
    ///
    /// # Errors
    /// Returns the modifier's failure.
    fn install(&self, env: &Environment, element: NodeId, args: &CapturedArguments) -> Result<()>;

    /// The arguments changed.
    ///
    /// # Errors
    /// Returns the modifier's failure.
    fn update(&self, env: &Environment, element: NodeId, args: &CapturedArguments) -> Result<()> {
        self.install(env, element, args)
    }

    /// The element is going away.
    fn destroy(&self, _element: NodeId) {}
}

struct ElementModifierState {
    modifier: Rc<dyn ElementModifier>,
    element: NodeId,
    args: CapturedArguments,
    installed: Cell<bool>,
}

impl Destroy for ElementModifierState {
    fn will_destroy(&self) {
        if self.installed.replace(false) {
            self.modifier.destroy(self.element);
        }
    }
}

/// Drives [`ElementModifier`]s. The definition state must be an
/// `Rc<dyn ElementModifier>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ElementModifierManager;

impl ElementModifierManager {
    fn state(state: &ModifierState) -> Result<Rc<ElementModifierState>> {
        Rc::clone(state)
            .downcast::<ElementModifierState>()
            .map_err(|_| anyhow!("state does not belong to an element modifier"))
    }
}

impl ModifierManager for ElementModifierManager {
    fn create(
        &self,
        element: NodeId,
        definition: &Rc<dyn Any>,
        args: CapturedArguments,
        _dynamic_scope: &Rc<DynamicScope>,
    ) -> Result<ModifierState> {
        let modifier = Rc::clone(definition)
            .downcast::<Rc<dyn ElementModifier>>()
            .map_err(|_| anyhow!("modifier definition holds no element modifier"))?;
        Ok(Rc::new(ElementModifierState {
            modifier: Rc::clone(&*modifier),
            element,
            args,
            installed: Cell::new(false),
        }))
    }

    fn tag(&self, state: &ModifierState) -> Tag {
        Self::state(state).map_or(Tag::CONSTANT, |state| state.args.tag())
    }

    fn install(&self, env: &Environment, state: &ModifierState) -> Result<()> {
        let state = Self::state(state)?;
        state.modifier.install(env, state.element, &state.args)?;
        state.installed.set(true);
        Ok(())
    }

    fn update(&self, env: &Environment, state: &ModifierState) -> Result<()> {
        let state = Self::state(state)?;
        state.modifier.update(env, state.element, &state.args)
    }

    fn destructor(&self, state: &ModifierState) -> Option<Rc<dyn Destroy>> {
        Self::state(state).ok().map(|state| state as Rc<dyn Destroy>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use trellis_dom::{Document, DomTree as _};
    use trellis_reference::{ConstReference, Value};

    #[derive(Default)]
    struct Counter {
        installs: Cell<usize>,
        updates: Cell<usize>,
        destroys: Cell<usize>,
    }

    impl ElementModifier for Counter {
        fn install(&self, _env: &Environment, _element: NodeId, _args: &CapturedArguments) -> Result<()> {
            self.installs.set(self.installs.get() + 1);
            Ok(())
        }

        fn update(&self, _env: &Environment, _element: NodeId, _args: &CapturedArguments) -> Result<()> {
            self.updates.set(self.updates.get() + 1);
            Ok(())
        }

        fn destroy(&self, _element: NodeId) {
            self.destroys.set(self.destroys.get() + 1);
        }
    }

    /// Test the element modifier lifecycle through its manager.
    ///
    /// # Panics
    /// Panics if a hook runs the wrong number of times.
    #[test]
    fn element_modifiers_follow_the_lifecycle() -> Result<()> {
        let document = Rc::new(RefCell::new(Document::new()));
        let env = Environment::with_defaults(Rc::clone(&document) as _);
        let element = document.borrow_mut().create_element("div", None);
        let counter = Rc::new(Counter::default());
        let definition = ModifierDefinition::element(Rc::clone(&counter) as _);
        let args = CapturedArguments::new(vec![ConstReference::new(Value::from(1))], Vec::new());

        let manager = definition.manager();
        let state = manager.create(element, definition.state(), args, &DynamicScope::new())?;
        assert!(manager.tag(&state).is_const());
        manager.install(&env, &state)?;
        manager.update(&env, &state)?;
        let destructor = manager.destructor(&state).ok_or_else(|| anyhow!("no destructor"))?;
        destructor.will_destroy();
        destructor.will_destroy();

        assert_eq!(counter.installs.get(), 1);
        assert_eq!(counter.updates.get(), 1);
        assert_eq!(counter.destroys.get(), 1);
        Ok(())
    }
}
