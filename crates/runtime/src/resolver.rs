//! Name resolution shared by the compiler and the VM.
//!
//! The compiler turns names into handles through [`CompileTimeResolver`];
//! the VM turns handles back into definitions through [`RuntimeResolver`].
//! [`Registry`] is both, backed by plain tables. Which manager drives a
//! definition is looked up by the Rust type of its state in a
//! [`ManagerRegistry`].

use anyhow::{Result, anyhow};
use core::any::{Any, TypeId, type_name};
use core::cell::RefCell;
use core::fmt;
use log::debug;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use std::rc::Rc;
use trellis_opcode_compiler::{CompileTimeComponent, CompileTimeResolver, Template};
use trellis_reference::{CapturedArguments, HelperFn, Value};

use crate::component::{
    ClassComponentManager, ComponentDefinition, ComponentFactory, ComponentManager,
    TemplateOnlyComponentManager,
};
use crate::modifier::{ElementModifier, ElementModifierManager, ModifierDefinition, ModifierManager};

/// What a handle resolves to.
#[derive(Clone)]
pub enum Resolved {
    /// A component definition.
    Component(Rc<ComponentDefinition>),
    /// A helper function.
    Helper(HelperFn),
    /// A modifier definition.
    Modifier(Rc<ModifierDefinition>),
    /// A partial template.
    Partial(Rc<Template>),
}

impl Resolved {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Component(_) => "component",
            Self::Helper(_) => "helper",
            Self::Modifier(_) => "modifier",
            Self::Partial(_) => "partial",
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Component(definition) => write!(formatter, "Component({})", definition.name()),
            Self::Partial(template) => write!(formatter, "Partial({})", template.id()),
            other => formatter.write_str(other.kind()),
        }
    }
}

/// Runtime lookups made by the VM.
pub trait RuntimeResolver {
    /// The definition behind a handle the compiler was given.
    fn resolve(&self, handle: i32) -> Option<Resolved>;

    /// A component named by a runtime value, for `{{component name}}`.
    fn lookup_component(&self, name: &str, referrer: &Json) -> Option<Rc<ComponentDefinition>>;

    /// A partial named by a runtime value, for `{{partial name}}`.
    fn lookup_partial(&self, name: &str, referrer: &Json) -> Option<Rc<Template>>;
}

/// Typed accessors over [`RuntimeResolver::resolve`].
pub trait RuntimeResolverExt: RuntimeResolver {
    /// The component behind `handle`.
    ///
    /// # Errors
    /// Returns an error if the handle is unknown or not a component.
    fn resolve_component(&self, handle: i32) -> Result<Rc<ComponentDefinition>> {
        match self.resolve(handle) {
            Some(Resolved::Component(definition)) => Ok(definition),
            other => Err(mismatch(handle, "component", other.as_ref())),
        }
    }

    /// The helper behind `handle`.
    ///
    /// # Errors
    /// Returns an error if the handle is unknown or not a helper.
    fn resolve_helper(&self, handle: i32) -> Result<HelperFn> {
        match self.resolve(handle) {
            Some(Resolved::Helper(helper)) => Ok(helper),
            other => Err(mismatch(handle, "helper", other.as_ref())),
        }
    }

    /// The modifier behind `handle`.
    ///
    /// # Errors
    /// Returns an error if the handle is unknown or not a modifier.
    fn resolve_modifier(&self, handle: i32) -> Result<Rc<ModifierDefinition>> {
        match self.resolve(handle) {
            Some(Resolved::Modifier(modifier)) => Ok(modifier),
            other => Err(mismatch(handle, "modifier", other.as_ref())),
        }
    }
}

impl<R: RuntimeResolver + ?Sized> RuntimeResolverExt for R {}

fn mismatch(handle: i32, expected: &str, found: Option<&Resolved>) -> anyhow::Error {
    match found {
        Some(found) => anyhow!("handle {handle} is a {}, not a {expected}", found.kind()),
        None => anyhow!("handle {handle} does not resolve to a {expected}"),
    }
}

/// Managers keyed by the Rust type of the definition state they drive.
pub struct ManagerRegistry {
    components: FxHashMap<TypeId, Rc<dyn ComponentManager>>,
    modifiers: FxHashMap<TypeId, Rc<dyn ModifierManager>>,
}

impl Default for ManagerRegistry {
    /// The built-in managers: `()` is template-only, a [`ComponentFactory`]
    /// is a class component and an `Rc<dyn ElementModifier>` is an element
    /// modifier.
    fn default() -> Self {
        let mut registry = Self {
            components: FxHashMap::default(),
            modifiers: FxHashMap::default(),
        };
        registry.set_component_manager::<()>(Rc::new(TemplateOnlyComponentManager));
        registry.set_component_manager::<ComponentFactory>(Rc::new(ClassComponentManager));
        registry.set_modifier_manager::<Rc<dyn ElementModifier>>(Rc::new(ElementModifierManager));
        registry
    }
}

impl ManagerRegistry {
    /// Drive definitions whose state is a `T` with `manager`.
    pub fn set_component_manager<T: Any>(&mut self, manager: Rc<dyn ComponentManager>) {
        self.components.insert(TypeId::of::<T>(), manager);
    }

    /// Drive modifiers whose definition state is a `T` with `manager`.
    pub fn set_modifier_manager<T: Any>(&mut self, manager: Rc<dyn ModifierManager>) {
        self.modifiers.insert(TypeId::of::<T>(), manager);
    }

    /// The component manager for `T`.
    ///
    /// # Errors
    /// Returns an error if none was set.
    pub fn component_manager<T: Any>(&self) -> Result<Rc<dyn ComponentManager>> {
        self.components
            .get(&TypeId::of::<T>())
            .map(Rc::clone)
            .ok_or_else(|| anyhow!("no component manager for {}", type_name::<T>()))
    }

    /// The modifier manager for `T`.
    ///
    /// # Errors
    /// Returns an error if none was set.
    pub fn modifier_manager<T: Any>(&self) -> Result<Rc<dyn ModifierManager>> {
        self.modifiers
            .get(&TypeId::of::<T>())
            .map(Rc::clone)
            .ok_or_else(|| anyhow!("no modifier manager for {}", type_name::<T>()))
    }
}

#[derive(Default)]
struct Tables {
    entries: Vec<Resolved>,
    components: FxHashMap<Rc<str>, i32>,
    helpers: FxHashMap<Rc<str>, i32>,
    modifiers: FxHashMap<Rc<str>, i32>,
    partials: FxHashMap<Rc<str>, i32>,
}

impl Tables {
    fn push(&mut self, resolved: Resolved) -> i32 {
        let handle = self.entries.len() as i32;
        self.entries.push(resolved);
        handle
    }
}

/// A single global namespace of components, helpers, modifiers and
/// partials. The referrer is not consulted.
#[derive(Default)]
pub struct Registry {
    tables: RefCell<Tables>,
    managers: RefCell<ManagerRegistry>,
}

impl Registry {
    /// An empty registry with the built-in managers.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Replace the manager for definition states of type `T`.
    pub fn set_component_manager<T: Any>(&self, manager: Rc<dyn ComponentManager>) {
        self.managers.borrow_mut().set_component_manager::<T>(manager);
    }

    /// Replace the manager for modifier states of type `T`.
    pub fn set_modifier_manager<T: Any>(&self, manager: Rc<dyn ModifierManager>) {
        self.managers.borrow_mut().set_modifier_manager::<T>(manager);
    }

    /// Register `definition` under its name, returning its handle.
    pub fn register_component(&self, definition: Rc<ComponentDefinition>) -> i32 {
        let mut tables = self.tables.borrow_mut();
        let name: Rc<str> = Rc::from(definition.name());
        let handle = tables.push(Resolved::Component(definition));
        debug!(target: "trellis::resolver", "component {name} is handle {handle}");
        tables.components.insert(name, handle);
        handle
    }

    /// Define a component whose manager is the one set for `T`.
    ///
    /// # Errors
    /// Returns an error if no manager handles `T`.
    pub fn define_component<T: Any>(&self, name: &str, layout: Option<Rc<Template>>, state: Rc<T>) -> Result<i32> {
        let manager = self.managers.borrow().component_manager::<T>()?;
        Ok(self.register_component(ComponentDefinition::with_state(name, manager, layout, state)))
    }

    /// A component that is only its layout.
    ///
    /// # Errors
    /// Returns an error if no manager is registered for template-only state.
    pub fn register_template_only(&self, name: &str, layout: Rc<Template>) -> Result<i32> {
        self.define_component(name, Some(layout), Rc::new(()))
    }

    /// A component whose instances `factory` builds.
    ///
    /// # Errors
    /// Returns an error if no manager handles [`ComponentFactory`].
    pub fn register_class(&self, name: &str, layout: Rc<Template>, factory: ComponentFactory) -> Result<i32> {
        self.define_component(name, Some(layout), Rc::new(factory))
    }

    /// Register a helper computing a value from its arguments.
    pub fn register_helper<F>(&self, name: &str, helper: F) -> i32
    where
        F: Fn(&CapturedArguments) -> Value + 'static,
    {
        let mut tables = self.tables.borrow_mut();
        let handle = tables.push(Resolved::Helper(Rc::new(helper)));
        tables.helpers.insert(Rc::from(name), handle);
        handle
    }

    /// Register a modifier definition.
    pub fn register_modifier(&self, name: &str, definition: Rc<ModifierDefinition>) -> i32 {
        let mut tables = self.tables.borrow_mut();
        let handle = tables.push(Resolved::Modifier(definition));
        tables.modifiers.insert(Rc::from(name), handle);
        handle
    }

    /// Register an [`ElementModifier`] through the manager set for it.
    ///
    /// # Errors
    /// Returns an error if no manager handles element modifiers.
    pub fn register_element_modifier(&self, name: &str, modifier: Rc<dyn ElementModifier>) -> Result<i32> {
        let manager = self.managers.borrow().modifier_manager::<Rc<dyn ElementModifier>>()?;
        Ok(self.register_modifier(name, ModifierDefinition::new(manager, Rc::new(modifier))))
    }

    /// Register a partial template.
    pub fn register_partial(&self, name: &str, template: Rc<Template>) -> i32 {
        let mut tables = self.tables.borrow_mut();
        let handle = tables.push(Resolved::Partial(template));
        tables.partials.insert(Rc::from(name), handle);
        handle
    }

    fn handle_of(&self, table: impl FnOnce(&Tables) -> &FxHashMap<Rc<str>, i32>, name: &str) -> Option<i32> {
        table(&self.tables.borrow()).get(name).copied()
    }
}

impl CompileTimeResolver for Registry {
    fn lookup_component(&self, name: &str, _referrer: &Json) -> Option<CompileTimeComponent> {
        let handle = self.handle_of(|tables| &tables.components, name)?;
        let Some(Resolved::Component(definition)) = self.resolve(handle) else {
            return None;
        };
        let capabilities = definition.capabilities();
        let compilable = if capabilities.dynamic_layout {
            None
        } else {
            definition.manager().layout(&definition).ok()
        };
        Some(CompileTimeComponent {
            handle,
            capabilities,
            compilable,
        })
    }

    fn lookup_helper(&self, name: &str, _referrer: &Json) -> Option<i32> {
        self.handle_of(|tables| &tables.helpers, name)
    }

    fn lookup_modifier(&self, name: &str, _referrer: &Json) -> Option<i32> {
        self.handle_of(|tables| &tables.modifiers, name)
    }

    fn lookup_partial(&self, name: &str, _referrer: &Json) -> Option<i32> {
        self.handle_of(|tables| &tables.partials, name)
    }
}

impl RuntimeResolver for Registry {
    fn resolve(&self, handle: i32) -> Option<Resolved> {
        let index = usize::try_from(handle).ok()?;
        self.tables.borrow().entries.get(index).cloned()
    }

    fn lookup_component(&self, name: &str, _referrer: &Json) -> Option<Rc<ComponentDefinition>> {
        match self.resolve(self.handle_of(|tables| &tables.components, name)?)? {
            Resolved::Component(definition) => Some(definition),
            _ => None,
        }
    }

    fn lookup_partial(&self, name: &str, _referrer: &Json) -> Option<Rc<Template>> {
        match self.resolve(self.handle_of(|tables| &tables.partials, name)?)? {
            Resolved::Partial(template) => Some(template),
            _ => None,
        }
    }
}
