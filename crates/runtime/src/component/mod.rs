//! Component definitions, instances and the manager protocol.
//!
//! A [`ComponentDefinition`] pairs a layout with the [`ComponentManager`]
//! that creates and updates its instances. The VM only ever talks to the
//! manager; what a component "is" beyond that is the manager's business.

mod class;
mod curried;
mod template_only;

use anyhow::{Result, anyhow};
use core::any::Any;
use core::fmt;
use std::rc::Rc;
use trellis_opcode_compiler::{Capabilities, CompilableTemplate, SymbolTable, Template};
use trellis_reference::Reference;
use trellis_validator::Tag;

use crate::builder::LiveBlock;
use crate::destroyable::Destroy;
use crate::environment::Environment;
use crate::vm::arguments::Arguments;
use crate::vm::scope::{DynamicScope, EvalScope};

pub use class::{ClassComponentManager, Component, ComponentFactory};
pub use curried::{CurryComponentReference, CurriedComponentDefinition, definition_of};
pub use template_only::TemplateOnlyComponentManager;

/// Whatever a manager keeps per instance.
pub type ComponentState = Rc<dyn Any>;

/// Creates, updates and tears down the instances of the components it
/// manages.
///
/// Hooks a manager's [`Capabilities`] do not ask for are never called.
pub trait ComponentManager {
    /// What the manager supports for `definition`.
    fn capabilities(&self, definition: &ComponentDefinition) -> Capabilities;

    /// Rewrite the invocation's arguments before the instance is created.
    ///
    /// # Errors
    /// Returns the manager's failure.
    fn prepare_args(&self, _definition: &ComponentDefinition, _args: &Arguments) -> Result<Option<Arguments>> {
        Ok(None)
    }

    /// Create the state of a new instance.
    ///
    /// # Errors
    /// Returns the manager's failure.
    fn create(
        &self,
        env: &Environment,
        definition: &ComponentDefinition,
        args: Option<&Arguments>,
        dynamic_scope: Option<&Rc<DynamicScope>>,
        caller: Option<Reference>,
        has_default_block: bool,
    ) -> Result<ComponentState>;

    /// The `this` of the layout.
    ///
    /// # Errors
    /// Returns an error if `state` is not this manager's.
    fn get_self(&self, state: &ComponentState) -> Result<Reference>;

    /// What the instance depends on; when it changes [`Self::update`] runs.
    fn tag(&self, _state: &ComponentState) -> Tag {
        Tag::CONSTANT
    }

    /// The layout finished rendering for the first time.
    fn did_render_layout(&self, _state: &ComponentState, _bounds: &Rc<LiveBlock>) {}

    /// Runs when the render transaction commits.
    ///
    /// # Errors
    /// Returns the component's failure.
    fn did_create(&self, _state: &ComponentState) -> Result<()> {
        Ok(())
    }

    /// The instance's tag moved.
    ///
    /// # Errors
    /// Returns the component's failure.
    fn update(&self, _state: &ComponentState, _dynamic_scope: Option<&Rc<DynamicScope>>) -> Result<()> {
        Ok(())
    }

    /// A revalidation pass reached the end of the layout.
    fn did_update_layout(&self, _state: &ComponentState, _bounds: &Rc<LiveBlock>) {}

    /// Runs when a revalidation transaction commits.
    ///
    /// # Errors
    /// Returns the component's failure.
    fn did_update(&self, _state: &ComponentState) -> Result<()> {
        Ok(())
    }

    /// Teardown for the instance.
    fn destructor(&self, _state: &ComponentState) -> Option<Rc<dyn Destroy>> {
        None
    }

    /// The layout shared by every instance of `definition`.
    ///
    /// # Errors
    /// Returns an error if the definition has no layout.
    fn layout(&self, definition: &ComponentDefinition) -> Result<Rc<CompilableTemplate>> {
        definition
            .layout()
            .map(|layout| layout.as_layout())
            .ok_or_else(|| anyhow!("component {} has no layout", definition.name()))
    }

    /// The layout of one instance, for managers with a dynamic layout.
    ///
    /// # Errors
    /// Returns an error if there is no layout.
    fn dynamic_layout(&self, definition: &ComponentDefinition, _state: Option<&ComponentState>) -> Result<Rc<CompilableTemplate>> {
        self.layout(definition)
    }
}

/// A component known to the resolver.
pub struct ComponentDefinition {
    name: Rc<str>,
    manager: Rc<dyn ComponentManager>,
    layout: Option<Rc<Template>>,
    state: Rc<dyn Any>,
}

impl ComponentDefinition {
    /// A definition whose manager needs no state of its own.
    pub fn new(name: &str, manager: Rc<dyn ComponentManager>, layout: Option<Rc<Template>>) -> Rc<Self> {
        Self::with_state(name, manager, layout, Rc::new(()))
    }

    /// A definition carrying manager-specific `state`.
    pub fn with_state(
        name: &str,
        manager: Rc<dyn ComponentManager>,
        layout: Option<Rc<Template>>,
        state: Rc<dyn Any>,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            manager,
            layout,
            state,
        })
    }

    /// The name it was registered under.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The manager.
    #[inline]
    pub const fn manager(&self) -> &Rc<dyn ComponentManager> {
        &self.manager
    }

    /// The layout template.
    #[inline]
    pub const fn layout(&self) -> Option<&Rc<Template>> {
        self.layout.as_ref()
    }

    /// The manager-specific state.
    #[inline]
    pub const fn state(&self) -> &Rc<dyn Any> {
        &self.state
    }

    /// The manager's capabilities for this definition.
    pub fn capabilities(&self) -> Capabilities {
        self.manager.capabilities(self)
    }
}

impl fmt::Debug for ComponentDefinition {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish_non_exhaustive()
    }
}

/// What an invocation names: a definition, or one with curried arguments
/// still to be unwrapped.
#[derive(Clone)]
pub enum InstanceDefinition {
    /// A plain definition.
    Resolved(Rc<ComponentDefinition>),
    /// A `(component ...)` value.
    Curried(Rc<CurriedComponentDefinition>),
}

impl InstanceDefinition {
    /// The name of the underlying definition.
    pub fn name(&self) -> &str {
        match self {
            Self::Resolved(definition) => definition.name(),
            Self::Curried(curried) => curried.inner().name(),
        }
    }
}

/// A component being rendered: its definition, manager state and layout.
pub struct ComponentInstance {
    definition: InstanceDefinition,
    capabilities: Capabilities,
    /// What the manager created, once `CreateComponent` ran.
    pub state: Option<ComponentState>,
    /// The compiled layout.
    pub handle: Option<i32>,
    /// The layout's symbol table.
    pub table: Option<Rc<SymbolTable>>,
    /// Locals exposed to `{{partial}}` and `{{debugger}}` in the layout.
    pub lookup: Option<EvalScope>,
}

impl ComponentInstance {
    /// An instance of `definition` about to be created.
    pub fn new(definition: InstanceDefinition) -> Self {
        let capabilities = match &definition {
            InstanceDefinition::Resolved(resolved) => resolved.capabilities(),
            InstanceDefinition::Curried(_) => Capabilities::MINIMAL,
        };
        Self {
            definition,
            capabilities,
            state: None,
            handle: None,
            table: None,
            lookup: None,
        }
    }

    /// The resolved definition.
    ///
    /// # Errors
    /// Returns an error while the curried arguments are not unwrapped yet.
    pub fn definition(&self) -> Result<&Rc<ComponentDefinition>> {
        match &self.definition {
            InstanceDefinition::Resolved(definition) => Ok(definition),
            InstanceDefinition::Curried(_) => Err(anyhow!("component {} is still curried", self.definition.name())),
        }
    }

    /// The definition as invoked.
    #[inline]
    pub const fn instance_definition(&self) -> &InstanceDefinition {
        &self.definition
    }

    /// Replace a curried definition with what it unwrapped to.
    pub fn resolve(&mut self, definition: Rc<ComponentDefinition>) {
        self.capabilities = definition.capabilities();
        self.definition = InstanceDefinition::Resolved(definition);
    }

    /// The manager.
    ///
    /// # Errors
    /// Returns an error while still curried.
    pub fn manager(&self) -> Result<Rc<dyn ComponentManager>> {
        Ok(Rc::clone(self.definition()?.manager()))
    }

    /// The manager's capabilities.
    #[inline]
    pub const fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}
