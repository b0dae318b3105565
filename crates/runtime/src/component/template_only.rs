//! Components that are nothing but a layout.

use anyhow::Result;
use std::rc::Rc;
use trellis_opcode_compiler::Capabilities;
use trellis_reference::{ConstReference, Reference};

use super::{ComponentDefinition, ComponentManager, ComponentState};
use crate::environment::Environment;
use crate::vm::arguments::Arguments;
use crate::vm::scope::DynamicScope;

/// Manages layout-only components: no instance, `this` is `null`, and
/// arguments are reachable only as `@names`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateOnlyComponentManager;

impl ComponentManager for TemplateOnlyComponentManager {
    fn capabilities(&self, _definition: &ComponentDefinition) -> Capabilities {
        Capabilities::MINIMAL
    }

    fn create(
        &self,
        _env: &Environment,
        _definition: &ComponentDefinition,
        _args: Option<&Arguments>,
        _dynamic_scope: Option<&Rc<DynamicScope>>,
        _caller: Option<Reference>,
        _has_default_block: bool,
    ) -> Result<ComponentState> {
        Ok(Rc::new(()))
    }

    fn get_self(&self, _state: &ComponentState) -> Result<Reference> {
        Ok(ConstReference::null())
    }
}
