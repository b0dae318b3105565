//! Component invocation: definitions, arguments, instances and layouts.

use anyhow::{Result, anyhow, bail};
use core::cell::RefCell;
use log::debug;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use trellis_program::Register;
use trellis_reference::{ConstReference, Value};

use super::{instance, register};
use crate::component::{ComponentInstance, CurryComponentReference, InstanceDefinition, definition_of};
use crate::resolver::RuntimeResolverExt as _;
use crate::updating::{DidUpdateLayout, UpdateComponent};
use crate::vm::Vm;
use crate::vm::arguments::Arguments;
use crate::vm::scope::{Scope, ScopeSlot};
use crate::vm::stack::StackValue;

fn push_instance(vm: &mut Vm, definition: InstanceDefinition) {
    let instance = ComponentInstance::new(definition);
    vm.stack().push(StackValue::Instance(Rc::new(RefCell::new(instance))));
}

pub fn push_component_definition(vm: &mut Vm, handle: i32) -> Result<()> {
    let definition = vm.runtime().resolver().resolve_component(handle)?;
    push_instance(vm, InstanceDefinition::Resolved(definition));
    Ok(())
}

/// Resolve a component named by a string, or unwrap a component value.
pub fn resolve_dynamic_component(vm: &mut Vm, meta: i32) -> Result<()> {
    let value = vm.stack().pop()?.into_reference()?.value();
    let definition = match &value {
        Value::String(name) if !name.is_empty() => {
            let referrer = vm.template_meta(meta)?;
            let definition = vm
                .runtime()
                .resolver()
                .lookup_component(name, &referrer)
                .ok_or_else(|| anyhow!("Could not find a component named \"{name}\""))?;
            InstanceDefinition::Resolved(definition)
        }
        other => definition_of(other)?,
    };
    vm.stack().push(StackValue::Definition(definition));
    Ok(())
}

pub fn push_dynamic_component_instance(vm: &mut Vm) -> Result<()> {
    let definition = vm.stack().pop()?.into_definition()?;
    push_instance(vm, definition);
    Ok(())
}

pub fn push_curried_component(vm: &mut Vm) -> Result<()> {
    let value = vm.stack().pop()?.into_reference()?.value();
    let definition = definition_of(&value)?;
    vm.stack().push(StackValue::Definition(definition));
    Ok(())
}

pub fn push_args(vm: &mut Vm, names: i32, block_names: i32, flags: i32) -> Result<()> {
    let names = vm.string_array(names)?;
    let block_names = vm.string_array(block_names)?;
    let args = Arguments::from_stack(vm.stack(), &names, &block_names, flags)?;
    vm.stack().push(StackValue::Args(Rc::new(args)));
    Ok(())
}

pub fn push_empty_args(vm: &mut Vm) -> Result<()> {
    vm.stack().push(StackValue::Args(Rc::default()));
    Ok(())
}

/// Merge curried arguments and let the manager rewrite the list.
pub fn prepare_args(vm: &mut Vm, word: i32) -> Result<()> {
    let instance = instance(vm, word)?;
    let mut args = vm.stack().pop()?.into_args()?;

    let curried = match instance.borrow().instance_definition() {
        InstanceDefinition::Curried(curried) => Some(Rc::clone(curried)),
        InstanceDefinition::Resolved(_) => None,
    };
    if let Some(curried) = curried {
        let (definition, merged) = curried.unwrap(&args);
        debug!(target: "trellis::component", "unwrapped curried component {}", definition.name());
        instance.borrow_mut().resolve(definition);
        args = Rc::new(merged);
    }

    let instance = instance.borrow();
    if instance.capabilities().prepare_args {
        let definition = instance.definition()?;
        if let Some(prepared) = definition.manager().prepare_args(definition, &args)? {
            args = Rc::new(prepared);
        }
    }
    vm.stack().push(StackValue::Args(args));
    Ok(())
}

pub fn capture_args(vm: &mut Vm) -> Result<()> {
    let captured = vm.stack().pop()?.into_args()?.capture();
    vm.stack().push(StackValue::Captured(captured));
    Ok(())
}

/// `(component ...)`: leaves the curried reference in `$v0`.
pub fn curry_component(vm: &mut Vm, meta: i32) -> Result<()> {
    let definition = vm.stack().pop()?.into_reference()?;
    let captured = vm.stack().pop()?.into_captured()?;
    let referrer = vm.template_meta(meta)?;
    let resolver = vm.runtime().resolver();
    let curried = CurryComponentReference::new(definition, resolver, referrer, captured);
    vm.low_level().load(Register::V0, StackValue::Reference(curried))
}

/// Set up the top-level component pushed by the renderer.
pub fn main(vm: &mut Vm, word: i32) -> Result<()> {
    let definition = vm.stack().pop()?.into_definition()?;
    let StackValue::Invocation { handle, table } = vm.stack().pop()? else {
        bail!("Main expects an invocation on the stack");
    };
    let mut instance = ComponentInstance::new(definition);
    instance.handle = Some(handle);
    instance.table = Some(table);
    let instance = StackValue::Instance(Rc::new(RefCell::new(instance)));
    vm.low_level().load(register(word)?, instance)
}

/// Ask the manager for the instance state, passing only what its
/// capabilities ask for.
pub fn create_component(vm: &mut Vm, flags: i32, word: i32) -> Result<()> {
    let instance = instance(vm, word)?;
    let (definition, capabilities) = {
        let instance = instance.borrow();
        (Rc::clone(instance.definition()?), instance.capabilities())
    };
    let dynamic_scope = if capabilities.dynamic_scope {
        Some(vm.dynamic_scope()?)
    } else {
        None
    };
    let args = if capabilities.create_args {
        Some(Rc::clone(vm.stack().peek()?.as_args()?))
    } else {
        None
    };
    let caller = if capabilities.create_caller {
        Some(vm.scope()?.get_self()?)
    } else {
        None
    };

    let manager = Rc::clone(definition.manager());
    let state = manager.create(
        vm.env(),
        &definition,
        args.as_deref(),
        dynamic_scope.as_ref(),
        caller,
        flags & 1 == 1,
    )?;
    instance.borrow_mut().state = Some(Rc::clone(&state));

    let tag = manager.tag(&state);
    if !tag.is_const() {
        vm.update_with(UpdateComponent::new(tag, state, manager, dynamic_scope))?;
    }
    Ok(())
}

pub fn register_destructor(vm: &mut Vm, word: i32) -> Result<()> {
    let instance = instance(vm, word)?;
    let instance = instance.borrow();
    if let Some(state) = &instance.state
        && let Some(destructor) = instance.manager()?.destructor(state)
    {
        vm.associate_destroyable(destructor);
    }
    Ok(())
}

pub fn get_component_self(vm: &mut Vm, word: i32) -> Result<()> {
    let instance = instance(vm, word)?;
    let this = {
        let instance = instance.borrow();
        match &instance.state {
            Some(state) => instance.manager()?.get_self(state)?,
            None => ConstReference::null(),
        }
    };
    vm.stack().push(StackValue::Reference(this));
    Ok(())
}

/// Compile the layout the manager picks; push its table and handle.
pub fn get_layout(vm: &mut Vm, word: i32) -> Result<()> {
    let instance = instance(vm, word)?;
    let layout = {
        let instance = instance.borrow();
        let definition = instance.definition()?;
        let manager = definition.manager();
        if instance.capabilities().dynamic_layout {
            manager.dynamic_layout(definition, instance.state.as_ref())?
        } else {
            manager.layout(definition)?
        }
    };
    let handle = vm.runtime().compile(&layout)?;
    let stack = vm.stack();
    stack.push(StackValue::Table(Rc::new(layout.symbol_table().clone())));
    stack.push(StackValue::Handle(handle));
    Ok(())
}

pub fn populate_layout(vm: &mut Vm, word: i32) -> Result<()> {
    let handle = vm.stack().pop()?.into_handle()?;
    let table = vm.stack().pop()?.into_table()?;
    let instance = instance(vm, word)?;
    let mut instance = instance.borrow_mut();
    instance.handle = handle;
    instance.table = table;
    Ok(())
}

fn layout_symbols(vm: &mut Vm, word: i32) -> Result<(Rc<RefCell<ComponentInstance>>, Vec<String>)> {
    let instance = instance(vm, word)?;
    let symbols = instance
        .borrow()
        .table
        .as_ref()
        .map(|table| table.symbols().to_vec())
        .ok_or_else(|| anyhow!("component layout has no symbol table"))?;
    Ok((instance, symbols))
}

pub fn virtual_root_scope(vm: &mut Vm, word: i32) -> Result<()> {
    let (_, symbols) = layout_symbols(vm, word)?;
    vm.push_scope(Scope::sized(symbols.len() + 1));
    Ok(())
}

/// Expose the layout's locals to `{{partial}}` when it needs them.
pub fn setup_for_eval(vm: &mut Vm, word: i32) -> Result<()> {
    let instance = instance(vm, word)?;
    let has_eval = instance.borrow().table.as_ref().is_some_and(|table| table.has_eval());
    if has_eval {
        let lookup = Rc::new(RefCell::new(FxHashMap::default()));
        instance.borrow_mut().lookup = Some(Rc::clone(&lookup));
        vm.scope()?.bind_eval_scope(Some(lookup));
    }
    Ok(())
}

fn symbol_of(symbols: &[String], name: &str) -> Option<usize> {
    symbols.iter().position(|symbol| symbol == name).map(|index| index + 1)
}

pub fn set_named_variables(vm: &mut Vm, word: i32) -> Result<()> {
    let (instance, symbols) = layout_symbols(vm, word)?;
    let args = Rc::clone(vm.stack().peek()?.as_args()?);
    let scope = vm.scope()?;
    let instance = instance.borrow();
    for (name, reference) in args.named().iter().rev() {
        let name = format!("@{name}");
        if let Some(symbol) = symbol_of(&symbols, &name) {
            scope.bind_symbol(symbol, Rc::clone(reference));
        }
        if let Some(lookup) = &instance.lookup {
            lookup
                .borrow_mut()
                .insert(Rc::from(name), ScopeSlot::Reference(Rc::clone(reference)));
        }
    }
    Ok(())
}

pub fn set_blocks(vm: &mut Vm, word: i32) -> Result<()> {
    let (instance, symbols) = layout_symbols(vm, word)?;
    let args = Rc::clone(vm.stack().peek()?.as_args()?);
    let scope = vm.scope()?;
    let instance = instance.borrow();
    for (name, block) in args.blocks() {
        let name = format!("&{name}");
        if let Some(symbol) = symbol_of(&symbols, &name) {
            scope.bind_block(symbol, block.clone());
        }
        if let Some(lookup) = &instance.lookup {
            lookup.borrow_mut().insert(Rc::from(name), ScopeSlot::Block(block.clone()));
        }
    }
    Ok(())
}

pub fn invoke_layout(vm: &mut Vm, word: i32) -> Result<()> {
    let handle = instance(vm, word)?
        .borrow()
        .handle
        .ok_or_else(|| anyhow!("component layout is not compiled"))?;
    vm.low_level().call(handle)
}

/// Open the cache group and block that wrap one component.
pub fn begin_transaction(vm: &mut Vm) -> Result<()> {
    vm.begin_cache_group()?;
    vm.builder().push_simple_block();
    Ok(())
}

/// Close the component's block and queue `did_create`.
pub fn did_render_layout(vm: &mut Vm, word: i32) -> Result<()> {
    let bounds = vm.builder().pop_block()?;
    let instance = instance(vm, word)?;
    let instance = instance.borrow();
    let Some(state) = &instance.state else {
        return Ok(());
    };
    let manager = instance.manager()?;
    manager.did_render_layout(state, &bounds);
    vm.env().did_create(Rc::clone(&manager), Rc::clone(state))?;
    vm.update_with(DidUpdateLayout::new(manager, Rc::clone(state), bounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElementBuilder;
    use crate::component::{ComponentDefinition, TemplateOnlyComponentManager};
    use crate::config::RuntimeConfig;
    use crate::environment::Environment;
    use crate::resolver::Registry;
    use crate::runtime::Runtime;
    use crate::vm::scope::DynamicScope;
    use trellis_dom::Document;
    use trellis_reference::PathReference as _;

    fn vm(registry: Rc<Registry>) -> Vm {
        let document = Rc::new(RefCell::new(Document::new()));
        let root = document.borrow().root();
        let env = Environment::with_defaults(Rc::clone(&document) as _);
        let runtime = Runtime::new(Rc::clone(&env), registry, RuntimeConfig::default());
        let builder = ElementBuilder::for_initial_render(env, root, None);
        Vm::initial(runtime, -1, Scope::root(ConstReference::undefined(), 1), DynamicScope::new(), builder)
    }

    /// Test that an unknown component name is an error, not an empty render.
    ///
    /// # Panics
    /// Panics if the lookup succeeds.
    #[test]
    fn unknown_dynamic_component_fails() -> Result<()> {
        let mut vm = vm(Registry::new());
        let meta = vm
            .runtime()
            .program()
            .borrow_mut()
            .constants
            .template_meta(&serde_json::json!({}));
        vm.stack().push(StackValue::Reference(ConstReference::new(Value::from("missing-thing"))));
        let error = resolve_dynamic_component(&mut vm, meta).err().ok_or_else(|| anyhow!("resolved"))?;
        assert!(error.to_string().contains("missing-thing"));
        Ok(())
    }

    /// Test that a template-only instance has a null `this`.
    ///
    /// # Panics
    /// Panics if `this` is not null.
    #[test]
    fn template_only_self_is_null() -> Result<()> {
        let mut vm = vm(Registry::new());
        let definition = ComponentDefinition::new("plain", Rc::new(TemplateOnlyComponentManager), None);
        push_instance(&mut vm, InstanceDefinition::Resolved(definition));
        let instance = vm.stack().pop()?;
        vm.low_level().load(Register::S0, instance)?;
        vm.stack().push(StackValue::Args(Rc::default()));
        create_component(&mut vm, 0, Register::S0 as i32)?;
        get_component_self(&mut vm, Register::S0 as i32)?;
        let this = vm.stack().pop()?.into_reference()?;
        assert!(matches!(this.value(), Value::Null));
        Ok(())
    }
}
