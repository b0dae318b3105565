//! `{{partial}}`, names that may be partial locals, and `{{debugger}}`.

use anyhow::{Result, anyhow, bail};
use log::{Level, debug, log_enabled};
use std::rc::Rc;
use trellis_reference::{PathReference as _, Value, get_path};

use crate::vm::Vm;
use crate::vm::scope::{Scope, ScopeSlot};
use crate::vm::stack::StackValue;

/// Render the partial named on the stack in a root scope that shares the
/// caller's `self` and sees the caller's locals listed in `info`.
pub fn invoke_partial(vm: &mut Vm, meta: i32, symbols: i32, info: i32) -> Result<()> {
    let referrer = vm.template_meta(meta)?;
    let outer_symbols = vm.string_array(symbols)?;
    let info = vm.array(info)?;

    let name = match vm.stack().pop()?.into_reference()?.value() {
        Value::String(name) => name,
        other => bail!("the name of a partial must be a string, not {other}"),
    };
    let template = vm
        .runtime()
        .resolver()
        .lookup_partial(&name, &referrer)
        .ok_or_else(|| anyhow!("Could not find a partial named \"{name}\""))?;
    let partial = template.as_partial();
    let handle = vm.runtime().compile(&partial)?;
    let partial_symbols = partial.symbol_table().symbols().to_vec();

    let outer = vm.scope()?;
    let scope = Scope::sized(partial_symbols.len() + 1);
    let eval = outer.eval_scope();
    scope.bind_eval_scope(eval.clone());
    scope.bind_symbol(0, outer.get_self()?);

    let mut locals = outer
        .partial_map()
        .map(|map| (*map).clone())
        .unwrap_or_default();
    for slot in info {
        let slot = usize::try_from(slot)?;
        let Some(local) = slot.checked_sub(1).and_then(|index| outer_symbols.get(index)) else {
            continue;
        };
        if let Some(ScopeSlot::Reference(reference)) = outer.slot(slot) {
            locals.insert(Rc::clone(local), reference);
        }
    }

    if let Some(eval) = &eval {
        let eval = eval.borrow();
        for (index, symbol) in partial_symbols.iter().enumerate() {
            if let Some(value) = eval.get(symbol.as_str()) {
                scope.bind(index + 1, value.clone());
            }
        }
    }
    scope.bind_partial_map(Rc::new(locals));

    debug!(target: "trellis::vm", "invoking partial {name}");
    vm.push_scope(scope);
    vm.low_level().push_frame();
    vm.low_level().call(handle)
}

/// A free name inside a partial: the caller's local if there is one,
/// otherwise a property of `this`.
pub fn resolve_maybe_local(vm: &mut Vm, name: i32) -> Result<()> {
    let name = vm.string(name)?;
    let scope = vm.scope()?;
    let local = scope.partial_map().and_then(|locals| locals.get(&name).cloned());
    let reference = match local {
        Some(reference) => reference,
        None => get_path(&scope.get_self()?, &name),
    };
    vm.stack().push(StackValue::Reference(reference));
    Ok(())
}

/// Log the locals in scope at a `{{debugger}}` statement.
pub fn debugger(vm: &mut Vm, symbols: i32, info: i32) -> Result<()> {
    if !log_enabled!(target: "trellis::debugger", Level::Debug) {
        return Ok(());
    }
    let symbols = vm.string_array(symbols)?;
    let info = vm.array(info)?;
    let scope = vm.scope()?;

    let this = scope.get_self()?;
    debug!(target: "trellis::debugger", "this = {:?}", this.value());
    for slot in info {
        let slot = usize::try_from(slot)?;
        let Some(name) = slot.checked_sub(1).and_then(|index| symbols.get(index)) else {
            continue;
        };
        match scope.slot(slot) {
            Some(ScopeSlot::Reference(reference)) => {
                debug!(target: "trellis::debugger", "{name} = {:?}", reference.value());
            }
            Some(ScopeSlot::Block(Some(_))) => debug!(target: "trellis::debugger", "{name} = <block>"),
            Some(ScopeSlot::Block(None)) => debug!(target: "trellis::debugger", "{name} = <unbound block>"),
            None => debug!(target: "trellis::debugger", "{name} is not bound"),
        }
    }
    if let Some(locals) = scope.partial_map() {
        for (name, reference) in locals.iter() {
            debug!(target: "trellis::debugger", "{name} = {:?} (from the caller)", reference.value());
        }
    }
    Ok(())
}
