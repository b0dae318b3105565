//! Values, scopes, blocks and helpers.

use anyhow::Result;
use std::rc::Rc;
use trellis_opcode_compiler::{CompilableTemplate, SymbolTable};
use trellis_program::Register;
use trellis_reference::{ConstReference, HelperReference, Value, get_path};

use super::{count, register};
use crate::references::{self, DynamicVarReference};
use crate::resolver::RuntimeResolverExt as _;
use crate::vm::Vm;
use crate::vm::scope::{Scope, ScopeBlock, ScopeSlot};
use crate::vm::stack::StackValue;

pub fn primitive(vm: &mut Vm, word: i32) -> Result<()> {
    let value = vm.primitive(word)?;
    vm.stack().push(StackValue::Value(value));
    Ok(())
}

pub fn primitive_reference(vm: &mut Vm) -> Result<()> {
    let value = vm.stack().pop()?.into_value()?;
    vm.stack().push(StackValue::Reference(ConstReference::new(value)));
    Ok(())
}

pub fn constant(vm: &mut Vm, index: i32) -> Result<()> {
    let block = vm.other::<CompilableTemplate>(index)?;
    vm.stack().push(StackValue::Block(block));
    Ok(())
}

pub fn push_symbol_table(vm: &mut Vm, index: i32) -> Result<()> {
    let table = vm.serializable::<SymbolTable>(index)?;
    vm.stack().push(StackValue::Table(Rc::new(table)));
    Ok(())
}

pub fn push_block_scope(vm: &mut Vm) -> Result<()> {
    let scope = vm.scope()?;
    vm.stack().push(StackValue::Scope(scope));
    Ok(())
}

pub fn compile_block(vm: &mut Vm) -> Result<()> {
    let compiled = match vm.stack().pop()?.into_block()? {
        Some(block) => StackValue::Handle(vm.runtime().compile(&block)?),
        None => StackValue::Null,
    };
    vm.stack().push(compiled);
    Ok(())
}

pub fn load(vm: &mut Vm, word: i32) -> Result<()> {
    let value = vm.stack().pop()?;
    vm.low_level().load(register(word)?, value)
}

pub fn fetch(vm: &mut Vm, word: i32) -> Result<()> {
    let value = vm.low_level().fetch(register(word)?);
    vm.stack().push(value);
    Ok(())
}

pub fn get_variable(vm: &mut Vm, symbol: i32) -> Result<()> {
    let value = match vm.scope()?.slot(count(symbol)?) {
        Some(ScopeSlot::Reference(reference)) => StackValue::Reference(reference),
        Some(ScopeSlot::Block(block)) => StackValue::ScopeBlock(block),
        None => StackValue::Reference(ConstReference::undefined()),
    };
    vm.stack().push(value);
    Ok(())
}

pub fn get_property(vm: &mut Vm, key: i32) -> Result<()> {
    let key = vm.string(key)?;
    let parent = vm.stack().pop()?.into_reference()?;
    vm.stack().push(StackValue::Reference(get_path(&parent, &key)));
    Ok(())
}

pub fn get_block(vm: &mut Vm, symbol: i32) -> Result<()> {
    let block = vm.scope()?.get_block(count(symbol)?);
    vm.stack().push(StackValue::ScopeBlock(block));
    Ok(())
}

pub fn spread_block(vm: &mut Vm) -> Result<()> {
    let block = vm.stack().pop()?.into_scope_block()?;
    let stack = vm.stack();
    match block {
        Some(block) => {
            stack.push(StackValue::Table(Rc::clone(&block.table)));
            stack.push(StackValue::Scope(Rc::clone(&block.scope)));
            stack.push(StackValue::Block(Rc::clone(&block.block)));
        }
        None => {
            for _ in 0..3 {
                stack.push(StackValue::Null);
            }
        }
    }
    Ok(())
}

pub fn has_block(vm: &mut Vm) -> Result<()> {
    let present = vm.stack().pop()?.into_scope_block()?.is_some();
    vm.stack().push(StackValue::Reference(ConstReference::new(Value::Bool(present))));
    Ok(())
}

pub fn has_block_params(vm: &mut Vm) -> Result<()> {
    let stack = vm.stack();
    stack.pop()?.into_handle()?;
    stack.pop()?.into_scope()?;
    let table = stack.pop()?.into_table()?;
    let has_params = table.is_some_and(|table| !table.parameters().is_empty());
    stack.push(StackValue::Reference(ConstReference::new(Value::Bool(has_params))));
    Ok(())
}

pub fn set_variable(vm: &mut Vm, symbol: i32) -> Result<()> {
    let reference = vm.stack().pop()?.into_reference()?;
    vm.scope()?.bind_symbol(count(symbol)?, reference);
    Ok(())
}

pub fn set_block(vm: &mut Vm, symbol: i32) -> Result<()> {
    let stack = vm.stack();
    let block = stack.pop()?.into_block()?;
    let scope = stack.pop()?.into_scope()?;
    let table = stack.pop()?.into_table()?;
    let bound = match (block, scope, table) {
        (Some(block), Some(scope), Some(table)) => Some(Rc::new(ScopeBlock { block, scope, table })),
        _ => None,
    };
    vm.scope()?.bind_block(count(symbol)?, bound);
    Ok(())
}

pub fn root_scope(vm: &mut Vm, size: i32) -> Result<()> {
    vm.push_scope(Scope::sized(count(size)?));
    Ok(())
}

pub fn child_scope(vm: &mut Vm) -> Result<()> {
    let child = vm.scope()?.child();
    vm.push_scope(child);
    Ok(())
}

pub fn concat(vm: &mut Vm, parts: i32) -> Result<()> {
    let parts = vm
        .stack()
        .pop_n(count(parts)?)?
        .into_iter()
        .map(StackValue::into_reference)
        .collect::<Result<Vec<_>>>()?;
    let joined = references::concat(vm.env(), parts);
    vm.stack().push(StackValue::Reference(joined));
    Ok(())
}

pub fn helper(vm: &mut Vm, handle: i32) -> Result<()> {
    let helper = vm.runtime().resolver().resolve_helper(handle)?;
    let args = vm.stack().pop()?.into_args()?;
    let reference = HelperReference::new(helper, args.capture(), vm.env().path_delegate());
    vm.low_level().load(Register::V0, StackValue::Reference(reference))
}

/// Invoke the block spread on the stack with the positional arguments
/// below it. Without a block this only opens the frame and scope the
/// trailing `PopScope`/`PopFrame` close.
pub fn invoke_yield(vm: &mut Vm) -> Result<()> {
    let stack = vm.stack();
    let handle = stack.pop()?.into_handle()?;
    let scope = stack.pop()?.into_scope()?;
    let table = stack.pop()?.into_table()?;
    let args = stack.pop()?.into_args()?;

    let (Some(handle), Some(scope), Some(table)) = (handle, scope, table) else {
        vm.low_level().push_frame();
        let current = vm.scope()?;
        vm.push_scope(current);
        return Ok(());
    };

    let parameters = table.parameters();
    let invoking = if parameters.is_empty() {
        scope
    } else {
        let child = scope.child();
        for (index, &symbol) in parameters.iter().enumerate() {
            child.bind_symbol(symbol as usize, args.at(index));
        }
        child
    };
    vm.low_level().push_frame();
    vm.push_scope(invoking);
    vm.low_level().call(handle)
}

pub fn bind_dynamic_scope(vm: &mut Vm, names: i32) -> Result<()> {
    let names = vm.string_array(names)?;
    let scope = vm.dynamic_scope()?;
    for name in names.iter().rev() {
        let reference = vm.stack().pop()?.into_reference()?;
        scope.set(name, reference);
    }
    Ok(())
}

pub fn get_dynamic_var(vm: &mut Vm) -> Result<()> {
    let name = vm.stack().pop()?.into_reference()?;
    let scope = vm.dynamic_scope()?;
    vm.stack().push(StackValue::Reference(DynamicVarReference::new(scope, name)));
    Ok(())
}
