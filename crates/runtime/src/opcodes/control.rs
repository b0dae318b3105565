//! Branches, guards and iteration.

use anyhow::Result;
use core::cell::RefCell;
use log::trace;
use std::rc::Rc;
use trellis_reference::{PathReference as _, ReferenceCache, ReferenceIterator, Value};

use crate::references::{self, IterablePresenceReference};
use crate::updating::Assert;
use crate::vm::Vm;
use crate::vm::stack::StackValue;

/// Jump to `target` when the popped condition is falsy. A condition that
/// can change leaves an [`Assert`] behind, so the block re-renders when it
/// flips.
pub fn jump_unless(vm: &mut Vm, target: i32) -> Result<()> {
    let condition = vm.stack().pop()?.into_reference()?;
    if condition.is_const() {
        if !condition.value().is_truthy() {
            vm.low_level().goto(target);
        }
        return Ok(());
    }
    let mut cache = ReferenceCache::new(condition);
    if !cache.peek().is_truthy() {
        vm.low_level().goto(target);
    }
    vm.update_with(Assert::new(cache))
}

pub fn jump_eq(vm: &mut Vm, target: i32, expected: i32) -> Result<()> {
    if vm.stack().peek()?.as_int()? == expected {
        vm.low_level().goto(target);
    }
    Ok(())
}

pub fn assert_same(vm: &mut Vm) -> Result<()> {
    let reference = Rc::clone(vm.stack().peek()?.as_reference()?);
    if !reference.is_const() {
        vm.update_with(Assert::current(reference))?;
    }
    Ok(())
}

pub fn reify_u32(vm: &mut Vm) -> Result<()> {
    let number = match vm.stack().peek()?.as_reference()?.value() {
        Value::Number(number) => number as i32,
        _ => 0,
    };
    vm.stack().push(StackValue::Int(number));
    Ok(())
}

pub fn to_boolean(vm: &mut Vm) -> Result<()> {
    let reference = vm.stack().pop()?.into_reference()?;
    let truthy = references::to_bool(vm.env(), reference);
    vm.stack().push(StackValue::Reference(truthy));
    Ok(())
}

pub fn content_type(vm: &mut Vm) -> Result<()> {
    let reference = Rc::clone(vm.stack().peek()?.as_reference()?);
    let kind = references::content_type(vm.env(), reference);
    vm.stack().push(StackValue::Reference(kind));
    Ok(())
}

/// Pop the list and its key path; push the iterator and whether the list
/// has any items.
pub fn put_iterator(vm: &mut Vm) -> Result<()> {
    let list = vm.stack().pop()?.into_reference()?;
    let key = vm.stack().pop()?.into_reference()?.value();
    let iterable = vm.env().iterable_for(list, &key);
    let iterator = ReferenceIterator::new(iterable);
    let presence = IterablePresenceReference::new(Rc::clone(iterator.artifacts()));
    let stack = vm.stack();
    stack.push(StackValue::Iterator(Rc::new(RefCell::new(iterator))));
    stack.push(StackValue::Reference(presence));
    Ok(())
}

/// Render the next item, or jump to `breaks` once the list is exhausted.
pub fn iterate(vm: &mut Vm, breaks: i32) -> Result<()> {
    let iterator = Rc::clone(vm.stack().peek()?.as_iterator()?);
    let next = iterator.borrow_mut().next_item();
    match next {
        Some((key, value, memo)) => {
            trace!(target: "trellis::vm", "rendering item {key}");
            let block = vm.iterate(memo, value)?;
            vm.enter_item(key, &block)
        }
        None => {
            vm.low_level().goto(breaks);
            Ok(())
        }
    }
}
