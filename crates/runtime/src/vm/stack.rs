//! The evaluation stack and the values it holds.

use anyhow::{Result, anyhow, bail, ensure};
use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;
use trellis_opcode_compiler::{CompilableTemplate, SymbolTable};
use trellis_reference::{CapturedArguments, Reference, ReferenceIterator, Value};

use crate::builder::ElementOperations;
use crate::component::{ComponentInstance, InstanceDefinition};
use crate::vm::arguments::Arguments;
use crate::vm::scope::{Scope, ScopeBlock};

/// One slot of the evaluation stack or a register.
#[derive(Clone, Default)]
pub enum StackValue {
    /// Nothing; also what registers start out as.
    #[default]
    Null,
    /// A raw integer: a saved register, a flag or a content type.
    Int(i32),
    /// A primitive before `PrimitiveReference` wraps it.
    Value(Value),
    /// A reference.
    Reference(Reference),
    /// A block's symbol table.
    Table(Rc<SymbolTable>),
    /// A captured scope.
    Scope(Rc<Scope>),
    /// A block not compiled yet.
    Block(Rc<CompilableTemplate>),
    /// The result of `GetBlock`.
    ScopeBlock(Option<Rc<ScopeBlock>>),
    /// A compiled block's heap handle.
    Handle(i32),
    /// Evaluated arguments.
    Args(Rc<Arguments>),
    /// Arguments captured for currying.
    Captured(CapturedArguments),
    /// An `{{#each}}` iterator.
    Iterator(Rc<RefCell<ReferenceIterator>>),
    /// The component being invoked.
    Instance(Rc<RefCell<ComponentInstance>>),
    /// A definition waiting for `Main`.
    Definition(InstanceDefinition),
    /// The element operations collecting attributes for `...attributes`.
    Operations(Rc<RefCell<ElementOperations>>),
    /// The entry point `Main` calls.
    Invocation {
        /// Handle of the compiled layout.
        handle: i32,
        /// The layout's symbol table.
        table: Rc<SymbolTable>,
    },
}

impl StackValue {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Int(_) => "int",
            Self::Value(_) => "value",
            Self::Reference(_) => "reference",
            Self::Table(_) => "symbol table",
            Self::Scope(_) => "scope",
            Self::Block(_) => "block",
            Self::ScopeBlock(_) => "scope block",
            Self::Handle(_) => "handle",
            Self::Args(_) => "arguments",
            Self::Captured(_) => "captured arguments",
            Self::Iterator(_) => "iterator",
            Self::Instance(_) => "component instance",
            Self::Definition(_) => "component definition",
            Self::Operations(_) => "element operations",
            Self::Invocation { .. } => "invocation",
        }
    }

    /// Whether this stands for "no value" in a block triple.
    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::Null | Self::Value(Value::Null | Value::Undefined))
    }

    fn mismatch<T>(&self, expected: &str) -> Result<T> {
        Err(anyhow!("expected {expected} on the stack, found {}", self.kind()))
    }

    /// Unwrap a reference.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_reference(self) -> Result<Reference> {
        match self {
            Self::Reference(reference) => Ok(reference),
            other => other.mismatch("reference"),
        }
    }

    /// Borrow a reference.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn as_reference(&self) -> Result<&Reference> {
        match self {
            Self::Reference(reference) => Ok(reference),
            other => other.mismatch("reference"),
        }
    }

    /// Read an integer.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn as_int(&self) -> Result<i32> {
        match self {
            Self::Int(value) => Ok(*value),
            other => other.mismatch("int"),
        }
    }

    /// Unwrap a primitive.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Null => Ok(Value::Null),
            other => other.mismatch("primitive"),
        }
    }

    /// Unwrap an optional symbol table.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_table(self) -> Result<Option<Rc<SymbolTable>>> {
        match self {
            Self::Table(table) => Ok(Some(table)),
            none if none.is_none() => Ok(None),
            other => other.mismatch("symbol table"),
        }
    }

    /// Unwrap an optional scope.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_scope(self) -> Result<Option<Rc<Scope>>> {
        match self {
            Self::Scope(scope) => Ok(Some(scope)),
            none if none.is_none() => Ok(None),
            other => other.mismatch("scope"),
        }
    }

    /// Unwrap an optional uncompiled block.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_block(self) -> Result<Option<Rc<CompilableTemplate>>> {
        match self {
            Self::Block(block) => Ok(Some(block)),
            none if none.is_none() => Ok(None),
            other => other.mismatch("block"),
        }
    }

    /// Unwrap an optional compiled handle.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_handle(self) -> Result<Option<i32>> {
        match self {
            Self::Handle(handle) => Ok(Some(handle)),
            none if none.is_none() => Ok(None),
            other => other.mismatch("handle"),
        }
    }

    /// Unwrap the result of `GetBlock`.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_scope_block(self) -> Result<Option<Rc<ScopeBlock>>> {
        match self {
            Self::ScopeBlock(block) => Ok(block),
            none if none.is_none() => Ok(None),
            other => other.mismatch("scope block"),
        }
    }

    /// Unwrap arguments.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_args(self) -> Result<Rc<Arguments>> {
        match self {
            Self::Args(args) => Ok(args),
            other => other.mismatch("arguments"),
        }
    }

    /// Borrow arguments.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn as_args(&self) -> Result<&Rc<Arguments>> {
        match self {
            Self::Args(args) => Ok(args),
            other => other.mismatch("arguments"),
        }
    }

    /// Unwrap captured arguments.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_captured(self) -> Result<CapturedArguments> {
        match self {
            Self::Captured(args) => Ok(args),
            other => other.mismatch("captured arguments"),
        }
    }

    /// Borrow an iterator.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn as_iterator(&self) -> Result<&Rc<RefCell<ReferenceIterator>>> {
        match self {
            Self::Iterator(iterator) => Ok(iterator),
            other => other.mismatch("iterator"),
        }
    }

    /// Borrow a component instance.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn as_instance(&self) -> Result<&Rc<RefCell<ComponentInstance>>> {
        match self {
            Self::Instance(instance) => Ok(instance),
            other => other.mismatch("component instance"),
        }
    }

    /// Unwrap a definition.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_definition(self) -> Result<InstanceDefinition> {
        match self {
            Self::Definition(definition) => Ok(definition),
            other => other.mismatch("component definition"),
        }
    }

    /// Unwrap element operations, if any were created.
    ///
    /// # Errors
    /// Returns an error for any other kind.
    pub fn into_operations(self) -> Result<Option<Rc<RefCell<ElementOperations>>>> {
        match self {
            Self::Operations(operations) => Ok(Some(operations)),
            Self::Null => Ok(None),
            other => other.mismatch("element operations"),
        }
    }
}

impl fmt::Debug for StackValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(formatter, "Int({value})"),
            Self::Value(value) => write!(formatter, "Value({value:?})"),
            Self::Handle(handle) => write!(formatter, "Handle({handle})"),
            Self::Reference(reference) => write!(formatter, "Reference({:?})", reference.value()),
            other => formatter.write_str(other.kind()),
        }
    }
}

/// The operand stack of the append VM.
#[derive(Default)]
pub struct EvaluationStack {
    values: Vec<StackValue>,
}

impl EvaluationStack {
    /// A stack holding `values`, bottom first.
    pub const fn restore(values: Vec<StackValue>) -> Self {
        Self { values }
    }

    /// Push a value.
    #[inline]
    pub fn push(&mut self, value: StackValue) {
        self.values.push(value);
    }

    /// Pop the top value.
    ///
    /// # Errors
    /// Returns an error when the stack is empty.
    pub fn pop(&mut self) -> Result<StackValue> {
        self.values
            .pop()
            .ok_or_else(|| anyhow!("evaluation stack underflow"))
    }

    /// Pop `count` values, returned bottom first.
    ///
    /// # Errors
    /// Returns an error when fewer than `count` values are present.
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<StackValue>> {
        ensure!(
            count <= self.values.len(),
            "popping {count} values from a stack of {}",
            self.values.len()
        );
        Ok(self.values.split_off(self.values.len() - count))
    }

    /// Drop `count` values.
    ///
    /// # Errors
    /// Returns an error when fewer than `count` values are present.
    pub fn drop_n(&mut self, count: usize) -> Result<()> {
        self.pop_n(count).map(drop)
    }

    /// The top value.
    ///
    /// # Errors
    /// Returns an error when the stack is empty.
    pub fn peek(&self) -> Result<&StackValue> {
        self.values
            .last()
            .ok_or_else(|| anyhow!("peeking an empty evaluation stack"))
    }

    /// The value `offset` slots below the top.
    ///
    /// # Errors
    /// Returns an error when the slot does not exist.
    pub fn from_top(&self, offset: usize) -> Result<&StackValue> {
        self.values
            .len()
            .checked_sub(offset + 1)
            .and_then(|index| self.values.get(index))
            .ok_or_else(|| anyhow!("stack slot {offset} below the top is out of range"))
    }

    /// The value at absolute `index`.
    ///
    /// # Errors
    /// Returns an error when the slot does not exist.
    pub fn get(&self, index: i32) -> Result<&StackValue> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.values.get(index))
            .ok_or_else(|| anyhow!("stack slot {index} is out of range"))
    }

    /// The number of values.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the stack is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop everything above `len`.
    ///
    /// # Errors
    /// Returns an error when `len` is above the current height.
    pub fn truncate(&mut self, len: usize) -> Result<()> {
        if len > self.values.len() {
            bail!("cannot truncate a stack of {} to {len}", self.values.len());
        }
        self.values.truncate(len);
        Ok(())
    }

    /// Copy the top `count` values, bottom first.
    ///
    /// # Errors
    /// Returns an error when fewer than `count` values are present.
    pub fn capture(&self, count: usize) -> Result<Vec<StackValue>> {
        ensure!(
            count <= self.values.len(),
            "capturing {count} values from a stack of {}",
            self.values.len()
        );
        Ok(self.values[self.values.len() - count..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test addressing from the top and by index.
    ///
    /// # Panics
    /// Panics if an offset is miscounted.
    #[test]
    fn addresses_slots() -> Result<()> {
        let mut stack = EvaluationStack::default();
        for value in 0..4 {
            stack.push(StackValue::Int(value));
        }
        assert_eq!(stack.from_top(0)?.as_int()?, 3);
        assert_eq!(stack.from_top(3)?.as_int()?, 0);
        assert!(stack.from_top(4).is_err());
        assert_eq!(stack.get(1)?.as_int()?, 1);

        let captured = stack.capture(2)?;
        assert_eq!(captured.len(), 2);
        let popped = stack.pop_n(2)?;
        assert_eq!(popped[0].as_int()?, 2);
        assert_eq!(stack.len(), 2);
        assert!(stack.pop_n(3).is_err());
        Ok(())
    }

    /// Test that null slots read as "no block".
    ///
    /// # Panics
    /// Panics if a null is mistaken for a value.
    #[test]
    fn nulls_are_absent_blocks() -> Result<()> {
        assert!(StackValue::Null.into_table()?.is_none());
        assert!(StackValue::Value(Value::Null).into_handle()?.is_none());
        assert!(StackValue::Int(1).into_scope().is_err());
        Ok(())
    }
}
