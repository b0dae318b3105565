//! The append VM: runs a compiled program once, building DOM and the
//! updating program that keeps it current.
//!
//! ```text
//!  Enter ──► capture state ──► TryBlock ──► children ──► ... ──► Exit
//!                 │
//!                 └── stack slice, scope, dynamic scope, $pc
//! ```

pub mod arguments;
pub mod scope;
pub mod stack;

use anyhow::{Context as _, Result, anyhow};
use core::any::Any;
use log::trace;
use serde::de::DeserializeOwned;
use std::rc::Rc;
use trellis_program::encoding::{
    Immediate, NUMBER_MAX_HANDLE, STRING_MAX_HANDLE, decode_handle, decode_immediate, is_string_handle,
};
use trellis_reference::{IterationKey, Reference, Value};
use trellis_validator::combine;

use crate::builder::{ElementBuilder, LiveBlock};
use crate::destroyable::{Destroy, DestructorList};
use crate::environment::Environment;
use crate::low_level::LowLevelVm;
use crate::opcodes;
use crate::runtime::Runtime;
use crate::updating::{DidModify, JumpIfNotModified, ListBlock, TryBlock, UpdatingList, UpdatingOpcode, updating_list};
use scope::{DynamicScope, Scope};
use stack::{EvaluationStack, StackValue};

/// Everything needed to run part of the program again later.
#[derive(Clone)]
pub struct ResumableState {
    /// Where to resume.
    pub pc: i32,
    scope: Rc<Scope>,
    dynamic_scope: Rc<DynamicScope>,
    stack: Vec<StackValue>,
}

/// What a finished append pass produced.
pub struct RenderOutcome {
    /// Opcodes revalidating the render.
    pub updating: UpdatingList,
    /// The DOM range rendered.
    pub block: Rc<LiveBlock>,
    /// Teardown of everything the render created.
    pub destructors: Rc<DestructorList>,
}

/// The append VM.
pub struct Vm {
    inner: LowLevelVm,
    runtime: Rc<Runtime>,
    builder: ElementBuilder,
    scopes: Vec<Rc<Scope>>,
    dynamic_scopes: Vec<Rc<DynamicScope>>,
    updating: Vec<UpdatingList>,
    cache_groups: Vec<usize>,
    lists: Vec<Rc<ListBlock>>,
    destructors: Vec<Rc<DestructorList>>,
    root_destructors: Rc<DestructorList>,
}

impl Vm {
    fn new(
        runtime: Rc<Runtime>,
        stack: EvaluationStack,
        pc: i32,
        scope: Rc<Scope>,
        dynamic_scope: Rc<DynamicScope>,
        builder: ElementBuilder,
        destructors: Rc<DestructorList>,
    ) -> Self {
        let inner = LowLevelVm::new(Rc::clone(runtime.program()), stack, pc);
        Self {
            inner,
            runtime,
            builder,
            scopes: vec![scope],
            dynamic_scopes: vec![dynamic_scope],
            updating: Vec::new(),
            cache_groups: Vec::new(),
            lists: Vec::new(),
            destructors: vec![Rc::clone(&destructors)],
            root_destructors: destructors,
        }
    }

    /// A VM for a first render starting at `pc`.
    pub fn initial(
        runtime: Rc<Runtime>,
        pc: i32,
        scope: Rc<Scope>,
        dynamic_scope: Rc<DynamicScope>,
        builder: ElementBuilder,
    ) -> Self {
        let mut vm = Self::new(
            runtime,
            EvaluationStack::default(),
            pc,
            scope,
            dynamic_scope,
            builder,
            DestructorList::new(),
        );
        vm.push_updating(updating_list());
        vm
    }

    /// A VM picking up from `state`, registering teardown on `destructors`.
    /// The caller pushes the updating lists it wants filled.
    pub fn resume(
        runtime: Rc<Runtime>,
        state: &ResumableState,
        builder: ElementBuilder,
        destructors: Rc<DestructorList>,
    ) -> Self {
        Self::new(
            runtime,
            EvaluationStack::restore(state.stack.clone()),
            state.pc,
            Rc::clone(&state.scope),
            Rc::clone(&state.dynamic_scope),
            builder,
            destructors,
        )
    }

    /// Run until `$pc` falls off the program.
    ///
    /// # Errors
    /// Returns the first failing opcode's error.
    pub fn execute(mut self) -> Result<RenderOutcome> {
        while let Some(instruction) = self.inner.next_statement() {
            let op = instruction
                .op()
                .ok_or_else(|| anyhow!("unknown opcode {} at {}", instruction.kind, instruction.offset))?;
            if op.is_machine() {
                self.inner.evaluate_outer(op, &instruction)?;
            } else {
                trace!(target: "trellis::vm", "{:>6} {op}", instruction.offset);
                opcodes::evaluate(&mut self, op, &instruction)
                    .with_context(|| format!("{op} at {}", instruction.offset))?;
            }
        }
        let block = self.builder.pop_block()?;
        let updating = self.pop_updating()?;
        Ok(RenderOutcome {
            updating,
            block,
            destructors: self.root_destructors,
        })
    }

    /// The register machine.
    #[inline]
    pub const fn low_level(&mut self) -> &mut LowLevelVm {
        &mut self.inner
    }

    /// The evaluation stack.
    #[inline]
    pub const fn stack(&mut self) -> &mut EvaluationStack {
        &mut self.inner.stack
    }

    /// The runtime.
    #[inline]
    pub const fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    /// The environment.
    #[inline]
    pub fn env(&self) -> &Rc<Environment> {
        self.runtime.env()
    }

    /// The DOM builder.
    #[inline]
    pub const fn builder(&mut self) -> &mut ElementBuilder {
        &mut self.builder
    }

    /// Decode a `Primitive` operand.
    ///
    /// # Errors
    /// Returns an error for a handle the constant pool does not know.
    pub fn primitive(&self, word: i32) -> Result<Value> {
        if word >= 0 {
            return Ok(match decode_immediate(word) {
                Immediate::Int(number) => Value::Number(f64::from(number)),
                Immediate::Bool(flag) => Value::Bool(flag),
                Immediate::Null => Value::Null,
                Immediate::Undefined => Value::Undefined,
            });
        }
        let program = self.inner.program().borrow();
        if is_string_handle(word) {
            let index = decode_handle(word, STRING_MAX_HANDLE) as i32;
            Ok(Value::string(program.constants.get_string(index)?))
        } else {
            let index = decode_handle(word, NUMBER_MAX_HANDLE) as i32;
            Ok(Value::Number(program.constants.get_number(index)?))
        }
    }

    /// A string constant; index 0 is the empty string.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn string(&self, index: i32) -> Result<Rc<str>> {
        Ok(Rc::from(self.inner.program().borrow().constants.get_string(index)?))
    }

    /// A string constant, or `None` for index 0.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn optional_string(&self, index: i32) -> Result<Option<Rc<str>>> {
        if index == 0 {
            return Ok(None);
        }
        self.string(index).map(Some)
    }

    /// A string array constant.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn string_array(&self, index: i32) -> Result<Vec<Rc<str>>> {
        self.inner.program().borrow().constants.get_string_array(index)
    }

    /// An integer array constant.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn array(&self, index: i32) -> Result<Vec<i32>> {
        Ok(self.inner.program().borrow().constants.get_array(index)?.to_vec())
    }

    /// A deserialized constant.
    ///
    /// # Errors
    /// Returns an error for an unknown index or a value of another shape.
    pub fn serializable<T: DeserializeOwned>(&self, index: i32) -> Result<T> {
        self.inner.program().borrow().constants.get_serializable(index)
    }

    /// Template metadata identifying the referrer.
    ///
    /// # Errors
    /// Returns an error for an unknown index.
    pub fn template_meta(&self, index: i32) -> Result<serde_json::Value> {
        Ok(self.inner.program().borrow().constants.get_template_meta(index)?.clone())
    }

    /// A runtime object constant.
    ///
    /// # Errors
    /// Returns an error for an unknown index or a value of another type.
    pub fn other<T: Any>(&self, index: i32) -> Result<Rc<T>> {
        self.inner.program().borrow().constants.get_other(index)
    }

    /// The innermost lexical scope.
    ///
    /// # Errors
    /// Returns an error when the scope stack is empty.
    pub fn scope(&self) -> Result<Rc<Scope>> {
        self.scopes.last().cloned().ok_or_else(|| anyhow!("no scope"))
    }

    /// Enter `scope`.
    pub fn push_scope(&mut self, scope: Rc<Scope>) {
        self.scopes.push(scope);
    }

    /// Leave the innermost scope.
    ///
    /// # Errors
    /// Returns an error when the scope stack is empty.
    pub fn pop_scope(&mut self) -> Result<Rc<Scope>> {
        self.scopes.pop().ok_or_else(|| anyhow!("popping a scope with none open"))
    }

    /// The innermost dynamic scope.
    ///
    /// # Errors
    /// Returns an error when the dynamic scope stack is empty.
    pub fn dynamic_scope(&self) -> Result<Rc<DynamicScope>> {
        self.dynamic_scopes
            .last()
            .cloned()
            .ok_or_else(|| anyhow!("no dynamic scope"))
    }

    /// Enter a child of the current dynamic scope.
    ///
    /// # Errors
    /// Returns an error when the dynamic scope stack is empty.
    pub fn push_dynamic_scope(&mut self) -> Result<Rc<DynamicScope>> {
        let child = self.dynamic_scope()?.child();
        self.dynamic_scopes.push(Rc::clone(&child));
        Ok(child)
    }

    /// Leave the innermost dynamic scope.
    ///
    /// # Errors
    /// Returns an error when the dynamic scope stack is empty.
    pub fn pop_dynamic_scope(&mut self) -> Result<()> {
        self.dynamic_scopes
            .pop()
            .ok_or_else(|| anyhow!("popping a dynamic scope with none open"))?;
        Ok(())
    }

    /// Start filling `list`.
    pub fn push_updating(&mut self, list: UpdatingList) {
        self.updating.push(list);
    }

    fn pop_updating(&mut self) -> Result<UpdatingList> {
        self.updating
            .pop()
            .ok_or_else(|| anyhow!("popping an updating list with none open"))
    }

    fn updating(&self) -> Result<&UpdatingList> {
        self.updating.last().ok_or_else(|| anyhow!("no updating list"))
    }

    /// Append an opcode to the current updating list.
    ///
    /// # Errors
    /// Returns an error when no updating list is open.
    pub fn update_with(&mut self, op: Rc<dyn UpdatingOpcode>) -> Result<()> {
        self.updating()?.borrow_mut().push(op);
        Ok(())
    }

    /// Tear `destroyable` down together with the innermost block.
    pub fn associate_destroyable(&self, destroyable: Rc<dyn Destroy>) {
        self.destructors
            .last()
            .unwrap_or(&self.root_destructors)
            .associate(destroyable);
    }

    /// Snapshot enough state to run from `pc`, or from the next
    /// instruction, again; the top `count` stack values are kept.
    ///
    /// # Errors
    /// Returns an error when the stack holds fewer than `count` values.
    pub fn capture(&self, count: usize, pc: Option<i32>) -> Result<ResumableState> {
        Ok(ResumableState {
            pc: pc.unwrap_or_else(|| self.inner.pc()),
            scope: self.scope()?,
            dynamic_scope: self.dynamic_scope()?,
            stack: self.inner.stack.capture(count)?,
        })
    }

    fn enter_block(
        &mut self,
        op: Rc<dyn UpdatingOpcode>,
        destroyable: Rc<dyn Destroy>,
        children: UpdatingList,
        destructors: Rc<DestructorList>,
    ) -> Result<()> {
        self.associate_destroyable(destroyable);
        self.destructors.push(destructors);
        self.update_with(op)?;
        self.push_updating(children);
        Ok(())
    }

    /// Start a re-renderable block over the top `count` stack values.
    ///
    /// # Errors
    /// Returns an error when the stack is too short.
    pub fn enter(&mut self, count: usize) -> Result<()> {
        let state = self.capture(count, None)?;
        let bounds = self.builder.push_updatable_block();
        let block = TryBlock::new(Rc::clone(&self.runtime), state, bounds);
        self.did_enter(&block)
    }

    /// Make `block` the innermost block.
    ///
    /// # Errors
    /// Returns an error when no updating list is open.
    pub fn did_enter(&mut self, block: &Rc<TryBlock>) -> Result<()> {
        self.enter_block(
            Rc::clone(block) as _,
            Rc::clone(block) as _,
            Rc::clone(block.children()),
            Rc::clone(block.destructors()),
        )
    }

    /// Close the innermost block.
    ///
    /// # Errors
    /// Returns an error when no block is open.
    pub fn exit(&mut self) -> Result<()> {
        self.destructors.pop();
        self.builder.pop_block()?;
        self.pop_updating()?;
        let parent = self.updating()?;
        let last = parent.borrow().last().cloned();
        if let Some(block) = last {
            block.did_initialize_children();
        }
        Ok(())
    }

    /// Start the list over the iterator on top of the stack. Items resume
    /// at `offset`.
    ///
    /// # Errors
    /// Returns an error when the stack does not hold an iterator.
    pub fn enter_list(&mut self, offset: i32) -> Result<()> {
        let address = self.inner.target(offset);
        let state = self.capture(0, Some(address))?;
        let artifacts = Rc::clone(self.inner.stack.peek()?.as_iterator()?.borrow().artifacts());
        let children = updating_list();
        let bounds = self.builder.push_block_list(Rc::clone(&children));
        let list = ListBlock::new(Rc::clone(&self.runtime), state, bounds, children, artifacts);
        self.lists.push(Rc::clone(&list));
        let destructors = Rc::clone(list.destructors());
        self.enter_block(Rc::clone(&list) as _, Rc::clone(&list) as _, Rc::clone(list.children()), destructors)
    }

    /// Close the innermost list.
    ///
    /// # Errors
    /// Returns an error when no list is open.
    pub fn exit_list(&mut self) -> Result<()> {
        self.exit()?;
        self.lists
            .pop()
            .ok_or_else(|| anyhow!("exiting a list with none open"))?;
        Ok(())
    }

    /// Push an item's value and memo and open a block for it.
    ///
    /// # Errors
    /// Returns an error when the scope stacks are empty.
    pub fn iterate(&mut self, memo: Reference, value: Reference) -> Result<Rc<TryBlock>> {
        self.inner.stack.push(StackValue::Reference(value));
        self.inner.stack.push(StackValue::Reference(memo));
        let state = self.capture(2, None)?;
        let bounds = self.builder.push_updatable_block();
        Ok(TryBlock::new(Rc::clone(&self.runtime), state, bounds))
    }

    /// Register `block` under `key` in the innermost list and enter it.
    ///
    /// # Errors
    /// Returns an error when no list is open.
    pub fn enter_item(&mut self, key: IterationKey, block: &Rc<TryBlock>) -> Result<()> {
        let list = self
            .lists
            .last()
            .ok_or_else(|| anyhow!("iterating outside a list"))?;
        list.register_item(key, Rc::clone(block));
        self.did_enter(block)
    }

    /// Start a group of opcodes skipped as a whole while their tags hold.
    ///
    /// # Errors
    /// Returns an error when no updating list is open.
    pub fn begin_cache_group(&mut self) -> Result<()> {
        let start = self.updating()?.borrow().len();
        self.cache_groups.push(start);
        Ok(())
    }

    /// Close the innermost cache group.
    ///
    /// # Errors
    /// Returns an error when no group is open.
    pub fn commit_cache_group(&mut self) -> Result<()> {
        let start = self
            .cache_groups
            .pop()
            .ok_or_else(|| anyhow!("committing a cache group with none open"))?;
        let mut ops = self.updating()?.borrow_mut();
        let start = start.min(ops.len());
        let tag = combine(ops[start..].iter().map(|op| op.tag()));
        let guard = JumpIfNotModified::new(tag, ops.len() - start + 1);
        ops.insert(start, Rc::clone(&guard) as _);
        ops.push(DidModify::new(guard));
        Ok(())
    }
}
