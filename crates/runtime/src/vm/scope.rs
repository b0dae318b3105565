//! Lexical and dynamic scopes.

use anyhow::{Result, anyhow};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use trellis_opcode_compiler::{CompilableTemplate, SymbolTable};
use trellis_reference::{ConstReference, Reference};

/// A block captured together with the scope it closes over.
pub struct ScopeBlock {
    /// The block, compiled on first invocation.
    pub block: Rc<CompilableTemplate>,
    /// The scope the block was written in.
    pub scope: Rc<Scope>,
    /// How the block binds its parameters.
    pub table: Rc<SymbolTable>,
}

/// One local slot.
#[derive(Clone)]
pub enum ScopeSlot {
    /// A value.
    Reference(Reference),
    /// A block symbol, possibly unbound.
    Block(Option<Rc<ScopeBlock>>),
}

impl Default for ScopeSlot {
    fn default() -> Self {
        Self::Reference(ConstReference::undefined())
    }
}

/// Locals visible to `{{partial}}` and `{{debugger}}`, keyed by symbol name.
pub type EvalScope = Rc<RefCell<FxHashMap<Rc<str>, ScopeSlot>>>;

/// Locals a partial can see from its caller, keyed by name.
pub type PartialMap = Rc<FxHashMap<Rc<str>, Reference>>;

/// Symbol slots, with `self` at slot 0.
#[derive(Default)]
pub struct Scope {
    slots: RefCell<Vec<ScopeSlot>>,
    eval: RefCell<Option<EvalScope>>,
    partial_map: RefCell<Option<PartialMap>>,
}

impl Scope {
    /// A root scope with `self` and `size` more slots.
    pub fn root(this: Reference, size: usize) -> Rc<Self> {
        let mut slots = vec![ScopeSlot::default(); size + 1];
        slots[0] = ScopeSlot::Reference(this);
        Rc::new(Self {
            slots: RefCell::new(slots),
            ..Self::default()
        })
    }

    /// A root scope of `size` unbound slots, `self` included.
    pub fn sized(size: usize) -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(vec![ScopeSlot::default(); size.max(1)]),
            ..Self::default()
        })
    }

    /// A copy sharing this scope's bindings, for block parameters.
    pub fn child(&self) -> Rc<Self> {
        Rc::new(Self {
            slots: RefCell::new(self.slots.borrow().clone()),
            eval: RefCell::new(self.eval.borrow().clone()),
            partial_map: RefCell::new(self.partial_map.borrow().clone()),
        })
    }

    /// The reference in slot 0.
    ///
    /// # Errors
    /// Returns an error if slot 0 holds a block.
    pub fn get_self(&self) -> Result<Reference> {
        self.get_symbol(0)
    }

    /// The reference in `symbol`.
    ///
    /// # Errors
    /// Returns an error if the slot is out of range or holds a block.
    pub fn get_symbol(&self, symbol: usize) -> Result<Reference> {
        match self.slots.borrow().get(symbol) {
            Some(ScopeSlot::Reference(reference)) => Ok(Rc::clone(reference)),
            Some(ScopeSlot::Block(_)) => Err(anyhow!("symbol {symbol} holds a block")),
            None => Err(anyhow!("symbol {symbol} is out of range")),
        }
    }

    /// The block in `symbol`, or `None` when it is unbound or holds a value.
    pub fn get_block(&self, symbol: usize) -> Option<Rc<ScopeBlock>> {
        match self.slots.borrow().get(symbol) {
            Some(ScopeSlot::Block(block)) => block.clone(),
            _ => None,
        }
    }

    /// Bind a slot, growing the scope if needed.
    pub fn bind(&self, symbol: usize, slot: ScopeSlot) {
        let mut slots = self.slots.borrow_mut();
        if symbol >= slots.len() {
            slots.resize_with(symbol + 1, ScopeSlot::default);
        }
        slots[symbol] = slot;
    }

    /// Bind a value.
    #[inline]
    pub fn bind_symbol(&self, symbol: usize, reference: Reference) {
        self.bind(symbol, ScopeSlot::Reference(reference));
    }

    /// Bind a block.
    #[inline]
    pub fn bind_block(&self, symbol: usize, block: Option<Rc<ScopeBlock>>) {
        self.bind(symbol, ScopeSlot::Block(block));
    }

    /// The slot at `symbol`.
    pub fn slot(&self, symbol: usize) -> Option<ScopeSlot> {
        self.slots.borrow().get(symbol).cloned()
    }

    /// The number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Whether the scope has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// The locals a partial or debugger statement can see.
    pub fn eval_scope(&self) -> Option<EvalScope> {
        self.eval.borrow().clone()
    }

    /// Attach the eval locals.
    pub fn bind_eval_scope(&self, eval: Option<EvalScope>) {
        *self.eval.borrow_mut() = eval;
    }

    /// The caller's locals, inside a partial.
    pub fn partial_map(&self) -> Option<PartialMap> {
        self.partial_map.borrow().clone()
    }

    /// Attach the caller's locals.
    pub fn bind_partial_map(&self, map: PartialMap) {
        *self.partial_map.borrow_mut() = Some(map);
    }
}

/// Values bound with `-with-dynamic-vars`, inherited by everything rendered
/// inside.
#[derive(Default)]
pub struct DynamicScope {
    bucket: RefCell<FxHashMap<Rc<str>, Reference>>,
}

impl DynamicScope {
    /// An empty dynamic scope.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// The reference bound to `key`.
    pub fn get(&self, key: &str) -> Option<Reference> {
        self.bucket.borrow().get(key).cloned()
    }

    /// Bind `key`.
    pub fn set(&self, key: &str, reference: Reference) {
        self.bucket.borrow_mut().insert(Rc::from(key), reference);
    }

    /// A copy whose writes don't leak back into this scope.
    pub fn child(&self) -> Rc<Self> {
        Rc::new(Self {
            bucket: RefCell::new(self.bucket.borrow().clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_reference::{PathReference as _, Value};

    /// Test that child scopes copy bindings without sharing writes.
    ///
    /// # Panics
    /// Panics if a child write leaks into its parent.
    #[test]
    fn children_copy_bindings() -> Result<()> {
        let scope = Scope::root(ConstReference::new(Value::from("self")), 2);
        scope.bind_symbol(1, ConstReference::new(Value::from(1)));
        let child = scope.child();
        child.bind_symbol(1, ConstReference::new(Value::from(2)));
        child.bind_symbol(5, ConstReference::null());

        assert_eq!(scope.get_symbol(1)?.value(), Value::from(1));
        assert_eq!(child.get_symbol(1)?.value(), Value::from(2));
        assert_eq!(child.get_self()?.value(), Value::from("self"));
        assert_eq!(child.len(), 6);
        assert!(scope.get_symbol(9).is_err());
        Ok(())
    }

    /// Test that block slots are not readable as values.
    ///
    /// # Panics
    /// Panics if an unbound block reads as a reference.
    #[test]
    fn block_slots_are_distinct() {
        let scope = Scope::sized(3);
        scope.bind_block(2, None);
        assert!(scope.get_block(2).is_none());
        assert!(scope.get_symbol(2).is_err());
        assert!(scope.get_block(1).is_none());
    }

    /// Test dynamic scope inheritance.
    ///
    /// # Panics
    /// Panics if a child binding leaks.
    #[test]
    fn dynamic_children_inherit() {
        let outer = DynamicScope::new();
        outer.set("theme", ConstReference::new(Value::from("dark")));
        let inner = outer.child();
        inner.set("theme", ConstReference::new(Value::from("light")));
        assert_eq!(outer.get("theme").map(|reference| reference.value()), Some(Value::from("dark")));
        assert_eq!(inner.get("theme").map(|reference| reference.value()), Some(Value::from("light")));
        assert!(outer.get("missing").is_none());
    }
}
