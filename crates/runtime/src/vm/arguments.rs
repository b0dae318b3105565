//! Evaluated invocation arguments.

use anyhow::Result;
use std::rc::Rc;
use trellis_reference::{CapturedArguments, ConstReference, PathReference as _, Reference};
use trellis_validator::{Tag, combine};

use crate::vm::scope::ScopeBlock;
use crate::vm::stack::{EvaluationStack, StackValue};

/// Flag bit set when hash names carry a leading `@`.
pub const AT_NAMES: i32 = 0b1000;

/// Positional and named references plus the blocks passed to an invocation.
#[derive(Clone, Default)]
pub struct Arguments {
    positional: Vec<Reference>,
    named: Vec<(Rc<str>, Reference)>,
    blocks: Vec<(Rc<str>, Option<Rc<ScopeBlock>>)>,
}

impl Arguments {
    /// No arguments.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Arguments from evaluated references.
    pub const fn new(positional: Vec<Reference>, named: Vec<(Rc<str>, Reference)>) -> Self {
        Self {
            positional,
            named,
            blocks: Vec::new(),
        }
    }

    /// Pop the values pushed for `PushArgs`.
    ///
    /// The stack holds, bottom to top, a `(table, scope, block)` triple per
    /// block name, the positional values, then one value per hash name.
    ///
    /// # Errors
    /// Returns an error if the stack does not hold that shape.
    pub fn from_stack(
        stack: &mut EvaluationStack,
        names: &[Rc<str>],
        block_names: &[Rc<str>],
        flags: i32,
    ) -> Result<Self> {
        let at_names = flags & AT_NAMES != 0;
        let positional_count = usize::try_from(flags >> 4)?;

        let mut named = Vec::with_capacity(names.len());
        for name in names.iter().rev() {
            let reference = stack.pop()?.into_reference()?;
            let name = if at_names {
                name.strip_prefix('@').map_or_else(|| Rc::clone(name), Rc::from)
            } else {
                Rc::clone(name)
            };
            named.push((name, reference));
        }
        named.reverse();

        let positional = stack
            .pop_n(positional_count)?
            .into_iter()
            .map(StackValue::into_reference)
            .collect::<Result<Vec<_>>>()?;

        let mut blocks = Vec::with_capacity(block_names.len());
        for name in block_names.iter().rev() {
            let block = stack.pop()?.into_block()?;
            let scope = stack.pop()?.into_scope()?;
            let table = stack.pop()?.into_table()?;
            let scope_block = match (block, scope, table) {
                (Some(block), Some(scope), Some(table)) => Some(Rc::new(ScopeBlock { block, scope, table })),
                _ => None,
            };
            blocks.push((Rc::clone(name), scope_block));
        }
        blocks.reverse();

        Ok(Self {
            positional,
            named,
            blocks,
        })
    }

    /// The positional references.
    #[inline]
    pub fn positional(&self) -> &[Reference] {
        &self.positional
    }

    /// The named references, without `@`.
    #[inline]
    pub fn named(&self) -> &[(Rc<str>, Reference)] {
        &self.named
    }

    /// The passed blocks, by name without `&`.
    #[inline]
    pub fn blocks(&self) -> &[(Rc<str>, Option<Rc<ScopeBlock>>)] {
        &self.blocks
    }

    /// The positional reference at `index`, or `undefined`.
    pub fn at(&self, index: usize) -> Reference {
        self.positional
            .get(index)
            .cloned()
            .unwrap_or_else(ConstReference::undefined)
    }

    /// The named reference `name`.
    pub fn get(&self, name: &str) -> Option<&Reference> {
        self.named
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, reference)| reference)
    }

    /// The block passed as `name`.
    pub fn block(&self, name: &str) -> Option<Rc<ScopeBlock>> {
        self.blocks
            .iter()
            .find(|(key, _)| &**key == name)
            .and_then(|(_, block)| block.clone())
    }

    /// The combined tag of every reference.
    pub fn tag(&self) -> Tag {
        combine(
            self.positional
                .iter()
                .chain(self.named.iter().map(|(_, reference)| reference))
                .map(|reference| reference.tag()),
        )
    }

    /// Capture the references for a manager or helper.
    pub fn capture(&self) -> CapturedArguments {
        CapturedArguments::new(self.positional.clone(), self.named.clone())
    }

    /// These arguments with `outer` curried in front: outer positional
    /// arguments come first and outer named arguments fill in names the
    /// invocation did not pass.
    pub fn with_curried(&self, outer: &CapturedArguments) -> Self {
        let mut positional = outer.positional().to_vec();
        positional.extend(self.positional.iter().cloned());
        let mut named = self.named.clone();
        for (name, reference) in outer.named() {
            if self.get(name).is_none() {
                named.push((Rc::clone(name), Rc::clone(reference)));
            }
        }
        Self {
            positional,
            named,
            blocks: self.blocks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::scope::Scope;
    use trellis_reference::Value;

    fn literal(value: i32) -> StackValue {
        StackValue::Reference(ConstReference::new(Value::from(value)))
    }

    fn text(value: &str) -> Reference {
        ConstReference::new(Value::from(value))
    }

    /// Test popping positional and named values with `@` names.
    ///
    /// # Panics
    /// Panics if the values are bound to the wrong names.
    #[test]
    fn pops_in_order() -> Result<()> {
        let mut stack = EvaluationStack::default();
        stack.push(StackValue::Null);
        stack.push(StackValue::Scope(Scope::sized(1)));
        stack.push(StackValue::Null);
        for value in 1..=3 {
            stack.push(literal(value));
        }
        let names: Vec<Rc<str>> = vec![Rc::from("@title")];
        let blocks: Vec<Rc<str>> = vec![Rc::from("default")];
        let args = Arguments::from_stack(&mut stack, &names, &blocks, (2 << 4) | AT_NAMES)?;

        assert!(stack.is_empty());
        assert_eq!(args.positional().len(), 2);
        assert_eq!(args.at(1).value(), Value::from(2));
        assert_eq!(args.at(7).value(), Value::Undefined);
        assert_eq!(args.get("title").map(|reference| reference.value()), Some(Value::from(3)));
        assert_eq!(args.blocks().len(), 1);
        assert!(args.block("default").is_none());
        Ok(())
    }

    /// Test that curried arguments go first and never override.
    ///
    /// # Panics
    /// Panics if the merge order is wrong.
    #[test]
    fn curried_arguments_merge() {
        let outer = CapturedArguments::new(
            vec![text("a")],
            vec![(Rc::from("size"), text("big")), (Rc::from("color"), text("red"))],
        );
        let inner = Arguments::new(
            vec![text("b")],
            vec![(Rc::from("size"), text("small"))],
        );
        let merged = inner.with_curried(&outer);
        let positional: Vec<Value> = merged.positional().iter().map(|reference| reference.value()).collect();
        assert_eq!(positional, [Value::from("a"), Value::from("b")]);
        assert_eq!(merged.get("size").map(|reference| reference.value()), Some(Value::from("small")));
        assert_eq!(merged.get("color").map(|reference| reference.value()), Some(Value::from("red")));
    }
}
