//! Captured helper and component arguments.

use crate::reference::Reference;
use crate::value::Value;
use core::fmt;
use std::rc::Rc;
use trellis_validator::{Tag, combine};

/// Positional and named argument references captured off the VM stack.
#[derive(Clone, Default)]
pub struct CapturedArguments {
    positional: Vec<Reference>,
    named: Vec<(Rc<str>, Reference)>,
    tag: Tag,
}

impl CapturedArguments {
    /// Capture `positional` and `named` references; the tag combines all of
    /// them.
    pub fn new(positional: Vec<Reference>, named: Vec<(Rc<str>, Reference)>) -> Self {
        let tag = combine(
            positional
                .iter()
                .map(|reference| reference.tag())
                .chain(named.iter().map(|(_, reference)| reference.tag())),
        );
        Self {
            positional,
            named,
            tag,
        }
    }

    /// The combined tag of every argument.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.tag.clone()
    }

    /// Positional argument references.
    #[inline]
    pub fn positional(&self) -> &[Reference] {
        &self.positional
    }

    /// Named argument references in the order they were passed.
    #[inline]
    pub fn named(&self) -> &[(Rc<str>, Reference)] {
        &self.named
    }

    /// The positional reference at `index`.
    pub fn positional_at(&self, index: usize) -> Option<&Reference> {
        self.positional.get(index)
    }

    /// The named reference for `name`.
    pub fn named_ref(&self, name: &str) -> Option<&Reference> {
        self.named
            .iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, reference)| reference)
    }

    /// The current value of the positional argument at `index`, or
    /// `undefined`.
    pub fn positional_value(&self, index: usize) -> Value {
        self.positional_at(index)
            .map(|reference| reference.value())
            .unwrap_or_default()
    }

    /// The current value of the named argument `name`, or `undefined`.
    pub fn named_value(&self, name: &str) -> Value {
        self.named_ref(name)
            .map(|reference| reference.value())
            .unwrap_or_default()
    }

    /// Current values of all positional arguments.
    pub fn positional_values(&self) -> Vec<Value> {
        self.positional.iter().map(|reference| reference.value()).collect()
    }

    /// Current values of all named arguments.
    pub fn named_values(&self) -> Vec<(Rc<str>, Value)> {
        self.named
            .iter()
            .map(|(name, reference)| (Rc::clone(name), reference.value()))
            .collect()
    }

    /// Whether there are no arguments at all.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

impl fmt::Debug for CapturedArguments {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CapturedArguments")
            .field("positional", &self.positional.len())
            .field(
                "named",
                &self.named.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}
