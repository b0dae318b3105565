//! Keyed iteration over template values.
//!
//! Every item of an `{{#each}}` gets a key. The key strategy is chosen by
//! the `key=` argument:
//!
//! | key          | item key                                  |
//! |--------------|-------------------------------------------|
//! | `@key`       | the item's position, as a number          |
//! | `@index`     | the item's position, as a string          |
//! | `@identity`  | the item itself (strict identity)         |
//! | other        | the property at that path on the item     |
//!
//! Keys are made unique within one pass: the nth repeat of a key gets a
//! synthetic `(key, n)` identity, which is the same on every pass.

use crate::delegate::PathDelegate;
use crate::reference::{IterationItemReference, Reference};
use crate::value::Value;
use core::fmt;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use trellis_validator::Tag;

/// A hashable item key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum IterationKey {
    /// `undefined`.
    Undefined,
    /// `null` or the null identity.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number, by its bit pattern.
    Number(u64),
    /// A string.
    String(Rc<str>),
    /// A reference-typed value, by address.
    Pointer(usize),
    /// The nth repeat of a key within one pass.
    Nth(Rc<IterationKey>, usize),
}

impl IterationKey {
    /// The key for a value under strict identity.
    #[allow(clippy::float_cmp, reason = "both zeroes map to one key")]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Undefined => Self::Undefined,
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => {
                // +0 and -0 are identical.
                let normalized = if *number == 0.0 { 0.0 } else { *number };
                Self::Number(normalized.to_bits())
            }
            Value::String(text) => Self::String(Rc::clone(text)),
            other => other.pointer().map_or(Self::Undefined, Self::Pointer),
        }
    }

    /// A numeric key.
    #[inline]
    pub fn number(number: f64) -> Self {
        Self::from_value(&Value::Number(number))
    }
}

impl fmt::Display for IterationKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => formatter.write_str("undefined"),
            Self::Null => formatter.write_str("null"),
            Self::Bool(flag) => write!(formatter, "{flag}"),
            Self::Number(bits) => write!(formatter, "{}", f64::from_bits(*bits)),
            Self::String(text) => write!(formatter, "{text:?}"),
            Self::Pointer(address) => write!(formatter, "@{address:#x}"),
            Self::Nth(key, count) => write!(formatter, "{key}#{count}"),
        }
    }
}

/// How item keys are derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyStrategy {
    /// `@key`: the position as a number.
    Position,
    /// `@index`: the position as a string.
    Index,
    /// `@identity`: the item itself.
    Identity,
    /// A property path on the item.
    Path(Rc<str>),
}

impl KeyStrategy {
    /// Parse the `key=` argument of an `{{#each}}`.
    pub fn parse(key: &str) -> Self {
        match key {
            "@key" => Self::Position,
            "@index" => Self::Index,
            "@identity" => Self::Identity,
            path => Self::Path(Rc::from(path)),
        }
    }
}

/// Produces unique keys for one pass over a list.
struct UniqueKeys {
    strategy: KeyStrategy,
    delegate: Rc<dyn PathDelegate>,
    seen: FxHashMap<IterationKey, usize>,
}

impl UniqueKeys {
    fn key_for(&mut self, value: &Value, position: usize) -> IterationKey {
        let key = match &self.strategy {
            KeyStrategy::Position => IterationKey::number(position as f64),
            KeyStrategy::Index => IterationKey::String(Rc::from(position.to_string())),
            KeyStrategy::Identity => IterationKey::from_value(value),
            KeyStrategy::Path(path) => {
                IterationKey::from_value(&self.delegate.get_path(value, path))
            }
        };

        let count = self.seen.entry(key.clone()).or_insert(0);
        let occurrence = *count;
        *count += 1;
        if occurrence == 0 {
            key
        } else {
            IterationKey::Nth(Rc::new(key), occurrence)
        }
    }
}

/// One item produced by an [`ItemIterator`].
#[derive(Clone, Debug)]
pub struct IterationItem {
    /// The item's unique key.
    pub key: IterationKey,
    /// The item.
    pub value: Value,
    /// The item's position.
    pub memo: Value,
}

/// A single pass over the current items of an iterable.
pub struct ItemIterator {
    items: Vec<Value>,
    position: usize,
    keys: UniqueKeys,
}

impl ItemIterator {
    /// Whether the pass has no items at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Iterator for ItemIterator {
    type Item = IterationItem;

    fn next(&mut self) -> Option<IterationItem> {
        let value = self.items.get(self.position)?.clone();
        let position = self.position;
        self.position += 1;
        Some(IterationItem {
            key: self.keys.key_for(&value, position),
            value,
            memo: Value::Number(position as f64),
        })
    }
}

/// The list side of an `{{#each}}`: a parent reference plus a key strategy.
pub struct IterableReference {
    parent: Reference,
    strategy: KeyStrategy,
    delegate: Rc<dyn PathDelegate>,
}

impl IterableReference {
    /// Iterate `parent`, keying items by `key`.
    pub fn new(parent: Reference, key: &str, delegate: Rc<dyn PathDelegate>) -> Self {
        Self {
            parent,
            strategy: KeyStrategy::parse(key),
            delegate,
        }
    }

    /// The tag of the iterated value.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.parent.tag()
    }

    /// Start a pass over the current value.
    pub fn iterate(&self) -> ItemIterator {
        let value = self.parent.value();
        let items = match &value {
            Value::Array(items) => items.to_vec(),
            other => self.delegate.to_iterator(other).unwrap_or_default(),
        };
        ItemIterator {
            items,
            position: 0,
            keys: UniqueKeys {
                strategy: self.strategy.clone(),
                delegate: Rc::clone(&self.delegate),
                seen: FxHashMap::default(),
            },
        }
    }

    /// A fresh reference to the item's value.
    pub fn value_reference_for(&self, item: &IterationItem) -> Rc<IterationItemReference> {
        IterationItemReference::new(item.value.clone(), Rc::clone(&self.delegate))
    }

    /// A fresh reference to the item's position.
    pub fn memo_reference_for(&self, item: &IterationItem) -> Rc<IterationItemReference> {
        IterationItemReference::new(item.memo.clone(), Rc::clone(&self.delegate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::DefaultPathDelegate;
    use crate::object::TrackedObject;
    use crate::reference::ConstReference;

    fn keys_of(items: Vec<Value>, key: &str) -> Vec<IterationKey> {
        let iterable = IterableReference::new(
            ConstReference::new(Value::from(items)),
            key,
            Rc::new(DefaultPathDelegate),
        );
        iterable.iterate().map(|item| item.key).collect()
    }

    /// Test the positional key strategies.
    ///
    /// # Panics
    /// Panics if `@key` and `@index` produce the wrong key shapes.
    #[test]
    fn positional_keys() {
        let items = vec![Value::from("a"), Value::from("b")];
        assert_eq!(
            keys_of(items.clone(), "@key"),
            vec![IterationKey::number(0.0), IterationKey::number(1.0)]
        );
        assert_eq!(
            keys_of(items, "@index"),
            vec![IterationKey::String(Rc::from("0")), IterationKey::String(Rc::from("1"))]
        );
    }

    /// Test that repeated identities get stable synthetic keys.
    ///
    /// # Panics
    /// Panics if duplicates alias each other.
    #[test]
    fn duplicates_get_nth_keys() {
        let keys = keys_of(
            vec![Value::from("x"), Value::from("y"), Value::from("x"), Value::from("x")],
            "@identity",
        );
        let plain = IterationKey::from_value(&Value::from("x"));
        assert_eq!(keys[0], plain);
        assert_eq!(keys[2], IterationKey::Nth(Rc::new(plain.clone()), 1));
        assert_eq!(keys[3], IterationKey::Nth(Rc::new(plain), 2));
    }

    /// Test keying by a property path.
    ///
    /// # Panics
    /// Panics if the path is not read off each item.
    #[test]
    fn path_keys() {
        let first = TrackedObject::with_fields([("id", Value::from(7))]);
        let second = TrackedObject::with_fields([("id", Value::from(9))]);
        let keys = keys_of(vec![Value::from(first), Value::from(second)], "id");
        assert_eq!(keys, vec![IterationKey::number(7.0), IterationKey::number(9.0)]);
    }
}
