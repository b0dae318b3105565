//! Objects with named, tracked properties.

use crate::value::Value;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;
use rustc_hash::FxHashMap;
use std::rc::Rc;
use trellis_validator::PropertyTags;

/// A value with named properties.
///
/// Implementations that want reads to be tracked consume a property tag in
/// [`Object::get`] and dirty it in [`Object::set`].
pub trait Object: Any {
    /// Read a property; missing properties are `undefined`.
    fn get(&self, key: &str) -> Value;

    /// Write a property. Returns `false` if the object is read-only.
    fn set(&self, _key: &str, _value: Value) -> bool {
        false
    }

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Debug formatting for values holding this object.
    fn fmt_debug(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("[object Object]")
    }
}

/// A plain object whose properties are individually tracked.
///
/// This is the host-side equivalent of a class with tracked fields: reading
/// `name` inside a tracking frame makes the frame depend on `name` only.
#[derive(Default)]
pub struct TrackedObject {
    fields: RefCell<FxHashMap<Rc<str>, Value>>,
    tags: PropertyTags,
}

impl TrackedObject {
    /// Create an empty object.
    #[inline]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Create an object from key/value pairs.
    pub fn with_fields<I, K>(fields: I) -> Rc<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let object = Self::default();
        {
            let mut map = object.fields.borrow_mut();
            for (key, value) in fields {
                map.insert(Rc::from(key.as_ref()), value);
            }
        }
        Rc::new(object)
    }

    /// Read a property without tracking it.
    pub fn peek(&self, key: &str) -> Value {
        self.fields.borrow().get(key).cloned().unwrap_or_default()
    }

    /// The property tags owned by this object.
    #[inline]
    pub const fn tags(&self) -> &PropertyTags {
        &self.tags
    }
}

impl Object for TrackedObject {
    fn get(&self, key: &str) -> Value {
        self.tags.consume(key);
        self.peek(key)
    }

    fn set(&self, key: &str, value: Value) -> bool {
        self.fields.borrow_mut().insert(Rc::from(key), value);
        self.tags.dirty(key);
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn fmt_debug(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_map()
            .entries(self.fields.borrow().iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_validator::{track, validate_tag, value_for_tag};

    /// Test that a read depends on the property it read and nothing else.
    ///
    /// # Panics
    /// Panics if writing an unrelated property invalidates the read.
    #[test]
    fn reads_are_per_property() {
        let object = TrackedObject::with_fields([("first", Value::from("a"))]);
        let (value, tag) = track(|| object.get("first"));
        assert_eq!(value, Value::from("a"));

        let snapshot = value_for_tag(&tag);
        assert!(object.set("second", Value::from(2)));
        assert!(validate_tag(&tag, snapshot));
        assert!(object.set("first", Value::from("b")));
        assert!(!validate_tag(&tag, snapshot));
        assert_eq!(object.peek("first"), Value::from("b"));
    }
}
