//! Host hooks for reading paths, iterating values and truthiness.

use crate::value::Value;
use anyhow::{Result, bail};

/// How the host reads and writes properties of template values.
///
/// Every method has a default that understands [`Value`]'s built-in shapes,
/// so hosts only override what they customize.
pub trait PathDelegate {
    /// Read `key` off `parent`.
    fn get_path(&self, parent: &Value, key: &str) -> Value {
        default_get_path(parent, key)
    }

    /// Write `key` on `parent`.
    ///
    /// # Errors
    /// Returns an error if `parent` cannot hold properties.
    fn set_path(&self, parent: &Value, key: &str, value: Value) -> Result<()> {
        default_set_path(parent, key, value)
    }

    /// Turn a non-array value into a list of items, or `None` if it is not
    /// iterable.
    fn to_iterator(&self, value: &Value) -> Option<Vec<Value>> {
        default_to_iterator(value)
    }

    /// Truthiness used by conditionals.
    fn to_bool(&self, value: &Value) -> bool {
        default_to_bool(value)
    }
}

/// A [`PathDelegate`] with every default.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultPathDelegate;

impl PathDelegate for DefaultPathDelegate {}

/// Property read understanding objects and arrays.
pub fn default_get_path(parent: &Value, key: &str) -> Value {
    match parent {
        Value::Object(object) => object.get(key),
        Value::Array(items) => {
            if key == "length" {
                return Value::Number(items.len() as f64);
            }
            key.parse::<usize>()
                .ok()
                .and_then(|index| items.get(index).cloned())
                .unwrap_or_default()
        }
        Value::String(text) | Value::SafeString(text) if key == "length" => {
            Value::Number(text.chars().count() as f64)
        }
        _ => Value::Undefined,
    }
}

/// Property write understanding objects.
///
/// # Errors
/// Returns an error for values that cannot hold properties.
pub fn default_set_path(parent: &Value, key: &str, value: Value) -> Result<()> {
    match parent {
        Value::Object(object) if object.set(key, value) => Ok(()),
        other => bail!("cannot set property `{key}` on {other:?}"),
    }
}

/// Arrays iterate their items, `null`/`undefined` iterate nothing.
pub fn default_to_iterator(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.to_vec()),
        Value::Undefined | Value::Null => Some(Vec::new()),
        _ => None,
    }
}

/// Truthiness with empty arrays treated as false.
pub fn default_to_bool(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        other => other.is_truthy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::TrackedObject;

    /// Test default property reads.
    ///
    /// # Panics
    /// Panics if arrays or objects are read incorrectly.
    #[test]
    fn reads_arrays_and_objects() {
        let list = Value::array([Value::from("a"), Value::from("b")]);
        assert_eq!(default_get_path(&list, "length"), Value::from(2));
        assert_eq!(default_get_path(&list, "1"), Value::from("b"));
        assert_eq!(default_get_path(&list, "9"), Value::Undefined);

        let object = Value::from(TrackedObject::with_fields([("name", Value::from("x"))]));
        assert_eq!(DefaultPathDelegate.get_path(&object, "name"), Value::from("x"));
        assert!(DefaultPathDelegate.set_path(&object, "name", Value::from("y")).is_ok());
        assert_eq!(DefaultPathDelegate.get_path(&object, "name"), Value::from("y"));
        assert!(DefaultPathDelegate.set_path(&list, "name", Value::Null).is_err());
    }

    /// Test that empty arrays are falsy for conditionals.
    ///
    /// # Panics
    /// Panics if an empty array is treated as true.
    #[test]
    fn empty_arrays_are_false() {
        assert!(!default_to_bool(&Value::array([])));
        assert!(default_to_bool(&Value::array([Value::Null])));
        assert!(!default_to_bool(&Value::Null));
    }
}
