//! Dynamic values flowing through references.
//!
//! Templates are dynamically typed, so every reference produces a [`Value`].
//! Equality follows strict-identity rules: primitives compare by value,
//! everything else by pointer.

use crate::object::Object;
use core::any::Any;
use core::fmt;
use std::rc::Rc;

/// A callable value, such as an action passed to a modifier.
pub type Callback = Rc<dyn Fn(&[Value]) -> Value>;

/// A dynamically typed template value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absence of a value.
    #[default]
    Undefined,
    /// An explicit empty value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string, escaped when appended.
    String(Rc<str>),
    /// Trusted markup, inserted as HTML when appended.
    SafeString(Rc<str>),
    /// An immutable list of values.
    Array(Rc<[Value]>),
    /// An object with named properties.
    Object(Rc<dyn Object>),
    /// A callable value.
    Function(Callback),
    /// A host value the runtime knows how to interpret, such as a curried
    /// component definition.
    Opaque(Rc<dyn Any>),
}

impl Value {
    /// Create a string value.
    #[inline]
    pub fn string(text: &str) -> Self {
        Self::String(Rc::from(text))
    }

    /// Create a trusted HTML value.
    #[inline]
    pub fn safe_string(html: &str) -> Self {
        Self::SafeString(Rc::from(html))
    }

    /// Create an array value.
    #[inline]
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        Self::Array(items.into_iter().collect())
    }

    /// Wrap a host value.
    #[inline]
    pub fn opaque<T: Any>(value: T) -> Self {
        Self::Opaque(Rc::new(value))
    }

    /// Strict identity: primitives by value, everything else by pointer.
    #[allow(clippy::float_cmp, reason = "identity compares numbers exactly")]
    pub fn identical(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => left == right,
            (Self::String(left), Self::String(right)) => left == right,
            (Self::SafeString(left), Self::SafeString(right)) => Rc::ptr_eq(left, right),
            (Self::Array(left), Self::Array(right)) => Rc::ptr_eq(left, right),
            (Self::Object(left), Self::Object(right)) => {
                Rc::as_ptr(left).cast::<()>() == Rc::as_ptr(right).cast::<()>()
            }
            (Self::Function(left), Self::Function(right)) => {
                Rc::as_ptr(left).cast::<()>() == Rc::as_ptr(right).cast::<()>()
            }
            (Self::Opaque(left), Self::Opaque(right)) => {
                Rc::as_ptr(left).cast::<()>() == Rc::as_ptr(right).cast::<()>()
            }
            _ => false,
        }
    }

    /// The address backing a reference-typed value, used as its identity.
    pub fn pointer(&self) -> Option<usize> {
        match self {
            Self::SafeString(html) => Some(Rc::as_ptr(html).cast::<()>().addr()),
            Self::Array(items) => Some(Rc::as_ptr(items).cast::<()>().addr()),
            Self::Object(object) => Some(Rc::as_ptr(object).cast::<()>().addr()),
            Self::Function(function) => Some(Rc::as_ptr(function).cast::<()>().addr()),
            Self::Opaque(value) => Some(Rc::as_ptr(value).cast::<()>().addr()),
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_) => {
                None
            }
        }
    }

    /// Whether properties can be read off this value.
    #[inline]
    pub const fn is_dict(&self) -> bool {
        matches!(
            self,
            Self::Array(_) | Self::Object(_) | Self::Function(_) | Self::Opaque(_)
        )
    }

    /// Whether this value is `null` or `undefined`.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Scripting-language truthiness.
    #[allow(clippy::float_cmp, reason = "only exact zero is falsy")]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(flag) => *flag,
            Self::Number(number) => *number != 0.0 && !number.is_nan(),
            Self::String(text) => !text.is_empty(),
            Self::SafeString(_)
            | Self::Array(_)
            | Self::Object(_)
            | Self::Function(_)
            | Self::Opaque(_) => true,
        }
    }

    /// The text content inserted when this value is appended or used as an
    /// attribute. `null` and `undefined` become the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Self::Undefined | Self::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Downcast an opaque host value.
    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        match self {
            Self::Opaque(value) => Rc::clone(value).downcast::<T>().ok(),
            _ => None,
        }
    }
}

#[allow(clippy::float_cmp, reason = "negative zero prints as zero")]
fn format_number(number: f64, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
    if number.is_infinite() {
        formatter.write_str(if number > 0.0 { "Infinity" } else { "-Infinity" })
    } else if number == 0.0 {
        formatter.write_str("0")
    } else {
        write!(formatter, "{number}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => formatter.write_str("undefined"),
            Self::Null => formatter.write_str("null"),
            Self::Bool(flag) => write!(formatter, "{flag}"),
            Self::Number(number) => format_number(*number, formatter),
            Self::String(text) | Self::SafeString(text) => formatter.write_str(text),
            Self::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        formatter.write_str(",")?;
                    }
                    if !item.is_empty() {
                        write!(formatter, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Object(_) => formatter.write_str("[object Object]"),
            Self::Function(_) => formatter.write_str("function"),
            Self::Opaque(_) => formatter.write_str("[object Opaque]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(text) => write!(formatter, "{text:?}"),
            Self::SafeString(html) => write!(formatter, "SafeString({html:?})"),
            Self::Array(items) => formatter.debug_list().entries(items.iter()).finish(),
            Self::Object(object) => object.fmt_debug(formatter),
            other => write!(formatter, "{other}"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.identical(other)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::string(text)
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::String(Rc::from(text))
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::Number(f64::from(number))
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(Rc::from(items))
    }
}

impl<T: Object> From<Rc<T>> for Value {
    fn from(object: Rc<T>) -> Self {
        Self::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the text produced for appended values.
    ///
    /// # Panics
    /// Panics if a value renders differently from script semantics.
    #[test]
    fn text_conversion() {
        assert_eq!(Value::Undefined.to_text(), "");
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::from(3).to_text(), "3");
        assert_eq!(Value::from(1.5).to_text(), "1.5");
        assert_eq!(Value::from(f64::INFINITY).to_text(), "Infinity");
        assert_eq!(Value::from(true).to_text(), "true");
        let list = Value::array([Value::from(1), Value::Null, Value::from("x")]);
        assert_eq!(list.to_text(), "1,,x");
    }

    /// Test identity rules for primitives and reference values.
    ///
    /// # Panics
    /// Panics if equal strings differ or distinct arrays compare equal.
    #[test]
    fn identity_rules() {
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from(f64::NAN), Value::from(f64::NAN));
        let first = Value::array([Value::from(1)]);
        let second = Value::array([Value::from(1)]);
        assert_ne!(first, second);
        assert_eq!(first, first.clone());
    }

    /// Test truthiness.
    ///
    /// # Panics
    /// Panics if a falsy value is reported truthy.
    #[test]
    fn truthiness() {
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::array([]).is_truthy());
        assert!(Value::opaque(5_u8).downcast::<u8>().is_some());
    }
}
