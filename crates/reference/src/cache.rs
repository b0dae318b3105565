//! Change detection on top of a reference.

use crate::reference::Reference;
use crate::value::Value;
use trellis_validator::{Revision, validate_tag, value_for_tag};

/// The outcome of [`ReferenceCache::revalidate`].
#[derive(Clone, Debug, PartialEq)]
pub enum Validation<T> {
    /// Nothing observable changed.
    NotModified,
    /// The value changed to the carried one.
    Modified(T),
}

/// Remembers the last value of a reference and reports when it changes.
pub struct ReferenceCache {
    reference: Reference,
    last_value: Option<Value>,
    last_revision: Revision,
}

impl ReferenceCache {
    /// Wrap `reference`; nothing is read until [`ReferenceCache::peek`].
    pub fn new(reference: Reference) -> Self {
        Self {
            reference,
            last_value: None,
            last_revision: Revision::CONSTANT,
        }
    }

    /// The cached value, reading it on first use.
    pub fn peek(&mut self) -> Value {
        match &self.last_value {
            Some(value) => value.clone(),
            None => self.initialize(),
        }
    }

    /// Re-read the reference if its tag moved and report whether the value
    /// is a different one.
    pub fn revalidate(&mut self) -> Validation<Value> {
        let Some(last_value) = self.last_value.clone() else {
            return Validation::Modified(self.initialize());
        };

        let tag = self.reference.tag();
        if validate_tag(&tag, self.last_revision) {
            return Validation::NotModified;
        }

        let value = self.reference.value();
        self.last_revision = value_for_tag(&tag);
        if value.identical(&last_value) {
            return Validation::NotModified;
        }

        self.last_value = Some(value.clone());
        Validation::Modified(value)
    }

    /// The wrapped reference.
    #[inline]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    fn initialize(&mut self) -> Value {
        let value = self.reference.value();
        self.last_revision = value_for_tag(&self.reference.tag());
        self.last_value = Some(value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::DefaultPathDelegate;
    use crate::reference::IterationItemReference;
    use std::rc::Rc;

    /// Test the modified/not-modified protocol.
    ///
    /// # Panics
    /// Panics if an identical value is reported as modified.
    #[test]
    fn reports_only_real_changes() {
        let item = IterationItemReference::new(Value::from(1), Rc::new(DefaultPathDelegate));
        let mut cache = ReferenceCache::new(Rc::clone(&item) as Reference);

        assert_eq!(cache.peek(), Value::from(1));
        assert_eq!(cache.revalidate(), Validation::NotModified);

        item.update(Value::from(1));
        assert_eq!(cache.revalidate(), Validation::NotModified);

        item.update(Value::from(2));
        assert_eq!(cache.revalidate(), Validation::Modified(Value::from(2)));
        assert_eq!(cache.peek(), Value::from(2));
    }
}
