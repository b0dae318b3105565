//! Per-object property tags and tracked storage.
//!
//! Every tracked object owns a [`PropertyTags`] side table mapping property
//! names to tags. Reads consume the property's tag; writes dirty it and fire
//! the thread's property-did-change hook, which render loops use to schedule
//! a revalidation.

use crate::tag::{Tag, create_tag, dirty_tag};
use crate::tracking::consume_tag;
use core::cell::RefCell;
use core::fmt;
use rustc_hash::FxHashMap;
use std::rc::Rc;

type ChangeHook = Rc<dyn Fn()>;

thread_local! {
    static PROPERTY_DID_CHANGE: RefCell<Option<ChangeHook>> = const { RefCell::new(None) };
}

/// Install the hook called after every tracked write on this thread.
///
/// Returns the previously installed hook.
pub fn set_property_did_change<F>(hook: F) -> Option<Rc<dyn Fn()>>
where
    F: Fn() + 'static,
{
    install_property_did_change(Rc::new(hook))
}

/// Install a shared hook. Returns the previously installed hook.
pub fn install_property_did_change(hook: Rc<dyn Fn()>) -> Option<Rc<dyn Fn()>> {
    PROPERTY_DID_CHANGE.with_borrow_mut(|slot| slot.replace(hook))
}

/// Put `previous` back if `hook` is still the installed hook. Returns
/// whether it was; a hook installed later is left in place.
pub fn uninstall_property_did_change(hook: &Rc<dyn Fn()>, previous: Option<Rc<dyn Fn()>>) -> bool {
    PROPERTY_DID_CHANGE.with_borrow_mut(|slot| {
        let installed = slot.as_ref().is_some_and(|current| Rc::ptr_eq(current, hook));
        if installed {
            *slot = previous;
        }
        installed
    })
}

/// Remove the hook installed with [`set_property_did_change`].
pub fn clear_property_did_change() {
    PROPERTY_DID_CHANGE.with_borrow_mut(|slot| *slot = None);
}

/// Fire the property-did-change hook, if one is installed.
pub fn property_did_change() {
    let hook = PROPERTY_DID_CHANGE.with_borrow(Clone::clone);
    if let Some(hook) = hook {
        hook();
    }
}

/// Lazily created tags for the properties of one object.
#[derive(Default)]
pub struct PropertyTags {
    tags: RefCell<FxHashMap<Rc<str>, Tag>>,
}

impl PropertyTags {
    /// Create an empty side table.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tag for `key`, created on first use.
    pub fn tag_for(&self, key: &str) -> Tag {
        if let Some(tag) = self.tags.borrow().get(key) {
            return tag.clone();
        }
        let tag = create_tag();
        self.tags.borrow_mut().insert(Rc::from(key), tag.clone());
        tag
    }

    /// Record a read of `key` in the open tracking frame.
    #[inline]
    pub fn consume(&self, key: &str) {
        consume_tag(&self.tag_for(key));
    }

    /// Mark `key` as written.
    ///
    /// Properties nobody has read yet have no tag and need no invalidation,
    /// but the change hook still fires.
    pub fn dirty(&self, key: &str) {
        let tag = self.tags.borrow().get(key).cloned();
        if let Some(tag) = tag {
            dirty_tag(&tag);
        }
        property_did_change();
    }
}

impl fmt::Debug for PropertyTags {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_set()
            .entries(self.tags.borrow().keys())
            .finish()
    }
}

/// A single tracked value.
///
/// Reading with [`TrackedCell::get`] consumes the cell's tag; writing with
/// [`TrackedCell::set`] dirties it.
pub struct TrackedCell<T> {
    value: RefCell<T>,
    tag: Tag,
}

impl<T: Clone> TrackedCell<T> {
    /// Wrap `value` in a fresh tag.
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            tag: create_tag(),
        }
    }

    /// Read the value, recording the dependency.
    pub fn get(&self) -> T {
        consume_tag(&self.tag);
        self.value.borrow().clone()
    }

    /// Replace the value and invalidate readers.
    pub fn set(&self, value: T) {
        *self.value.borrow_mut() = value;
        dirty_tag(&self.tag);
        property_did_change();
    }

    /// The cell's tag.
    #[inline]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedCell<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TrackedCell")
            .field("value", &self.value.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{validate_tag, value_for_tag};
    use crate::tracking::track;
    use core::cell::Cell;

    /// Test that property tags are stable per key.
    ///
    /// # Panics
    /// Panics if two reads of one key yield different tags.
    #[test]
    fn tags_are_per_key() {
        let tags = PropertyTags::new();
        assert!(tags.tag_for("name").ptr_eq(&tags.tag_for("name")));
        assert!(!tags.tag_for("name").ptr_eq(&tags.tag_for("age")));
    }

    /// Test that writes invalidate frames that read the property.
    ///
    /// # Panics
    /// Panics if the write does not invalidate the tracked tag.
    #[test]
    fn write_invalidates_reader() {
        let tags = PropertyTags::new();
        let ((), tag) = track(|| tags.consume("count"));
        let snapshot = value_for_tag(&tag);
        tags.dirty("other");
        assert!(validate_tag(&tag, snapshot));
        tags.dirty("count");
        assert!(!validate_tag(&tag, snapshot));
    }

    /// Test that removing a hook restores the one it replaced, and only
    /// while it is still installed.
    ///
    /// # Panics
    /// Panics if a write reaches the wrong hook.
    #[test]
    fn uninstall_restores_the_previous_hook() {
        let first_calls = Rc::new(Cell::new(0));
        let second_calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&first_calls);
        let first: Rc<dyn Fn()> = Rc::new(move || counter.set(counter.get() + 1));
        let counter = Rc::clone(&second_calls);
        let second: Rc<dyn Fn()> = Rc::new(move || counter.set(counter.get() + 1));

        let before_first = install_property_did_change(Rc::clone(&first));
        let before_second = install_property_did_change(Rc::clone(&second));
        assert!(!uninstall_property_did_change(&first, before_first.clone()));
        property_did_change();
        assert_eq!((first_calls.get(), second_calls.get()), (0, 1));

        assert!(uninstall_property_did_change(&second, before_second));
        property_did_change();
        assert_eq!((first_calls.get(), second_calls.get()), (1, 1));

        assert!(uninstall_property_did_change(&first, before_first));
        property_did_change();
        assert_eq!((first_calls.get(), second_calls.get()), (1, 1));
    }

    /// Test that tracked writes fire the change hook.
    ///
    /// # Panics
    /// Panics if the hook is not called once per write.
    #[test]
    fn hook_fires_on_write() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        set_property_did_change(move || counter.set(counter.get() + 1));

        let cell = TrackedCell::new(1);
        cell.set(2);
        PropertyTags::new().dirty("name");
        clear_property_did_change();
        cell.set(3);

        assert_eq!(calls.get(), 2);
        assert_eq!(cell.get(), 3);
    }
}
