//! Path references.
//!
//! A reference is a lazily evaluated, cached path into template data. Each
//! reference knows its value and the tag that summarizes what the value
//! depends on:
//!
//! ```text
//! RootReference(self) ── get("user") ──► PropertyReference(user)
//!                                             │ get("name")
//!                                             ▼
//!                                        PropertyReference(user.name)
//!                          tag = combine([parent.tag, value_tag])
//! ```

use crate::arguments::CapturedArguments;
use crate::delegate::PathDelegate;
use crate::value::Value;
use core::cell::RefCell;
use core::fmt;
use rustc_hash::FxHashMap;
use std::rc::{Rc, Weak};
use trellis_validator::{
    Revision, Tag, combine, consume_tag, create_tag, create_update_tag, dirty_tag, track,
    update_tag, validate_tag, value_for_tag,
};

/// A node in the reference graph.
pub trait PathReference {
    /// The current value, recomputed only if the tag is no longer valid for
    /// the cached snapshot.
    fn value(&self) -> Value;

    /// The tag summarizing every input of [`PathReference::value`].
    fn tag(&self) -> Tag;

    /// A child reference for the property `key`, memoized per key.
    fn get(self: Rc<Self>, key: &str) -> Reference;

    /// Whether the value can never change.
    fn is_const(&self) -> bool {
        self.tag().is_const()
    }
}

/// A shared, dynamically dispatched reference.
pub type Reference = Rc<dyn PathReference>;

/// A helper implementation: computes a value from its arguments.
pub type HelperFn = Rc<dyn Fn(&CapturedArguments) -> Value>;

/// Derive a child reference from a shared reference.
#[inline]
pub fn get_path(reference: &Reference, key: &str) -> Reference {
    Rc::clone(reference).get(key)
}

/// Memoized child property references, held weakly by their parent.
#[derive(Default)]
struct Children {
    refs: RefCell<FxHashMap<Rc<str>, Weak<PropertyReference>>>,
}

impl Children {
    fn get_or_create(
        &self,
        parent: Reference,
        key: &str,
        delegate: &Rc<dyn PathDelegate>,
    ) -> Reference {
        if let Some(existing) = self.refs.borrow().get(key).and_then(Weak::upgrade) {
            return existing;
        }
        let child = Rc::new(PropertyReference::new(parent, key, Rc::clone(delegate)));
        self.refs
            .borrow_mut()
            .insert(Rc::from(key), Rc::downgrade(&child));
        child
    }
}

/// A constant value; its children are `undefined`.
pub struct ConstReference {
    inner: Value,
}

impl ConstReference {
    /// Wrap a constant value.
    #[inline]
    pub fn new(inner: Value) -> Rc<Self> {
        Rc::new(Self { inner })
    }

    /// The shared `undefined` reference.
    pub fn undefined() -> Reference {
        thread_local! {
            static UNDEFINED: Rc<ConstReference> = ConstReference::new(Value::Undefined);
        }
        UNDEFINED.with(|reference| Rc::clone(reference) as Reference)
    }

    /// The shared `null` reference.
    pub fn null() -> Reference {
        thread_local! {
            static NULL: Rc<ConstReference> = ConstReference::new(Value::Null);
        }
        NULL.with(|reference| Rc::clone(reference) as Reference)
    }
}

impl PathReference for ConstReference {
    fn value(&self) -> Value {
        self.inner.clone()
    }

    fn tag(&self) -> Tag {
        Tag::CONSTANT
    }

    fn get(self: Rc<Self>, _key: &str) -> Reference {
        Self::undefined()
    }
}

/// A reference to a fixed root object, such as a component's `self`.
///
/// The root itself never changes; its properties are tracked through
/// [`PropertyReference`] children.
pub struct RootReference {
    inner: Value,
    delegate: Rc<dyn PathDelegate>,
    children: Children,
}

impl RootReference {
    /// Create a root over `inner`.
    pub fn new(inner: Value, delegate: Rc<dyn PathDelegate>) -> Rc<Self> {
        Rc::new(Self {
            inner,
            delegate,
            children: Children::default(),
        })
    }
}

impl PathReference for RootReference {
    fn value(&self) -> Value {
        self.inner.clone()
    }

    fn tag(&self) -> Tag {
        Tag::CONSTANT
    }

    fn get(self: Rc<Self>, key: &str) -> Reference {
        let parent: Reference = Rc::clone(&self) as Reference;
        self.children.get_or_create(parent, key, &self.delegate)
    }
}

/// A property read off a parent reference.
pub struct PropertyReference {
    parent: Reference,
    key: Rc<str>,
    delegate: Rc<dyn PathDelegate>,
    value_tag: Tag,
    tag: Tag,
    cache: RefCell<Option<(Revision, Value)>>,
    children: Children,
}

impl PropertyReference {
    fn new(parent: Reference, key: &str, delegate: Rc<dyn PathDelegate>) -> Self {
        let value_tag = create_update_tag();
        let tag = combine([parent.tag(), value_tag.clone()]);
        Self {
            parent,
            key: Rc::from(key),
            delegate,
            value_tag,
            tag,
            cache: RefCell::new(None),
            children: Children::default(),
        }
    }

    /// The property name this reference reads.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PathReference for PropertyReference {
    fn value(&self) -> Value {
        if let Some((revision, value)) = self.cache.borrow().as_ref()
            && validate_tag(&self.tag, *revision)
        {
            consume_tag(&self.tag);
            return value.clone();
        }

        let parent_value = self.parent.value();
        let value = if parent_value.is_dict() {
            let (value, tag) = track(|| self.delegate.get_path(&parent_value, &self.key));
            update_tag(&self.value_tag, &tag);
            value
        } else {
            Value::Undefined
        };

        *self.cache.borrow_mut() = Some((value_for_tag(&self.tag), value.clone()));
        consume_tag(&self.tag);
        value
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }

    fn get(self: Rc<Self>, key: &str) -> Reference {
        let parent: Reference = Rc::clone(&self) as Reference;
        self.children.get_or_create(parent, key, &self.delegate)
    }
}

impl fmt::Debug for PropertyReference {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PropertyReference")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// A value computed by a helper from its arguments.
///
/// If the arguments are constant the helper runs once eagerly; if that run
/// consumed no tags the reference is constant forever.
pub struct HelperReference {
    helper: HelperFn,
    args: CapturedArguments,
    delegate: Rc<dyn PathDelegate>,
    compute_tag: Tag,
    tag: Tag,
    cache: RefCell<Option<(Revision, Value)>>,
    children: Children,
}

impl HelperReference {
    /// Create a helper reference.
    pub fn new(
        helper: HelperFn,
        args: CapturedArguments,
        delegate: Rc<dyn PathDelegate>,
    ) -> Rc<Self> {
        let compute_tag = create_update_tag();
        let mut cache = None;
        let mut tag = combine([args.tag(), compute_tag.clone()]);

        if args.tag().is_const() {
            let (value, computed) = track(|| helper(&args));
            if computed.is_const() {
                tag = Tag::CONSTANT;
            } else {
                update_tag(&compute_tag, &computed);
            }
            cache = Some((value_for_tag(&tag), value));
        }

        Rc::new(Self {
            helper,
            args,
            delegate,
            compute_tag,
            tag,
            cache: RefCell::new(cache),
            children: Children::default(),
        })
    }
}

impl PathReference for HelperReference {
    fn value(&self) -> Value {
        if let Some((revision, value)) = self.cache.borrow().as_ref()
            && validate_tag(&self.tag, *revision)
        {
            consume_tag(&self.tag);
            return value.clone();
        }

        let (value, computed) = track(|| (self.helper)(&self.args));
        update_tag(&self.compute_tag, &computed);
        *self.cache.borrow_mut() = Some((value_for_tag(&self.tag), value.clone()));
        consume_tag(&self.tag);
        value
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }

    fn get(self: Rc<Self>, key: &str) -> Reference {
        let parent: Reference = Rc::clone(&self) as Reference;
        self.children.get_or_create(parent, key, &self.delegate)
    }
}

/// A list item's value (or memo), replaced in place by the reconciler.
pub struct IterationItemReference {
    inner: RefCell<Value>,
    tag: Tag,
    delegate: Rc<dyn PathDelegate>,
    children: Children,
}

impl IterationItemReference {
    /// Create an item reference holding `inner`.
    pub fn new(inner: Value, delegate: Rc<dyn PathDelegate>) -> Rc<Self> {
        Rc::new(Self {
            inner: RefCell::new(inner),
            tag: create_tag(),
            delegate,
            children: Children::default(),
        })
    }

    /// Replace the held value. Always dirties the tag.
    pub fn update(&self, value: Value) {
        *self.inner.borrow_mut() = value;
        dirty_tag(&self.tag);
    }
}

impl PathReference for IterationItemReference {
    fn value(&self) -> Value {
        consume_tag(&self.tag);
        self.inner.borrow().clone()
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }

    fn get(self: Rc<Self>, key: &str) -> Reference {
        let parent: Reference = Rc::clone(&self) as Reference;
        self.children.get_or_create(parent, key, &self.delegate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::DefaultPathDelegate;
    use crate::object::{Object as _, TrackedObject};
    use core::cell::Cell;

    fn delegate() -> Rc<dyn PathDelegate> {
        Rc::new(DefaultPathDelegate)
    }

    /// Test that property references track the property they read.
    ///
    /// # Panics
    /// Panics if the reference does not see the write.
    #[test]
    fn property_reference_follows_writes() {
        let user = TrackedObject::with_fields([("name", Value::from("Ada"))]);
        let root: Reference = RootReference::new(
            Value::from(TrackedObject::with_fields([("user", Value::from(Rc::clone(&user)))])),
            delegate(),
        );
        let name = get_path(&get_path(&root, "user"), "name");

        assert_eq!(name.value(), Value::from("Ada"));
        let snapshot = value_for_tag(&name.tag());
        user.set("name", Value::from("Grace"));
        assert!(!validate_tag(&name.tag(), snapshot));
        assert_eq!(name.value(), Value::from("Grace"));
    }

    /// Test that children are memoized while alive.
    ///
    /// # Panics
    /// Panics if two lookups of one key produce different references.
    #[test]
    fn children_are_memoized() {
        let root: Reference = RootReference::new(Value::from(TrackedObject::new()), delegate());
        let first = get_path(&root, "title");
        let second = get_path(&root, "title");
        assert!(Rc::ptr_eq(&first, &second));
    }

    /// Test that reading a property off a primitive is undefined.
    ///
    /// # Panics
    /// Panics if the read produces a value.
    #[test]
    fn non_dict_parent_is_undefined() {
        let root: Reference = RootReference::new(Value::from("text"), delegate());
        assert_eq!(get_path(&root, "anything").value(), Value::Undefined);
    }

    /// Test that a helper over constant arguments with no tracked reads is
    /// constant and computed once.
    ///
    /// # Panics
    /// Panics if the helper is recomputed or not constant.
    #[test]
    fn constant_helper_runs_once() {
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let helper: HelperFn = Rc::new(move |args: &CapturedArguments| {
            counter.set(counter.get() + 1);
            Value::from(args.positional_value(0).to_text().to_uppercase())
        });
        let args = CapturedArguments::new(vec![ConstReference::new(Value::from("hi"))], vec![]);
        let reference = HelperReference::new(helper, args, delegate());

        assert!(reference.is_const());
        assert_eq!(reference.value(), Value::from("HI"));
        assert_eq!(reference.value(), Value::from("HI"));
        assert_eq!(runs.get(), 1);
    }

    /// Test that a helper recomputes when its arguments change.
    ///
    /// # Panics
    /// Panics if the helper does not observe the new argument.
    #[test]
    fn helper_recomputes_on_change() {
        let helper: HelperFn =
            Rc::new(|args: &CapturedArguments| Value::from(args.positional_value(0).to_text().len() as f64));
        let item = IterationItemReference::new(Value::from("ab"), delegate());
        let args = CapturedArguments::new(vec![Rc::clone(&item) as Reference], vec![]);
        let reference = HelperReference::new(helper, args, delegate());

        assert_eq!(reference.value(), Value::from(2));
        item.update(Value::from("abcd"));
        assert_eq!(reference.value(), Value::from(4));
    }
}
