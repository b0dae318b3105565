//! Opcodes that decide whether the rest of a block still holds.

use anyhow::Result;
use core::cell::{Cell, RefCell};
use std::rc::Rc;
use trellis_reference::{Reference, ReferenceCache, Validation};
use trellis_validator::{Revision, Tag, validate_tag, value_for_tag};

use super::{UpdatingOpcode, UpdatingVm};

/// Throws when a value the append VM branched on changes.
pub struct Assert {
    cache: RefCell<ReferenceCache>,
    tag: Tag,
}

impl Assert {
    /// Guard the value `cache` last saw.
    pub fn new(cache: ReferenceCache) -> Rc<Self> {
        let tag = cache.reference().tag();
        Rc::new(Self {
            cache: RefCell::new(cache),
            tag,
        })
    }

    /// Guard the current value of `reference`.
    pub fn current(reference: Reference) -> Rc<Self> {
        let mut cache = ReferenceCache::new(reference);
        cache.peek();
        Self::new(cache)
    }
}

impl UpdatingOpcode for Assert {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        let modified = matches!(self.cache.borrow_mut().revalidate(), Validation::Modified(_));
        if modified {
            vm.throw()?;
        }
        Ok(())
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }
}

/// Skips a cache group whose tags have not moved since it last ran.
pub struct JumpIfNotModified {
    tag: Tag,
    last_revision: Cell<Revision>,
    count: usize,
}

impl JumpIfNotModified {
    /// Guard the `count` opcodes that follow.
    pub fn new(tag: Tag, count: usize) -> Rc<Self> {
        let last_revision = Cell::new(value_for_tag(&tag));
        Rc::new(Self {
            tag,
            last_revision,
            count,
        })
    }

    fn did_modify(&self) {
        self.last_revision.set(value_for_tag(&self.tag));
    }
}

impl UpdatingOpcode for JumpIfNotModified {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        if !vm.always_revalidate() && validate_tag(&self.tag, self.last_revision.get()) {
            vm.skip(self.count);
        }
        Ok(())
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }
}

/// Closes a cache group, recording the revision it ran at.
pub struct DidModify {
    target: Rc<JumpIfNotModified>,
}

impl DidModify {
    /// Close the group `target` guards.
    pub fn new(target: Rc<JumpIfNotModified>) -> Rc<Self> {
        Rc::new(Self { target })
    }
}

impl UpdatingOpcode for DidModify {
    fn evaluate(self: Rc<Self>, _vm: &mut UpdatingVm) -> Result<()> {
        self.target.did_modify();
        Ok(())
    }

    fn tag(&self) -> Tag {
        Tag::CONSTANT
    }
}
