//! Opcodes that patch DOM nodes in place.

use anyhow::Result;
use core::cell::RefCell;
use log::trace;
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_reference::{Reference, ReferenceCache, Validation};
use trellis_validator::Tag;

use super::{UpdatingOpcode, UpdatingVm};
use crate::builder::DynamicAttribute;

/// Keeps a text node in step with its reference.
pub struct DynamicTextContent {
    node: NodeId,
    reference: Reference,
    last: RefCell<String>,
}

impl DynamicTextContent {
    /// Track `node`, which currently shows `text`.
    pub fn new(node: NodeId, reference: Reference, text: String) -> Rc<Self> {
        Rc::new(Self {
            node,
            reference,
            last: RefCell::new(text),
        })
    }
}

impl UpdatingOpcode for DynamicTextContent {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        let text = self.reference.value().to_text();
        if *self.last.borrow() == text {
            return Ok(());
        }
        trace!(target: "trellis::updating", "text {:?} -> {text:?}", self.last.borrow());
        vm.env().dom().borrow_mut().set_text(self.node, &text)?;
        *self.last.borrow_mut() = text;
        Ok(())
    }

    fn tag(&self) -> Tag {
        self.reference.tag()
    }
}

/// Keeps an attribute in step with its reference.
pub struct UpdateDynamicAttribute {
    attribute: DynamicAttribute,
    cache: RefCell<ReferenceCache>,
    tag: Tag,
}

impl UpdateDynamicAttribute {
    /// Track `attribute`, whose current value `cache` has seen.
    pub fn new(attribute: DynamicAttribute, cache: ReferenceCache) -> Rc<Self> {
        let tag = cache.reference().tag();
        Rc::new(Self {
            attribute,
            cache: RefCell::new(cache),
            tag,
        })
    }
}

impl UpdatingOpcode for UpdateDynamicAttribute {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        let validation = self.cache.borrow_mut().revalidate();
        if let Validation::Modified(value) = validation {
            trace!(target: "trellis::updating", "attribute {} -> {value:?}", self.attribute.name());
            self.attribute.update(vm.env(), &value)?;
        }
        Ok(())
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }
}
