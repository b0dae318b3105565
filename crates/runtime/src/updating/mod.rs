//! The updating program: what the append VM leaves behind to revalidate a
//! render.
//!
//! ```text
//!  TryBlock ──children──► [Assert, DynamicTextContent, ListBlock, ...]
//!     │                                          │
//!     └─ handle_exception: reset + re-run         └─ items: TryBlock per key
//! ```
//!
//! Each opcode compares what it rendered against its references and patches
//! the DOM in place. A change an opcode cannot patch makes it throw to the
//! innermost [`TryBlock`], which clears its bounds and re-runs its part of
//! the append program.

mod blocks;
mod component;
mod dom;
mod guards;
mod vm;

use anyhow::Result;
use core::cell::RefCell;
use std::rc::Rc;
use trellis_validator::Tag;

use crate::builder::LiveBlock;

pub use blocks::{ListBlock, TryBlock};
pub use component::{DidUpdateLayout, UpdateComponent, UpdateModifier};
pub use dom::{DynamicTextContent, UpdateDynamicAttribute};
pub use guards::{Assert, DidModify, JumpIfNotModified};
pub use vm::UpdatingVm;

/// One step of a revalidation pass.
pub trait UpdatingOpcode {
    /// Bring what this opcode rendered up to date.
    ///
    /// # Errors
    /// Returns DOM and hook failures; the updating VM hands them to the
    /// innermost [`TryBlock`].
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()>;

    /// What the opcode depends on.
    fn tag(&self) -> Tag;

    /// The DOM range the opcode owns, for block opcodes.
    fn bounds(&self) -> Option<Rc<LiveBlock>> {
        None
    }

    /// The opcodes rendered inside this block are complete.
    fn did_initialize_children(&self) {}
}

/// A shared, ordered list of updating opcodes.
pub type UpdatingList = Rc<RefCell<Vec<Rc<dyn UpdatingOpcode>>>>;

/// An empty [`UpdatingList`].
pub fn updating_list() -> UpdatingList {
    Rc::new(RefCell::new(Vec::new()))
}
