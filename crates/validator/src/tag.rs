//! Tags: opaque revision markers.
//!
//! A tag answers one question: "has anything I depend on changed since
//! snapshot `s`?". There are three kinds of tags:
//!
//! ```text
//! Dirtyable   - written directly with `dirty_tag`
//! Updatable   - dirtyable, plus one replaceable subtag
//! Combinator  - the max over a fixed list of subtags
//! ```
//!
//! The constant tag is represented by a tag without an inner cell and is
//! always valid.

use crate::revision::{Revision, bump, current_revision};
use core::cell::{Cell, RefCell};
use core::fmt;
use log::warn;
use std::rc::Rc;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum TagKind {
    Dirtyable,
    Updatable,
    Combinator,
}

struct TagCell {
    kind: TagKind,
    revision: Cell<Revision>,
    last_checked: Cell<Revision>,
    last_value: Cell<Revision>,
    is_updating: Cell<bool>,
    subtags: Box<[Tag]>,
    subtag: RefCell<Option<Tag>>,
    subtag_buffer_cache: Cell<Option<Revision>>,
}

impl TagCell {
    fn new(kind: TagKind, subtags: Box<[Tag]>) -> Self {
        Self {
            kind,
            revision: Cell::new(Revision::INITIAL),
            last_checked: Cell::new(Revision::INITIAL),
            last_value: Cell::new(Revision::INITIAL),
            is_updating: Cell::new(false),
            subtags,
            subtag: RefCell::new(None),
            subtag_buffer_cache: Cell::new(None),
        }
    }

    fn compute(&self) -> Revision {
        let clock = current_revision();
        if self.last_checked.get() != clock {
            self.is_updating.set(true);
            self.last_checked.set(clock);

            let mut revision = self.revision.get();
            let subtag = self.subtag.borrow().clone();
            if let Some(subtag) = subtag {
                let subtag_value = subtag.compute();
                if Some(subtag_value) == self.subtag_buffer_cache.get() {
                    revision = revision.max(self.last_value.get());
                } else {
                    self.subtag_buffer_cache.set(None);
                    revision = revision.max(subtag_value);
                }
            }
            for subtag in &self.subtags {
                revision = revision.max(subtag.compute());
            }

            self.last_value.set(revision);
            self.is_updating.set(false);
        } else if self.is_updating.get() {
            // Reached again while computing: break the cycle and force a
            // recompute on the next read.
            self.last_checked.set(bump());
        }
        self.last_value.get()
    }
}

/// An opaque, shareable revision marker.
///
/// Cloning a tag clones a handle to the same marker; two clones are the same
/// tag for dependency tracking purposes.
#[derive(Clone, Default)]
pub struct Tag {
    cell: Option<Rc<TagCell>>,
}

impl Tag {
    /// The tag of values that never change.
    pub const CONSTANT: Self = Self { cell: None };

    fn with_kind(kind: TagKind, subtags: Box<[Tag]>) -> Self {
        Self {
            cell: Some(Rc::new(TagCell::new(kind, subtags))),
        }
    }

    /// Whether this is the constant tag.
    #[inline]
    pub const fn is_const(&self) -> bool {
        self.cell.is_none()
    }

    /// Whether two handles point at the same tag.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.cell, &other.cell) {
            (Some(left), Some(right)) => Rc::ptr_eq(left, right),
            (None, None) => true,
            _ => false,
        }
    }

    /// A stable identity for deduplication while the tag is alive.
    #[inline]
    pub fn id(&self) -> usize {
        self.cell
            .as_ref()
            .map_or(0, |cell| Rc::as_ptr(cell).addr())
    }

    /// The tag's current computed revision.
    ///
    /// Combinators memoize this per clock value; calling it twice within the
    /// same revision epoch does not walk the subtags again.
    #[inline]
    pub fn compute(&self) -> Revision {
        self.cell
            .as_ref()
            .map_or(Revision::CONSTANT, |cell| cell.compute())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cell {
            None => formatter.write_str("Tag(CONSTANT)"),
            Some(cell) => formatter
                .debug_struct("Tag")
                .field("kind", &cell.kind)
                .field("revision", &cell.revision.get())
                .field("subtags", &cell.subtags.len())
                .finish_non_exhaustive(),
        }
    }
}

/// Create a tag that can be dirtied directly.
#[inline]
pub fn create_tag() -> Tag {
    Tag::with_kind(TagKind::Dirtyable, Box::default())
}

/// Create a dirtyable tag whose single subtag can later be replaced with
/// [`update_tag`].
#[inline]
pub fn create_update_tag() -> Tag {
    Tag::with_kind(TagKind::Updatable, Box::default())
}

/// Advance the clock and stamp `tag` with the new revision.
///
/// Dirtying a combinator or the constant tag is a programming error; it is
/// reported in debug builds and ignored otherwise.
pub fn dirty_tag(tag: &Tag) {
    match &tag.cell {
        Some(cell) if cell.kind != TagKind::Combinator => {
            cell.revision.set(bump());
        }
        _ => {
            debug_assert!(false, "attempted to dirty a tag that is not dirtyable: {tag:?}");
            warn!(target: "trellis::validator", "ignored dirty of non-dirtyable tag {tag:?}");
        }
    }
}

/// Replace the subtag of an updatable tag.
///
/// The subtag's current revision is buffered, so the updatable tag only
/// observes the new subtag once it changes after the swap.
pub fn update_tag(tag: &Tag, subtag: &Tag) {
    let Some(cell) = tag.cell.as_ref().filter(|cell| cell.kind == TagKind::Updatable) else {
        debug_assert!(false, "attempted to update a tag that is not updatable: {tag:?}");
        warn!(target: "trellis::validator", "ignored update of non-updatable tag {tag:?}");
        return;
    };

    if subtag.is_const() {
        *cell.subtag.borrow_mut() = None;
    } else {
        cell.subtag_buffer_cache.set(Some(subtag.compute()));
        *cell.subtag.borrow_mut() = Some(subtag.clone());
    }
}

/// Combine tags into one whose revision is the max over all of them.
///
/// Constant tags are dropped; zero remaining tags yields the constant tag and
/// a single remaining tag is returned as is.
pub fn combine<I>(tags: I) -> Tag
where
    I: IntoIterator<Item = Tag>,
{
    let mut live: Vec<Tag> = tags.into_iter().filter(|tag| !tag.is_const()).collect();
    match live.len() {
        0 => Tag::CONSTANT,
        1 => live.pop().unwrap_or_default(),
        _ => Tag::with_kind(TagKind::Combinator, live.into_boxed_slice()),
    }
}

/// Snapshot the tag's revision for a later [`validate_tag`].
#[inline]
pub fn value_for_tag(tag: &Tag) -> Revision {
    tag.compute()
}

/// Whether nothing behind `tag` changed since `snapshot` was taken.
#[inline]
pub fn validate_tag(tag: &Tag, snapshot: Revision) -> bool {
    snapshot >= tag.compute()
}
