//! Tracking frames.
//!
//! While a frame is open, every tag passed to [`consume_tag`] is recorded.
//! Closing the frame combines the recorded tags into the single tag that
//! summarizes everything the computation read.

use crate::tag::{Tag, combine};
use anyhow::{Result, anyhow};
use core::cell::RefCell;
use core::mem;
use log::trace;
use rustc_hash::FxHashSet;

/// Tags consumed during one frame, deduplicated by identity.
#[derive(Default)]
struct Tracker {
    seen: FxHashSet<usize>,
    tags: Vec<Tag>,
}

impl Tracker {
    fn add(&mut self, tag: &Tag) {
        if tag.is_const() || !self.seen.insert(tag.id()) {
            return;
        }
        self.tags.push(tag.clone());
    }

    fn combine(self) -> Tag {
        combine(self.tags)
    }
}

/// The open tracker (`None` outside any frame or inside `untrack`) plus the
/// trackers it shadows.
#[derive(Default)]
struct TrackingState {
    current: Option<Tracker>,
    stack: Vec<Option<Tracker>>,
}

thread_local! {
    static STATE: RefCell<TrackingState> = RefCell::new(TrackingState::default());
}

fn push_frame(tracker: Option<Tracker>) {
    STATE.with_borrow_mut(|state| {
        let previous = state.current.take();
        state.stack.push(previous);
        state.current = tracker;
    });
}

fn pop_frame() -> Option<Option<Tracker>> {
    STATE.with_borrow_mut(|state| {
        let previous = state.stack.pop()?;
        Some(mem::replace(&mut state.current, previous))
    })
}

/// Open a new tracking frame.
pub fn begin_track_frame() {
    push_frame(Some(Tracker::default()));
}

/// Close the innermost tracking frame and return the combined tag of
/// everything consumed inside it.
///
/// # Errors
/// Returns an error if no frame is open.
pub fn end_track_frame() -> Result<Tag> {
    let tracker = pop_frame()
        .ok_or_else(|| anyhow!("attempted to close a tracking frame, but one was not open"))?;
    Ok(tracker.map_or(Tag::CONSTANT, Tracker::combine))
}

/// Record `tag` in the open frame, if any.
pub fn consume_tag(tag: &Tag) {
    STATE.with_borrow_mut(|state| {
        if let Some(tracker) = state.current.as_mut() {
            tracker.add(tag);
        }
    });
}

/// Whether a tracking frame is currently recording.
pub fn is_tracking() -> bool {
    STATE.with_borrow(|state| state.current.is_some())
}

/// Pops the frame it guards even if the closure unwinds.
struct FrameGuard {
    armed: bool,
}

impl FrameGuard {
    fn finish(mut self) -> Option<Tracker> {
        self.armed = false;
        pop_frame().flatten()
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.armed {
            let _tracker = pop_frame();
        }
    }
}

/// Run `compute` inside a fresh frame and return its result with the tag of
/// everything it consumed.
pub fn track<T, F>(compute: F) -> (T, Tag)
where
    F: FnOnce() -> T,
{
    begin_track_frame();
    let guard = FrameGuard { armed: true };
    let result = compute();
    let tag = guard.finish().map_or(Tag::CONSTANT, Tracker::combine);
    trace!(target: "trellis::validator", "tracked frame closed with {tag:?}");
    (result, tag)
}

/// Run `compute` without recording its reads into the enclosing frame.
pub fn untrack<T, F>(compute: F) -> T
where
    F: FnOnce() -> T,
{
    push_frame(None);
    let guard = FrameGuard { armed: true };
    let result = compute();
    let _tracker = guard.finish();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{create_tag, dirty_tag, validate_tag, value_for_tag};

    /// Test that tracking with no reads yields the constant tag.
    ///
    /// # Panics
    /// Panics if an empty frame produces a live tag.
    #[test]
    fn empty_frame_is_constant() {
        let ((), tag) = track(|| {});
        assert!(tag.is_const());
    }

    /// Test that a single consumed tag is returned as is.
    ///
    /// # Panics
    /// Panics if the frame wraps a single tag in a combinator.
    #[test]
    fn single_tag_passes_through() {
        let tag = create_tag();
        let ((), tracked) = track(|| {
            consume_tag(&tag);
            consume_tag(&tag);
        });
        assert!(tracked.ptr_eq(&tag));
    }

    /// Test that untracked reads do not leak into the outer frame.
    ///
    /// # Panics
    /// Panics if the untracked tag invalidates the outer frame.
    #[test]
    fn untrack_hides_reads() {
        let inner = create_tag();
        let outer = create_tag();
        let ((), tracked) = track(|| {
            consume_tag(&outer);
            untrack(|| consume_tag(&inner));
            assert!(is_tracking());
        });
        let snapshot = value_for_tag(&tracked);
        dirty_tag(&inner);
        assert!(validate_tag(&tracked, snapshot));
        dirty_tag(&outer);
        assert!(!validate_tag(&tracked, snapshot));
    }

    /// Test that a nested frame records on its own and the parent only sees
    /// the tag it consumes explicitly.
    ///
    /// # Panics
    /// Panics if the parent frame misses the nested reads.
    #[test]
    fn nested_frames_are_independent() {
        let first = create_tag();
        let second = create_tag();
        let (inner, outer) = track(|| {
            consume_tag(&first);
            let ((), inner) = track(|| consume_tag(&second));
            consume_tag(&inner);
            inner
        });
        assert!(inner.ptr_eq(&second));
        let snapshot = value_for_tag(&outer);
        dirty_tag(&second);
        assert!(!validate_tag(&outer, snapshot));
    }

    /// Test that closing a frame that was never opened is an error.
    ///
    /// # Panics
    /// Panics if the unbalanced close succeeds.
    #[test]
    fn unbalanced_end_errors() {
        assert!(!is_tracking());
        assert!(end_track_frame().is_err());
    }
}
