//! The revision clock.
//!
//! Revisions are monotonically increasing counters that advance whenever a
//! tag is dirtied. Each render tree reads the clock of the thread it runs on,
//! so independent threads host independent render trees.

use core::cell::Cell;
use core::fmt;

/// A point in time on the revision clock.
///
/// A higher revision means a more recent write. Snapshots taken with
/// [`crate::value_for_tag`] are revisions.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct Revision(u64);

impl Revision {
    /// The revision of tags that never change.
    pub const CONSTANT: Self = Self(0);

    /// The revision every freshly created tag starts at.
    pub const INITIAL: Self = Self(1);

    /// Create a revision from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw revision value.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Check if this revision is newer than another.
    #[inline]
    pub const fn is_newer_than(self, other: Self) -> bool {
        self.0 > other.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "r{}", self.0)
    }
}

thread_local! {
    static CLOCK: Cell<u64> = const { Cell::new(Revision::INITIAL.0) };
}

/// The current value of this thread's revision clock.
#[inline]
pub fn current_revision() -> Revision {
    Revision(CLOCK.with(Cell::get))
}

/// Advance the clock and return the new revision.
#[inline]
pub(crate) fn bump() -> Revision {
    CLOCK.with(|clock| {
        let next = clock.get() + 1;
        clock.set(next);
        Revision(next)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that bumping the clock is monotonic.
    ///
    /// # Panics
    /// Panics if a bump does not produce a newer revision.
    #[test]
    fn bump_is_monotonic() {
        let before = current_revision();
        let after = bump();
        assert!(after.is_newer_than(before));
        assert_eq!(current_revision(), after);
    }

    /// Test the ordering of the reserved revisions.
    ///
    /// # Panics
    /// Panics if the constant revision is not older than the initial one.
    #[test]
    fn constant_precedes_initial() {
        assert!(Revision::INITIAL.is_newer_than(Revision::CONSTANT));
        assert_eq!(Revision::new(1), Revision::INITIAL);
        assert_eq!(Revision::INITIAL.to_string(), "r1");
    }
}
