//! Revision tracking for the Trellis rendering VM.
//!
//! This crate provides the dependency-tracking layer every other crate builds
//! on:
//! - A thread-local revision clock that advances on every write
//! - Tags that summarize "what this value depends on"
//! - Tracking frames that collect the tags a computation reads
//! - Per-object property tags with a change hook for scheduling re-renders
//!
//! # Architecture
//!
//! ```text
//! write ──► dirty_tag ──► clock += 1 ──► property_did_change hook
//!                                              │
//! read  ──► consume_tag ──► open frame         ▼
//!                               │         render loop schedules
//!                               ▼         a revalidation pass
//!                        end_track_frame ──► combined tag ──► snapshot
//! ```
//!
//! # Example
//!
//! ```
//! use trellis_validator::{TrackedCell, track, validate_tag, value_for_tag};
//!
//! let count = TrackedCell::new(1);
//! let (doubled, tag) = track(|| count.get() * 2);
//! let snapshot = value_for_tag(&tag);
//! assert_eq!(doubled, 2);
//!
//! count.set(5);
//! assert!(!validate_tag(&tag, snapshot));
//! ```

#![allow(
    clippy::module_name_repetitions,
    reason = "Types like TrackedCell read better with their module's name"
)]

mod meta;
mod revision;
mod tag;
mod tracking;

pub use meta::{
    PropertyTags, TrackedCell, clear_property_did_change, install_property_did_change,
    property_did_change, set_property_did_change, uninstall_property_did_change,
};
pub use revision::{Revision, current_revision};
pub use tag::{
    Tag, combine, create_tag, create_update_tag, dirty_tag, update_tag, validate_tag,
    value_for_tag,
};
pub use tracking::{begin_track_frame, consume_tag, end_track_frame, is_tracking, track, untrack};
