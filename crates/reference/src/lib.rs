//! References and list reconciliation for the Trellis rendering VM.
//!
//! This crate sits between the raw tags of `trellis_validator` and the VM:
//! - [`Value`]: the dynamically typed values templates compute with
//! - [`PathReference`]: cached, tag-aware paths into those values
//! - [`ReferenceCache`]: modified/not-modified change detection
//! - [`IteratorSynchronizer`]: keyed reconciliation of `{{#each}}` lists
//!
//! # Architecture
//!
//! ```text
//! RootReference ──► PropertyReference ──► HelperReference(args)
//!       │                  │                      │
//!       └──────── tags ────┴────── combine ───────┘
//!                                   │
//!                   IterableReference ──► IterationArtifacts
//!                                              │
//!                                   IteratorSynchronizer ──► delegate ops
//! ```

#![allow(
    clippy::module_name_repetitions,
    reason = "Reference types like PropertyReference are clearer with the suffix"
)]
#![allow(
    clippy::len_without_is_empty,
    reason = "IterationArtifacts::is_empty starts a pass and needs &mut self"
)]

mod arguments;
mod cache;
mod delegate;
mod iterable;
mod object;
mod reference;
mod synchronizer;
mod value;

pub use arguments::CapturedArguments;
pub use cache::{ReferenceCache, Validation};
pub use delegate::{
    DefaultPathDelegate, PathDelegate, default_get_path, default_set_path, default_to_bool,
    default_to_iterator,
};
pub use iterable::{IterableReference, IterationItem, IterationKey, ItemIterator, KeyStrategy};
pub use object::{Object, TrackedObject};
pub use reference::{
    ConstReference, HelperFn, HelperReference, IterationItemReference, PathReference,
    PropertyReference, Reference, RootReference, get_path,
};
pub use synchronizer::{
    IterationArtifacts, IteratorSynchronizer, ListItem, ReferenceIterator, SynchronizerDelegate,
};
pub use value::{Callback, Value};
