//! The in-memory DOM the Trellis rendering VM renders into.
//!
//! [`DomTree`] is the narrow set of primitives the VM's element builder
//! uses. [`Document`] implements it over an `indextree` arena and journals
//! every mutation, which is how tests tell a re-render that touched nothing
//! from one that rebuilt the page.
//!
//! ```text
//!  element builder ──► DomTree ──► Document { arena, journal }
//!                                      │
//!                             outer_html / to_json_value
//! ```

mod document;
mod tree;

pub use document::{Attribute, Document, DomNode, Mutation, NodeKind};
pub use indextree::NodeId;
pub use tree::{DomTree, SVG_NAMESPACE, XLINK_NAMESPACE};
