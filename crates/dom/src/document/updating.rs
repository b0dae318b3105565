//! The mutation journal.

use indextree::NodeId;

/// One change made to the live tree.
///
/// Creating a detached node is not a mutation; attaching it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// `node` was inserted into `parent` before `next`.
    Insert {
        parent: NodeId,
        node: NodeId,
        next: Option<NodeId>,
    },
    /// `node` was detached.
    Remove { node: NodeId },
    /// An attribute was set.
    SetAttribute {
        element: NodeId,
        name: String,
        value: String,
    },
    /// An attribute was removed.
    RemoveAttribute { element: NodeId, name: String },
    /// A text or comment node changed.
    SetText { node: NodeId, text: String },
}

impl Mutation {
    /// Whether this attached a node.
    #[inline]
    pub const fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }

    /// Whether this detached a node.
    #[inline]
    pub const fn is_remove(&self) -> bool {
        matches!(self, Self::Remove { .. })
    }
}
