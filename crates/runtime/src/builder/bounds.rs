//! Block bounds: the first and last DOM nodes a block produced.

use anyhow::Result;
use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::Rc;
use trellis_dom::{DomTree, NodeId};

use crate::updating::UpdatingList;

/// How a block tracks what it appends.
pub enum BlockKind {
    /// Rendered once.
    Simple,
    /// Can be cleared and rendered again in place.
    Updatable,
    /// Rendered into another element by `{{#in-element}}`.
    Remote,
    /// The items of an `{{#each}}`; bounds come from the item blocks.
    List(UpdatingList),
}

/// One end of a block: a node or a nested block.
#[derive(Clone)]
pub enum Boundary {
    /// A node appended directly.
    Node(NodeId),
    /// A nested block.
    Block(Rc<LiveBlock>),
}

impl Boundary {
    fn first_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(node) => Some(*node),
            Self::Block(block) => block.first_node(),
        }
    }

    fn last_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(node) => Some(*node),
            Self::Block(block) => block.last_node(),
        }
    }
}

/// A block of rendered content under one parent.
pub struct LiveBlock {
    parent: NodeId,
    kind: BlockKind,
    first: RefCell<Option<Boundary>>,
    last: RefCell<Option<Boundary>>,
    nesting: Cell<usize>,
}

impl LiveBlock {
    /// An empty block under `parent`.
    pub fn new(parent: NodeId, kind: BlockKind) -> Rc<Self> {
        Rc::new(Self {
            parent,
            kind,
            first: RefCell::new(None),
            last: RefCell::new(None),
            nesting: Cell::new(0),
        })
    }

    /// The element the block renders into.
    #[inline]
    pub const fn parent(&self) -> NodeId {
        self.parent
    }

    const fn is_list(&self) -> bool {
        matches!(self.kind, BlockKind::List(_))
    }

    /// The first node, if anything was rendered.
    pub fn first_node(&self) -> Option<NodeId> {
        match &self.kind {
            BlockKind::List(children) => children
                .borrow()
                .iter()
                .filter_map(|child| child.bounds())
                .find_map(|bounds| bounds.first_node()),
            _ => self.first.borrow().as_ref().and_then(Boundary::first_node),
        }
    }

    /// The last node, if anything was rendered.
    pub fn last_node(&self) -> Option<NodeId> {
        match &self.kind {
            BlockKind::List(children) => children
                .borrow()
                .iter()
                .rev()
                .filter_map(|child| child.bounds())
                .find_map(|bounds| bounds.last_node()),
            _ => self.last.borrow().as_ref().and_then(Boundary::last_node),
        }
    }

    fn did_append(&self, boundary: Boundary) {
        if self.is_list() || self.nesting.get() != 0 {
            return;
        }
        let mut first = self.first.borrow_mut();
        if first.is_none() {
            *first = Some(boundary.clone());
        }
        *self.last.borrow_mut() = Some(boundary);
    }

    /// Record a node appended at this block's top level.
    pub fn did_append_node(&self, node: NodeId) {
        self.did_append(Boundary::Node(node));
    }

    /// Record a nested block appended at this block's top level.
    pub fn did_append_bounds(&self, block: Rc<Self>) {
        self.did_append(Boundary::Block(block));
    }

    /// An element was opened; its contents are not top-level.
    pub fn open_element(&self, element: NodeId) {
        if self.is_list() {
            return;
        }
        self.did_append_node(element);
        self.nesting.set(self.nesting.get() + 1);
    }

    /// The element opened last was closed.
    pub fn close_element(&self) {
        if self.is_list() {
            return;
        }
        self.nesting.set(self.nesting.get().saturating_sub(1));
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.first_node().is_none()
    }

    /// Whether the block needs a placeholder so its bounds are never empty.
    pub fn needs_placeholder(&self) -> bool {
        !self.is_list() && self.first.borrow().is_none()
    }

    /// Clear the block's content and forget it, returning the node that
    /// followed it.
    ///
    /// # Errors
    /// Propagates DOM failures.
    pub fn reset(&self, dom: &mut dyn DomTree) -> Result<Option<NodeId>> {
        let next = clear(dom, self)?;
        *self.first.borrow_mut() = None;
        *self.last.borrow_mut() = None;
        self.nesting.set(0);
        Ok(next)
    }
}

impl fmt::Debug for LiveBlock {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("LiveBlock")
            .field("parent", &self.parent)
            .field("first", &self.first_node())
            .field("last", &self.last_node())
            .finish_non_exhaustive()
    }
}

/// The nodes of `bounds`, in order.
fn nodes(dom: &dyn DomTree, bounds: &LiveBlock) -> Vec<NodeId> {
    let (Some(first), Some(last)) = (bounds.first_node(), bounds.last_node()) else {
        return Vec::new();
    };
    let mut nodes = Vec::new();
    let mut current = Some(first);
    while let Some(node) = current {
        nodes.push(node);
        if node == last {
            break;
        }
        current = dom.next_sibling(node);
    }
    nodes
}

/// Remove every node of `bounds` and return the node that followed them.
///
/// # Errors
/// Propagates DOM failures.
pub fn clear(dom: &mut dyn DomTree, bounds: &LiveBlock) -> Result<Option<NodeId>> {
    let Some(last) = bounds.last_node() else {
        return Ok(None);
    };
    let next = dom.next_sibling(last);
    for node in nodes(dom, bounds) {
        dom.remove_child(node)?;
    }
    Ok(next)
}

/// Move every node of `bounds` before `before` in the block's parent.
///
/// # Errors
/// Propagates DOM failures.
pub fn move_bounds(dom: &mut dyn DomTree, bounds: &LiveBlock, before: Option<NodeId>) -> Result<()> {
    for node in nodes(dom, bounds) {
        dom.insert_before(bounds.parent(), node, before)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_dom::Document;

    /// Test that nested content does not move the block's ends.
    ///
    /// # Panics
    /// Panics if a nested node becomes a boundary.
    #[test]
    fn nesting_hides_inner_nodes() -> Result<()> {
        let mut document = Document::new();
        let root = document.root();
        let block = LiveBlock::new(root, BlockKind::Simple);
        let div = document.create_element("div", None);
        document.insert_before(root, div, None)?;
        block.open_element(div);
        let inner = document.create_text("inner");
        document.insert_before(div, inner, None)?;
        block.did_append_node(inner);
        block.close_element();
        let after = document.create_text("after");
        document.insert_before(root, after, None)?;
        block.did_append_node(after);

        assert_eq!(block.first_node(), Some(div));
        assert_eq!(block.last_node(), Some(after));
        Ok(())
    }

    /// Test clearing and moving a nested block.
    ///
    /// # Panics
    /// Panics if nodes outside the bounds are touched.
    #[test]
    fn clears_and_moves_ranges() -> Result<()> {
        let mut document = Document::new();
        let root = document.root();
        let outer = LiveBlock::new(root, BlockKind::Simple);
        let inner = LiveBlock::new(root, BlockKind::Updatable);
        let texts: Vec<NodeId> = ["a", "b", "c", "d"]
            .iter()
            .map(|text| document.create_text(text))
            .collect();
        for text in &texts {
            document.insert_before(root, *text, None)?;
        }
        outer.did_append_node(texts[0]);
        inner.did_append_node(texts[1]);
        inner.did_append_node(texts[2]);
        outer.did_append_bounds(Rc::clone(&inner));
        outer.did_append_node(texts[3]);

        move_bounds(&mut document, &inner, None)?;
        assert_eq!(document.to_html(), "adbc");

        let next = inner.reset(&mut document)?;
        assert_eq!(next, None);
        assert_eq!(document.to_html(), "ad");
        assert!(inner.is_empty());
        assert_eq!(outer.last_node(), Some(texts[3]));
        Ok(())
    }
}
