//! The DOM primitives the rendering VM needs.

use anyhow::Result;
use indextree::NodeId;

/// The SVG namespace.
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
/// The XLink namespace, used by `xlink:href`.
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

/// A mutable node tree.
///
/// Nodes are addressed by [`NodeId`]. Removed nodes stay addressable, so a
/// block can still describe bounds it has just cleared, and moved nodes are
/// detached from their old position first.
pub trait DomTree {
    /// A detached element.
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeId;

    /// A detached text node.
    fn create_text(&mut self, text: &str) -> NodeId;

    /// A detached comment.
    fn create_comment(&mut self, text: &str) -> NodeId;

    /// Insert `node` into `parent` before `next`, or last when `next` is `None`.
    ///
    /// # Errors
    /// Returns an error if `next` is not a child of `parent` or the insert
    /// would create a cycle.
    fn insert_before(&mut self, parent: NodeId, node: NodeId, next: Option<NodeId>) -> Result<()>;

    /// Detach `node` from its parent.
    ///
    /// # Errors
    /// Returns an error if `node` does not exist.
    fn remove_child(&mut self, node: NodeId) -> Result<()>;

    /// Set an attribute, replacing any earlier value.
    ///
    /// # Errors
    /// Returns an error if `element` is not an element.
    fn set_attribute(
        &mut self,
        element: NodeId,
        name: &str,
        value: &str,
        namespace: Option<&str>,
    ) -> Result<()>;

    /// Remove an attribute if present.
    ///
    /// # Errors
    /// Returns an error if `element` is not an element.
    fn remove_attribute(&mut self, element: NodeId, name: &str, namespace: Option<&str>) -> Result<()>;

    /// Replace the contents of a text or comment node.
    ///
    /// # Errors
    /// Returns an error for other node kinds.
    fn set_text(&mut self, node: NodeId, text: &str) -> Result<()>;

    /// Insert raw markup before `next` and return the first and last nodes
    /// it produced. Empty markup produces an empty comment so the bounds are
    /// never empty.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    fn insert_html_before(
        &mut self,
        parent: NodeId,
        next: Option<NodeId>,
        html: &str,
    ) -> Result<(NodeId, NodeId)>;

    /// The parent of `node`.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// The sibling after `node`.
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// The first child of `node`.
    fn first_child(&self, node: NodeId) -> Option<NodeId>;

    /// The lowercase tag of an element.
    fn tag_name(&self, node: NodeId) -> Option<&str>;

    /// An attribute's value.
    fn attribute(&self, element: NodeId, name: &str) -> Option<&str>;
}
