//! An arena-backed document implementing [`DomTree`].

mod printing;
mod updating;

use core::mem;
use anyhow::{Result, anyhow, ensure};
use indextree::{Arena, NodeId};
use log::trace;
use smallvec::SmallVec;

use crate::tree::DomTree;

pub use updating::Mutation;

/// What a node is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeKind {
    /// The document root.
    #[default]
    Document,
    /// An element.
    Element {
        /// Lowercase tag name.
        tag: String,
        /// Namespace URI, `None` for HTML.
        namespace: Option<String>,
    },
    /// A text node.
    Text(String),
    /// A comment.
    Comment(String),
    /// Markup inserted verbatim by a trusted append.
    Html(String),
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name, as written.
    pub name: String,
    /// Namespace URI, `None` for plain attributes.
    pub namespace: Option<String>,
    /// The value.
    pub value: String,
}

/// A node in the arena.
#[derive(Debug, Clone, Default)]
pub struct DomNode {
    /// What the node is.
    pub kind: NodeKind,
    /// Attributes, in insertion order.
    pub attrs: SmallVec<Attribute, 4>,
}

impl DomNode {
    const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: SmallVec::new(),
        }
    }
}

/// A document plus a journal of every mutation made to it.
pub struct Document {
    arena: Arena<DomNode>,
    root: NodeId,
    journal: Vec<Mutation>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(DomNode::default());
        Self {
            arena,
            root,
            journal: Vec::new(),
        }
    }

    /// The document node.
    #[inline]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Look up a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.arena.get(id).map(indextree::Node::get)
    }

    /// The children of `id`, in order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        id.children(&self.arena).collect()
    }

    /// The text of a text or comment node.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) | NodeKind::Html(text) => Some(text),
            NodeKind::Document | NodeKind::Element { .. } => None,
        }
    }

    /// Mutations recorded since the last [`Document::take_mutations`].
    #[inline]
    pub fn mutations(&self) -> &[Mutation] {
        &self.journal
    }

    /// Drain the mutation journal.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        mem::take(&mut self.journal)
    }

    fn create(&mut self, kind: NodeKind) -> NodeId {
        self.arena.new_node(DomNode::new(kind))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut DomNode> {
        self.arena
            .get_mut(id)
            .map(indextree::Node::get_mut)
            .ok_or_else(|| anyhow!("no node {id:?}"))
    }

    fn attrs_mut(&mut self, element: NodeId) -> Result<&mut SmallVec<Attribute, 4>> {
        let node = self.node_mut(element)?;
        ensure!(
            matches!(node.kind, NodeKind::Element { .. }),
            "node {element:?} is not an element"
        );
        Ok(&mut node.attrs)
    }

    fn record(&mut self, mutation: Mutation) {
        trace!(target: "trellis::dom", "{mutation:?}");
        self.journal.push(mutation);
    }
}

impl DomTree for Document {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> NodeId {
        self.create(NodeKind::Element {
            tag: tag.to_lowercase(),
            namespace: namespace.map(str::to_owned),
        })
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        self.create(NodeKind::Text(text.to_owned()))
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.create(NodeKind::Comment(text.to_owned()))
    }

    fn insert_before(&mut self, parent: NodeId, node: NodeId, next: Option<NodeId>) -> Result<()> {
        if next == Some(node) {
            return Ok(());
        }
        if let Some(next) = next {
            ensure!(
                self.parent(next) == Some(parent),
                "{next:?} is not a child of {parent:?}"
            );
        }
        node.detach(&mut self.arena);
        match next {
            Some(next) => next.checked_insert_before(node, &mut self.arena),
            None => parent.checked_append(node, &mut self.arena),
        }
        .map_err(|error| anyhow!("inserting {node:?} into {parent:?}: {error:?}"))?;
        self.record(Mutation::Insert { parent, node, next });
        Ok(())
    }

    fn remove_child(&mut self, node: NodeId) -> Result<()> {
        ensure!(self.arena.get(node).is_some(), "no node {node:?}");
        node.detach(&mut self.arena);
        self.record(Mutation::Remove { node });
        Ok(())
    }

    fn set_attribute(
        &mut self,
        element: NodeId,
        name: &str,
        value: &str,
        namespace: Option<&str>,
    ) -> Result<()> {
        let attrs = self.attrs_mut(element)?;
        match attrs
            .iter_mut()
            .find(|attr| attr.name == name && attr.namespace.as_deref() == namespace)
        {
            Some(attr) => value.clone_into(&mut attr.value),
            None => attrs.push(Attribute {
                name: name.to_owned(),
                namespace: namespace.map(str::to_owned),
                value: value.to_owned(),
            }),
        }
        self.record(Mutation::SetAttribute {
            element,
            name: name.to_owned(),
            value: value.to_owned(),
        });
        Ok(())
    }

    fn remove_attribute(&mut self, element: NodeId, name: &str, namespace: Option<&str>) -> Result<()> {
        let attrs = self.attrs_mut(element)?;
        let before = attrs.len();
        attrs.retain(|attr| !(attr.name == name && attr.namespace.as_deref() == namespace));
        if attrs.len() != before {
            self.record(Mutation::RemoveAttribute {
                element,
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<()> {
        match &mut self.node_mut(node)?.kind {
            NodeKind::Text(current) | NodeKind::Comment(current) => text.clone_into(current),
            other => return Err(anyhow!("cannot set text of {other:?}")),
        }
        self.record(Mutation::SetText {
            node,
            text: text.to_owned(),
        });
        Ok(())
    }

    fn insert_html_before(
        &mut self,
        parent: NodeId,
        next: Option<NodeId>,
        html: &str,
    ) -> Result<(NodeId, NodeId)> {
        let node = if html.is_empty() {
            self.create_comment("")
        } else {
            self.create(NodeKind::Html(html.to_owned()))
        };
        self.insert_before(parent, node, next)?;
        Ok((node, node))
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.parent()
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.next_sibling()
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node)?.first_child()
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.node(node)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    fn attribute(&self, element: NodeId, name: &str) -> Option<&str> {
        self.node(element)?
            .attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }
}
