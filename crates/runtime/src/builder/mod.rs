//! Tracks where the append VM is writing in the DOM and which block owns
//! each node it creates.

mod attributes;
mod bounds;

use anyhow::{Context as _, Result, anyhow};
use log::trace;
use std::rc::Rc;
use trellis_dom::{NodeId, SVG_NAMESPACE};
use trellis_reference::Value;

use crate::environment::Environment;
use crate::modifier::ModifierInstance;
use crate::updating::UpdatingList;

pub use attributes::{DeferredAttribute, DynamicAttribute, ElementOperations};
pub use bounds::{BlockKind, Boundary, LiveBlock, clear, move_bounds};

const SVG_INTEGRATION_POINTS: [&str; 3] = ["foreignobject", "desc", "title"];

/// Where content is inserted into a remote element.
#[derive(Clone, Copy, Debug)]
pub enum RemoteInsert {
    /// Remove the element's children first and append.
    Replace,
    /// Insert before the given child, or append.
    Before(Option<NodeId>),
}

#[derive(Clone, Copy, Debug)]
struct Cursor {
    element: NodeId,
    next: Option<NodeId>,
    svg: bool,
}

/// The append VM's view of the DOM under construction.
pub struct ElementBuilder {
    env: Rc<Environment>,
    root: NodeId,
    cursors: Vec<Cursor>,
    blocks: Vec<Rc<LiveBlock>>,
    modifiers: Vec<Vec<ModifierInstance>>,
    constructing: Option<(NodeId, bool)>,
}

impl ElementBuilder {
    fn with_cursor(env: Rc<Environment>, element: NodeId, next: Option<NodeId>) -> Self {
        let svg = is_svg_root(&env, element);
        Self {
            env,
            root: element,
            cursors: vec![Cursor { element, next, svg }],
            blocks: Vec::new(),
            modifiers: Vec::new(),
            constructing: None,
        }
    }

    /// A builder inserting into `parent` before `next`.
    pub fn for_initial_render(env: Rc<Environment>, parent: NodeId, next: Option<NodeId>) -> Self {
        let mut builder = Self::with_cursor(env, parent, next);
        builder.push_simple_block();
        builder
    }

    /// A builder that clears `block` and renders into it again.
    ///
    /// # Errors
    /// Propagates DOM failures from clearing the block.
    pub fn resume(env: Rc<Environment>, block: &Rc<LiveBlock>) -> Result<Self> {
        let next = block.reset(&mut *env.dom().borrow_mut())?;
        let mut builder = Self::with_cursor(env, block.parent(), next);
        builder.push_simple_block();
        builder.push_live_block(Rc::clone(block), false);
        Ok(builder)
    }

    /// The environment.
    #[inline]
    pub const fn env(&self) -> &Rc<Environment> {
        &self.env
    }

    fn cursor(&self) -> Result<Cursor> {
        self.cursors.last().copied().ok_or_else(|| anyhow!("no insertion point"))
    }

    /// The element content is being inserted into.
    ///
    /// # Errors
    /// Returns an error when the builder has no cursor.
    pub fn element(&self) -> Result<NodeId> {
        Ok(self.cursor()?.element)
    }

    /// The node content is inserted before.
    ///
    /// # Errors
    /// Returns an error when the builder has no cursor.
    pub fn next_sibling(&self) -> Result<Option<NodeId>> {
        Ok(self.cursor()?.next)
    }

    /// The innermost open block.
    ///
    /// # Errors
    /// Returns an error when no block is open.
    pub fn block(&self) -> Result<&Rc<LiveBlock>> {
        self.blocks.last().ok_or_else(|| anyhow!("no open block"))
    }

    /// The element opened but not yet flushed.
    ///
    /// # Errors
    /// Returns an error outside an element's attributes.
    pub fn constructing(&self) -> Result<NodeId> {
        self.constructing
            .map(|(element, _)| element)
            .ok_or_else(|| anyhow!("no element is being constructed"))
    }

    fn push_live_block(&mut self, block: Rc<LiveBlock>, remote: bool) -> Rc<LiveBlock> {
        if !remote && let Some(current) = self.blocks.last() {
            current.did_append_bounds(Rc::clone(&block));
        }
        self.blocks.push(Rc::clone(&block));
        block
    }

    fn push_block(&mut self, kind: BlockKind) -> Rc<LiveBlock> {
        let parent = self.cursors.last().map_or(self.root, |cursor| cursor.element);
        self.push_live_block(LiveBlock::new(parent, kind), false)
    }

    /// Open a block that is rendered once.
    pub fn push_simple_block(&mut self) -> Rc<LiveBlock> {
        self.push_block(BlockKind::Simple)
    }

    /// Open a block that can be cleared and rendered again.
    pub fn push_updatable_block(&mut self) -> Rc<LiveBlock> {
        self.push_block(BlockKind::Updatable)
    }

    /// Open a block whose bounds come from the list items in `children`.
    pub fn push_block_list(&mut self, children: UpdatingList) -> Rc<LiveBlock> {
        self.push_block(BlockKind::List(children))
    }

    /// Close the innermost block, giving it a placeholder comment if it
    /// rendered nothing.
    ///
    /// # Errors
    /// Returns an error when no block is open.
    pub fn pop_block(&mut self) -> Result<Rc<LiveBlock>> {
        if self.block()?.needs_placeholder() {
            self.append_comment("")?;
        }
        self.blocks.pop().ok_or_else(|| anyhow!("no open block"))
    }

    /// Render into `element` until [`Self::pop_remote_element`].
    ///
    /// # Errors
    /// Propagates DOM failures from clearing the element.
    pub fn push_remote_element(&mut self, element: NodeId, insert: RemoteInsert) -> Result<Rc<LiveBlock>> {
        let next = match insert {
            RemoteInsert::Before(next) => next,
            RemoteInsert::Replace => {
                let mut dom = self.env.dom().borrow_mut();
                while let Some(child) = dom.first_child(element) {
                    dom.remove_child(child)?;
                }
                None
            }
        };
        let svg = is_svg_root(&self.env, element);
        self.cursors.push(Cursor { element, next, svg });
        Ok(self.push_live_block(LiveBlock::new(element, BlockKind::Remote), true))
    }

    /// Stop rendering into the remote element.
    ///
    /// # Errors
    /// Returns an error when no remote block is open.
    pub fn pop_remote_element(&mut self) -> Result<Rc<LiveBlock>> {
        let block = self.pop_block()?;
        self.cursors.pop().context("no remote element to leave")?;
        Ok(block)
    }

    fn insert(&self, node: NodeId) -> Result<()> {
        let cursor = self.cursor()?;
        self.env.dom().borrow_mut().insert_before(cursor.element, node, cursor.next)?;
        self.block()?.did_append_node(node);
        Ok(())
    }

    /// Append a text node.
    ///
    /// # Errors
    /// Propagates DOM failures.
    pub fn append_text(&mut self, text: &str) -> Result<NodeId> {
        let node = self.env.dom().borrow_mut().create_text(text);
        self.insert(node)?;
        Ok(node)
    }

    /// Append a comment node.
    ///
    /// # Errors
    /// Propagates DOM failures.
    pub fn append_comment(&mut self, text: &str) -> Result<NodeId> {
        let node = self.env.dom().borrow_mut().create_comment(text);
        self.insert(node)?;
        Ok(node)
    }

    /// Parse and insert trusted HTML, returning the first and last nodes
    /// inserted. Empty HTML inserts a comment.
    ///
    /// # Errors
    /// Propagates DOM and parse failures.
    pub fn insert_html(&mut self, html: &str) -> Result<(NodeId, NodeId)> {
        if html.is_empty() {
            let comment = self.append_comment("")?;
            return Ok((comment, comment));
        }
        let cursor = self.cursor()?;
        let (first, last) = self
            .env
            .dom()
            .borrow_mut()
            .insert_html_before(cursor.element, cursor.next, html)?;
        let block = self.block()?;
        block.did_append_node(first);
        block.did_append_node(last);
        Ok((first, last))
    }

    /// Append the text form of `value`, or trusted HTML for safe strings.
    ///
    /// # Errors
    /// Propagates DOM failures.
    pub fn append_value(&mut self, value: &Value) -> Result<(NodeId, NodeId)> {
        if let Value::SafeString(html) = value {
            return self.insert_html(html);
        }
        let node = self.append_text(&value.to_text())?;
        Ok((node, node))
    }

    /// Create an element. It is inserted by [`Self::flush_element`].
    ///
    /// Elements are in the SVG namespace inside `<svg>`, except below the
    /// HTML integration points.
    pub fn open_element(&mut self, tag: &str) -> NodeId {
        let svg = tag.eq_ignore_ascii_case("svg")
            || self.cursors.last().is_some_and(|cursor| {
                cursor.svg
                    && !self.env.dom().borrow().tag_name(cursor.element).is_some_and(|parent| {
                        SVG_INTEGRATION_POINTS.contains(&parent.to_ascii_lowercase().as_str())
                    })
            });
        let namespace = svg.then_some(SVG_NAMESPACE);
        trace!(target: "trellis::builder", "open <{tag}> in {namespace:?}");
        let element = self.env.dom().borrow_mut().create_element(tag, namespace);
        self.constructing = Some((element, svg));
        element
    }

    /// Insert the element being constructed and move into it. `modifiers`
    /// are handed back by the matching [`Self::close_element`].
    ///
    /// # Errors
    /// Returns an error when no element is being constructed.
    pub fn flush_element(&mut self, modifiers: Vec<ModifierInstance>) -> Result<NodeId> {
        let (element, svg) = self
            .constructing
            .take()
            .ok_or_else(|| anyhow!("no element is being constructed"))?;
        let cursor = self.cursor()?;
        self.env.dom().borrow_mut().insert_before(cursor.element, element, cursor.next)?;
        self.block()?.open_element(element);
        self.cursors.push(Cursor {
            element,
            next: None,
            svg,
        });
        self.modifiers.push(modifiers);
        Ok(element)
    }

    /// Leave the innermost element, returning its modifiers.
    ///
    /// # Errors
    /// Returns an error when no element is open.
    pub fn close_element(&mut self) -> Result<Vec<ModifierInstance>> {
        self.block()?.close_element();
        self.cursors.pop().context("no element to close")?;
        self.modifiers.pop().context("no element to close")
    }

    /// Set an attribute that never changes on the element being constructed.
    ///
    /// # Errors
    /// Returns an error outside an element's attributes.
    pub fn set_static_attribute(&mut self, name: &str, value: &str, namespace: Option<&str>) -> Result<()> {
        let element = self.constructing()?;
        self.env.dom().borrow_mut().set_attribute(element, name, value, namespace)
    }

    /// Set an attribute that may change on the element being constructed.
    /// Trusting attributes are not sanitized.
    ///
    /// # Errors
    /// Returns an error outside an element's attributes.
    pub fn set_dynamic_attribute(
        &mut self,
        name: &str,
        value: &Value,
        namespace: Option<&str>,
        trusting: bool,
    ) -> Result<DynamicAttribute> {
        let element = self.constructing()?;
        let mut attribute = DynamicAttribute::new(&self.env, element, name, namespace);
        if trusting {
            attribute = attribute.trusting();
        }
        attribute.set(&self.env, value)?;
        Ok(attribute)
    }
}

fn is_svg_root(env: &Environment, element: NodeId) -> bool {
    env.dom()
        .borrow()
        .tag_name(element)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("svg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use trellis_dom::{Document, DomTree as _, NodeKind};

    fn builder() -> (Rc<RefCell<Document>>, ElementBuilder) {
        let document = Rc::new(RefCell::new(Document::new()));
        let root = document.borrow().root();
        let env = Environment::with_defaults(Rc::clone(&document) as _);
        (document, ElementBuilder::for_initial_render(env, root, None))
    }

    /// Test element nesting and block bounds.
    ///
    /// # Panics
    /// Panics if the markup or the bounds are wrong.
    #[test]
    fn builds_nested_elements() -> Result<()> {
        let (document, mut builder) = builder();
        builder.append_text("before")?;
        let div = builder.open_element("div");
        builder.set_static_attribute("class", "box", None)?;
        builder.flush_element(Vec::new())?;
        builder.append_text("inside")?;
        assert!(builder.close_element()?.is_empty());
        let block = builder.pop_block()?;

        assert_eq!(document.borrow().to_html(), r#"before<div class="box">inside</div>"#);
        assert_eq!(block.last_node(), Some(div));
        Ok(())
    }

    /// Test that empty blocks get a placeholder.
    ///
    /// # Panics
    /// Panics if an empty block has no bounds.
    #[test]
    fn empty_blocks_get_placeholders() -> Result<()> {
        let (document, mut builder) = builder();
        builder.push_updatable_block();
        let block = builder.pop_block()?;
        assert!(!block.is_empty());
        assert_eq!(document.borrow().to_html(), "<!---->");
        Ok(())
    }

    /// Test SVG namespacing, including integration points.
    ///
    /// # Panics
    /// Panics if an element gets the wrong namespace.
    #[test]
    fn svg_children_inherit_the_namespace() -> Result<()> {
        let (document, mut builder) = builder();
        builder.open_element("svg");
        builder.flush_element(Vec::new())?;
        let circle = builder.open_element("circle");
        builder.flush_element(Vec::new())?;
        builder.close_element()?;
        builder.open_element("foreignObject");
        builder.flush_element(Vec::new())?;
        let div = builder.open_element("div");
        builder.flush_element(Vec::new())?;

        let document = document.borrow();
        let namespace = |node| match document.node(node).map(|node| &node.kind) {
            Some(NodeKind::Element { namespace, .. }) => namespace.clone(),
            _ => None,
        };
        assert_eq!(namespace(circle).as_deref(), Some(SVG_NAMESPACE));
        assert_eq!(namespace(div), None);
        Ok(())
    }

    /// Test rendering into another element.
    ///
    /// # Panics
    /// Panics if remote content lands in the wrong place.
    #[test]
    fn remote_elements_replace_content() -> Result<()> {
        let (document, mut builder) = builder();
        let target = document.borrow_mut().create_element("aside", None);
        {
            let mut dom = document.borrow_mut();
            let root = dom.root();
            dom.insert_before(root, target, None)?;
            let old = dom.create_text("old");
            dom.insert_before(target, old, None)?;
        }
        builder.push_remote_element(target, RemoteInsert::Replace)?;
        builder.append_text("new")?;
        builder.pop_remote_element()?;
        let here = builder.append_text("here")?;

        assert_eq!(document.borrow().to_html(), "<aside>new</aside>here");
        assert_eq!(builder.block()?.first_node(), Some(here));
        Ok(())
    }
}
