//! Keyed list reconciliation.
//!
//! [`IterationArtifacts`] remembers the items rendered on the previous pass
//! as a key map plus a linked list in DOM order. [`IteratorSynchronizer`]
//! walks the new items against that list and reports the minimal set of
//! retain/insert/move/delete operations to a [`SynchronizerDelegate`].
//!
//! ```text
//! Append ── new item matches cursor ──► retain
//!        ── key known elsewhere     ──► move (or advance past seen nodes)
//!        ── unknown key             ──► insert before cursor
//! Prune  ── not retained            ──► delete, else reset flags
//! Done   ──► delegate.done()
//! ```

use crate::iterable::{IterableReference, IterationItem, IterationKey, ItemIterator};
use crate::reference::{IterationItemReference, Reference};
use anyhow::{Result, anyhow};
use core::cell::RefCell;
use indextree::{Arena, Node, NodeId};
use log::{debug, trace};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use trellis_validator::Tag;

/// A rendered list item.
pub struct ListItem {
    /// The item's key.
    pub key: IterationKey,
    /// Reference to the item's value, updated in place.
    pub value: Rc<IterationItemReference>,
    /// Reference to the item's position, updated in place.
    pub memo: Rc<IterationItemReference>,
    retained: bool,
    seen: bool,
}

impl ListItem {
    fn update(&mut self, item: &IterationItem) {
        self.retained = true;
        self.value.update(item.value.clone());
        self.memo.update(item.memo.clone());
    }

    fn reset(&mut self) {
        self.retained = false;
        self.seen = false;
    }

    /// The value reference, type-erased.
    pub fn value_reference(&self) -> Reference {
        Rc::clone(&self.value) as Reference
    }

    /// The memo reference, type-erased.
    pub fn memo_reference(&self) -> Reference {
        Rc::clone(&self.memo) as Reference
    }
}

enum Slot {
    List,
    Item(ListItem),
}

/// The previous pass of a list: key map plus DOM-ordered linked list.
pub struct IterationArtifacts {
    iterable: IterableReference,
    arena: Arena<Slot>,
    list: NodeId,
    map: FxHashMap<IterationKey, NodeId>,
    iterator: Option<ItemIterator>,
}

impl IterationArtifacts {
    /// Create empty artifacts for `iterable`.
    pub fn new(iterable: IterableReference) -> Self {
        let mut arena = Arena::new();
        let list = arena.new_node(Slot::List);
        Self {
            iterable,
            arena,
            list,
            map: FxHashMap::default(),
            iterator: None,
        }
    }

    /// The tag of the iterated value.
    #[inline]
    pub fn tag(&self) -> Tag {
        self.iterable.tag()
    }

    /// Start a pass and report whether it is empty. The pass is kept for the
    /// next [`IterationArtifacts::iterate`].
    pub fn is_empty(&mut self) -> bool {
        let iterator = self.iterable.iterate();
        let empty = iterator.is_empty();
        self.iterator = Some(iterator);
        empty
    }

    /// The pending pass started by `is_empty`, or a fresh one.
    pub fn iterate(&mut self) -> ItemIterator {
        self.iterator
            .take()
            .unwrap_or_else(|| self.iterable.iterate())
    }

    /// Whether an item with `key` is in the list.
    #[inline]
    pub fn has(&self, key: &IterationKey) -> bool {
        self.map.contains_key(key)
    }

    /// The node holding `key`.
    #[inline]
    pub fn node(&self, key: &IterationKey) -> Option<NodeId> {
        self.map.get(key).copied()
    }

    /// The item stored at `node`.
    pub fn item(&self, node: NodeId) -> Option<&ListItem> {
        match self.arena.get(node).map(Node::get) {
            Some(Slot::Item(item)) => Some(item),
            _ => None,
        }
    }

    fn item_mut(&mut self, node: NodeId) -> Option<&mut ListItem> {
        match self.arena.get_mut(node).map(Node::get_mut) {
            Some(Slot::Item(item)) => Some(item),
            _ => None,
        }
    }

    fn key_of(&self, node: NodeId) -> Option<&IterationKey> {
        self.item(node).map(|item| &item.key)
    }

    /// Whether the node for `key` was walked past during this pass.
    pub fn was_seen(&self, key: &IterationKey) -> bool {
        self.node(key)
            .and_then(|node| self.item(node))
            .is_some_and(|item| item.seen)
    }

    /// Refresh the references of the item with `item.key`, marking it
    /// retained.
    pub fn update(&mut self, item: &IterationItem) -> Option<NodeId> {
        let node = self.node(&item.key)?;
        self.item_mut(node)?.update(item);
        Some(node)
    }

    fn new_item(&self, item: &IterationItem, retained: bool) -> Slot {
        Slot::Item(ListItem {
            key: item.key.clone(),
            value: self.iterable.value_reference_for(item),
            memo: self.iterable.memo_reference_for(item),
            retained,
            seen: false,
        })
    }

    /// Add a new item at the end of the list.
    pub fn append(&mut self, item: &IterationItem) -> NodeId {
        let slot = self.new_item(item, false);
        let node = self.arena.new_node(slot);
        self.list.append(node, &mut self.arena);
        self.map.insert(item.key.clone(), node);
        node
    }

    /// Add a new, retained item before `reference` (or at the end).
    ///
    /// # Errors
    /// Returns an error if `reference` is not part of the list.
    pub fn insert_before(
        &mut self,
        item: &IterationItem,
        reference: Option<NodeId>,
    ) -> Result<NodeId> {
        let slot = self.new_item(item, true);
        let node = self.arena.new_node(slot);
        self.link_before(node, reference)?;
        self.map.insert(item.key.clone(), node);
        Ok(node)
    }

    /// Move `node` before `reference` (or to the end), marking it retained.
    ///
    /// # Errors
    /// Returns an error if either node is not part of the list.
    pub fn move_before(&mut self, node: NodeId, reference: Option<NodeId>) -> Result<()> {
        if let Some(item) = self.item_mut(node) {
            item.retained = true;
        }
        node.detach(&mut self.arena);
        self.link_before(node, reference)
    }

    fn link_before(&mut self, node: NodeId, reference: Option<NodeId>) -> Result<()> {
        match reference {
            Some(reference) => reference
                .checked_insert_before(node, &mut self.arena)
                .map_err(|error| anyhow!("cannot link list item: {error}")),
            None => self
                .list
                .checked_append(node, &mut self.arena)
                .map_err(|error| anyhow!("cannot link list item: {error}")),
        }
    }

    /// Unlink and forget `node`.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(key) = self.key_of(node).cloned() {
            self.map.remove(&key);
        }
        node.remove(&mut self.arena);
    }

    /// The node after `node`.
    #[inline]
    pub fn next_node(&self, node: NodeId) -> Option<NodeId> {
        self.arena.get(node).and_then(Node::next_sibling)
    }

    /// Mark `node` seen and return the node after it.
    pub fn advance_node(&mut self, node: NodeId) -> Option<NodeId> {
        if let Some(item) = self.item_mut(node) {
            item.seen = true;
        }
        self.next_node(node)
    }

    /// Walk from `current` (marking nodes seen) until the node for `key`.
    pub fn advance_to_key(&mut self, key: &IterationKey, current: NodeId) -> Option<NodeId> {
        let mut seek = Some(current);
        while let Some(node) = seek {
            if self.key_of(node) == Some(key) {
                return Some(node);
            }
            seek = self.advance_node(node);
        }
        None
    }

    /// The first node of the list.
    #[inline]
    pub fn head(&self) -> Option<NodeId> {
        self.arena.get(self.list).and_then(Node::first_child)
    }

    /// Keys in list order.
    pub fn keys(&self) -> Vec<IterationKey> {
        self.list
            .children(&self.arena)
            .filter_map(|node| self.key_of(node).cloned())
            .collect()
    }

    /// Number of items in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    fn is_retained(&self, node: NodeId) -> bool {
        self.item(node).is_some_and(|item| item.retained)
    }

    fn reset(&mut self, node: NodeId) {
        if let Some(item) = self.item_mut(node) {
            item.reset();
        }
    }
}

/// Drives the initial render of a list, recording each item in the shared
/// artifacts as it is produced.
pub struct ReferenceIterator {
    artifacts: Rc<RefCell<IterationArtifacts>>,
    iterator: Option<ItemIterator>,
}

impl ReferenceIterator {
    /// Create an iterator and its artifacts.
    pub fn new(iterable: IterableReference) -> Self {
        Self {
            artifacts: Rc::new(RefCell::new(IterationArtifacts::new(iterable))),
            iterator: None,
        }
    }

    /// The artifacts shared with the list block that revalidates the list.
    #[inline]
    pub fn artifacts(&self) -> &Rc<RefCell<IterationArtifacts>> {
        &self.artifacts
    }

    /// Produce the next item, returning its key, value reference and memo
    /// reference.
    pub fn next_item(&mut self) -> Option<(IterationKey, Reference, Reference)> {
        let mut artifacts = self.artifacts.borrow_mut();
        let iterator = self.iterator.get_or_insert_with(|| artifacts.iterate());
        let item = iterator.next()?;
        let node = artifacts.append(&item);
        let stored = artifacts.item(node)?;
        Some((
            item.key,
            stored.value_reference(),
            stored.memo_reference(),
        ))
    }
}

/// Receives the operations computed by an [`IteratorSynchronizer`].
///
/// A `before` of `None` means "at the end of the list".
pub trait SynchronizerDelegate {
    /// The item stayed where it was; its references were already updated.
    ///
    /// # Errors
    /// Propagates failures of the host.
    fn retain(&mut self, key: &IterationKey, item: &Reference, memo: &Reference) -> Result<()>;

    /// A new item must be rendered before `before`.
    ///
    /// # Errors
    /// Propagates failures of the host.
    fn insert(
        &mut self,
        key: &IterationKey,
        item: &Reference,
        memo: &Reference,
        before: Option<&IterationKey>,
    ) -> Result<()>;

    /// An existing item must be moved before `before`.
    ///
    /// # Errors
    /// Propagates failures of the host.
    fn move_item(
        &mut self,
        key: &IterationKey,
        item: &Reference,
        memo: &Reference,
        before: Option<&IterationKey>,
    ) -> Result<()>;

    /// An item disappeared.
    ///
    /// # Errors
    /// Propagates failures of the host.
    fn delete(&mut self, key: &IterationKey) -> Result<()>;

    /// The pass finished.
    ///
    /// # Errors
    /// Propagates failures of the host.
    fn done(&mut self) -> Result<()>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Append,
    Prune,
    Done,
}

/// One reconciliation pass over a list.
pub struct IteratorSynchronizer<'list, D: SynchronizerDelegate> {
    artifacts: &'list mut IterationArtifacts,
    target: &'list mut D,
    iterator: ItemIterator,
    current: Option<NodeId>,
}

impl<'list, D: SynchronizerDelegate> IteratorSynchronizer<'list, D> {
    /// Prepare a pass over the current items of `artifacts`.
    pub fn new(artifacts: &'list mut IterationArtifacts, target: &'list mut D) -> Self {
        let iterator = artifacts.iterate();
        let current = artifacts.head();
        Self {
            artifacts,
            target,
            iterator,
            current,
        }
    }

    /// Run all phases.
    ///
    /// # Errors
    /// Propagates delegate failures and list corruption.
    pub fn sync(mut self) -> Result<()> {
        debug!(target: "trellis::reference", "synchronizing list of {} items", self.artifacts.len());
        let mut phase = Phase::Append;
        loop {
            phase = match phase {
                Phase::Append => self.next_append()?,
                Phase::Prune => self.next_prune()?,
                Phase::Done => return self.target.done(),
            };
        }
    }

    fn references(&self, node: NodeId) -> Result<(IterationKey, Reference, Reference)> {
        let item = self
            .artifacts
            .item(node)
            .ok_or_else(|| anyhow!("list node {node:?} has no item"))?;
        Ok((item.key.clone(), item.value_reference(), item.memo_reference()))
    }

    fn next_append(&mut self) -> Result<Phase> {
        let Some(item) = self.iterator.next() else {
            self.current = self.artifacts.head();
            return Ok(Phase::Prune);
        };

        let current_key = self.current.and_then(|node| self.artifacts.key_of(node));
        if current_key == Some(&item.key) {
            self.next_retain(&item)?;
        } else if self.artifacts.has(&item.key) {
            self.next_move(&item)?;
        } else {
            self.next_insert(&item)?;
        }
        Ok(Phase::Append)
    }

    fn next_retain(&mut self, item: &IterationItem) -> Result<()> {
        let current = self
            .artifacts
            .update(item)
            .ok_or_else(|| anyhow!("retained key {} is not in the list", item.key))?;
        self.current = self.artifacts.next_node(current);
        let (key, value, memo) = self.references(current)?;
        trace!(target: "trellis::reference", "retain {key}");
        self.target.retain(&key, &value, &memo)
    }

    fn next_move(&mut self, item: &IterationItem) -> Result<()> {
        let found = self
            .artifacts
            .update(item)
            .ok_or_else(|| anyhow!("moved key {} is not in the list", item.key))?;

        if self.artifacts.was_seen(&item.key) {
            let current = self.current;
            self.move_item(found, current)
        } else {
            self.advance_to_key(&item.key)
        }
    }

    fn advance_to_key(&mut self, key: &IterationKey) -> Result<()> {
        let Some(current) = self.current else {
            return Ok(());
        };

        let next = self.artifacts.advance_node(current);
        if let Some(next) = next
            && self.artifacts.key_of(next) == Some(key)
        {
            self.current = self.artifacts.advance_node(next);
            return Ok(());
        }

        if let Some(seek) = self.artifacts.advance_to_key(key, current) {
            self.move_item(seek, Some(current))?;
            self.current = self.artifacts.next_node(current);
        }
        Ok(())
    }

    fn move_item(&mut self, node: NodeId, reference: Option<NodeId>) -> Result<()> {
        if self.artifacts.next_node(node) == reference {
            return Ok(());
        }

        self.artifacts.move_before(node, reference)?;
        let (key, value, memo) = self.references(node)?;
        let before = reference.and_then(|reference| self.artifacts.key_of(reference).cloned());
        trace!(target: "trellis::reference", "move {key} before {before:?}");
        self.target.move_item(&key, &value, &memo, before.as_ref())
    }

    fn next_insert(&mut self, item: &IterationItem) -> Result<()> {
        let current = self.current;
        let node = self.artifacts.insert_before(item, current)?;
        let (key, value, memo) = self.references(node)?;
        let before = current.and_then(|current| self.artifacts.key_of(current).cloned());
        trace!(target: "trellis::reference", "insert {key} before {before:?}");
        self.target.insert(&key, &value, &memo, before.as_ref())
    }

    fn next_prune(&mut self) -> Result<Phase> {
        let Some(node) = self.current else {
            return Ok(Phase::Done);
        };
        self.current = self.artifacts.next_node(node);

        if self.artifacts.is_retained(node) {
            self.artifacts.reset(node);
        } else {
            let (key, _, _) = self.references(node)?;
            self.artifacts.remove(node);
            trace!(target: "trellis::reference", "delete {key}");
            self.target.delete(&key)?;
        }
        Ok(Phase::Prune)
    }
}
