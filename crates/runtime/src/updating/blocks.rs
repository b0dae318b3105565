//! Block opcodes: regions the updating VM can re-render from scratch.

use anyhow::{Result, anyhow};
use core::cell::{Cell, RefCell};
use log::{debug, trace, warn};
use rustc_hash::FxHashMap;
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_reference::{IterationArtifacts, IterationKey, IteratorSynchronizer, Reference, SynchronizerDelegate};
use trellis_validator::{
    Revision, Tag, combine, create_tag, create_update_tag, dirty_tag, update_tag, validate_tag, value_for_tag,
};

use super::{UpdatingList, UpdatingOpcode, UpdatingVm, updating_list};
use crate::builder::{ElementBuilder, LiveBlock, clear, move_bounds};
use crate::destroyable::{Destroy, DestructorList};
use crate::environment::Environment;
use crate::runtime::Runtime;
use crate::vm::{ResumableState, Vm};

fn children_tag(children: &UpdatingList) -> Tag {
    combine(children.borrow().iter().map(|child| child.tag()))
}

/// A re-renderable block: revalidates its children and, when one of them
/// throws, clears its bounds and runs the append program again from the
/// state captured when it was entered.
pub struct TryBlock {
    runtime: Rc<Runtime>,
    state: ResumableState,
    bounds: Rc<LiveBlock>,
    children: UpdatingList,
    destructors: Rc<DestructorList>,
    tag: Tag,
}

impl TryBlock {
    /// A block rendered into `bounds`, resumable from `state`.
    pub fn new(runtime: Rc<Runtime>, state: ResumableState, bounds: Rc<LiveBlock>) -> Rc<Self> {
        Rc::new(Self {
            runtime,
            state,
            bounds,
            children: updating_list(),
            destructors: DestructorList::new(),
            tag: create_update_tag(),
        })
    }

    /// The opcodes rendered inside the block.
    #[inline]
    pub const fn children(&self) -> &UpdatingList {
        &self.children
    }

    /// What the block's content registered for teardown.
    #[inline]
    pub const fn destructors(&self) -> &Rc<DestructorList> {
        &self.destructors
    }

    /// Tear the block's content down and render it again.
    ///
    /// When the re-render fails, the block is left holding an empty
    /// placeholder at its old position and renders again on the next pass.
    ///
    /// # Errors
    /// Returns failures of the re-render itself; those are not caught again.
    pub fn handle_exception(self: &Rc<Self>) -> Result<()> {
        debug!(target: "trellis::updating", "re-rendering block at pc {}", self.state.pc);
        let env = Rc::clone(self.runtime.env());
        self.children.borrow_mut().clear();
        env.destroy_children(&self.destructors);
        let next = {
            let dom = env.dom().borrow();
            self.bounds.last_node().and_then(|last| dom.next_sibling(last))
        };

        let builder = ElementBuilder::resume(Rc::clone(&env), &self.bounds)?;
        let mut vm = Vm::resume(
            Rc::clone(&self.runtime),
            &self.state,
            builder,
            Rc::clone(&self.destructors),
        );
        vm.push_updating(updating_list());
        vm.update_with(Rc::clone(self) as _)?;
        vm.push_updating(Rc::clone(&self.children));
        if let Err(error) = vm.execute() {
            self.abandon(&env, next)?;
            return Err(error);
        }
        Ok(())
    }

    /// Drop whatever a failed re-render produced, keep a placeholder before
    /// `next` and leave a [`Retry`] as the only child.
    fn abandon(&self, env: &Environment, next: Option<NodeId>) -> Result<()> {
        warn!(target: "trellis::updating", "block at pc {} failed to re-render", self.state.pc);
        env.destroy_children(&self.destructors);
        {
            let mut dom = env.dom().borrow_mut();
            self.bounds.reset(&mut *dom)?;
            let placeholder = dom.create_comment("");
            dom.insert_before(self.bounds.parent(), placeholder, next)?;
            self.bounds.did_append_node(placeholder);
        }
        let retry = create_tag();
        update_tag(&self.tag, &retry);
        dirty_tag(&retry);
        *self.children.borrow_mut() = vec![Rc::new(Retry { tag: retry }) as Rc<dyn UpdatingOpcode>];
        Ok(())
    }
}

/// The content of a block whose re-render failed: throws so the block
/// renders again.
struct Retry {
    tag: Tag,
}

impl UpdatingOpcode for Retry {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        vm.throw()
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }
}

impl UpdatingOpcode for TryBlock {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        let children = Rc::clone(&self.children);
        vm.try_block(children, Some(self));
        Ok(())
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }

    fn bounds(&self) -> Option<Rc<LiveBlock>> {
        Some(Rc::clone(&self.bounds))
    }

    fn did_initialize_children(&self) {
        update_tag(&self.tag, &children_tag(&self.children));
    }
}

impl Destroy for TryBlock {
    fn will_destroy(&self) {
        self.destructors.will_destroy();
    }

    fn did_destroy(&self) {
        self.destructors.did_destroy();
    }
}

/// The items of an `{{#each}}`: one [`TryBlock`] per key, reconciled
/// against the list whenever it changes.
pub struct ListBlock {
    runtime: Rc<Runtime>,
    state: ResumableState,
    bounds: Rc<LiveBlock>,
    children: UpdatingList,
    destructors: Rc<DestructorList>,
    artifacts: Rc<RefCell<IterationArtifacts>>,
    last_iterated: Cell<Revision>,
    map: RefCell<FxHashMap<IterationKey, Rc<TryBlock>>>,
    artifacts_tag: Tag,
    children_tag: Tag,
    tag: Tag,
}

impl ListBlock {
    /// A list rendered into `bounds`, whose item blocks are `children`.
    pub fn new(
        runtime: Rc<Runtime>,
        state: ResumableState,
        bounds: Rc<LiveBlock>,
        children: UpdatingList,
        artifacts: Rc<RefCell<IterationArtifacts>>,
    ) -> Rc<Self> {
        let children_tag = create_update_tag();
        let artifacts_tag = artifacts.borrow().tag();
        let tag = combine([artifacts_tag.clone(), children_tag.clone()]);
        Rc::new(Self {
            runtime,
            state,
            bounds,
            children,
            destructors: DestructorList::new(),
            artifacts,
            last_iterated: Cell::new(Revision::INITIAL),
            map: RefCell::new(FxHashMap::default()),
            artifacts_tag,
            children_tag,
            tag,
        })
    }

    /// The item blocks, in DOM order.
    #[inline]
    pub const fn children(&self) -> &UpdatingList {
        &self.children
    }

    /// What the items registered for teardown.
    #[inline]
    pub const fn destructors(&self) -> &Rc<DestructorList> {
        &self.destructors
    }

    /// Record the block rendered for `key`.
    pub fn register_item(&self, key: IterationKey, item: Rc<TryBlock>) {
        self.map.borrow_mut().insert(key, item);
    }

    fn did_initialize(&self, changed: bool) {
        self.last_iterated.set(value_for_tag(&self.artifacts_tag));
        if changed {
            update_tag(&self.children_tag, &children_tag(&self.children));
        }
    }

    fn item(&self, key: &IterationKey) -> Result<Rc<TryBlock>> {
        self.map
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no rendered item for key {key}"))
    }

    fn position(&self, item: &Rc<TryBlock>) -> Option<usize> {
        let target = Rc::as_ptr(item).cast::<()>();
        self.children
            .borrow()
            .iter()
            .position(|child| Rc::as_ptr(child).cast::<()>() == target)
    }

    /// Place `item` in the children before `before`, or at the end.
    fn place(&self, item: Rc<TryBlock>, before: Option<&Rc<TryBlock>>) {
        let index = before.and_then(|before| self.position(before));
        let mut children = self.children.borrow_mut();
        match index {
            Some(index) => children.insert(index, item),
            None => children.push(item),
        }
    }

    fn sync(self: &Rc<Self>) -> Result<()> {
        let end = {
            let env = self.runtime.env();
            let dom = env.dom().borrow();
            self.bounds.last_node().and_then(|last| dom.next_sibling(last))
        };
        let mut delegate = ListUpdate {
            list: Rc::clone(self),
            end,
            changed: false,
        };
        {
            let mut artifacts = self.artifacts.borrow_mut();
            IteratorSynchronizer::new(&mut artifacts, &mut delegate).sync()?;
        }
        self.did_initialize(delegate.changed);
        Ok(())
    }
}

impl UpdatingOpcode for ListBlock {
    fn evaluate(self: Rc<Self>, vm: &mut UpdatingVm) -> Result<()> {
        if !validate_tag(&self.artifacts_tag, self.last_iterated.get()) {
            self.sync()?;
        }
        vm.try_block(Rc::clone(&self.children), None);
        Ok(())
    }

    fn tag(&self) -> Tag {
        self.tag.clone()
    }

    fn bounds(&self) -> Option<Rc<LiveBlock>> {
        Some(Rc::clone(&self.bounds))
    }

    fn did_initialize_children(&self) {
        self.did_initialize(true);
    }
}

impl Destroy for ListBlock {
    fn will_destroy(&self) {
        self.destructors.will_destroy();
    }

    fn did_destroy(&self) {
        self.destructors.did_destroy();
    }
}

/// Applies one reconciliation pass to the DOM. New and moved items go
/// before `end`, the node following the list, when they belong at the end.
struct ListUpdate {
    list: Rc<ListBlock>,
    end: Option<NodeId>,
    changed: bool,
}

impl ListUpdate {
    fn next_node(&self, before: Option<&IterationKey>) -> Result<(Option<NodeId>, Option<Rc<TryBlock>>)> {
        let Some(key) = before else {
            return Ok((self.end, None));
        };
        let item = self.list.item(key)?;
        let node = item.bounds.first_node().or(self.end);
        Ok((node, Some(item)))
    }
}

impl SynchronizerDelegate for ListUpdate {
    fn retain(&mut self, key: &IterationKey, _item: &Reference, _memo: &Reference) -> Result<()> {
        trace!(target: "trellis::updating", "retaining item {key}");
        Ok(())
    }

    fn insert(
        &mut self,
        key: &IterationKey,
        item: &Reference,
        memo: &Reference,
        before: Option<&IterationKey>,
    ) -> Result<()> {
        trace!(target: "trellis::updating", "inserting item {key}");
        let list = &self.list;
        let (next, reference) = self.next_node(before)?;
        let env = Rc::clone(list.runtime.env());
        let builder = ElementBuilder::for_initial_render(env, list.bounds.parent(), next);
        let mut vm = Vm::resume(
            Rc::clone(&list.runtime),
            &list.state,
            builder,
            Rc::clone(&list.destructors),
        );
        vm.push_updating(updating_list());
        let block = vm.iterate(Rc::clone(memo), Rc::clone(item))?;
        list.register_item(key.clone(), Rc::clone(&block));
        vm.did_enter(&block)?;
        vm.execute()?;
        list.place(block, reference.as_ref());
        self.changed = true;
        Ok(())
    }

    fn move_item(
        &mut self,
        key: &IterationKey,
        _item: &Reference,
        _memo: &Reference,
        before: Option<&IterationKey>,
    ) -> Result<()> {
        trace!(target: "trellis::updating", "moving item {key}");
        let list = &self.list;
        let block = list.item(key)?;
        let (next, reference) = self.next_node(before)?;
        {
            let env = list.runtime.env();
            let mut dom = env.dom().borrow_mut();
            move_bounds(&mut *dom, &block.bounds, next)?;
        }
        if let Some(index) = list.position(&block) {
            list.children.borrow_mut().remove(index);
        }
        list.place(block, reference.as_ref());
        Ok(())
    }

    fn delete(&mut self, key: &IterationKey) -> Result<()> {
        trace!(target: "trellis::updating", "deleting item {key}");
        let list = &self.list;
        let block = list
            .map
            .borrow_mut()
            .remove(key)
            .ok_or_else(|| anyhow!("no rendered item for key {key}"))?;
        list.destructors.remove(&block);
        if let Some(index) = list.position(&block) {
            list.children.borrow_mut().remove(index);
        }
        let env = list.runtime.env();
        env.destroy(Rc::clone(&block) as Rc<dyn Destroy>);
        clear(&mut *env.dom().borrow_mut(), &block.bounds)?;
        self.changed = true;
        Ok(())
    }

    fn done(&mut self) -> Result<()> {
        trace!(target: "trellis::updating", "list pass done, changed: {}", self.changed);
        Ok(())
    }
}
