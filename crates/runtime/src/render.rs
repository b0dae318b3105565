//! Entry points: render a template or a component into an element, then
//! revalidate or tear down what was rendered.

use anyhow::Result;
use log::debug;
use std::rc::Rc;
use trellis_dom::NodeId;
use trellis_opcode_compiler::Template;
use trellis_reference::{ConstReference, Reference};

use crate::builder::{ElementBuilder, LiveBlock, clear};
use crate::component::{ComponentDefinition, InstanceDefinition};
use crate::destroyable::{Destroy, DestructorList};
use crate::environment::Environment;
use crate::runtime::Runtime;
use crate::updating::{UpdatingList, UpdatingVm};
use crate::vm::arguments::Arguments;
use crate::vm::scope::{DynamicScope, Scope};
use crate::vm::stack::StackValue;
use crate::vm::{RenderOutcome, Vm};

/// What a render left behind: its DOM bounds, the updating program that
/// keeps them current and the destructors to run on teardown.
pub struct RenderResult {
    runtime: Rc<Runtime>,
    updating: UpdatingList,
    bounds: Rc<LiveBlock>,
    destructors: Rc<DestructorList>,
}

impl RenderResult {
    fn new(runtime: Rc<Runtime>, outcome: RenderOutcome) -> Self {
        let RenderOutcome {
            updating,
            block,
            destructors,
        } = outcome;
        Self {
            runtime,
            updating,
            bounds: block,
            destructors,
        }
    }

    /// The environment rendered into.
    #[inline]
    pub fn env(&self) -> &Rc<Environment> {
        self.runtime.env()
    }

    /// The first and last nodes rendered, and their parent.
    #[inline]
    pub const fn bounds(&self) -> &Rc<LiveBlock> {
        &self.bounds
    }

    /// The top-level updating opcodes.
    #[inline]
    pub const fn updating(&self) -> &UpdatingList {
        &self.updating
    }

    /// Bring the DOM up to date with every reference read by the render.
    ///
    /// # Errors
    /// Returns revalidation failures outside any re-renderable block, and
    /// failures of a block's re-render.
    pub fn rerender(&self) -> Result<()> {
        let env = Rc::clone(self.runtime.env());
        let always_revalidate = self.runtime.config().always_revalidate;
        debug!(target: "trellis::render", "revalidating {} top-level opcodes", self.updating.borrow().len());
        env.transact(|| {
            UpdatingVm::new(Rc::clone(&env), always_revalidate).execute(Rc::clone(&self.updating), None)
        })
    }

    /// Run every destructor and remove the rendered nodes.
    ///
    /// # Errors
    /// Propagates DOM failures.
    pub fn destroy(&self) -> Result<()> {
        let env = self.runtime.env();
        env.transact(|| {
            env.destroy(Rc::clone(&self.destructors) as Rc<dyn Destroy>);
            Ok(())
        })?;
        self.updating.borrow_mut().clear();
        clear(&mut *env.dom().borrow_mut(), &self.bounds)?;
        Ok(())
    }
}

fn execute(runtime: &Rc<Runtime>, vm: Vm) -> Result<RenderResult> {
    let outcome = runtime.env().transact(|| vm.execute())?;
    Ok(RenderResult::new(Rc::clone(runtime), outcome))
}

/// Render `template` with `this` as its `self`, appending to `parent`
/// before `next`.
///
/// # Errors
/// Returns compile errors and failures of the render.
pub fn render_template(
    runtime: &Rc<Runtime>,
    template: &Template,
    this: Reference,
    parent: NodeId,
    next: Option<NodeId>,
) -> Result<RenderResult> {
    let layout = template.as_layout();
    let handle = runtime.compile(&layout)?;
    let pc = program_address(runtime, handle)?;
    debug!(target: "trellis::render", "rendering template {} at {pc}", template.id());

    let scope = Scope::root(this, layout.symbol_table().symbols().len());
    let builder = ElementBuilder::for_initial_render(Rc::clone(runtime.env()), parent, next);
    let vm = Vm::initial(Rc::clone(runtime), pc, scope, DynamicScope::new(), builder);
    execute(runtime, vm)
}

/// Render `definition` with the named arguments `args` through the shared
/// `main` routine, appending to `parent` before `next`.
///
/// # Errors
/// Returns compile errors and failures of the render.
pub fn render_component(
    runtime: &Rc<Runtime>,
    definition: Rc<ComponentDefinition>,
    args: Vec<(Rc<str>, Reference)>,
    parent: NodeId,
    next: Option<NodeId>,
) -> Result<RenderResult> {
    let layout = definition.manager().layout(&definition)?;
    let handle = runtime.compile(&layout)?;
    let table = Rc::new(layout.symbol_table().clone());
    let pc = program_address(runtime, runtime.context().stdlib().main)?;
    debug!(target: "trellis::render", "rendering component {}", definition.name());

    let builder = ElementBuilder::for_initial_render(Rc::clone(runtime.env()), parent, next);
    let scope = Scope::root(ConstReference::undefined(), 0);
    let mut vm = Vm::initial(Rc::clone(runtime), pc, scope, DynamicScope::new(), builder);
    vm.low_level().push_frame();
    let stack = vm.stack();
    stack.push(StackValue::Args(Rc::new(Arguments::new(Vec::new(), args))));
    stack.push(StackValue::Invocation { handle, table });
    stack.push(StackValue::Definition(InstanceDefinition::Resolved(definition)));
    execute(runtime, vm)
}

fn program_address(runtime: &Runtime, handle: i32) -> Result<i32> {
    let address = runtime.program().borrow().heap.get_addr(handle)?;
    Ok(i32::try_from(address)?)
}
