//! Syscall handlers of the append VM, one function per opcode.
//!
//! Machine opcodes never get here; [`crate::low_level::LowLevelVm`] runs
//! them.

mod components;
mod control;
mod dom;
mod expressions;
mod partial;

use anyhow::{Result, anyhow, bail};
use core::cell::RefCell;
use std::rc::Rc;
use trellis_program::{Op, Register, RuntimeOp};

use crate::component::ComponentInstance;
use crate::vm::Vm;

/// Run one syscall.
///
/// # Errors
/// Returns the handler's failure, or an error for opcodes the append VM
/// does not run.
pub fn evaluate(vm: &mut Vm, op: Op, instruction: &RuntimeOp) -> Result<()> {
    let RuntimeOp { op1, op2, op3, .. } = *instruction;
    match op {
        Op::Primitive => expressions::primitive(vm, op1),
        Op::PrimitiveReference => expressions::primitive_reference(vm),
        Op::Constant => expressions::constant(vm, op1),
        Op::PushSymbolTable => expressions::push_symbol_table(vm, op1),
        Op::PushBlockScope => expressions::push_block_scope(vm),
        Op::CompileBlock => expressions::compile_block(vm),
        Op::Dup => vm.low_level().dup(register(op1)?, op2),
        Op::Pop => vm.stack().drop_n(count(op1)?),
        Op::Load => expressions::load(vm, op1),
        Op::Fetch => expressions::fetch(vm, op1),
        Op::GetVariable => expressions::get_variable(vm, op1),
        Op::GetProperty => expressions::get_property(vm, op1),
        Op::GetBlock => expressions::get_block(vm, op1),
        Op::SpreadBlock => expressions::spread_block(vm),
        Op::HasBlock => expressions::has_block(vm),
        Op::HasBlockParams => expressions::has_block_params(vm),
        Op::SetVariable => expressions::set_variable(vm, op1),
        Op::SetJitBlock => expressions::set_block(vm, op1),
        Op::RootScope => expressions::root_scope(vm, op1),
        Op::ChildScope => expressions::child_scope(vm),
        Op::PopScope => vm.pop_scope().map(drop),
        Op::Concat => expressions::concat(vm, op1),
        Op::Helper => expressions::helper(vm, op1),
        Op::InvokeYield => expressions::invoke_yield(vm),
        Op::PushDynamicScope => vm.push_dynamic_scope().map(drop),
        Op::PopDynamicScope => vm.pop_dynamic_scope(),
        Op::BindDynamicScope => expressions::bind_dynamic_scope(vm, op1),
        Op::GetDynamicVar => expressions::get_dynamic_var(vm),

        Op::JumpUnless => control::jump_unless(vm, op1),
        Op::JumpEq => control::jump_eq(vm, op1, op2),
        Op::AssertSame => control::assert_same(vm),
        Op::ReifyU32 => control::reify_u32(vm),
        Op::Enter => vm.enter(count(op1)?),
        Op::Exit => vm.exit(),
        Op::ToBoolean => control::to_boolean(vm),
        Op::ContentType => control::content_type(vm),
        Op::PutIterator => control::put_iterator(vm),
        Op::EnterList => vm.enter_list(op1),
        Op::ExitList => vm.exit_list(),
        Op::Iterate => control::iterate(vm, op1),

        Op::Text => dom::text(vm, op1),
        Op::Comment => dom::comment(vm, op1),
        Op::AppendText => dom::append_text(vm),
        Op::AppendHTML | Op::AppendSafeHTML => dom::append_html(vm),
        Op::OpenElement => dom::open_element(vm, op1),
        Op::PutComponentOperations => dom::put_component_operations(vm),
        Op::StaticAttr => dom::static_attr(vm, op1, op2, op3),
        Op::StaticComponentAttr => dom::static_component_attr(vm, op1, op2, op3),
        Op::DynamicAttr => dom::dynamic_attr(vm, op1, op2, op3),
        Op::ComponentAttr => dom::component_attr(vm, op1, op3),
        Op::FlushElement => dom::flush_element(vm),
        Op::CloseElement => dom::close_element(vm),
        Op::Modifier => dom::modifier(vm, op1),
        Op::PushRemoteElement => dom::push_remote_element(vm),
        Op::PopRemoteElement => vm.builder().pop_remote_element().map(drop),

        Op::PushComponentDefinition => components::push_component_definition(vm, op1),
        Op::ResolveDynamicComponent => components::resolve_dynamic_component(vm, op1),
        Op::PushDynamicComponentInstance => components::push_dynamic_component_instance(vm),
        Op::PushCurriedComponent => components::push_curried_component(vm),
        Op::PushArgs => components::push_args(vm, op1, op2, op3),
        Op::PushEmptyArgs => components::push_empty_args(vm),
        Op::PrepareArgs => components::prepare_args(vm, op1),
        Op::CaptureArgs => components::capture_args(vm),
        Op::CurryComponent => components::curry_component(vm, op1),
        Op::Main => components::main(vm, op1),
        Op::CreateComponent => components::create_component(vm, op1, op2),
        Op::RegisterComponentDestructor => components::register_destructor(vm, op1),
        Op::GetComponentSelf => components::get_component_self(vm, op1),
        Op::GetJitComponentLayout => components::get_layout(vm, op1),
        Op::PopulateLayout => components::populate_layout(vm, op1),
        Op::VirtualRootScope => components::virtual_root_scope(vm, op1),
        Op::SetupForEval => components::setup_for_eval(vm, op1),
        Op::SetNamedVariables => components::set_named_variables(vm, op1),
        Op::SetBlocks => components::set_blocks(vm, op1),
        Op::InvokeComponentLayout => components::invoke_layout(vm, op1),
        Op::BeginComponentTransaction => components::begin_transaction(vm),
        Op::CommitComponentTransaction => vm.commit_cache_group(),
        Op::DidRenderLayout => components::did_render_layout(vm, op1),

        Op::InvokePartial => partial::invoke_partial(vm, op1, op2, op3),
        Op::ResolveMaybeLocal => partial::resolve_maybe_local(vm, op1),
        Op::Debugger => partial::debugger(vm, op1, op2),

        other => bail!("{other} is not run by the append VM"),
    }
}

fn register(word: i32) -> Result<Register> {
    Register::from_operand(word).ok_or_else(|| anyhow!("{word} is not a register"))
}

fn count(word: i32) -> Result<usize> {
    usize::try_from(word).map_err(|_| anyhow!("{word} is not a count"))
}

/// The component instance held in the register `word`.
fn instance(vm: &mut Vm, word: i32) -> Result<Rc<RefCell<ComponentInstance>>> {
    let register = register(word)?;
    Ok(Rc::clone(vm.low_level().register(register)?.as_instance()?))
}
