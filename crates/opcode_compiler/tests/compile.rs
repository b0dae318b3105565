//! Compiling whole templates and reading the instructions back.

use anyhow::{Result, anyhow};
use serde_json::{Value as Json, json};
use std::collections::HashMap;
use std::rc::Rc;
use trellis_opcode_compiler::{
    Capabilities, CompilableTemplate, CompileTimeComponent, CompileTimeResolver, NoopResolver,
    SyntaxContext, Template,
};
use trellis_program::{Op, PLACEHOLDER_HANDLE, RuntimeOp};
use trellis_wire_format::{SerializedTemplate, SerializedTemplateBlock};

const TODO_LIST: &str = include_str!("fixtures/todo_list.json");

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Knows the `on` modifier, a `shout` helper and any registered layouts.
#[derive(Default)]
struct TestResolver {
    layouts: HashMap<String, Rc<Template>>,
}

impl CompileTimeResolver for TestResolver {
    fn lookup_component(&self, name: &str, _referrer: &Json) -> Option<CompileTimeComponent> {
        self.layouts.get(name).map(|template| CompileTimeComponent {
            handle: 40,
            capabilities: Capabilities::MINIMAL,
            compilable: Some(template.as_layout()),
        })
    }

    fn lookup_helper(&self, name: &str, _referrer: &Json) -> Option<i32> {
        (name == "shout").then_some(11)
    }

    fn lookup_modifier(&self, name: &str, _referrer: &Json) -> Option<i32> {
        (name == "on").then_some(3)
    }

    fn lookup_partial(&self, _name: &str, _referrer: &Json) -> Option<i32> {
        None
    }
}

fn block(json: &Json) -> Result<SerializedTemplateBlock> {
    Ok(serde_json::from_value(json.clone())?)
}

fn layout(id: &str, json: &Json) -> Result<Template> {
    Ok(Template::from_block(id, block(json)?, json!({ "module": id })))
}

/// Decode every instruction of the block behind `handle`.
fn decode(context: &SyntaxContext, handle: i32) -> Result<Vec<RuntimeOp>> {
    let program = context.program().borrow();
    let start = program.heap.get_addr(handle)?;
    let end = start + program.heap.size_of(handle) as usize;
    let mut ops = Vec::new();
    let mut offset = start;
    while offset < end {
        let op = RuntimeOp::decode(&program.heap, offset);
        offset += op.size;
        ops.push(op);
    }
    Ok(ops)
}

fn kinds(ops: &[RuntimeOp]) -> Vec<Op> {
    ops.iter().filter_map(RuntimeOp::op).collect()
}

fn first(ops: &[RuntimeOp], kind: Op) -> Result<RuntimeOp> {
    ops.iter()
        .copied()
        .find(|op| op.op() == Some(kind))
        .ok_or_else(|| anyhow!("no {kind} instruction"))
}

/// The instruction a relative jump at `from` lands on.
fn jump_target(ops: &[RuntimeOp], from: &RuntimeOp) -> Result<RuntimeOp> {
    let target = from.offset as i32 + from.op1;
    ops.iter()
        .copied()
        .find(|op| op.offset as i32 == target)
        .ok_or_else(|| anyhow!("{} jumps to {target}, which is not an instruction", from.kind))
}

fn nested_block(context: &SyntaxContext, constant: &RuntimeOp) -> Result<Rc<CompilableTemplate>> {
    context
        .program()
        .borrow()
        .constants
        .get_other::<CompilableTemplate>(constant.op1)
}

#[test]
fn static_markup_compiles_to_element_ops() -> Result<()> {
    init();
    let context = SyntaxContext::new(Rc::new(NoopResolver));
    let template = layout(
        "static",
        &json!({
            "symbols": [],
            "statements": [[9, "p", true], [12, "class", "lead", null], [10], [1, 1, 0, 0, "hi"], [11]],
            "upvars": []
        }),
    )?;
    let handle = template.as_layout().compile(&context)?;
    let ops = decode(&context, handle)?;
    assert_eq!(
        kinds(&ops),
        [Op::OpenElement, Op::StaticAttr, Op::FlushElement, Op::Text, Op::CloseElement, Op::Return]
    );

    let program = context.program().borrow();
    let attr = first(&ops, Op::StaticAttr)?;
    assert_eq!(program.constants.get_string(attr.op1)?, "class");
    assert_eq!(program.constants.get_string(attr.op2)?, "lead");
    assert_eq!(attr.op3, 0);
    assert_eq!(program.constants.get_string(first(&ops, Op::Text)?.op1)?, "hi");
    Ok(())
}

#[test]
fn if_block_is_replayable() -> Result<()> {
    init();
    let context = SyntaxContext::new(Rc::new(NoopResolver));
    let template = layout(
        "conditional",
        &json!({
            "symbols": [],
            "statements": [[5, [27, [26, 0, "BlockHead"], []], [[27, [24, 0], ["ok"]]], null,
                [["default", "else"], [
                    {"statements": [[1, 1, 0, 0, "Yes"]], "parameters": []},
                    {"statements": [[1, 1, 0, 0, "No"]], "parameters": []}
                ]]]],
            "upvars": ["if"]
        }),
    )?;
    let handle = template.as_layout().compile(&context)?;
    let ops = decode(&context, handle)?;
    assert_eq!(
        kinds(&ops),
        [
            Op::PushFrame,
            Op::ReturnTo,
            Op::GetVariable,
            Op::GetProperty,
            Op::ToBoolean,
            Op::Enter,
            Op::JumpUnless,
            Op::PushFrame,
            Op::Constant,
            Op::CompileBlock,
            Op::InvokeVirtual,
            Op::PopFrame,
            Op::Jump,
            Op::PushFrame,
            Op::Constant,
            Op::CompileBlock,
            Op::InvokeVirtual,
            Op::PopFrame,
            Op::Exit,
            Op::Return,
            Op::PopFrame,
            Op::Return,
        ]
    );
    assert_eq!(first(&ops, Op::Enter)?.op1, 1);

    let jump_unless = first(&ops, Op::JumpUnless)?;
    let jump = first(&ops, Op::Jump)?;
    let return_to = first(&ops, Op::ReturnTo)?;
    assert_eq!(jump_target(&ops, &jump_unless)?.offset, ops[13].offset);
    assert_eq!(jump_target(&ops, &jump)?.op(), Some(Op::Exit));
    assert_eq!(jump_target(&ops, &return_to)?.offset, ops[20].offset);

    let consequent = nested_block(&context, &ops[8])?;
    let alternative = nested_block(&context, &ops[14])?;
    assert_eq!(consequent.handle(), None);
    let yes = decode(&context, consequent.compile(&context)?)?;
    let no = decode(&context, alternative.compile(&context)?)?;
    let program = context.program().borrow();
    assert_eq!(program.constants.get_string(first(&yes, Op::Text)?.op1)?, "Yes");
    assert_eq!(program.constants.get_string(first(&no, Op::Text)?.op1)?, "No");
    Ok(())
}

#[test]
fn appends_go_through_the_stdlib() -> Result<()> {
    init();
    let context = SyntaxContext::new(Rc::new(NoopResolver));
    let stdlib = context.stdlib();
    assert_ne!(stdlib.cautious_append, PLACEHOLDER_HANDLE);
    assert_ne!(stdlib.trusting_append, stdlib.cautious_append);

    let template = layout(
        "append",
        &json!({
            "symbols": [],
            "statements": [[1, 0, 0, 0, [27, [24, 0], ["name"]]], [1, 1, 0, 0, [27, [24, 0], ["html"]]]],
            "upvars": []
        }),
    )?;
    let handle = template.as_layout().compile(&context)?;
    let ops = decode(&context, handle)?;
    let invokes: Vec<i32> = ops
        .iter()
        .filter(|op| op.op() == Some(Op::InvokeStatic))
        .map(|op| op.op1)
        .collect();
    assert_eq!(invokes, [stdlib.cautious_append, stdlib.trusting_append]);

    let routine = decode(&context, stdlib.trusting_append)?;
    assert_eq!(routine.first().and_then(RuntimeOp::op), Some(Op::ContentType));
    assert!(kinds(&routine).contains(&Op::AppendHTML));
    assert!(!kinds(&decode(&context, stdlib.cautious_append)?).contains(&Op::AppendHTML));
    Ok(())
}

#[test]
fn unknown_names_are_compile_errors() -> Result<()> {
    init();
    let context = SyntaxContext::new(Rc::new(TestResolver::default()));
    let template = layout(
        "errors",
        &json!({
            "symbols": [],
            "statements": [
                [1, 0, 2, 10, [31, 2, 10, [27, [26, 0, "CallHead"], []], [[27, [24, 0], ["x"]]], null]],
                [5, [27, [26, 1, "BlockHead"], []], null, null, null],
                [1, 0, 14, 6, [31, 14, 6, [27, [26, 2, "CallHead"], []], null, null]]
            ],
            "upvars": ["format", "frobnicate", "shout"]
        }),
    )?;
    let compilable = template.as_layout();
    let Err(errors) = compilable.compile(&context) else {
        return Err(anyhow!("unknown names should not compile"));
    };
    let problems: Vec<&str> = errors.errors.iter().map(|error| error.problem.as_str()).collect();
    assert_eq!(problems, ["Unexpected Helper format", "Unknown block macro frobnicate"]);
    assert_eq!(errors.errors[0].span.end(), 12);
    assert_eq!(compilable.handle(), Some(errors.handle));

    let ops = decode(&context, errors.handle)?;
    assert_eq!(first(&ops, Op::Helper)?.op1, 11);
    assert!(compilable.compile(&context).is_err());
    Ok(())
}

#[test]
fn todo_list_compiles_with_modifiers() -> Result<()> {
    init();
    let context = SyntaxContext::new(Rc::new(TestResolver::default()));
    let template = Template::new(&SerializedTemplate::from_json_str(TODO_LIST)?)?;
    assert_eq!(template.id(), "zFkD7tc2");
    let handle = template.as_layout().compile(&context)?;
    let ops = decode(&context, handle)?;
    let ops_kinds = kinds(&ops);

    let modifiers: Vec<i32> = ops
        .iter()
        .filter(|op| op.op() == Some(Op::Modifier))
        .map(|op| op.op1)
        .collect();
    assert_eq!(modifiers, [3, 3]);
    assert_eq!(
        ops_kinds.iter().filter(|op| **op == Op::PutComponentOperations).count(),
        2
    );
    for op in [Op::PutIterator, Op::EnterList, Op::Iterate, Op::ExitList] {
        assert!(ops_kinds.contains(&op), "missing {op}");
    }

    let iterate = first(&ops, Op::Iterate)?;
    assert_eq!(jump_target(&ops, &iterate)?.op(), Some(Op::ExitList));
    let body = ops
        .iter()
        .skip_while(|op| op.op() != Some(Op::Iterate))
        .find(|op| op.op() == Some(Op::Constant))
        .ok_or_else(|| anyhow!("each body is not pushed"))?;
    let item = nested_block(&context, body)?;
    assert_eq!(item.symbol_table().parameters(), [1]);

    let item_ops = decode(&context, item.compile(&context)?)?;
    assert_eq!(first(&item_ops, Op::GetVariable)?.op1, 1);
    let program = context.program().borrow();
    assert_eq!(program.constants.get_string(first(&item_ops, Op::OpenElement)?.op1)?, "li");
    Ok(())
}

#[test]
fn recursive_layouts_patch_their_own_handle() -> Result<()> {
    init();
    let tree = layout(
        "tree",
        &json!({
            "symbols": ["@depth"],
            "statements": [[9, "ul", true], [10], [7, "Tree", [], [["@depth"], [[27, [24, 1], []]]], null], [11]],
            "upvars": []
        }),
    )?;
    let mut resolver = TestResolver::default();
    resolver.layouts.insert("Tree".to_owned(), Rc::new(tree));
    let resolver = Rc::new(resolver);
    let context = SyntaxContext::new(Rc::clone(&resolver) as Rc<dyn CompileTimeResolver>);

    let compilable = resolver
        .lookup_component("Tree", &Json::Null)
        .and_then(|component| component.compilable)
        .ok_or_else(|| anyhow!("Tree should resolve to a layout"))?;
    let handle = compilable.compile(&context)?;
    let ops = decode(&context, handle)?;

    assert_eq!(first(&ops, Op::PushComponentDefinition)?.op1, 40);
    assert_eq!(first(&ops, Op::RootScope)?.op1, 2);
    assert_eq!(first(&ops, Op::InvokeStatic)?.op1, handle);
    Ok(())
}
