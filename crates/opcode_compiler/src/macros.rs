//! Built-in control constructs.
//!
//! Block macros handle `{{#name}}...{{/name}}`; inline macros get the first
//! chance at `{{name ...}}` in append position and return false to fall back
//! to an ordinary append.

use rustc_hash::FxHashMap;
use std::rc::Rc;
use trellis_program::{Op, Register};
use trellis_wire_format::{Expression, Hash, Span};

use crate::compiler::TemplateCompiler;
use crate::encoder::{Operand, Primitive};
use crate::template::{CompilableTemplate, NamedBlocks};

/// A `{{#name}}` invocation.
pub struct BlockInvocation<'tpl> {
    /// The macro name.
    pub name: &'tpl str,
    /// Positional arguments.
    pub params: &'tpl [Expression],
    /// Named arguments.
    pub hash: Option<&'tpl Hash>,
    /// The passed blocks.
    pub blocks: NamedBlocks,
}

impl BlockInvocation<'_> {
    /// The `default` block, recording an error when it is missing.
    fn default_block(&self, compiler: &mut TemplateCompiler<'_>) -> Option<Rc<CompilableTemplate>> {
        let block = self.blocks.get("default").cloned();
        if block.is_none() {
            compiler.error(
                format!("#{} requires a default block", self.name),
                Span::default(),
            );
        }
        block
    }

    /// Check the positional argument count.
    fn expect_params(&self, compiler: &mut TemplateCompiler<'_>, count: usize) -> bool {
        let matches = self.params.len() == count;
        if !matches {
            compiler.error(
                format!("SYNTAX ERROR: #{} requires a single argument", self.name),
                Span::default(),
            );
        }
        matches
    }
}

/// A `{{name ...}}` append that an inline macro may take over.
pub struct InlineInvocation<'tpl> {
    /// The macro name.
    pub name: &'tpl str,
    /// Positional arguments, for call syntax.
    pub params: Option<&'tpl [Expression]>,
    /// Named arguments, for call syntax.
    pub hash: Option<&'tpl Hash>,
    /// The whole appended expression.
    pub value: &'tpl Expression,
    /// Whether this is a `{{{triple}}}` append.
    pub trusted: bool,
    /// Source range.
    pub span: Span,
}

/// Compiles a block invocation.
pub type BlockMacro = fn(&mut TemplateCompiler<'_>, &BlockInvocation<'_>);
/// Compiles an inline invocation; false leaves it to the default append.
pub type InlineMacro = fn(&mut TemplateCompiler<'_>, &InlineInvocation<'_>) -> bool;

/// The macro tables.
#[derive(Clone, Default)]
pub struct Macros {
    blocks: FxHashMap<String, BlockMacro>,
    inlines: FxHashMap<String, InlineMacro>,
}

impl Macros {
    /// The built-in macros.
    pub fn builtin() -> Self {
        let mut macros = Self::default();
        macros.add_block("if", if_block);
        macros.add_block("unless", unless_block);
        macros.add_block("with", with_block);
        macros.add_block("let", let_block);
        macros.add_block("each", each_block);
        macros.add_block("in-element", in_element_block);
        macros.add_block("-with-dynamic-vars", with_dynamic_vars_block);
        macros.add_block("component", component_block);
        macros.add_inline("component", component_inline);
        macros.add_inline("has-block", keyword_inline);
        macros.add_inline("has-block-params", keyword_inline);
        macros.add_inline("-get-dynamic-var", keyword_inline);
        macros
    }

    /// Register a block macro.
    pub fn add_block(&mut self, name: &str, compile: BlockMacro) {
        self.blocks.insert(name.to_owned(), compile);
    }

    /// Register an inline macro.
    pub fn add_inline(&mut self, name: &str, compile: InlineMacro) {
        self.inlines.insert(name.to_owned(), compile);
    }

    /// The block macro called `name`.
    pub fn block(&self, name: &str) -> Option<BlockMacro> {
        self.blocks.get(name).copied()
    }

    /// The inline macro called `name`.
    pub fn inline(&self, name: &str) -> Option<InlineMacro> {
        self.inlines.get(name).copied()
    }
}

fn if_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    if !block.expect_params(compiler, 1) {
        return;
    }
    let Some(default) = block.default_block(compiler) else {
        return;
    };
    compiler.replayable_if(
        |nested| {
            nested.expr(&block.params[0]);
            nested.push(Op::ToBoolean, []);
            1
        },
        |nested| nested.invoke_static_block(&default),
        |nested| {
            if let Some(inverse) = block.blocks.get("else") {
                nested.invoke_static_block(inverse);
            }
        },
    );
}

fn unless_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    if !block.expect_params(compiler, 1) {
        return;
    }
    let Some(default) = block.default_block(compiler) else {
        return;
    };
    compiler.replayable_if(
        |nested| {
            nested.expr(&block.params[0]);
            nested.push(Op::ToBoolean, []);
            1
        },
        |nested| {
            if let Some(inverse) = block.blocks.get("else") {
                nested.invoke_static_block(inverse);
            }
        },
        |nested| nested.invoke_static_block(&default),
    );
}

fn with_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    if !block.expect_params(compiler, 1) {
        return;
    }
    let Some(default) = block.default_block(compiler) else {
        return;
    };
    compiler.replayable_if(
        |nested| {
            nested.expr(&block.params[0]);
            nested.push(Op::Dup, [Operand::Register(Register::Sp), Operand::Int(0)]);
            nested.push(Op::ToBoolean, []);
            2
        },
        |nested| nested.invoke_static_block_with_stack(&default, 1),
        |nested| {
            if let Some(inverse) = block.blocks.get("else") {
                nested.invoke_static_block(inverse);
            }
        },
    );
}

fn let_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    if block.params.is_empty() {
        compiler.error("let requires arguments", Span::default());
        return;
    }
    let Some(default) = block.default_block(compiler) else {
        return;
    };
    let count = compiler.compile_positional(Some(block.params));
    compiler.invoke_static_block_with_stack(&default, count);
}

/// `{{#each list key="@index" as |item index|}}`.
///
/// ```text
///     PutIterator
///     JumpUnless ELSE
///     PushFrame
///     Dup $fp 1
///     ReturnTo ITER
///     EnterList BODY
/// ITER:
///     Iterate BREAK
/// BODY:
///     <default block with (item, memo)>
///     Pop 2
///     Jump FINALLY
/// BREAK:
///     ExitList
///     PopFrame
///     Jump FINALLY
/// ELSE:
///     <else block>
/// ```
fn each_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    let Some(list) = block.params.first() else {
        compiler.error("#each requires a list to iterate", Span::default());
        return;
    };
    let Some(default) = block.default_block(compiler) else {
        return;
    };
    compiler.replayable(
        |nested| {
            match block.hash.and_then(|hash| hash.get("key")) {
                Some(key) => nested.expr(key),
                None => nested.push_primitive_reference(Primitive::Null),
            }
            nested.expr(list);
            2
        },
        |nested| {
            nested.push(Op::PutIterator, []);
            nested.push(Op::JumpUnless, [Operand::label("ELSE")]);
            nested.push(Op::PushFrame, []);
            nested.push(Op::Dup, [Operand::Register(Register::Fp), Operand::Int(1)]);
            nested.push(Op::ReturnTo, [Operand::label("ITER")]);
            nested.push(Op::EnterList, [Operand::label("BODY")]);
            nested.label("ITER");
            nested.push(Op::Iterate, [Operand::label("BREAK")]);
            nested.label("BODY");
            nested.invoke_static_block_with_stack(&default, 2);
            nested.push(Op::Pop, [Operand::Int(2)]);
            nested.push(Op::Jump, [Operand::label("FINALLY")]);
            nested.label("BREAK");
            nested.push(Op::ExitList, []);
            nested.push(Op::PopFrame, []);
            nested.push(Op::Jump, [Operand::label("FINALLY")]);
            nested.label("ELSE");
            if let Some(inverse) = block.blocks.get("else") {
                nested.invoke_static_block(inverse);
            }
        },
    );
}

/// `{{#in-element destination guid=... insertBefore=...}}`.
///
/// `guid` and `insertBefore` are always pushed, in that order, as
/// `undefined` when not passed; an undefined `insertBefore` clears the
/// destination first.
fn in_element_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    if !block.expect_params(compiler, 1) {
        return;
    }
    let Some(default) = block.default_block(compiler) else {
        return;
    };
    if let Some(hash) = block.hash
        && let Some(key) = hash
            .keys
            .iter()
            .find(|key| !matches!(key.as_str(), "guid" | "insertBefore"))
    {
        compiler.error(
            format!("SYNTAX ERROR: #in-element does not take a `{key}` option"),
            Span::default(),
        );
        return;
    }
    compiler.replayable_if(
        |nested| {
            for option in ["guid", "insertBefore"] {
                match block.hash.and_then(|hash| hash.get(option)) {
                    Some(value) => nested.expr(value),
                    None => nested.push_primitive_reference(Primitive::Undefined),
                }
            }
            nested.expr(&block.params[0]);
            nested.push(Op::Dup, [Operand::Register(Register::Sp), Operand::Int(0)]);
            4
        },
        |nested| {
            nested.push(Op::PushRemoteElement, []);
            nested.invoke_static_block(&default);
            nested.push(Op::PopRemoteElement, []);
        },
        |_| {},
    );
}

fn with_dynamic_vars_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    let Some(default) = block.default_block(compiler) else {
        return;
    };
    match block.hash {
        Some(hash) => {
            compiler.compile_positional(Some(&hash.values));
            compiler.dynamic_scope(&hash.keys, |nested| nested.invoke_static_block(&default));
        }
        None => compiler.invoke_static_block(&default),
    }
}

fn component_block(compiler: &mut TemplateCompiler<'_>, block: &BlockInvocation<'_>) {
    let Some((definition, params)) = block.params.split_first() else {
        compiler.error("#component requires a component definition", Span::default());
        return;
    };
    if let Some(tag) = definition.as_string()
        && compiler.static_component_helper(tag, block.hash, block.blocks.get("default").cloned())
    {
        return;
    }
    compiler.invoke_dynamic_component(definition, None, params, block.hash, false, &block.blocks);
}

fn component_inline(compiler: &mut TemplateCompiler<'_>, inline: &InlineInvocation<'_>) -> bool {
    let Some((definition, params)) = inline.params.and_then(<[Expression]>::split_first) else {
        compiler.error("component helper requires at least one argument", inline.span);
        return true;
    };
    if let Some(tag) = definition.as_string()
        && compiler.static_component_helper(tag, inline.hash, None)
    {
        return true;
    }
    compiler.invoke_dynamic_component(
        definition,
        None,
        params,
        inline.hash,
        false,
        &NamedBlocks::EMPTY,
    );
    true
}

/// `{{has-block}}`, `{{has-block-params}}` and `{{-get-dynamic-var}}` append
/// the keyword expression's value as text.
fn keyword_inline(compiler: &mut TemplateCompiler<'_>, inline: &InlineInvocation<'_>) -> bool {
    let value = match inline.value {
        Expression::Call { .. } => inline.value.clone(),
        head => Expression::Call {
            span: inline.span,
            head: Box::new(head.clone()),
            params: None,
            hash: None,
        },
    };
    compiler.guarded_append(inline.trusted, &value);
    true
}
