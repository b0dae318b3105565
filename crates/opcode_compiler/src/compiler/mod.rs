//! The statement and expression compiler.
//!
//! A [`TemplateCompiler`] compiles one block. Nested blocks are not compiled
//! here: they are pushed as `Constant` operands and compiled on first use by
//! the `CompileBlock` opcode. Component layouts invoked statically are the
//! exception and are compiled eagerly.

mod builders;
mod components;
mod expressions;

use std::borrow::Cow;
use std::rc::Rc;
use trellis_program::{Op, Register, StdlibOperand};
use trellis_wire_format::{Expression, Span, Statement};

use crate::context::SyntaxContext;
use crate::encoder::{Encoder, Operand};
use crate::error::{CompileError, CompileErrors};
use crate::macros::{BlockInvocation, InlineInvocation};
use crate::template::{CompileMeta, NamedBlocks};

pub use builders::Clause;
pub use components::Populate;

/// Compiles the statements of one block into an [`Encoder`].
pub struct TemplateCompiler<'ctx> {
    context: &'ctx SyntaxContext,
    meta: Rc<CompileMeta>,
    encoder: Encoder,
}

impl<'ctx> TemplateCompiler<'ctx> {
    /// A compiler for a block of the template described by `meta`.
    pub fn new(context: &'ctx SyntaxContext, meta: Rc<CompileMeta>) -> Self {
        Self {
            context,
            meta,
            encoder: Encoder::new(),
        }
    }

    /// The compilation context.
    #[inline]
    pub const fn context(&self) -> &'ctx SyntaxContext {
        self.context
    }

    /// The template metadata.
    #[inline]
    pub fn meta(&self) -> &Rc<CompileMeta> {
        &self.meta
    }

    /// Emit an instruction.
    pub fn push<const N: usize>(&mut self, op: Op, operands: [Operand; N]) {
        let mut program = self.context.program().borrow_mut();
        self.encoder.push(&mut program.constants, op, operands);
    }

    /// Record a compile error.
    pub fn error(&mut self, problem: impl Into<String>, span: Span) {
        self.encoder.error(CompileError::new(problem, span));
    }

    /// Open a label scope.
    #[inline]
    pub fn start_labels(&mut self) {
        self.encoder.start_labels();
    }

    /// Place a label.
    #[inline]
    pub fn label(&mut self, name: impl Into<Cow<'static, str>>) {
        self.encoder.label(name);
    }

    /// Close a label scope.
    #[inline]
    pub fn stop_labels(&mut self) {
        self.encoder.stop_labels();
    }

    /// Copy the compiled block into the heap.
    ///
    /// # Errors
    /// Returns every error recorded while compiling.
    pub fn commit(self) -> Result<i32, CompileErrors> {
        let mut program = self.context.program().borrow_mut();
        self.encoder.commit(&mut program.heap, self.meta.size)
    }

    /// Compile a statement list.
    pub fn statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.statement(statement);
        }
    }

    #[allow(clippy::too_many_lines, reason = "one arm per statement kind")]
    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Comment(text) => self.push(Op::Comment, [Operand::string(text.as_str())]),
            Statement::OpenElement { tag, simple } => {
                if !simple {
                    self.push(Op::PutComponentOperations, []);
                }
                self.push(Op::OpenElement, [Operand::string(tag.as_str())]);
            }
            Statement::FlushElement => self.push(Op::FlushElement, []),
            Statement::CloseElement => self.push(Op::CloseElement, []),
            Statement::StaticAttr(attr) => self.push(
                Op::StaticAttr,
                [
                    Operand::string(attr.name.as_str()),
                    Operand::string(attr.value.as_str()),
                    Operand::String(attr.namespace.clone()),
                ],
            ),
            Statement::StaticComponentAttr(attr) => self.push(
                Op::StaticComponentAttr,
                [
                    Operand::string(attr.name.as_str()),
                    Operand::string(attr.value.as_str()),
                    Operand::String(attr.namespace.clone()),
                ],
            ),
            Statement::DynamicAttr(attr) | Statement::TrustingDynamicAttr(attr) => {
                self.expr(&attr.value);
                self.push(
                    Op::DynamicAttr,
                    [
                        Operand::string(attr.name.as_str()),
                        Operand::Bool(matches!(statement, Statement::TrustingDynamicAttr(_))),
                        Operand::String(attr.namespace.clone()),
                    ],
                );
            }
            Statement::ComponentAttr(attr) | Statement::TrustingComponentAttr(attr) => {
                self.expr(&attr.value);
                self.push(
                    Op::ComponentAttr,
                    [
                        Operand::string(attr.name.as_str()),
                        Operand::Bool(matches!(statement, Statement::TrustingComponentAttr(_))),
                        Operand::String(attr.namespace.clone()),
                    ],
                );
            }
            Statement::Modifier {
                span,
                head,
                params,
                hash,
            } => {
                let Some(name) = self.expect_string(head, "Expected modifier head to be a string", *span)
                else {
                    return;
                };
                let found = self
                    .context
                    .resolver()
                    .lookup_modifier(&name, &self.meta.referrer);
                match found {
                    Some(handle) => {
                        self.push(Op::PushFrame, []);
                        self.simple_args(params.as_deref(), hash.as_ref(), false);
                        self.push(Op::Modifier, [Operand::Int(handle)]);
                        self.push(Op::PopFrame, []);
                    }
                    None => self.error(format!("Unexpected Modifier {name}"), *span),
                }
            }
            Statement::Append {
                trusted,
                span,
                value,
            } => self.append(*trusted, *span, value),
            Statement::Block {
                head,
                params,
                hash,
                blocks,
            } => {
                let Some(name) =
                    self.expect_string(head, "Expected block head to be a string", Span::default())
                else {
                    return;
                };
                let blocks = NamedBlocks::from_wire(blocks.as_ref(), &self.meta);
                let Some(block_macro) = self.context.macros().block(&name) else {
                    self.error(format!("Unknown block macro {name}"), Span::default());
                    return;
                };
                let invocation = BlockInvocation {
                    name: &name,
                    params: params.as_deref().unwrap_or_default(),
                    hash: hash.as_ref(),
                    blocks,
                };
                block_macro(self, &invocation);
            }
            Statement::Component {
                tag,
                attrs,
                args,
                blocks,
            } => self.component_statement(tag, attrs, args.as_ref(), blocks.as_ref()),
            Statement::Yield { to, params } => {
                self.yield_block(*to, params.as_deref().unwrap_or_default());
            }
            Statement::AttrSplat(to) => self.yield_block(*to, &[]),
            Statement::Partial { name, eval_info } => self.partial(name, eval_info),
            Statement::Debugger(eval_info) => {
                let symbols = self.meta.eval_symbols.clone().unwrap_or_default();
                self.push(
                    Op::Debugger,
                    [
                        Operand::StringArray(symbols),
                        Operand::Array(eval_info.iter().map(|&symbol| symbol as i32).collect()),
                    ],
                );
            }
        }
    }

    /// `{{value}}` or `{{{value}}}`.
    fn append(&mut self, trusted: bool, span: Span, value: &Expression) {
        if trusted && let Some(text) = value.as_string() {
            self.push(Op::Text, [Operand::string(text)]);
            return;
        }
        if self.inline(trusted, span, value) {
            return;
        }
        self.guarded_append(trusted, value);
    }

    /// Append through the stdlib routine that switches on content type.
    pub fn guarded_append(&mut self, trusted: bool, value: &Expression) {
        let routine = if trusted {
            StdlibOperand::TrustingAppend
        } else {
            StdlibOperand::CautiousAppend
        };
        self.push(Op::PushFrame, []);
        self.expr(value);
        self.push(Op::InvokeStatic, [Operand::Stdlib(routine)]);
        self.push(Op::PopFrame, []);
    }

    /// Try the inline macro named by `value`; false when none applies.
    fn inline(&mut self, trusted: bool, span: Span, value: &Expression) -> bool {
        let (head, params, hash) = match value {
            Expression::Call {
                head, params, hash, ..
            } => (head.as_ref(), params.as_deref(), hash.as_ref()),
            Expression::GetPath(..) => (value, None, None),
            _ => return false,
        };
        let Some(name) = self.simple_path_name(head) else {
            return false;
        };
        let Some(inline_macro) = self.context.macros().inline(&name) else {
            return false;
        };
        inline_macro(
            self,
            &InlineInvocation {
                name: &name,
                params,
                hash,
                value,
                trusted,
                span,
            },
        )
    }

    /// `{{partial name}}`: resolved and rendered at runtime.
    fn partial(&mut self, name: &Expression, eval_info: &[u32]) {
        let referrer = self.meta.referrer.clone();
        let symbols = self.meta.eval_symbols.clone().unwrap_or_default();
        let info: Vec<i32> = eval_info.iter().map(|&symbol| symbol as i32).collect();
        self.replayable_if(
            |compiler| {
                compiler.expr(name);
                compiler.push(
                    Op::Dup,
                    [Operand::Register(Register::Sp), Operand::Int(0)],
                );
                2
            },
            move |compiler| {
                compiler.push(
                    Op::InvokePartial,
                    [
                        Operand::TemplateMeta(referrer),
                        Operand::StringArray(symbols),
                        Operand::Array(info),
                    ],
                );
                compiler.push(Op::PopScope, []);
                compiler.push(Op::PopFrame, []);
            },
            |_| {},
        );
    }

    /// The upvar name of a bare free-variable path.
    pub fn simple_path_name(&self, expression: &Expression) -> Option<String> {
        let Expression::GetPath(head, tail) = expression else {
            return None;
        };
        if !tail.is_empty() {
            return None;
        }
        match **head {
            Expression::GetFree(index) | Expression::GetContextualFree(index, _) => {
                self.meta.upvars.get(index as usize).cloned()
            }
            _ => None,
        }
    }

    /// The name of a call, block or modifier head, recording an error when
    /// the head is not a bare free variable.
    pub fn expect_string(&mut self, expression: &Expression, what: &str, span: Span) -> Option<String> {
        if self.meta.upvars.is_empty() {
            self.error(
                format!("{what}, but there were no free variables in the template"),
                span,
            );
            return None;
        }
        let name = self.simple_path_name(expression);
        if name.is_none() {
            self.error(format!("{what}, got {}", expression.to_json()), span);
        }
        name
    }
}
