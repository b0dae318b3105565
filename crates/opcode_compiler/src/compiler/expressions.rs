//! Expression compilation. Every expression leaves one reference on the
//! stack.

use trellis_program::{Op, Register};
use trellis_wire_format::{Expression, ExpressionContext, Hash, Span};

use super::TemplateCompiler;
use crate::encoder::{Operand, Primitive};

impl TemplateCompiler<'_> {
    /// Compile an expression.
    pub fn expr(&mut self, expression: &Expression) {
        match expression {
            Expression::Literal(literal) => self.push_primitive_reference(literal.into()),
            Expression::Undefined => self.push_primitive_reference(Primitive::Undefined),
            Expression::GetSymbol(symbol) => {
                self.push(Op::GetVariable, [Operand::Int(*symbol as i32)]);
            }
            Expression::GetPath(head, tail) => {
                self.expr(head);
                for key in tail {
                    self.push(Op::GetProperty, [Operand::string(key.as_str())]);
                }
            }
            Expression::GetFree(index) => {
                let name = self.upvar(*index);
                self.error(
                    format!("cannot resolve free variable {name} outside a strict context"),
                    Span::default(),
                );
            }
            Expression::GetContextualFree(index, context) => self.contextual_free(*index, *context),
            Expression::HasBlock(block) => {
                self.expr(block);
                self.push(Op::HasBlock, []);
            }
            Expression::HasBlockParams(block) => {
                self.expr(block);
                self.push(Op::SpreadBlock, []);
                self.push(Op::CompileBlock, []);
                self.push(Op::HasBlockParams, []);
            }
            Expression::Concat(parts) => {
                for part in parts {
                    self.expr(part);
                }
                self.push(Op::Concat, [Operand::Int(parts.len() as i32)]);
            }
            Expression::Call {
                span,
                head,
                params,
                hash,
            } => self.call_expression(*span, head, params.as_deref(), hash.as_ref()),
        }
    }

    /// Push a constant reference to `primitive`.
    pub fn push_primitive_reference(&mut self, primitive: Primitive) {
        self.push(Op::Primitive, [Operand::Primitive(primitive)]);
        self.push(Op::PrimitiveReference, []);
    }

    fn upvar(&self, index: u32) -> String {
        self.meta
            .upvars
            .get(index as usize)
            .cloned()
            .unwrap_or_else(|| format!("#{index}"))
    }

    fn contextual_free(&mut self, index: u32, context: ExpressionContext) {
        let name = self.upvar(index);
        if self.meta.as_partial {
            self.push(Op::ResolveMaybeLocal, [Operand::String(Some(name))]);
            return;
        }
        match context {
            ExpressionContext::Expression => self.this_fallback(name),
            ExpressionContext::AppendSingleId => {
                let helper = self
                    .context
                    .resolver()
                    .lookup_helper(&name, &self.meta.referrer);
                match helper {
                    Some(handle) => self.call(handle, None, None),
                    None => self.this_fallback(name),
                }
            }
            ExpressionContext::CallHead
            | ExpressionContext::BlockHead
            | ExpressionContext::ModifierHead
            | ExpressionContext::ComponentHead => self.error(
                format!("cannot evaluate {name} in context {context:?}"),
                Span::default(),
            ),
        }
    }

    /// `this.name`.
    fn this_fallback(&mut self, name: String) {
        self.push(Op::GetVariable, [Operand::Int(0)]);
        self.push(Op::GetProperty, [Operand::String(Some(name))]);
    }

    fn call_expression(
        &mut self,
        span: Span,
        head: &Expression,
        params: Option<&[Expression]>,
        hash: Option<&Hash>,
    ) {
        let name = self.simple_path_name(head);
        match name.as_deref() {
            Some("component") => {
                let Some((definition, rest)) = params.and_then(<[Expression]>::split_first) else {
                    self.error("component helper requires at least one argument", span);
                    return;
                };
                self.curry_component(definition, rest, hash, false);
            }
            Some("has-block") => {
                let block = self.block_name(params);
                match self.meta.block_symbol(&block) {
                    Some(symbol) => {
                        self.push(Op::GetBlock, [Operand::Int(symbol as i32)]);
                        self.push(Op::HasBlock, []);
                    }
                    None => self.push_primitive_reference(Primitive::Bool(false)),
                }
            }
            Some("has-block-params") => {
                let block = self.block_name(params);
                match self.meta.block_symbol(&block) {
                    Some(symbol) => {
                        self.push(Op::GetBlock, [Operand::Int(symbol as i32)]);
                        self.push(Op::SpreadBlock, []);
                        self.push(Op::CompileBlock, []);
                        self.push(Op::HasBlockParams, []);
                    }
                    None => self.push_primitive_reference(Primitive::Bool(false)),
                }
            }
            Some("-get-dynamic-var") => {
                let Some(variable) = params.and_then(<[Expression]>::first) else {
                    self.error("-get-dynamic-var requires a name", span);
                    return;
                };
                self.expr(variable);
                self.push(Op::GetDynamicVar, []);
            }
            _ => {
                let Some(name) = self.expect_string(head, "Expected call head to be a string", span)
                else {
                    return;
                };
                let helper = self
                    .context
                    .resolver()
                    .lookup_helper(&name, &self.meta.referrer);
                match helper {
                    Some(handle) => self.call(handle, params, hash),
                    None => self.error(format!("Unexpected Helper {name}"), span),
                }
            }
        }
    }

    /// The block named by a `has-block` argument, `default` when omitted.
    fn block_name(&self, params: Option<&[Expression]>) -> String {
        params
            .and_then(<[Expression]>::first)
            .and_then(Expression::as_string)
            .unwrap_or("default")
            .to_owned()
    }

    /// Invoke a helper and push its result.
    pub fn call(&mut self, handle: i32, params: Option<&[Expression]>, hash: Option<&Hash>) {
        self.push(Op::PushFrame, []);
        self.simple_args(params, hash, false);
        self.push(Op::Helper, [Operand::Int(handle)]);
        self.push(Op::PopFrame, []);
        self.push(Op::Fetch, [Operand::Register(Register::V0)]);
    }
}
