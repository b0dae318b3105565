//! Component invocation.
//!
//! Three paths, from cheapest to most general:
//! - static: the layout is known and needs neither eval nor `prepare_args`,
//!   so arguments and blocks are bound straight into the layout's symbols
//!   and the layout is called with `InvokeStatic`
//! - prepared: arguments are built with `PushArgs`, prepared, then bound by
//!   the layout's symbol table at runtime
//! - dynamic: the definition is a runtime value, resolved and then invoked
//!   through the prepared path

use std::rc::Rc;
use trellis_program::{Op, PLACEHOLDER_HANDLE, Register};
use trellis_wire_format::{Blocks, Expression, Hash, Span, Statement};

use super::TemplateCompiler;
use crate::encoder::Operand;
use crate::resolver::{Capabilities, CompileTimeComponent};
use crate::template::{ATTRS_BLOCK, CompilableTemplate, NamedBlocks, SymbolTable};

/// How the prepared path finds the layout.
#[derive(Clone, Copy)]
pub enum Populate<'layout> {
    /// The caller has already set it up (the `main` routine).
    Ready,
    /// A statically known layout.
    Static(&'layout Rc<CompilableTemplate>),
    /// Ask the component manager at runtime.
    Dynamic,
}

/// Where a symbol in a static layout gets its value.
#[derive(Clone, Copy)]
struct Binding {
    symbol: u32,
    is_block: bool,
}

impl<'ctx> TemplateCompiler<'ctx> {
    /// `<Component @arg={{value}} />` or a dynamic `<this.component />`.
    pub(super) fn component_statement(
        &mut self,
        tag: &Expression,
        attrs: &[Statement],
        args: Option<&Hash>,
        blocks: Option<&Blocks>,
    ) {
        let named = NamedBlocks::from_wire(blocks, &self.meta);
        let attrs_block = (!attrs.is_empty()).then(|| {
            Rc::new(CompilableTemplate::new(
                attrs.to_vec(),
                Rc::clone(&self.meta),
                SymbolTable::Block {
                    parameters: Vec::new(),
                },
            ))
        });

        let Some(name) = tag.as_string() else {
            self.invoke_dynamic_component(tag, attrs_block, &[], args, true, &named);
            return;
        };
        let Some(component) = self.lookup_component(name) else {
            self.error(format!("Cannot find component {name}"), Span::default());
            return;
        };
        self.push(Op::PushComponentDefinition, [Operand::Int(component.handle)]);
        match &component.compilable {
            Some(layout) => self.invoke_static_component(
                component.capabilities,
                layout,
                attrs_block,
                &[],
                args,
                &named,
            ),
            None => self.invoke_component(
                Some(component.capabilities),
                attrs_block,
                &[],
                args,
                true,
                &named,
                None,
            ),
        }
    }

    fn lookup_component(&self, name: &str) -> Option<CompileTimeComponent> {
        self.context
            .resolver()
            .lookup_component(name, &self.meta.referrer)
    }

    /// `{{component "name" arg=value}}` with a statically known layout.
    ///
    /// Returns false when the name does not resolve to one, so the caller
    /// can fall back to dynamic invocation.
    pub fn static_component_helper(
        &mut self,
        tag: &str,
        hash: Option<&Hash>,
        block: Option<Rc<CompilableTemplate>>,
    ) -> bool {
        let Some(component) = self.lookup_component(tag) else {
            return false;
        };
        let Some(layout) = &component.compilable else {
            return false;
        };
        let hash = hash.map(|hash| Hash {
            keys: hash.keys.iter().map(|key| format!("@{key}")).collect(),
            values: hash.values.clone(),
        });
        self.push(Op::PushComponentDefinition, [Operand::Int(component.handle)]);
        self.invoke_static_component(
            component.capabilities,
            layout,
            None,
            &[],
            hash.as_ref(),
            &NamedBlocks::new(vec![("default".to_owned(), block)]),
        );
        true
    }

    /// Invoke the component on top of the stack, binding arguments straight
    /// into the layout's symbols.
    pub fn invoke_static_component(
        &mut self,
        capabilities: Capabilities,
        layout: &Rc<CompilableTemplate>,
        attrs: Option<Rc<CompilableTemplate>>,
        params: &[Expression],
        hash: Option<&Hash>,
        blocks: &NamedBlocks,
    ) {
        let table = layout.symbol_table();
        if table.has_eval() || capabilities.prepare_args {
            self.invoke_component(
                Some(capabilities),
                attrs,
                params,
                hash,
                true,
                blocks,
                Some(layout),
            );
            return;
        }

        self.push(Op::Fetch, [Operand::Register(Register::S0)]);
        self.push(Op::Dup, [Operand::Register(Register::Sp), Operand::Int(1)]);
        self.push(Op::Load, [Operand::Register(Register::S0)]);

        if capabilities.create_args {
            self.push(Op::PushFrame, []);
            self.simple_args(Some(params), hash, true);
        }
        self.push(Op::BeginComponentTransaction, []);
        if capabilities.dynamic_scope {
            self.push(Op::PushDynamicScope, []);
        }
        if capabilities.create_instance {
            self.push(
                Op::CreateComponent,
                [
                    Operand::Int(i32::from(blocks.has("default"))),
                    Operand::Register(Register::S0),
                ],
            );
        }
        if capabilities.create_args {
            self.push(Op::PopFrame, []);
        }

        self.push(Op::PushFrame, []);
        self.push(Op::RegisterComponentDestructor, [Operand::Register(Register::S0)]);
        self.push(Op::GetComponentSelf, [Operand::Register(Register::S0)]);
        let mut bindings = vec![Binding {
            symbol: 0,
            is_block: false,
        }];

        let symbols = table.symbols();
        for (index, symbol) in symbols.iter().enumerate() {
            let slot = index as u32 + 1;
            if let Some(name) = symbol.strip_prefix('&') {
                let block = if symbol == ATTRS_BLOCK {
                    attrs.as_ref()
                } else {
                    blocks.get(name)
                };
                self.push_yieldable_block(block);
                bindings.push(Binding {
                    symbol: slot,
                    is_block: true,
                });
            } else if symbol.starts_with('@')
                && let Some(value) = hash.and_then(|hash| hash.get(symbol))
            {
                self.expr(value);
                bindings.push(Binding {
                    symbol: slot,
                    is_block: false,
                });
            }
        }

        self.push(
            Op::RootScope,
            [
                Operand::Int(symbols.len() as i32 + 1),
                Operand::Bool(blocks.has_any()),
            ],
        );
        for binding in bindings.iter().rev() {
            let op = if binding.is_block {
                Op::SetJitBlock
            } else {
                Op::SetVariable
            };
            self.push(op, [Operand::Int(binding.symbol as i32)]);
        }

        self.invoke_static_layout(layout);

        // Closes the block opened by BeginComponentTransaction, so it is
        // emitted even for components without an instance.
        self.push(Op::DidRenderLayout, [Operand::Register(Register::S0)]);
        self.push(Op::PopFrame, []);
        self.push(Op::PopScope, []);
        if capabilities.dynamic_scope {
            self.push(Op::PopDynamicScope, []);
        }
        self.push(Op::CommitComponentTransaction, []);
        self.push(Op::Load, [Operand::Register(Register::S0)]);
    }

    /// `InvokeStatic` a layout, compiling it now. A layout still being
    /// compiled (recursion) gets a word patched once it has a handle.
    fn invoke_static_layout(&mut self, layout: &Rc<CompilableTemplate>) {
        match layout.compile(self.context) {
            Ok(PLACEHOLDER_HANDLE) => {
                let pending = Rc::clone(layout);
                self.push(
                    Op::InvokeStatic,
                    [Operand::Later(Box::new(move || {
                        pending.handle().unwrap_or(PLACEHOLDER_HANDLE)
                    }))],
                );
            }
            Ok(handle) => self.push(Op::InvokeStatic, [Operand::Int(handle)]),
            Err(errors) => {
                for error in errors.errors {
                    self.encoder.error(error);
                }
            }
        }
    }

    /// Invoke the component on top of the stack through a prepared argument
    /// list. `capabilities` is `None` when they are only known at runtime.
    #[allow(clippy::too_many_arguments, reason = "mirrors the invocation shape")]
    pub fn invoke_component(
        &mut self,
        capabilities: Option<Capabilities>,
        attrs: Option<Rc<CompilableTemplate>>,
        params: &[Expression],
        hash: Option<&Hash>,
        at_names: bool,
        blocks: &NamedBlocks,
        layout: Option<&Rc<CompilableTemplate>>,
    ) {
        let bindable_at_names = capabilities.is_none_or(|capabilities| capabilities.prepare_args)
            || hash.is_some_and(|hash| !hash.is_empty());
        let blocks = blocks.with("attrs", attrs);

        self.push(Op::Fetch, [Operand::Register(Register::S0)]);
        self.push(Op::Dup, [Operand::Register(Register::Sp), Operand::Int(1)]);
        self.push(Op::Load, [Operand::Register(Register::S0)]);
        self.push(Op::PushFrame, []);
        self.compile_args(Some(params), hash, &blocks, at_names);
        self.push(Op::PrepareArgs, [Operand::Register(Register::S0)]);
        let populate = layout.map_or(Populate::Dynamic, Populate::Static);
        self.invoke_prepared_component(blocks.has("default"), true, bindable_at_names, populate);
        self.push(Op::Load, [Operand::Register(Register::S0)]);
    }

    /// Create the component in `$s0`, bind its scope and call its layout.
    pub fn invoke_prepared_component(
        &mut self,
        has_block: bool,
        bindable_blocks: bool,
        bindable_at_names: bool,
        populate: Populate<'_>,
    ) {
        let state = || Operand::Register(Register::S0);
        self.push(Op::BeginComponentTransaction, []);
        self.push(Op::PushDynamicScope, []);
        self.push(Op::CreateComponent, [Operand::Int(i32::from(has_block)), state()]);

        match populate {
            Populate::Ready => {}
            Populate::Static(layout) => {
                self.push_symbol_table(Some(layout.symbol_table()));
                self.push_compilable(Some(layout));
                self.push(Op::CompileBlock, []);
                self.push(Op::PopulateLayout, [state()]);
            }
            Populate::Dynamic => {
                self.push(Op::GetJitComponentLayout, [state()]);
                self.push(Op::PopulateLayout, [state()]);
            }
        }

        self.push(Op::RegisterComponentDestructor, [state()]);
        self.push(Op::GetComponentSelf, [state()]);
        self.push(Op::VirtualRootScope, [state()]);
        self.push(Op::SetVariable, [Operand::Int(0)]);
        self.push(Op::SetupForEval, [state()]);
        if bindable_at_names {
            self.push(Op::SetNamedVariables, [state()]);
        }
        if bindable_blocks {
            self.push(Op::SetBlocks, [state()]);
        }
        self.push(Op::Pop, [Operand::Int(1)]);
        self.push(Op::InvokeComponentLayout, [state()]);
        self.push(Op::DidRenderLayout, [state()]);
        self.push(Op::PopFrame, []);
        self.push(Op::PopScope, []);
        self.push(Op::PopDynamicScope, []);
        self.push(Op::CommitComponentTransaction, []);
    }

    /// Invoke whatever component `definition` evaluates to, re-rendering
    /// when it changes.
    pub fn invoke_dynamic_component(
        &mut self,
        definition: &Expression,
        attrs: Option<Rc<CompilableTemplate>>,
        params: &[Expression],
        hash: Option<&Hash>,
        at_names: bool,
        blocks: &NamedBlocks,
    ) {
        let referrer = self.meta.referrer.clone();
        self.replayable(
            |compiler| {
                compiler.expr(definition);
                compiler.push(Op::Dup, [Operand::Register(Register::Sp), Operand::Int(0)]);
                2
            },
            |compiler| {
                compiler.push(Op::JumpUnless, [Operand::label("ELSE")]);
                compiler.push(Op::ResolveDynamicComponent, [Operand::TemplateMeta(referrer)]);
                compiler.push(Op::PushDynamicComponentInstance, []);
                compiler.invoke_component(None, attrs, params, hash, at_names, blocks, None);
                compiler.label("ELSE");
            },
        );
    }

    /// `(component definition ...)`: push a curried component reference.
    pub fn curry_component(
        &mut self,
        definition: &Expression,
        params: &[Expression],
        hash: Option<&Hash>,
        at_names: bool,
    ) {
        self.push(Op::PushFrame, []);
        self.simple_args(Some(params), hash, at_names);
        self.push(Op::CaptureArgs, []);
        self.expr(definition);
        self.push(Op::CurryComponent, [Operand::TemplateMeta(self.meta.referrer.clone())]);
        self.push(Op::PopFrame, []);
        self.push(Op::Fetch, [Operand::Register(Register::V0)]);
    }

    /// Invoke the component on top of the stack with no arguments of its own.
    pub fn invoke_bare_component(&mut self) {
        self.push(Op::Fetch, [Operand::Register(Register::S0)]);
        self.push(Op::Dup, [Operand::Register(Register::Sp), Operand::Int(1)]);
        self.push(Op::Load, [Operand::Register(Register::S0)]);
        self.push(Op::PushFrame, []);
        self.push(Op::PushEmptyArgs, []);
        self.push(Op::PrepareArgs, [Operand::Register(Register::S0)]);
        self.invoke_prepared_component(false, false, true, Populate::Dynamic);
        self.push(Op::Load, [Operand::Register(Register::S0)]);
    }
}
