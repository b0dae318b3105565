//! Instruction sequences shared by statements, macros and the stdlib.

use core::any::Any;
use std::rc::Rc;
use trellis_program::{Op, Register};
use trellis_wire_format::{Expression, Hash};

use super::TemplateCompiler;
use crate::encoder::{Operand, Primitive};
use crate::template::{CompilableTemplate, NamedBlocks, SymbolTable};

/// One arm of [`TemplateCompiler::switch_cases`].
pub type Clause<'clause, 'ctx> = Box<dyn FnOnce(&mut TemplateCompiler<'ctx>) + 'clause>;

/// `flags` bit marking named arguments as `@`-prefixed.
const AT_NAMES: i32 = 0b1000;
/// `flags` bits marking that blocks were pushed.
const HAS_BLOCKS: i32 = 0b0111;
/// `flags` shift of the positional count.
const POSITIONAL_SHIFT: i32 = 4;

impl<'ctx> TemplateCompiler<'ctx> {
    /// Emit a block that can be re-run from `Enter` when an assertion in
    /// `body` fails during an update.
    ///
    /// `args` pushes the values re-run needs and returns how many it pushed.
    /// `body` may jump to `FINALLY` to finish early.
    ///
    /// ```text
    ///     PushFrame
    ///     ReturnTo ENDINITIAL
    ///     <args>
    ///     Enter count
    ///     <body>
    /// FINALLY:
    ///     Exit
    ///     Return
    /// ENDINITIAL:
    ///     PopFrame
    /// ```
    pub fn replayable<A, B>(&mut self, args: A, body: B)
    where
        A: FnOnce(&mut Self) -> usize,
        B: FnOnce(&mut Self),
    {
        self.start_labels();
        self.push(Op::PushFrame, []);
        self.push(Op::ReturnTo, [Operand::label("ENDINITIAL")]);
        let count = args(self);
        self.push(Op::Enter, [Operand::Int(count as i32)]);
        body(self);
        self.label("FINALLY");
        self.push(Op::Exit, []);
        self.push(Op::Return, []);
        self.label("ENDINITIAL");
        self.push(Op::PopFrame, []);
        self.stop_labels();
    }

    /// A [`replayable`](Self::replayable) that branches on the reference on
    /// top of the stack.
    pub fn replayable_if<A, T, F>(&mut self, args: A, if_true: T, if_false: F)
    where
        A: FnOnce(&mut Self) -> usize,
        T: FnOnce(&mut Self),
        F: FnOnce(&mut Self),
    {
        self.replayable(args, |compiler| {
            compiler.push(Op::JumpUnless, [Operand::label("ELSE")]);
            if_true(compiler);
            compiler.push(Op::Jump, [Operand::label("FINALLY")]);
            compiler.label("ELSE");
            if_false(compiler);
        });
    }

    /// Switch on the `u32` the reference on top of the stack holds.
    ///
    /// The value is asserted, so a different case on update re-runs the
    /// switch. The first clause is the fallthrough.
    pub fn switch_cases(&mut self, clauses: Vec<(i32, Clause<'_, 'ctx>)>) {
        self.push(Op::Enter, [Operand::Int(2)]);
        self.push(Op::AssertSame, []);
        self.push(Op::ReifyU32, []);
        self.start_labels();

        let count = clauses.len();
        for (index, (matches, _)) in clauses.iter().enumerate().take(count.saturating_sub(1)) {
            self.push(
                Op::JumpEq,
                [Operand::label(format!("CLAUSE{index}")), Operand::Int(*matches)],
            );
        }
        for (index, (_, clause)) in clauses.into_iter().enumerate().rev() {
            self.label(format!("CLAUSE{index}"));
            self.push(Op::Pop, [Operand::Int(2)]);
            clause(self);
            if index != 0 {
                self.push(Op::Jump, [Operand::label("END")]);
            }
        }

        self.label("END");
        self.stop_labels();
        self.push(Op::Exit, []);
    }

    /// Push each positional argument; returns how many.
    pub fn compile_positional(&mut self, params: Option<&[Expression]>) -> usize {
        let params = params.unwrap_or_default();
        for param in params {
            self.expr(param);
        }
        params.len()
    }

    /// Push an argument list without blocks.
    pub fn simple_args(&mut self, params: Option<&[Expression]>, hash: Option<&Hash>, at_names: bool) {
        let count = self.compile_positional(params) as i32;
        let mut flags = count << POSITIONAL_SHIFT;
        if at_names {
            flags |= AT_NAMES;
        }
        let names = self.compile_hash(hash);
        self.push(
            Op::PushArgs,
            [
                Operand::StringArray(names),
                Operand::StringArray(Vec::new()),
                Operand::Int(flags),
            ],
        );
    }

    /// Push an argument list including `blocks`.
    pub fn compile_args(
        &mut self,
        params: Option<&[Expression]>,
        hash: Option<&Hash>,
        blocks: &NamedBlocks,
        at_names: bool,
    ) {
        let mut block_names = Vec::new();
        for (name, block) in blocks.entries() {
            self.push_yieldable_block(block);
            block_names.push(name.to_owned());
        }
        let count = self.compile_positional(params) as i32;
        let mut flags = (count << POSITIONAL_SHIFT) | HAS_BLOCKS;
        if at_names {
            flags |= AT_NAMES;
        }
        let names = self.compile_hash(hash);
        self.push(
            Op::PushArgs,
            [
                Operand::StringArray(names),
                Operand::StringArray(block_names),
                Operand::Int(flags),
            ],
        );
    }

    fn compile_hash(&mut self, hash: Option<&Hash>) -> Vec<String> {
        let Some(hash) = hash else {
            return Vec::new();
        };
        for value in &hash.values {
            self.expr(value);
        }
        hash.keys.clone()
    }

    /// Push a block as `(symbol table, scope, block)`, or three nulls.
    pub fn push_yieldable_block(&mut self, block: Option<&Rc<CompilableTemplate>>) {
        self.push_symbol_table(block.map(|block| block.symbol_table()));
        self.push(Op::PushBlockScope, []);
        self.push_compilable(block);
    }

    /// Push a symbol table, or null.
    pub fn push_symbol_table(&mut self, table: Option<&SymbolTable>) {
        match table {
            Some(table) => self.push(Op::PushSymbolTable, [Operand::SymbolTable(table.clone())]),
            None => self.push(Op::Primitive, [Operand::Primitive(Primitive::Null)]),
        }
    }

    /// Push an uncompiled block for `CompileBlock`, or null.
    pub fn push_compilable(&mut self, block: Option<&Rc<CompilableTemplate>>) {
        match block {
            Some(block) => {
                let value: Rc<dyn Any> = Rc::clone(block) as _;
                self.push(Op::Constant, [Operand::Other(value)]);
            }
            None => self.push(Op::Primitive, [Operand::Primitive(Primitive::Null)]),
        }
    }

    /// Call a statically known block in a new frame.
    pub fn invoke_static_block(&mut self, block: &Rc<CompilableTemplate>) {
        self.push(Op::PushFrame, []);
        self.push_compilable(Some(block));
        self.push(Op::CompileBlock, []);
        self.push(Op::InvokeVirtual, []);
        self.push(Op::PopFrame, []);
    }

    /// Call a block, binding up to `caller_count` values below the frame as
    /// its parameters.
    pub fn invoke_static_block_with_stack(&mut self, block: &Rc<CompilableTemplate>, caller_count: usize) {
        let parameters = block.symbol_table().parameters().to_vec();
        let count = caller_count.min(parameters.len());
        if count == 0 {
            self.invoke_static_block(block);
            return;
        }

        self.push(Op::PushFrame, []);
        self.push(Op::ChildScope, []);
        for (index, parameter) in parameters.iter().take(count).enumerate() {
            self.push(
                Op::Dup,
                [Operand::Register(Register::Fp), Operand::Int((caller_count - index) as i32)],
            );
            self.push(Op::SetVariable, [Operand::Int(*parameter as i32)]);
        }
        self.push_compilable(Some(block));
        self.push(Op::CompileBlock, []);
        self.push(Op::InvokeVirtual, []);
        self.push(Op::PopScope, []);
        self.push(Op::PopFrame, []);
    }

    /// Yield to the block in symbol `to`.
    pub fn yield_block(&mut self, to: u32, params: &[Expression]) {
        self.simple_args(Some(params), None, true);
        self.push(Op::GetBlock, [Operand::Int(to as i32)]);
        self.push(Op::SpreadBlock, []);
        self.push(Op::CompileBlock, []);
        self.push(Op::InvokeYield, []);
        self.push(Op::PopScope, []);
        self.push(Op::PopFrame, []);
    }

    /// Run `body` with the values on the stack bound as dynamic variables.
    pub fn dynamic_scope<B>(&mut self, names: &[String], body: B)
    where
        B: FnOnce(&mut Self),
    {
        self.push(Op::PushDynamicScope, []);
        self.push(Op::BindDynamicScope, [Operand::StringArray(names.to_vec())]);
        body(self);
        self.push(Op::PopDynamicScope, []);
    }
}
