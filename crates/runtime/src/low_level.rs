//! The register machine under the append VM.
//!
//! ```text
//!  $pc ──► header │ op1 │ op2 │ op3 ──► machine op? ──► handled here
//!                                          │
//!                                          └──► syscall, handed to the Vm
//! ```
//!
//! A frame is two stack slots, the saved `$ra` and `$fp`; `$fp` points at the
//! first of them. `$pc` below zero ends execution, which is how a resumed
//! block stops once it returns past its entry point.

use anyhow::{Result, anyhow, bail};
use log::trace;
use trellis_program::{Op, Register, RuntimeOp, SharedProgram};

use crate::vm::stack::{EvaluationStack, StackValue};

/// Registers that hold stack values rather than addresses.
#[derive(Default)]
struct ValueRegisters {
    s0: StackValue,
    s1: StackValue,
    t0: StackValue,
    t1: StackValue,
    v0: StackValue,
}

/// Program counter, frames and the evaluation stack.
pub struct LowLevelVm {
    /// The evaluation stack.
    pub stack: EvaluationStack,
    pc: i32,
    ra: i32,
    fp: i32,
    current_op_size: i32,
    registers: ValueRegisters,
    program: SharedProgram,
}

impl LowLevelVm {
    /// A machine about to run the code at `pc` over `stack`.
    pub fn new(program: SharedProgram, stack: EvaluationStack, pc: i32) -> Self {
        Self {
            stack,
            pc,
            ra: -1,
            fp: -1,
            current_op_size: 0,
            registers: ValueRegisters::default(),
            program,
        }
    }

    /// The program being run.
    #[inline]
    pub const fn program(&self) -> &SharedProgram {
        &self.program
    }

    /// The program counter.
    #[inline]
    pub const fn pc(&self) -> i32 {
        self.pc
    }

    /// Decode the instruction at `$pc` and advance past it. `None` once
    /// `$pc` is negative.
    pub fn next_statement(&mut self) -> Option<RuntimeOp> {
        let pc = usize::try_from(self.pc).ok()?;
        let op = RuntimeOp::decode(&self.program.borrow().heap, pc);
        self.current_op_size = op.size as i32;
        self.pc += op.size as i32;
        Some(op)
    }

    /// The absolute address of a jump `offset` relative to the current
    /// instruction.
    #[inline]
    pub const fn target(&self, offset: i32) -> i32 {
        self.pc + offset - self.current_op_size
    }

    /// Jump relative to the current instruction.
    #[inline]
    pub const fn goto(&mut self, offset: i32) {
        self.pc = self.target(offset);
    }

    /// Set `$ra` relative to the current instruction.
    #[inline]
    pub const fn return_to(&mut self, offset: i32) {
        self.ra = self.target(offset);
    }

    /// Jump to `$ra`.
    #[inline]
    pub const fn return_(&mut self) {
        self.pc = self.ra;
    }

    /// Save `$pc` in `$ra` and jump to the code behind `handle`.
    ///
    /// # Errors
    /// Returns an error for a handle the heap does not know.
    pub fn call(&mut self, handle: i32) -> Result<()> {
        let address = self.program.borrow().heap.get_addr(handle)?;
        self.ra = self.pc;
        self.pc = address as i32;
        Ok(())
    }

    /// Save `$ra` and `$fp`, starting a frame.
    pub fn push_frame(&mut self) {
        self.stack.push(StackValue::Int(self.ra));
        self.stack.push(StackValue::Int(self.fp));
        self.fp = self.stack.len() as i32 - 2;
    }

    /// Drop the current frame and restore `$ra` and `$fp`.
    ///
    /// # Errors
    /// Returns an error when no frame is open.
    pub fn pop_frame(&mut self) -> Result<()> {
        let fp = usize::try_from(self.fp).map_err(|_| anyhow!("popping a frame with none open"))?;
        let ra = self.stack.get(self.fp)?.as_int()?;
        let saved_fp = self.stack.get(self.fp + 1)?.as_int()?;
        self.stack.truncate(fp)?;
        self.ra = ra;
        self.fp = saved_fp;
        Ok(())
    }

    /// Push a copy of the slot `offset` below `$sp`, or `offset` below `$fp`.
    ///
    /// # Errors
    /// Returns an error for other registers or a slot out of range.
    pub fn dup(&mut self, register: Register, offset: i32) -> Result<()> {
        let value = match register {
            Register::Sp => self.stack.from_top(usize::try_from(offset)?)?.clone(),
            Register::Fp => self.stack.get(self.fp - offset)?.clone(),
            other => bail!("cannot dup relative to {other:?}"),
        };
        self.stack.push(value);
        Ok(())
    }

    /// Read a register.
    pub fn fetch(&self, register: Register) -> StackValue {
        match register {
            Register::Pc => StackValue::Int(self.pc),
            Register::Ra => StackValue::Int(self.ra),
            Register::Fp => StackValue::Int(self.fp),
            Register::Sp => StackValue::Int(self.stack.len() as i32 - 1),
            Register::S0 => self.registers.s0.clone(),
            Register::S1 => self.registers.s1.clone(),
            Register::T0 => self.registers.t0.clone(),
            Register::T1 => self.registers.t1.clone(),
            Register::V0 => self.registers.v0.clone(),
        }
    }

    /// Borrow a value register.
    ///
    /// # Errors
    /// Returns an error for the address registers.
    pub fn register(&self, register: Register) -> Result<&StackValue> {
        Ok(match register {
            Register::S0 => &self.registers.s0,
            Register::S1 => &self.registers.s1,
            Register::T0 => &self.registers.t0,
            Register::T1 => &self.registers.t1,
            Register::V0 => &self.registers.v0,
            other => bail!("{other:?} does not hold a value"),
        })
    }

    /// Write a register.
    ///
    /// # Errors
    /// Returns an error when an address register gets a non-integer.
    pub fn load(&mut self, register: Register, value: StackValue) -> Result<()> {
        match register {
            Register::Pc => self.pc = value.as_int()?,
            Register::Ra => self.ra = value.as_int()?,
            Register::Fp => self.fp = value.as_int()?,
            Register::Sp => self.stack.truncate(usize::try_from(value.as_int()? + 1)?)?,
            Register::S0 => self.registers.s0 = value,
            Register::S1 => self.registers.s1 = value,
            Register::T0 => self.registers.t0 = value,
            Register::T1 => self.registers.t1 = value,
            Register::V0 => self.registers.v0 = value,
        }
        Ok(())
    }

    /// Run a machine opcode.
    ///
    /// # Errors
    /// Returns an error for frame or stack corruption, or a syscall.
    pub fn evaluate_outer(&mut self, op: Op, instruction: &RuntimeOp) -> Result<()> {
        trace!(target: "trellis::vm", "{:>6} {op}", instruction.offset);
        match op {
            Op::PushFrame => self.push_frame(),
            Op::PopFrame => self.pop_frame()?,
            Op::InvokeStatic => self.call(instruction.op1)?,
            Op::InvokeVirtual => {
                let handle = self
                    .stack
                    .pop()?
                    .into_handle()?
                    .ok_or_else(|| anyhow!("InvokeVirtual without a compiled block"))?;
                self.call(handle)?;
            }
            Op::Jump => self.goto(instruction.op1),
            Op::Return => self.return_(),
            Op::ReturnTo => self.return_to(instruction.op1),
            other => bail!("{other} is not a machine opcode"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_program::{Program, encode_header};

    fn machine(words: &[i32]) -> LowLevelVm {
        let mut program = Program::default();
        for word in words {
            program.heap.push(*word);
        }
        LowLevelVm::new(program.shared(), EvaluationStack::default(), 0)
    }

    /// Test that frames save and restore `$ra` and `$fp`.
    ///
    /// # Panics
    /// Panics if a frame leaks stack slots.
    #[test]
    fn frames_restore_registers() -> Result<()> {
        let mut vm = machine(&[]);
        vm.stack.push(StackValue::Int(7));
        vm.push_frame();
        assert_eq!(vm.fetch(Register::Fp).as_int()?, 1);
        vm.stack.push(StackValue::Int(8));
        vm.dup(Register::Fp, -2)?;
        assert_eq!(vm.stack.peek()?.as_int()?, 8);
        vm.push_frame();
        vm.pop_frame()?;
        vm.pop_frame()?;
        assert_eq!(vm.stack.len(), 1);
        assert_eq!(vm.fetch(Register::Fp).as_int()?, -1);
        assert!(vm.pop_frame().is_err());
        Ok(())
    }

    /// Test relative jumps and returns.
    ///
    /// # Panics
    /// Panics if a jump lands on the wrong word.
    #[test]
    fn jumps_are_relative_to_the_instruction() -> Result<()> {
        let mut vm = machine(&[
            encode_header(Op::ReturnTo, 1),
            -2,
            encode_header(Op::Jump, 1),
            3,
            encode_header(Op::Return, 0),
            encode_header(Op::Return, 0),
        ]);
        let mut visited = Vec::new();
        while let Some(instruction) = vm.next_statement() {
            visited.push(instruction.offset);
            let op = instruction.op().ok_or_else(|| anyhow!("unknown op"))?;
            vm.evaluate_outer(op, &instruction)?;
        }
        assert_eq!(visited, [0, 2, 5]);
        Ok(())
    }
}
