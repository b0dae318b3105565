//! Instruction encoding with label patching.
//!
//! Jumps are emitted before their targets are known. Each label scope
//! records where labels land and which operands refer to them; closing the
//! scope rewrites those operands as offsets from the referring instruction:
//!
//! ```text
//!  0: JumpUnless ELSE ──┐   operand = 9 - 0
//!  2: ...               │
//!  9: ELSE: ...      ◄──┘
//! ```

use anyhow::{Context as _, Result};
use core::any::Any;
use log::trace;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use std::borrow::Cow;
use std::rc::Rc;
use trellis_program::encoding::{
    Immediate, MAX_HANDLE_INDEX, NUMBER_MAX_HANDLE, STRING_MAX_HANDLE, encode_handle,
    encode_immediate, is_small_int,
};
use trellis_program::{Constants, Heap, Op, Register, StdlibOperand, encode_header};
use trellis_wire_format::{Literal, Span};

use crate::error::{CompileError, CompileErrors};
use crate::template::SymbolTable;

/// A statically known primitive pushed by the `Primitive` opcode.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    String(String),
}

impl From<&Literal> for Primitive {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Self::Null,
            Literal::Bool(value) => Self::Bool(*value),
            Literal::Number(number) => Self::Number(number.as_f64().unwrap_or(f64::NAN)),
            Literal::String(value) => Self::String(value.clone()),
        }
    }
}

/// An instruction operand before it is turned into a word.
pub enum Operand {
    /// A raw integer.
    Int(i32),
    /// `1` or `0`.
    Bool(bool),
    /// An interned string, or `0` for none.
    String(Option<String>),
    /// An interned array of strings.
    StringArray(Vec<String>),
    /// An interned index array.
    Array(Vec<i32>),
    /// A symbol table stored as JSON.
    SymbolTable(SymbolTable),
    /// Interned template metadata.
    TemplateMeta(Json),
    /// A runtime value such as a compilable block.
    Other(Rc<dyn Any>),
    /// The handle of a stdlib routine, patched later.
    Stdlib(StdlibOperand),
    /// A word computed when the outermost compilation finishes.
    Later(Box<dyn FnOnce() -> i32>),
    /// An encoded primitive.
    Primitive(Primitive),
    /// A register number.
    Register(Register),
    /// A jump target, patched to a relative offset.
    Label(Cow<'static, str>),
}

impl Operand {
    /// A required string operand.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(Some(value.into()))
    }

    /// A label operand.
    pub fn label(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Label(name.into())
    }
}

/// A buffered word.
enum Word {
    Value(i32),
    Stdlib(StdlibOperand),
    Later(Box<dyn FnOnce() -> i32>),
}

/// One label scope.
#[derive(Default)]
struct Labels {
    labels: FxHashMap<Cow<'static, str>, usize>,
    targets: Vec<(usize, Cow<'static, str>)>,
}

/// Encodes one block's instructions before they are committed to the heap.
#[derive(Default)]
pub struct Encoder {
    buffer: Vec<Word>,
    labels: Vec<Labels>,
    errors: Vec<CompileError>,
}

impl Encoder {
    /// An empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Words emitted so far.
    #[inline]
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Encode `op` with its operands.
    pub fn push<const N: usize>(&mut self, constants: &mut Constants, op: Op, operands: [Operand; N]) {
        let at = self.buffer.len();
        trace!(target: "trellis::encoder", "{at}: {op}");
        self.buffer.push(Word::Value(encode_header(op, N)));
        for (index, operand) in operands.into_iter().enumerate() {
            let word = match operand {
                Operand::Label(name) => {
                    self.target(at + index, name);
                    Word::Value(-1)
                }
                Operand::Stdlib(operand) => Word::Stdlib(operand),
                Operand::Later(resolve) => Word::Later(resolve),
                operand => match resolve(constants, operand) {
                    Ok(word) => Word::Value(word),
                    Err(error) => {
                        self.errors
                            .push(CompileError::new(format!("{error:#}"), Span::default()));
                        Word::Value(0)
                    }
                },
            };
            self.buffer.push(word);
        }
    }

    /// Record an error and emit a stand-in instruction.
    pub fn error(&mut self, error: CompileError) {
        self.buffer.push(Word::Value(encode_header(Op::Primitive, 1)));
        self.buffer.push(Word::Value(0));
        self.errors.push(error);
    }

    /// Errors recorded so far.
    #[inline]
    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Open a label scope.
    pub fn start_labels(&mut self) {
        self.labels.push(Labels::default());
    }

    /// Place `name` at the current position.
    pub fn label(&mut self, name: impl Into<Cow<'static, str>>) {
        let at = self.buffer.len();
        let name = name.into();
        match self.labels.last_mut() {
            Some(labels) => {
                labels.labels.insert(name, at);
            }
            None => self.errors.push(CompileError::new(
                format!("label {name} outside a label scope"),
                Span::default(),
            )),
        }
    }

    fn target(&mut self, at: usize, name: Cow<'static, str>) {
        match self.labels.last_mut() {
            Some(labels) => labels.targets.push((at, name)),
            None => self.errors.push(CompileError::new(
                format!("jump to {name} outside a label scope"),
                Span::default(),
            )),
        }
    }

    /// Close the current label scope and patch its jumps.
    pub fn stop_labels(&mut self) {
        let Some(labels) = self.labels.pop() else {
            self.errors
                .push(CompileError::new("unbalanced label scope", Span::default()));
            return;
        };
        for (at, name) in labels.targets {
            match labels.labels.get(&name) {
                Some(&target) => {
                    if let Some(slot) = self.buffer.get_mut(at + 1) {
                        *slot = Word::Value(target as i32 - at as i32);
                    }
                }
                None => self
                    .errors
                    .push(CompileError::new(format!("unknown label {name}"), Span::default())),
            }
        }
    }

    /// Append a `Return`, then copy the block into `heap`.
    ///
    /// # Errors
    /// Returns the recorded errors together with the handle.
    pub fn commit(mut self, heap: &mut Heap, scope_size: usize) -> Result<i32, CompileErrors> {
        self.buffer.push(Word::Value(encode_header(Op::Return, 0)));
        let handle = heap.malloc();
        for word in self.buffer {
            match word {
                Word::Value(value) => heap.push(value),
                Word::Stdlib(operand) => heap.push_stdlib(operand),
                Word::Later(resolve) => heap.push_placeholder(resolve),
            }
        }
        heap.finish_malloc(handle, scope_size as i32);
        if self.errors.is_empty() {
            Ok(handle)
        } else {
            Err(CompileErrors {
                errors: self.errors,
                handle,
            })
        }
    }
}

/// Turn an operand into its word, interning constants as needed.
fn resolve(constants: &mut Constants, operand: Operand) -> Result<i32> {
    Ok(match operand {
        Operand::Int(value) => value,
        Operand::Bool(value) => i32::from(value),
        Operand::String(None) => 0,
        Operand::String(Some(value)) => constants.string(&value),
        Operand::StringArray(values) => constants.string_array(&values),
        Operand::Array(values) => constants.array(&values),
        Operand::SymbolTable(table) => constants
            .serializable(&table)
            .context("storing symbol table")?,
        Operand::TemplateMeta(meta) => constants.template_meta(&meta),
        Operand::Other(value) => constants.other(value),
        Operand::Register(register) => register as i32,
        Operand::Primitive(primitive) => encode_primitive(constants, primitive)?,
        Operand::Stdlib(_) | Operand::Later(_) | Operand::Label(_) => -1,
    })
}

/// Encode a primitive as an immediate or a constant handle.
fn encode_primitive(constants: &mut Constants, primitive: Primitive) -> Result<i32> {
    match primitive {
        Primitive::Undefined => encode_immediate(Immediate::Undefined),
        Primitive::Null => encode_immediate(Immediate::Null),
        Primitive::Bool(value) => encode_immediate(Immediate::Bool(value)),
        Primitive::Number(number) if is_small_int(number) => {
            encode_immediate(Immediate::Int(number as i32))
        }
        Primitive::Number(number) => encode_handle(
            constants.number(number) as u32,
            MAX_HANDLE_INDEX,
            NUMBER_MAX_HANDLE,
        ),
        Primitive::String(value) => encode_handle(
            constants.string(&value) as u32,
            MAX_HANDLE_INDEX,
            STRING_MAX_HANDLE,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_program::RuntimeOp;

    /// Test that forward and backward jumps are patched relative to the
    /// referring instruction.
    ///
    /// # Panics
    /// Panics if an offset is wrong.
    #[test]
    fn patches_labels() -> anyhow::Result<()> {
        let mut constants = Constants::new();
        let mut heap = Heap::with_page_size(64);
        let mut encoder = Encoder::new();
        encoder.start_labels();
        encoder.label("TOP");
        encoder.push(&mut constants, Op::JumpUnless, [Operand::label("ELSE")]);
        encoder.push(&mut constants, Op::Text, [Operand::string("yes")]);
        encoder.push(&mut constants, Op::Jump, [Operand::label("TOP")]);
        encoder.label("ELSE");
        encoder.stop_labels();

        let handle = encoder.commit(&mut heap, 0).map_err(anyhow::Error::from)?;
        let start = heap.get_addr(handle)?;
        let jump_unless = RuntimeOp::decode(&heap, start);
        assert_eq!(jump_unless.op(), Some(Op::JumpUnless));
        assert_eq!(jump_unless.op1, 6);
        let jump = RuntimeOp::decode(&heap, start + 4);
        assert_eq!(jump.op(), Some(Op::Jump));
        assert_eq!(jump.op1, -4);
        assert_eq!(RuntimeOp::decode(&heap, start + 6).op(), Some(Op::Return));
        Ok(())
    }

    /// Test primitive encodings.
    ///
    /// # Panics
    /// Panics if a primitive is encoded in the wrong range.
    #[test]
    fn encodes_primitives() -> anyhow::Result<()> {
        let mut constants = Constants::new();
        assert_eq!(encode_primitive(&mut constants, Primitive::Number(7.0))?, 7);
        let half = encode_primitive(&mut constants, Primitive::Number(0.5))?;
        assert_eq!(half, NUMBER_MAX_HANDLE);
        let text = encode_primitive(&mut constants, Primitive::String("hi".to_owned()))?;
        assert_eq!(text, STRING_MAX_HANDLE - constants.string("hi"));
        Ok(())
    }

    /// Test that a missing label becomes an error rather than a bad jump.
    ///
    /// # Panics
    /// Panics if the error is not reported.
    #[test]
    fn reports_unknown_labels() -> anyhow::Result<()> {
        let mut constants = Constants::new();
        let mut heap = Heap::with_page_size(64);
        let mut encoder = Encoder::new();
        encoder.start_labels();
        encoder.push(&mut constants, Op::Jump, [Operand::label("NOWHERE")]);
        encoder.stop_labels();
        let Err(errors) = encoder.commit(&mut heap, 0) else {
            return Err(anyhow::anyhow!("commit should fail"));
        };
        assert_eq!(errors.errors.len(), 1);
        assert!(errors.errors[0].problem.contains("NOWHERE"));
        Ok(())
    }
}
