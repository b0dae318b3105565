//! Compiled program storage for the Trellis rendering VM.
//!
//! A [`Program`] is what the opcode compiler writes and the VM reads:
//! - [`Heap`]: instruction words behind stable handles
//! - [`Constants`]: strings, arrays, numbers and runtime values operands
//!   refer to by index
//! - [`encoding`]: how immediates and constant handles share an operand word
//! - [`Op`]: opcode numbering and [`RuntimeOp`] decoding
//!
//! ```text
//!            compiler                         VM
//!               │                             │
//!   encode ──► Heap.push ──► handle ──► RuntimeOp::decode($pc)
//!               │                             │
//!      Constants.string ──► index ──► Constants.get_string
//! ```

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

mod constants;
pub mod encoding;
mod heap;
mod opcode;

pub use constants::{ConstantPool, Constants};
pub use heap::{
    Heap, PAGE_SIZE, PLACEHOLDER_HANDLE, PLACEHOLDER_WORD, SerializedHeap, StdlibHandles,
    StdlibOperand, TableSlotState,
};
pub use opcode::{
    ARG_SHIFT, MACHINE_MASK, MAX_MACHINE_OP, OPERAND_LEN_MASK, Op, Register, RuntimeOp, TYPE_MASK,
    encode_header,
};

/// A heap plus the constants its operands refer to.
#[derive(Default)]
pub struct Program {
    /// Instruction words.
    pub heap: Heap,
    /// Operand constants.
    pub constants: Constants,
}

/// A program shared by a compilation context and every VM running it.
pub type SharedProgram = Rc<RefCell<Program>>;

/// A serializable snapshot of a whole program.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedProgram {
    /// The captured heap.
    pub heap: SerializedHeap,
    /// The serializable constants.
    pub pool: ConstantPool,
}

impl Program {
    /// An empty program whose heap grows by `page_size` words.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            heap: Heap::with_page_size(page_size),
            constants: Constants::new(),
        }
    }

    /// Wrap in a [`SharedProgram`].
    #[inline]
    pub fn shared(self) -> SharedProgram {
        Rc::new(RefCell::new(self))
    }

    /// Patch and snapshot the program.
    pub fn capture(&mut self, stdlib: &StdlibHandles) -> SerializedProgram {
        SerializedProgram {
            heap: self.heap.capture(stdlib),
            pool: self.constants.to_pool(),
        }
    }
}
