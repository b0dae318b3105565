//! Opcode numbering and instruction decoding.
//!
//! Each instruction is a header word followed by up to three operands:
//!
//! ```text
//! header: | machine (bit 10) | operand count (bits 8-9) | type (bits 0-7) |
//! ```

use crate::heap::Heap;
use core::fmt;

/// Mask of the opcode type in the header word.
pub const TYPE_MASK: i32 = 0b0000_1111_1111;
/// Mask of the operand count in the header word.
pub const OPERAND_LEN_MASK: i32 = 0b0011_0000_0000;
/// Shift of the operand count.
pub const ARG_SHIFT: i32 = 8;
/// Bit set on machine opcodes.
pub const MACHINE_MASK: i32 = 0b0100_0000_0000;
/// Largest opcode number reserved for machine opcodes.
pub const MAX_MACHINE_OP: u8 = 15;

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $value:literal, )*) => {
        /// Every opcode the VM understands.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Op {
            $( $(#[$doc])* $name = $value, )*
        }

        impl Op {
            /// Decode an opcode number.
            pub const fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $( $value => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// The opcode's name, for logs.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name), )*
                }
            }
        }
    };
}

opcodes! {
    /// Save `$ra` and `$fp`.
    PushFrame = 0,
    /// Restore `$sp`, `$ra` and `$fp`.
    PopFrame = 1,
    /// Call the handle on top of the stack.
    InvokeVirtual = 2,
    /// Call a statically known handle.
    InvokeStatic = 3,
    /// Jump by a relative offset.
    Jump = 4,
    /// Jump to `$ra`.
    Return = 5,
    /// Set `$ra` to a relative target.
    ReturnTo = 6,

    Helper = 16,
    SetNamedVariables = 17,
    SetBlocks = 18,
    SetVariable = 19,
    SetJitBlock = 21,
    GetVariable = 22,
    GetProperty = 23,
    GetBlock = 24,
    SpreadBlock = 25,
    HasBlock = 26,
    HasBlockParams = 27,
    Concat = 28,
    Constant = 29,
    Primitive = 30,
    PrimitiveReference = 31,
    ReifyU32 = 32,
    Dup = 33,
    Pop = 34,
    Load = 35,
    Fetch = 36,
    RootScope = 37,
    VirtualRootScope = 38,
    ChildScope = 39,
    PopScope = 40,
    Text = 41,
    Comment = 42,
    AppendHTML = 43,
    AppendSafeHTML = 44,
    AppendText = 47,
    OpenElement = 48,
    PushRemoteElement = 50,
    StaticAttr = 51,
    DynamicAttr = 52,
    ComponentAttr = 53,
    FlushElement = 54,
    CloseElement = 55,
    PopRemoteElement = 56,
    Modifier = 57,
    BindDynamicScope = 58,
    PushDynamicScope = 59,
    PopDynamicScope = 60,
    CompileBlock = 61,
    PushBlockScope = 62,
    PushSymbolTable = 63,
    InvokeYield = 64,
    JumpUnless = 66,
    JumpEq = 67,
    AssertSame = 68,
    Enter = 69,
    Exit = 70,
    ToBoolean = 71,
    EnterList = 72,
    ExitList = 73,
    PutIterator = 74,
    Iterate = 75,
    Main = 76,
    ContentType = 78,
    CurryComponent = 79,
    PushComponentDefinition = 80,
    PushDynamicComponentInstance = 81,
    PushCurriedComponent = 82,
    ResolveDynamicComponent = 83,
    PushArgs = 84,
    PushEmptyArgs = 85,
    PrepareArgs = 87,
    CaptureArgs = 88,
    CreateComponent = 89,
    RegisterComponentDestructor = 90,
    PutComponentOperations = 91,
    GetComponentSelf = 92,
    GetJitComponentLayout = 95,
    SetupForEval = 97,
    PopulateLayout = 98,
    InvokeComponentLayout = 99,
    BeginComponentTransaction = 100,
    CommitComponentTransaction = 101,
    DidRenderLayout = 103,
    InvokePartial = 104,
    ResolveMaybeLocal = 105,
    Debugger = 106,
    GetDynamicVar = 107,
    StaticComponentAttr = 108,
}

impl Op {
    /// Whether this opcode is handled by the low-level VM itself.
    #[inline]
    pub const fn is_machine(self) -> bool {
        (self as u8) <= MAX_MACHINE_OP
    }
}

impl fmt::Display for Op {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// VM registers, as encoded in `Fetch`, `Load` and `Dup` operands.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Register {
    /// Program counter.
    Pc = 0,
    /// Return address.
    Ra = 1,
    /// Frame pointer.
    Fp = 2,
    /// Stack pointer.
    Sp = 3,
    /// First callee-saved register.
    S0 = 4,
    /// Second callee-saved register.
    S1 = 5,
    /// First temporary.
    T0 = 6,
    /// Second temporary.
    T1 = 7,
    /// Return value.
    V0 = 8,
}

impl Register {
    /// Decode a register operand.
    pub const fn from_operand(operand: i32) -> Option<Self> {
        Some(match operand {
            0 => Self::Pc,
            1 => Self::Ra,
            2 => Self::Fp,
            3 => Self::Sp,
            4 => Self::S0,
            5 => Self::S1,
            6 => Self::T0,
            7 => Self::T1,
            8 => Self::V0,
            _ => return None,
        })
    }
}

/// Encode a header word.
#[inline]
pub const fn encode_header(op: Op, operands: usize) -> i32 {
    let machine = if op.is_machine() { MACHINE_MASK } else { 0 };
    (op as i32) | machine | ((operands as i32) << ARG_SHIFT)
}

/// A decoded instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RuntimeOp {
    /// Address of the header word.
    pub offset: usize,
    /// Raw opcode type.
    pub kind: u8,
    /// Whether the machine bit is set.
    pub is_machine: bool,
    /// Header plus operands, in words.
    pub size: usize,
    /// First operand.
    pub op1: i32,
    /// Second operand.
    pub op2: i32,
    /// Third operand.
    pub op3: i32,
}

impl RuntimeOp {
    /// Decode the instruction at `offset`.
    pub fn decode(heap: &Heap, offset: usize) -> Self {
        let raw = heap.get_by_addr(offset);
        let operand = |index: usize| heap.get_by_addr(offset + index);
        Self {
            offset,
            kind: (raw & TYPE_MASK) as u8,
            is_machine: raw & MACHINE_MASK != 0,
            size: (((raw & OPERAND_LEN_MASK) >> ARG_SHIFT) + 1) as usize,
            op1: operand(1),
            op2: operand(2),
            op3: operand(3),
        }
    }

    /// The opcode, if the type is known.
    #[inline]
    pub const fn op(&self) -> Option<Op> {
        Op::from_u8(self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test the header word layout.
    ///
    /// # Panics
    /// Panics if the fields overlap.
    #[test]
    fn header_layout() {
        let header = encode_header(Op::Jump, 1);
        assert_eq!(header & TYPE_MASK, 4);
        assert_eq!(header & MACHINE_MASK, MACHINE_MASK);
        assert_eq!((header & OPERAND_LEN_MASK) >> ARG_SHIFT, 1);

        let syscall = encode_header(Op::AppendText, 0);
        assert_eq!(syscall & MACHINE_MASK, 0);
        assert_eq!(Op::from_u8(47), Some(Op::AppendText));
        assert_eq!(Op::from_u8(7), None);
    }
}
