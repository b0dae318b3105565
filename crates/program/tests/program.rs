//! Program-level tests: instruction streams survive compaction and capture.

use anyhow::Result;
use trellis_program::encoding::{Immediate, encode_immediate};
use trellis_program::{
    Op, Program, RuntimeOp, SerializedProgram, StdlibHandles, StdlibOperand, TableSlotState,
    encode_header,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn emit(program: &mut Program, ops: &[(Op, &[i32])]) -> i32 {
    let handle = program.heap.malloc();
    for (op, operands) in ops {
        program.heap.push(encode_header(*op, operands.len()));
        for operand in *operands {
            program.heap.push(*operand);
        }
    }
    program.heap.finish_malloc(handle, 0);
    handle
}

#[test]
fn decodes_after_compaction() -> Result<()> {
    init();
    let mut program = Program::with_page_size(8);
    let text = program.constants.string("hello");
    let scratch = emit(&mut program, &[(Op::Pop, &[1]), (Op::Pop, &[1])]);
    let block = emit(
        &mut program,
        &[(Op::Text, &[text]), (Op::Primitive, &[encode_immediate(Immediate::Int(-3))?])],
    );

    program.heap.free(scratch);
    program.heap.compact();
    assert_eq!(program.heap.state_of(scratch), TableSlotState::Purged);

    let start = program.heap.get_addr(block)?;
    let first = RuntimeOp::decode(&program.heap, start);
    assert_eq!(first.op(), Some(Op::Text));
    assert_eq!(program.constants.get_string(first.op1)?, "hello");

    let second = RuntimeOp::decode(&program.heap, start + first.size);
    assert_eq!(second.op(), Some(Op::Primitive));
    assert!(!second.is_machine);
    Ok(())
}

#[test]
fn captured_program_serializes() -> Result<()> {
    init();
    let mut program = Program::default();
    let handle = program.heap.malloc();
    program.heap.push(encode_header(Op::InvokeStatic, 1));
    program.heap.push_stdlib(StdlibOperand::Main);
    program.heap.finish_malloc(handle, 0);

    let stdlib = StdlibHandles {
        main: 30,
        trusting_append: 33,
        cautious_append: 36,
    };
    let captured = program.capture(&stdlib);
    let json = serde_json::to_string(&captured)?;
    let decoded: SerializedProgram = serde_json::from_str(&json)?;

    assert_eq!(decoded, captured);
    assert_eq!(decoded.heap.buffer[1], 30);
    Ok(())
}
