use crate::cpu::{Decoder, Instruction, InstructionInfo, Op, Parameter};
use crate::machine::LOAD_OFFSET;
use crate::memory::MMU;

/// binaries disassemble against the execution load base unless the
/// caller overrides it
pub const DEFAULT_BASE: u16 = LOAD_OFFSET;

/// soft upper bound on decoded instructions, to stop runaway sweeps
pub const MAX_INSTRUCTIONS: usize = 0x1_0000;

/// linear sweep over a flat byte buffer. every input position decodes
/// to either a valid instruction or a one-byte DB fallback, so the
/// concatenated raw bytes always equal the input
pub fn disassemble(data: &[u8], base: u16) -> Vec<InstructionInfo> {
    let mut mmu = MMU::default();
    if mmu.write(0, base, data).is_err() {
        return Vec::new();
    }

    let mut decoder = Decoder::default();
    let mut res = Vec::new();
    let end = u32::from(base) + data.len() as u32;
    let mut offset = u32::from(base);

    while offset < end && res.len() < MAX_INSTRUCTIONS {
        let info = decoder.get_instruction_info(&mmu, 0, offset as u16);
        let len = info.bytes.len() as u32;
        if info.instruction.command.is_valid() && offset + len <= end {
            offset += len;
            res.push(info);
        } else {
            // truncated or reserved encoding: emit the byte as data
            // and resume at the next position
            let b = mmu.read_u8(0, offset as u16);
            let mut instruction = Instruction::new1(Op::Db, Parameter::Imm8(b));
            instruction.length = 1;
            res.push(InstructionInfo { address: offset, bytes: vec![b], instruction });
            offset += 1;
        }
    }
    res
}

/// the textual listing, one line per instruction
pub fn listing(data: &[u8], base: u16) -> String {
    let lines: Vec<String> = disassemble(data, base).iter().map(|i| format!("{}", i)).collect();
    lines.join("\n")
}
