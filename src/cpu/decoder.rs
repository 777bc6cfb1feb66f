use crate::cpu::instruction::{Instruction, InstructionInfo, RepeatMode};
use crate::cpu::op::{Invalid, Op};
use crate::cpu::parameter::{ModRegRm, Parameter, ParameterSet};
use crate::cpu::register::{r16, r8, sr, AMode, R};
use crate::memory::{MemoryAddress, MMU};

#[cfg(test)]
#[path = "./decoder_test.rs"]
mod decoder_test;

/// decodes machine code into `Instruction`s. the decoder reads
/// through the MMU so the executor can fetch with it directly; the
/// flat-buffer sweep in `disasm` loads its input into a scratch MMU
#[derive(Clone, Default)]
pub struct Decoder {
    seg: u16,
    offset: u16,
}

impl Decoder {
    /// decodes the instruction at seg:offset
    pub fn get_instruction(&mut self, mmu: &MMU, seg: u16, offset: u16) -> Instruction {
        self.seg = seg;
        self.offset = offset;
        let mut op = Instruction::new(Op::Uninitialized);
        self.decode(mmu, &mut op);
        op.length = self.offset.wrapping_sub(offset) as u8;
        op
    }

    /// decodes the instruction at seg:offset, annotated with address
    /// and raw bytes
    pub fn get_instruction_info(&mut self, mmu: &MMU, seg: u16, offset: u16) -> InstructionInfo {
        let instr = self.get_instruction(mmu, seg, offset);
        InstructionInfo {
            address: MemoryAddress::new(seg, offset).value(),
            bytes: mmu.read(seg, offset, instr.length as usize),
            instruction: instr,
        }
    }

    fn decode(&mut self, mmu: &MMU, op: &mut Instruction) {
        let b = self.read_u8(mmu);
        match b {
            0xF2 => {
                op.repeat = RepeatMode::Repne;
                let next = self.read_u8(mmu);
                self.decode_opcode(mmu, op, next);
                if !op.command.is_string_op() {
                    op.command = Op::Invalid(vec![b, next], Invalid::Op);
                }
            }
            0xF3 => {
                op.repeat = RepeatMode::Rep;
                let next = self.read_u8(mmu);
                self.decode_opcode(mmu, op, next);
                if !op.command.is_string_op() {
                    op.command = Op::Invalid(vec![b, next], Invalid::Op);
                }
            }
            _ => self.decode_opcode(mmu, op, b),
        }
    }

    fn decode_opcode(&mut self, mmu: &MMU, op: &mut Instruction, b: u8) {
        match b {
            0x00 | 0x08 | 0x10 | 0x18 | 0x20 | 0x28 | 0x30 | 0x38 => {
                // <alu> r/m8, r8
                op.command = Op::group1_op(b >> 3, false);
                op.params = self.rm8_r8(mmu);
            }
            0x01 | 0x09 | 0x11 | 0x19 | 0x21 | 0x29 | 0x31 | 0x39 => {
                // <alu> r/m16, r16
                op.command = Op::group1_op(b >> 3, true);
                op.params = self.rm16_r16(mmu);
            }
            0x02 | 0x0A | 0x12 | 0x1A | 0x22 | 0x2A | 0x32 | 0x3A => {
                // <alu> r8, r/m8
                op.command = Op::group1_op(b >> 3, false);
                op.params = self.r8_rm8(mmu);
            }
            0x03 | 0x0B | 0x13 | 0x1B | 0x23 | 0x2B | 0x33 | 0x3B => {
                // <alu> r16, r/m16
                op.command = Op::group1_op(b >> 3, true);
                op.params = self.r16_rm16(mmu);
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                // <alu> AL, imm8
                op.command = Op::group1_op(b >> 3, false);
                op.params.dst = Parameter::Reg8(R::AL);
                op.params.src = Parameter::Imm8(self.read_u8(mmu));
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                // <alu> AX, imm16
                op.command = Op::group1_op(b >> 3, true);
                op.params.dst = Parameter::Reg16(R::AX);
                op.params.src = Parameter::Imm16(self.read_u16(mmu));
            }
            0x40..=0x47 => {
                // inc r16
                op.command = Op::Inc16;
                op.params.dst = Parameter::Reg16(r16(b & 7));
            }
            0x48..=0x4F => {
                // dec r16
                op.command = Op::Dec16;
                op.params.dst = Parameter::Reg16(r16(b & 7));
            }
            0x50..=0x57 => {
                // push r16
                op.command = Op::Push16;
                op.params.dst = Parameter::Reg16(r16(b & 7));
            }
            0x58..=0x5F => {
                // pop r16
                op.command = Op::Pop16;
                op.params.dst = Parameter::Reg16(r16(b & 7));
            }
            0x74 => {
                op.command = Op::Jz;
                op.params.dst = Parameter::Imm16(self.read_rel8(mmu));
            }
            0x75 => {
                op.command = Op::Jnz;
                op.params.dst = Parameter::Imm16(self.read_rel8(mmu));
            }
            0x7C => {
                op.command = Op::Jl;
                op.params.dst = Parameter::Imm16(self.read_rel8(mmu));
            }
            0x7D => {
                op.command = Op::Jge;
                op.params.dst = Parameter::Imm16(self.read_rel8(mmu));
            }
            0x7E => {
                op.command = Op::Jle;
                op.params.dst = Parameter::Imm16(self.read_rel8(mmu));
            }
            0x7F => {
                op.command = Op::Jg;
                op.params.dst = Parameter::Imm16(self.read_rel8(mmu));
            }
            0x80 => {
                // group1 r/m8, imm8
                let x = self.read_mod_reg_rm(mmu);
                op.command = Op::group1_op(x.reg, false);
                op.params.dst = self.rm8(mmu, x.md, x.rm);
                op.params.src = Parameter::Imm8(self.read_u8(mmu));
            }
            0x81 => {
                // group1 r/m16, imm16
                let x = self.read_mod_reg_rm(mmu);
                op.command = Op::group1_op(x.reg, true);
                op.params.dst = self.rm16(mmu, x.md, x.rm);
                op.params.src = Parameter::Imm16(self.read_u16(mmu));
            }
            0x83 => {
                // group1 r/m16, imm8 sign-extended
                let x = self.read_mod_reg_rm(mmu);
                op.command = Op::group1_op(x.reg, true);
                op.params.dst = self.rm16(mmu, x.md, x.rm);
                op.params.src = Parameter::ImmS8(self.read_s8(mmu));
            }
            0x84 => {
                // test r/m8, r8
                op.command = Op::Test8;
                op.params = self.rm8_r8(mmu);
            }
            0x85 => {
                // test r/m16, r16
                op.command = Op::Test16;
                op.params = self.rm16_r16(mmu);
            }
            0x88 => {
                // mov r/m8, r8
                op.command = Op::Mov8;
                op.params = self.rm8_r8(mmu);
            }
            0x89 => {
                // mov r/m16, r16
                op.command = Op::Mov16;
                op.params = self.rm16_r16(mmu);
            }
            0x8A => {
                // mov r8, r/m8
                op.command = Op::Mov8;
                op.params = self.r8_rm8(mmu);
            }
            0x8B => {
                // mov r16, r/m16
                op.command = Op::Mov16;
                op.params = self.r16_rm16(mmu);
            }
            0x8C => {
                // mov r/m16, sreg
                let x = self.read_mod_reg_rm(mmu);
                op.command = Op::Mov16;
                op.params.dst = self.rm16(mmu, x.md, x.rm);
                op.params.src = Parameter::SReg16(sr(x.reg));
            }
            0x8E => {
                // mov sreg, r/m16
                let x = self.read_mod_reg_rm(mmu);
                op.command = Op::Mov16;
                op.params.dst = Parameter::SReg16(sr(x.reg));
                op.params.src = self.rm16(mmu, x.md, x.rm);
            }
            0xA4 => op.command = Op::Movsb,
            0xA5 => op.command = Op::Movsw,
            0xA6 => op.command = Op::Cmpsb,
            0xA7 => op.command = Op::Cmpsw,
            0xA8 => {
                // test AL, imm8
                op.command = Op::Test8;
                op.params.dst = Parameter::Reg8(R::AL);
                op.params.src = Parameter::Imm8(self.read_u8(mmu));
            }
            0xA9 => {
                // test AX, imm16
                op.command = Op::Test16;
                op.params.dst = Parameter::Reg16(R::AX);
                op.params.src = Parameter::Imm16(self.read_u16(mmu));
            }
            0xAA => op.command = Op::Stosb,
            0xAB => op.command = Op::Stosw,
            0xAC => op.command = Op::Lodsb,
            0xAD => op.command = Op::Lodsw,
            0xAE => op.command = Op::Scasb,
            0xAF => op.command = Op::Scasw,
            0xB0..=0xB7 => {
                // mov r8, imm8
                op.command = Op::Mov8;
                op.params.dst = Parameter::Reg8(r8(b & 7));
                op.params.src = Parameter::Imm8(self.read_u8(mmu));
            }
            0xB8..=0xBF => {
                // mov r16, imm16
                op.command = Op::Mov16;
                op.params.dst = Parameter::Reg16(r16(b & 7));
                op.params.src = Parameter::Imm16(self.read_u16(mmu));
            }
            0xC3 => op.command = Op::Retn,
            0xC6 => {
                // mov r/m8, imm8 (reg field must be 0)
                let x = self.read_mod_reg_rm(mmu);
                if x.reg != 0 {
                    op.command = Op::Invalid(vec![b, x.u8()], Invalid::Reg(x.reg));
                    return;
                }
                op.command = Op::Mov8;
                op.params.dst = self.rm8(mmu, x.md, x.rm);
                op.params.src = Parameter::Imm8(self.read_u8(mmu));
            }
            0xC7 => {
                // mov r/m16, imm16 (reg field must be 0)
                let x = self.read_mod_reg_rm(mmu);
                if x.reg != 0 {
                    op.command = Op::Invalid(vec![b, x.u8()], Invalid::Reg(x.reg));
                    return;
                }
                op.command = Op::Mov16;
                op.params.dst = self.rm16(mmu, x.md, x.rm);
                op.params.src = Parameter::Imm16(self.read_u16(mmu));
            }
            0xCD => {
                op.command = Op::Int;
                op.params.dst = Parameter::Imm8(self.read_u8(mmu));
            }
            0xCF => op.command = Op::Iret,
            0xD0 | 0xD1 | 0xD2 | 0xD3 => {
                // group2 shift/rotate. D0/D1 shift by 1, D2/D3 by CL
                let wide = b & 1 != 0;
                let x = self.read_mod_reg_rm(mmu);
                match Op::group2_op(x.reg, wide) {
                    Some(cmd) => {
                        op.command = cmd;
                        op.params.dst = if wide {
                            self.rm16(mmu, x.md, x.rm)
                        } else {
                            self.rm8(mmu, x.md, x.rm)
                        };
                        op.params.src = if b & 2 == 0 {
                            Parameter::Imm8(1)
                        } else {
                            Parameter::Reg8(R::CL)
                        };
                    }
                    None => op.command = Op::Invalid(vec![b, x.u8()], Invalid::Reg(x.reg)),
                }
            }
            0xE4 => {
                // in AL, imm8
                op.command = Op::In8;
                op.params.dst = Parameter::Reg8(R::AL);
                op.params.src = Parameter::Imm8(self.read_u8(mmu));
            }
            0xE5 => {
                // in AX, imm8
                op.command = Op::In16;
                op.params.dst = Parameter::Reg16(R::AX);
                op.params.src = Parameter::Imm8(self.read_u8(mmu));
            }
            0xE6 => {
                // out imm8, AL
                op.command = Op::Out8;
                op.params.dst = Parameter::Imm8(self.read_u8(mmu));
                op.params.src = Parameter::Reg8(R::AL);
            }
            0xE7 => {
                // out imm8, AX
                op.command = Op::Out16;
                op.params.dst = Parameter::Imm8(self.read_u8(mmu));
                op.params.src = Parameter::Reg16(R::AX);
            }
            0xE8 => {
                // call rel16
                op.command = Op::CallNear;
                op.params.dst = Parameter::Imm16(self.read_rel16(mmu));
            }
            0xE9 => {
                // jmp rel16
                op.command = Op::JmpNear;
                op.params.dst = Parameter::Imm16(self.read_rel16(mmu));
            }
            0xEB => {
                // jmp rel8
                op.command = Op::JmpShort;
                op.params.dst = Parameter::Imm16(self.read_rel8(mmu));
            }
            0xEC => {
                // in AL, DX
                op.command = Op::In8;
                op.params.dst = Parameter::Reg8(R::AL);
                op.params.src = Parameter::Reg16(R::DX);
            }
            0xED => {
                // in AX, DX
                op.command = Op::In16;
                op.params.dst = Parameter::Reg16(R::AX);
                op.params.src = Parameter::Reg16(R::DX);
            }
            0xEE => {
                // out DX, AL
                op.command = Op::Out8;
                op.params.dst = Parameter::Reg16(R::DX);
                op.params.src = Parameter::Reg8(R::AL);
            }
            0xEF => {
                // out DX, AX
                op.command = Op::Out16;
                op.params.dst = Parameter::Reg16(R::DX);
                op.params.src = Parameter::Reg16(R::AX);
            }
            0xF4 => op.command = Op::Hlt,
            0xF5 => op.command = Op::Cmc,
            0xF6 | 0xF7 => {
                // group3: TEST/NOT/NEG/MUL/IMUL/DIV/IDIV r/m
                let wide = b & 1 != 0;
                let x = self.read_mod_reg_rm(mmu);
                match Op::group3_op(x.reg, wide) {
                    Some(cmd) => {
                        op.command = cmd.clone();
                        op.params.dst = if wide {
                            self.rm16(mmu, x.md, x.rm)
                        } else {
                            self.rm8(mmu, x.md, x.rm)
                        };
                        // TEST carries an immediate after the r/m bytes
                        if let Op::Test8 = cmd {
                            op.params.src = Parameter::Imm8(self.read_u8(mmu));
                        } else if let Op::Test16 = cmd {
                            op.params.src = Parameter::Imm16(self.read_u16(mmu));
                        }
                    }
                    None => op.command = Op::Invalid(vec![b, x.u8()], Invalid::Reg(x.reg)),
                }
            }
            0xF8 => op.command = Op::Clc,
            0xF9 => op.command = Op::Stc,
            0xFA => op.command = Op::Cli,
            0xFB => op.command = Op::Sti,
            0xFC => op.command = Op::Cld,
            0xFD => op.command = Op::Std,
            0xFE => {
                // inc/dec r/m8
                let x = self.read_mod_reg_rm(mmu);
                op.command = match x.reg {
                    0 => Op::Inc8,
                    1 => Op::Dec8,
                    _ => {
                        op.command = Op::Invalid(vec![b, x.u8()], Invalid::Reg(x.reg));
                        return;
                    }
                };
                op.params.dst = self.rm8(mmu, x.md, x.rm);
            }
            0xFF => {
                // inc/dec r/m16
                let x = self.read_mod_reg_rm(mmu);
                op.command = match x.reg {
                    0 => Op::Inc16,
                    1 => Op::Dec16,
                    _ => {
                        op.command = Op::Invalid(vec![b, x.u8()], Invalid::Reg(x.reg));
                        return;
                    }
                };
                op.params.dst = self.rm16(mmu, x.md, x.rm);
            }
            _ => op.command = Op::Invalid(vec![b], Invalid::Op),
        }
    }

    /// decode r/m8
    fn rm8(&mut self, mmu: &MMU, md: u8, rm: u8) -> Parameter {
        match md {
            0 => {
                if rm == 6 {
                    // [u16]
                    Parameter::Ptr8(self.read_u16(mmu))
                } else {
                    Parameter::Ptr8Amode(AMode::from(rm))
                }
            }
            1 => Parameter::Ptr8AmodeS8(AMode::from(rm), self.read_s8(mmu)),
            2 => Parameter::Ptr8AmodeS16(AMode::from(rm), self.read_s16(mmu)),
            _ => Parameter::Reg8(r8(rm)),
        }
    }

    /// decode r/m16
    fn rm16(&mut self, mmu: &MMU, md: u8, rm: u8) -> Parameter {
        match md {
            0 => {
                if rm == 6 {
                    // [u16]
                    Parameter::Ptr16(self.read_u16(mmu))
                } else {
                    Parameter::Ptr16Amode(AMode::from(rm))
                }
            }
            1 => Parameter::Ptr16AmodeS8(AMode::from(rm), self.read_s8(mmu)),
            2 => Parameter::Ptr16AmodeS16(AMode::from(rm), self.read_s16(mmu)),
            _ => Parameter::Reg16(r16(rm)),
        }
    }

    /// decode r/m8, r8
    fn rm8_r8(&mut self, mmu: &MMU) -> ParameterSet {
        let x = self.read_mod_reg_rm(mmu);
        ParameterSet {
            dst: self.rm8(mmu, x.md, x.rm),
            src: Parameter::Reg8(r8(x.reg)),
        }
    }

    /// decode r8, r/m8
    fn r8_rm8(&mut self, mmu: &MMU) -> ParameterSet {
        let x = self.read_mod_reg_rm(mmu);
        ParameterSet {
            dst: Parameter::Reg8(r8(x.reg)),
            src: self.rm8(mmu, x.md, x.rm),
        }
    }

    /// decode r/m16, r16
    fn rm16_r16(&mut self, mmu: &MMU) -> ParameterSet {
        let x = self.read_mod_reg_rm(mmu);
        ParameterSet {
            dst: self.rm16(mmu, x.md, x.rm),
            src: Parameter::Reg16(r16(x.reg)),
        }
    }

    /// decode r16, r/m16
    fn r16_rm16(&mut self, mmu: &MMU) -> ParameterSet {
        let x = self.read_mod_reg_rm(mmu);
        ParameterSet {
            dst: Parameter::Reg16(r16(x.reg)),
            src: self.rm16(mmu, x.md, x.rm),
        }
    }

    fn read_mod_reg_rm(&mut self, mmu: &MMU) -> ModRegRm {
        let b = self.read_u8(mmu);
        ModRegRm {
            md: b >> 6,
            reg: (b >> 3) & 7,
            rm: b & 7,
        }
    }

    fn read_u8(&mut self, mmu: &MMU) -> u8 {
        let b = mmu.read_u8(self.seg, self.offset);
        self.offset = self.offset.wrapping_add(1);
        b
    }

    fn read_u16(&mut self, mmu: &MMU) -> u16 {
        let lo = self.read_u8(mmu);
        let hi = self.read_u8(mmu);
        u16::from(hi) << 8 | u16::from(lo)
    }

    fn read_s8(&mut self, mmu: &MMU) -> i8 {
        self.read_u8(mmu) as i8
    }

    fn read_s16(&mut self, mmu: &MMU) -> i16 {
        self.read_u16(mmu) as i16
    }

    /// reads an 8-bit displacement and resolves it against the
    /// post-instruction offset, yielding the absolute jump target
    fn read_rel8(&mut self, mmu: &MMU) -> u16 {
        let val = self.read_s8(mmu);
        self.offset.wrapping_add(i16::from(val) as u16)
    }

    fn read_rel16(&mut self, mmu: &MMU) -> u16 {
        let val = self.read_s16(mmu);
        self.offset.wrapping_add(val as u16)
    }
}
