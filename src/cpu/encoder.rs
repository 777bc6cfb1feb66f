use std::fmt;

use crate::cpu::instruction::{Instruction, RepeatMode};
use crate::cpu::op::Op;
use crate::cpu::parameter::{ModRegRm, Parameter, ParameterSet};
use crate::cpu::register::R;

#[cfg(test)]
#[path = "./encoder_test.rs"]
mod encoder_test;

#[derive(Debug, PartialEq)]
pub enum EncodeError {
    UnhandledOp(Op),
    UnhandledParameter(Parameter),
    UnexpectedDstType(Parameter),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EncodeError::UnhandledOp(op) => write!(f, "unhandled op: {:?}", op),
            EncodeError::UnhandledParameter(p) => write!(f, "unhandled param: {:?}", p),
            EncodeError::UnexpectedDstType(p) => write!(f, "unexpected dst type: {:?}", p),
        }
    }
}

/// encodes an `Instruction` into its byte sequence. the operand-shape
/// priority matches the decoder: accumulator short form, then the
/// general r/m+imm form, then r/m+r
#[derive(Default)]
pub struct Encoder {}

impl Encoder {
    pub fn new() -> Self {
        Encoder {}
    }

    pub fn encode_vec(&self, ops: &[Instruction]) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        for op in ops {
            out.extend(self.encode(op)?);
        }
        Ok(out)
    }

    pub fn encode(&self, op: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        match op.repeat {
            RepeatMode::None => {}
            RepeatMode::Rep | RepeatMode::Repe => out.push(0xF3),
            RepeatMode::Repne => out.push(0xF2),
        }

        match op.command {
            Op::Add8 | Op::Or8 | Op::Adc8 | Op::Sbb8 | Op::And8 | Op::Sub8 | Op::Xor8
            | Op::Cmp8 => out.extend(self.alu_instr8(op)?),
            Op::Add16 | Op::Or16 | Op::Adc16 | Op::Sbb16 | Op::And16 | Op::Sub16 | Op::Xor16
            | Op::Cmp16 => out.extend(self.alu_instr16(op)?),

            Op::Test8 | Op::Not8 | Op::Neg8 | Op::Mul8 | Op::Imul8 | Op::Div8 | Op::Idiv8 => {
                out.extend(self.group3_instr8(op)?)
            }
            Op::Test16 | Op::Not16 | Op::Neg16 | Op::Mul16 | Op::Imul16 | Op::Div16
            | Op::Idiv16 => out.extend(self.group3_instr16(op)?),

            Op::Rol8 | Op::Ror8 | Op::Rcl8 | Op::Rcr8 | Op::Shl8 | Op::Shr8 | Op::Sar8
            | Op::Rol16 | Op::Ror16 | Op::Rcl16 | Op::Rcr16 | Op::Shl16 | Op::Shr16
            | Op::Sar16 => out.extend(self.shift_instr(op)?),

            Op::Mov8 => out.extend(self.mov_instr8(op)?),
            Op::Mov16 => out.extend(self.mov_instr16(op)?),

            Op::Inc8 | Op::Dec8 => {
                // 0xFE: inc/dec r/m8
                out.push(0xFE);
                out.extend(self.encode_rm(&op.params.dst, op.command.group4_index().unwrap())?);
            }
            Op::Inc16 | Op::Dec16 => {
                if let Parameter::Reg16(r) = op.params.dst {
                    // 0x40-0x47 inc r16, 0x48-0x4F dec r16
                    let base = if op.command == Op::Inc16 { 0x40 } else { 0x48 };
                    out.push(base | r.index() as u8);
                } else {
                    // 0xFF: inc/dec r/m16
                    out.push(0xFF);
                    out.extend(self.encode_rm(&op.params.dst, op.command.group4_index().unwrap())?);
                }
            }

            Op::Push16 => {
                if let Parameter::Reg16(r) = op.params.dst {
                    out.push(0x50 | r.index() as u8);
                } else {
                    return Err(EncodeError::UnexpectedDstType(op.params.dst.clone()));
                }
            }
            Op::Pop16 => {
                if let Parameter::Reg16(r) = op.params.dst {
                    out.push(0x58 | r.index() as u8);
                } else {
                    return Err(EncodeError::UnexpectedDstType(op.params.dst.clone()));
                }
            }

            Op::JmpShort => {
                // the parameter holds the displacement
                out.push(0xEB);
                out.push(self.imm_s8(&op.params.dst)? as u8);
            }
            Op::JmpNear => {
                out.push(0xE9);
                let disp = self.imm_u16(&op.params.dst)?;
                out.push(disp as u8);
                out.push((disp >> 8) as u8);
            }
            Op::Jz | Op::Jnz | Op::Jl | Op::Jge | Op::Jle | Op::Jg => {
                out.push(match op.command {
                    Op::Jz => 0x74,
                    Op::Jnz => 0x75,
                    Op::Jl => 0x7C,
                    Op::Jge => 0x7D,
                    Op::Jle => 0x7E,
                    _ => 0x7F,
                });
                out.push(self.imm_s8(&op.params.dst)? as u8);
            }
            Op::CallNear => {
                out.push(0xE8);
                let disp = self.imm_u16(&op.params.dst)?;
                out.push(disp as u8);
                out.push((disp >> 8) as u8);
            }
            Op::Retn => out.push(0xC3),
            Op::Iret => out.push(0xCF),

            Op::Movsb => out.push(0xA4),
            Op::Movsw => out.push(0xA5),
            Op::Cmpsb => out.push(0xA6),
            Op::Cmpsw => out.push(0xA7),
            Op::Stosb => out.push(0xAA),
            Op::Stosw => out.push(0xAB),
            Op::Lodsb => out.push(0xAC),
            Op::Lodsw => out.push(0xAD),
            Op::Scasb => out.push(0xAE),
            Op::Scasw => out.push(0xAF),

            Op::Clc => out.push(0xF8),
            Op::Stc => out.push(0xF9),
            Op::Cmc => out.push(0xF5),
            Op::Cld => out.push(0xFC),
            Op::Std => out.push(0xFD),
            Op::Cli => out.push(0xFA),
            Op::Sti => out.push(0xFB),

            Op::In8 | Op::In16 => {
                let wide = op.command == Op::In16;
                match op.params.src {
                    Parameter::Imm8(port) => {
                        out.push(if wide { 0xE5 } else { 0xE4 });
                        out.push(port);
                    }
                    Parameter::Reg16(R::DX) => out.push(if wide { 0xED } else { 0xEC }),
                    _ => return Err(EncodeError::UnhandledParameter(op.params.src.clone())),
                }
            }
            Op::Out8 | Op::Out16 => {
                let wide = op.command == Op::Out16;
                match op.params.dst {
                    Parameter::Imm8(port) => {
                        out.push(if wide { 0xE7 } else { 0xE6 });
                        out.push(port);
                    }
                    Parameter::Reg16(R::DX) => out.push(if wide { 0xEF } else { 0xEE }),
                    _ => return Err(EncodeError::UnhandledParameter(op.params.dst.clone())),
                }
            }

            Op::Int => {
                if let Parameter::Imm8(n) = op.params.dst {
                    out.push(0xCD);
                    out.push(n);
                } else {
                    return Err(EncodeError::UnhandledParameter(op.params.dst.clone()));
                }
            }
            Op::Hlt => out.push(0xF4),
            Op::Db => {
                if let Parameter::Imm8(b) = op.params.dst {
                    out.push(b);
                } else {
                    return Err(EncodeError::UnhandledParameter(op.params.dst.clone()));
                }
            }
            _ => return Err(EncodeError::UnhandledOp(op.command.clone())),
        }
        Ok(out)
    }

    fn alu_instr8(&self, ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        let base = ins.command.group1_index().unwrap() << 3;

        if let Parameter::Reg8(R::AL) = ins.params.dst {
            if let Parameter::Imm8(imm) = ins.params.src {
                // accumulator short form: <alu> AL, imm8
                out.push(base + 4);
                out.push(imm);
                return Ok(out);
            }
        }
        match ins.params.dst {
            Parameter::Reg8(r) => {
                if let Parameter::Imm8(imm) = ins.params.src {
                    // 0x80: <alu> r/m8, imm8
                    out.push(0x80);
                    let mrr = ModRegRm {
                        md: 3,
                        reg: ins.command.group1_index().unwrap(),
                        rm: r.index() as u8,
                    };
                    out.push(mrr.u8());
                    out.push(imm);
                } else if ins.params.src.is_ptr() {
                    // <alu> r8, r/m8
                    out.push(base + 2);
                    out.extend(self.encode_r_rm(&ins.params)?);
                } else {
                    // <alu> r/m8, r8
                    out.push(base);
                    out.extend(self.encode_rm_r(&ins.params)?);
                }
                Ok(out)
            }
            Parameter::Ptr8(_)
            | Parameter::Ptr8Amode(_)
            | Parameter::Ptr8AmodeS8(_, _)
            | Parameter::Ptr8AmodeS16(_, _) => {
                if let Parameter::Imm8(imm) = ins.params.src {
                    // 0x80: <alu> m8, imm8
                    out.push(0x80);
                    out.extend(
                        self.encode_rm(&ins.params.dst, ins.command.group1_index().unwrap())?,
                    );
                    out.push(imm);
                } else {
                    // <alu> m8, r8
                    out.push(base);
                    out.extend(self.encode_rm_r(&ins.params)?);
                }
                Ok(out)
            }
            _ => Err(EncodeError::UnexpectedDstType(ins.params.dst.clone())),
        }
    }

    fn alu_instr16(&self, ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        let base = ins.command.group1_index().unwrap() << 3;

        if let Parameter::Reg16(R::AX) = ins.params.dst {
            if ins.params.src.is_imm() {
                // accumulator short form: <alu> AX, imm16
                let imm = self.imm_u16(&ins.params.src)?;
                out.push(base + 5);
                out.push(imm as u8);
                out.push((imm >> 8) as u8);
                return Ok(out);
            }
        }
        match ins.params.src {
            Parameter::ImmS8(imm) => {
                // 0x83: <alu> r/m16, imm8 sign-extended
                out.push(0x83);
                out.extend(self.encode_rm(&ins.params.dst, ins.command.group1_index().unwrap())?);
                out.push(imm as u8);
                Ok(out)
            }
            Parameter::Imm16(imm) => {
                // 0x81: <alu> r/m16, imm16
                out.push(0x81);
                out.extend(self.encode_rm(&ins.params.dst, ins.command.group1_index().unwrap())?);
                out.push(imm as u8);
                out.push((imm >> 8) as u8);
                Ok(out)
            }
            Parameter::Reg16(_) => {
                // <alu> r/m16, r16
                out.push(base + 1);
                out.extend(self.encode_rm_r(&ins.params)?);
                Ok(out)
            }
            _ if ins.params.src.is_ptr() => {
                // <alu> r16, r/m16
                out.push(base + 3);
                out.extend(self.encode_r_rm(&ins.params)?);
                Ok(out)
            }
            _ => Err(EncodeError::UnhandledParameter(ins.params.src.clone())),
        }
    }

    fn group3_instr8(&self, ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        if ins.command == Op::Test8 {
            match ins.params.src {
                Parameter::Imm8(imm) => {
                    if let Parameter::Reg8(R::AL) = ins.params.dst {
                        // 0xA8: test AL, imm8
                        out.push(0xA8);
                    } else {
                        // 0xF6 /0: test r/m8, imm8
                        out.push(0xF6);
                        out.extend(self.encode_rm(&ins.params.dst, 0)?);
                    }
                    out.push(imm);
                    return Ok(out);
                }
                Parameter::Reg8(_) => {
                    // 0x84: test r/m8, r8
                    out.push(0x84);
                    out.extend(self.encode_rm_r(&ins.params)?);
                    return Ok(out);
                }
                _ => return Err(EncodeError::UnhandledParameter(ins.params.src.clone())),
            }
        }
        // 0xF6: not/neg/mul/imul/div/idiv r/m8
        out.push(0xF6);
        out.extend(self.encode_rm(&ins.params.dst, ins.command.group3_index().unwrap())?);
        Ok(out)
    }

    fn group3_instr16(&self, ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        if ins.command == Op::Test16 {
            match ins.params.src {
                Parameter::Imm16(imm) => {
                    if let Parameter::Reg16(R::AX) = ins.params.dst {
                        // 0xA9: test AX, imm16
                        out.push(0xA9);
                    } else {
                        // 0xF7 /0: test r/m16, imm16
                        out.push(0xF7);
                        out.extend(self.encode_rm(&ins.params.dst, 0)?);
                    }
                    out.push(imm as u8);
                    out.push((imm >> 8) as u8);
                    return Ok(out);
                }
                Parameter::Reg16(_) => {
                    // 0x85: test r/m16, r16
                    out.push(0x85);
                    out.extend(self.encode_rm_r(&ins.params)?);
                    return Ok(out);
                }
                _ => return Err(EncodeError::UnhandledParameter(ins.params.src.clone())),
            }
        }
        // 0xF7: not/neg/mul/imul/div/idiv r/m16
        out.push(0xF7);
        out.extend(self.encode_rm(&ins.params.dst, ins.command.group3_index().unwrap())?);
        Ok(out)
    }

    fn shift_instr(&self, ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        let wide = ins.command.is_16bit();
        let reg = ins.command.group2_index().unwrap();
        match ins.params.src {
            Parameter::Imm8(1) => {
                // 0xD0 / 0xD1: shift by 1
                out.push(if wide { 0xD1 } else { 0xD0 });
            }
            Parameter::Reg8(R::CL) => {
                // 0xD2 / 0xD3: shift by CL
                out.push(if wide { 0xD3 } else { 0xD2 });
            }
            _ => return Err(EncodeError::UnhandledParameter(ins.params.src.clone())),
        }
        out.extend(self.encode_rm(&ins.params.dst, reg)?);
        Ok(out)
    }

    fn mov_instr8(&self, ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        match ins.params.dst {
            Parameter::Reg8(r) => {
                if let Parameter::Imm8(imm) = ins.params.src {
                    // 0xB0-0xB7: mov r8, imm8
                    out.push(0xB0 | r.index() as u8);
                    out.push(imm);
                } else if ins.params.src.is_ptr() {
                    // 0x8A: mov r8, r/m8
                    out.push(0x8A);
                    out.extend(self.encode_r_rm(&ins.params)?);
                } else {
                    // 0x88: mov r/m8, r8
                    out.push(0x88);
                    out.extend(self.encode_rm_r(&ins.params)?);
                }
                Ok(out)
            }
            Parameter::Ptr8(_)
            | Parameter::Ptr8Amode(_)
            | Parameter::Ptr8AmodeS8(_, _)
            | Parameter::Ptr8AmodeS16(_, _) => {
                if let Parameter::Imm8(imm) = ins.params.src {
                    // 0xC6 /0: mov m8, imm8
                    out.push(0xC6);
                    out.extend(self.encode_rm(&ins.params.dst, 0)?);
                    out.push(imm);
                } else {
                    // 0x88: mov m8, r8
                    out.push(0x88);
                    out.extend(self.encode_rm_r(&ins.params)?);
                }
                Ok(out)
            }
            _ => Err(EncodeError::UnexpectedDstType(ins.params.dst.clone())),
        }
    }

    fn mov_instr16(&self, ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
        let mut out = vec![];
        // segment register forms first
        if let Parameter::SReg16(sr) = ins.params.dst {
            // 0x8E: mov sreg, r/m16
            out.push(0x8E);
            out.extend(self.encode_rm(&ins.params.src, sr.index() as u8)?);
            return Ok(out);
        }
        if let Parameter::SReg16(sr) = ins.params.src {
            // 0x8C: mov r/m16, sreg
            out.push(0x8C);
            out.extend(self.encode_rm(&ins.params.dst, sr.index() as u8)?);
            return Ok(out);
        }
        match ins.params.dst {
            Parameter::Reg16(r) => {
                if let Parameter::Imm16(imm) = ins.params.src {
                    // 0xB8-0xBF: mov r16, imm16
                    out.push(0xB8 | r.index() as u8);
                    out.push(imm as u8);
                    out.push((imm >> 8) as u8);
                } else if ins.params.src.is_ptr() {
                    // 0x8B: mov r16, r/m16
                    out.push(0x8B);
                    out.extend(self.encode_r_rm(&ins.params)?);
                } else {
                    // 0x89: mov r/m16, r16
                    out.push(0x89);
                    out.extend(self.encode_rm_r(&ins.params)?);
                }
                Ok(out)
            }
            Parameter::Ptr16(_)
            | Parameter::Ptr16Amode(_)
            | Parameter::Ptr16AmodeS8(_, _)
            | Parameter::Ptr16AmodeS16(_, _) => {
                if let Parameter::Imm16(imm) = ins.params.src {
                    // 0xC7 /0: mov m16, imm16
                    out.push(0xC7);
                    out.extend(self.encode_rm(&ins.params.dst, 0)?);
                    out.push(imm as u8);
                    out.push((imm >> 8) as u8);
                } else {
                    // 0x89: mov m16, r16
                    out.push(0x89);
                    out.extend(self.encode_rm_r(&ins.params)?);
                }
                Ok(out)
            }
            _ => Err(EncodeError::UnexpectedDstType(ins.params.dst.clone())),
        }
    }

    /// ModR/M with the dst parameter in the reg field
    fn encode_r_rm(&self, params: &ParameterSet) -> Result<Vec<u8>, EncodeError> {
        match params.dst {
            Parameter::Reg8(r) | Parameter::Reg16(r) => {
                self.encode_rm(&params.src, r.index() as u8)
            }
            _ => Err(EncodeError::UnexpectedDstType(params.dst.clone())),
        }
    }

    /// ModR/M with the src parameter in the reg field
    fn encode_rm_r(&self, params: &ParameterSet) -> Result<Vec<u8>, EncodeError> {
        match params.src {
            Parameter::Reg8(r) | Parameter::Reg16(r) => {
                self.encode_rm(&params.dst, r.index() as u8)
            }
            _ => Err(EncodeError::UnhandledParameter(params.src.clone())),
        }
    }

    /// ModR/M byte plus any displacement for the r/m operand, with a
    /// fixed value in the reg field
    fn encode_rm(&self, rm: &Parameter, reg: u8) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        match *rm {
            Parameter::Ptr8(addr) | Parameter::Ptr16(addr) => {
                out.push(ModRegRm { md: 0, reg, rm: 6 }.u8());
                out.push(addr as u8);
                out.push((addr >> 8) as u8);
            }
            Parameter::Ptr8Amode(amode) | Parameter::Ptr16Amode(amode) => {
                out.push(ModRegRm { md: 0, reg, rm: amode.index() as u8 }.u8());
            }
            Parameter::Ptr8AmodeS8(amode, disp) | Parameter::Ptr16AmodeS8(amode, disp) => {
                out.push(ModRegRm { md: 1, reg, rm: amode.index() as u8 }.u8());
                out.push(disp as u8);
            }
            Parameter::Ptr8AmodeS16(amode, disp) | Parameter::Ptr16AmodeS16(amode, disp) => {
                out.push(ModRegRm { md: 2, reg, rm: amode.index() as u8 }.u8());
                out.push(disp as u8);
                out.push((disp >> 8) as u8);
            }
            Parameter::Reg8(r) | Parameter::Reg16(r) => {
                out.push(ModRegRm { md: 3, reg, rm: r.index() as u8 }.u8());
            }
            _ => return Err(EncodeError::UnhandledParameter(rm.clone())),
        }
        Ok(out)
    }

    fn imm_s8(&self, p: &Parameter) -> Result<i8, EncodeError> {
        if let Parameter::ImmS8(v) = *p {
            Ok(v)
        } else {
            Err(EncodeError::UnhandledParameter(p.clone()))
        }
    }

    fn imm_u16(&self, p: &Parameter) -> Result<u16, EncodeError> {
        match *p {
            Parameter::Imm16(v) => Ok(v),
            Parameter::ImmS8(v) => Ok(i32::from(v) as u16),
            _ => Err(EncodeError::UnhandledParameter(p.clone())),
        }
    }
}
