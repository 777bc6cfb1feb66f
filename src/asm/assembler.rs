use std::collections::HashMap;
use std::fmt;

use crate::cpu::op;
use crate::cpu::{AMode, Encoder, Instruction, Op, Parameter, RepeatMode, R};

use super::parser::{
    parse_line, DataDirective, DataItem, DataWidth, JumpHint, SourceInstruction, SourceOperand,
    StatementBody, Width,
};

#[cfg(test)]
#[path = "./assembler_test.rs"]
mod assembler_test;

/// assembly errors. lexical and semantic errors accumulate; a unit
/// with any error produces no output
#[derive(Clone, Debug, PartialEq)]
pub enum AsmError {
    UnknownMnemonic { line: usize, name: String },
    ShapeMismatch { line: usize, mnemonic: String, detail: String },
    TooFewOperands { line: usize, mnemonic: String },
    TooManyOperands { line: usize, mnemonic: String },
    UndefinedLabel { line: usize, label: String },
    DuplicateLabel { line: usize, label: String },
    OffsetOutOfRange { line: usize, distance: i32 },
    UnterminatedString { line: usize, text: String },
    InvalidMemExpression { line: usize, text: String },
    InvalidNumber { line: usize, text: String },
    InvalidLabel { line: usize, text: String },
    InvalidOperand { line: usize, text: String },
    BadDataOperand { line: usize, text: String },
    RepWithoutString { line: usize, mnemonic: String },
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AsmError::UnknownMnemonic { line, name } => {
                write!(f, "asm: line {}: unknown mnemonic '{}'", line, name)
            }
            AsmError::ShapeMismatch { line, mnemonic, detail } => {
                write!(f, "asm: line {}: {} does not take these operands: {}", line, mnemonic, detail)
            }
            AsmError::TooFewOperands { line, mnemonic } => {
                write!(f, "asm: line {}: too few operands for {}", line, mnemonic)
            }
            AsmError::TooManyOperands { line, mnemonic } => {
                write!(f, "asm: line {}: too many operands for {}", line, mnemonic)
            }
            AsmError::UndefinedLabel { line, label } => {
                write!(f, "asm: line {}: undefined label '{}'", line, label)
            }
            AsmError::DuplicateLabel { line, label } => {
                write!(f, "asm: line {}: duplicate label '{}'", line, label)
            }
            AsmError::OffsetOutOfRange { line, distance } => write!(
                f,
                "asm: line {}: jump displacement {} does not fit the selected form",
                line, distance
            ),
            AsmError::UnterminatedString { line, text } => {
                write!(f, "asm: line {}: unterminated string literal: {}", line, text)
            }
            AsmError::InvalidMemExpression { line, text } => {
                write!(f, "asm: line {}: invalid memory expression: {}", line, text)
            }
            AsmError::InvalidNumber { line, text } => {
                write!(f, "asm: line {}: invalid numeric literal: {}", line, text)
            }
            AsmError::InvalidLabel { line, text } => {
                write!(f, "asm: line {}: invalid label name: {}", line, text)
            }
            AsmError::InvalidOperand { line, text } => {
                write!(f, "asm: line {}: unrecognized operand: {}", line, text)
            }
            AsmError::BadDataOperand { line, text } => {
                write!(f, "asm: line {}: unsupported data operand: {}", line, text)
            }
            AsmError::RepWithoutString { line, mnemonic } => write!(
                f,
                "asm: line {}: repeat prefix requires a string primitive, got '{}'",
                line, mnemonic
            ),
        }
    }
}

/// the jump form fixed during pass one; lengths never change afterwards
#[derive(Copy, Clone, Debug, PartialEq)]
enum JumpForm {
    Short,
    Near,
}

enum PendingBody {
    Instr { instr: SourceInstruction, jump: Option<JumpForm> },
    Data(DataDirective),
}

struct Pending {
    line: usize,
    addr: u16,
    len: u16,
    body: PendingBody,
}

/// two-pass assembler over a source unit. pass one resolves label
/// addresses and fixes every instruction length; pass two emits bytes
pub struct Assembler {
    origin: u16,
    labels: HashMap<String, u16>,
    errors: Vec<AsmError>,
    encoder: Encoder,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            origin: 0,
            labels: HashMap::new(),
            errors: Vec::new(),
            encoder: Encoder::new(),
        }
    }

    /// label addresses start at `origin` instead of zero
    pub fn with_origin(origin: u16) -> Self {
        let mut a = Self::new();
        a.origin = origin;
        a
    }

    pub fn assemble(&mut self, source: &str) -> Result<Vec<u8>, Vec<AsmError>> {
        self.labels.clear();
        self.errors.clear();

        let pending = self.first_pass(source);
        let out = self.second_pass(&pending);

        if self.errors.is_empty() {
            Ok(out)
        } else {
            Err(self.errors.clone())
        }
    }

    fn first_pass(&mut self, source: &str) -> Vec<Pending> {
        let mut pending = Vec::new();
        let mut addr = self.origin;

        for (i, line) in source.lines().enumerate() {
            let line_no = i + 1;
            let stmt = match parse_line(line, line_no) {
                Ok(stmt) => stmt,
                Err(e) => {
                    self.errors.push(e);
                    continue;
                }
            };
            for label in stmt.labels {
                if self.labels.insert(label.clone(), addr).is_some() {
                    self.errors.push(AsmError::DuplicateLabel { line: line_no, label });
                }
            }
            let body = match stmt.body {
                Some(b) => b,
                None => continue,
            };
            match body {
                StatementBody::Data(data) => {
                    let len = data_len(&data);
                    pending.push(Pending {
                        line: line_no,
                        addr,
                        len,
                        body: PendingBody::Data(data),
                    });
                    addr = addr.wrapping_add(len);
                }
                StatementBody::Instruction(instr) => {
                    let jump = match self.jump_form(&instr, addr, line_no) {
                        Ok(j) => j,
                        Err(e) => {
                            self.errors.push(e);
                            continue;
                        }
                    };
                    let len = match jump {
                        Some(JumpForm::Short) => 2,
                        Some(JumpForm::Near) => 3,
                        None => match self.instruction_len(&instr, line_no) {
                            Ok(n) => n,
                            Err(e) => {
                                self.errors.push(e);
                                continue;
                            }
                        },
                    };
                    pending.push(Pending {
                        line: line_no,
                        addr,
                        len,
                        body: PendingBody::Instr { instr, jump },
                    });
                    addr = addr.wrapping_add(len);
                }
            }
        }
        pending
    }

    fn second_pass(&mut self, pending: &[Pending]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in pending {
            match &p.body {
                PendingBody::Data(data) => self.emit_data(data, p.line, &mut out),
                PendingBody::Instr { instr, jump } => {
                    let lowered = match *jump {
                        Some(form) => self.lower_jump(instr, form, p.addr, p.len, p.line),
                        None => self.lower(instr, true, p.line),
                    };
                    let lowered = match lowered {
                        Ok(ins) => ins,
                        Err(e) => {
                            self.errors.push(e);
                            continue;
                        }
                    };
                    match self.encoder.encode(&lowered) {
                        Ok(bytes) => {
                            debug_assert_eq!(p.len as usize, bytes.len());
                            out.extend(bytes);
                        }
                        Err(e) => self.errors.push(AsmError::ShapeMismatch {
                            line: p.line,
                            mnemonic: instr.mnemonic.clone(),
                            detail: format!("{}", e),
                        }),
                    }
                }
            }
        }
        out
    }

    fn emit_data(&mut self, data: &DataDirective, line: usize, out: &mut Vec<u8>) {
        for item in &data.items {
            match item {
                DataItem::Bytes(bytes) => {
                    if data.width == DataWidth::Word {
                        self.errors.push(AsmError::BadDataOperand {
                            line,
                            text: "string literals are DB only".to_string(),
                        });
                        continue;
                    }
                    out.extend(bytes);
                }
                DataItem::Value(v) => match data.width {
                    DataWidth::Byte => out.push((*v & 0xFF) as u8),
                    DataWidth::Word => {
                        let w = (*v & 0xFFFF) as u16;
                        out.push(w as u8);
                        out.push((w >> 8) as u8);
                    }
                },
                DataItem::LabelRef(name) => match self.labels.get(name) {
                    Some(a) => {
                        // label references emit their 16-bit address,
                        // low byte first
                        out.push(*a as u8);
                        out.push((*a >> 8) as u8);
                    }
                    None => self.errors.push(AsmError::UndefinedLabel {
                        line,
                        label: name.clone(),
                    }),
                },
            }
        }
    }

    /// decides the encoding form of a control-transfer mnemonic during
    /// pass one, so the length is fixed before labels are all known:
    /// conditional jumps are always short; CALL is always near; JMP
    /// takes a SHORT/NEAR keyword, fits a known (backward or numeric)
    /// target, and otherwise assembles near
    fn jump_form(
        &self,
        instr: &SourceInstruction,
        addr: u16,
        line: usize,
    ) -> Result<Option<JumpForm>, AsmError> {
        let is_jcc = match instr.mnemonic.as_str() {
            "JE" | "JZ" | "JNE" | "JNZ" | "JG" | "JGE" | "JL" | "JLE" => true,
            "JMP" | "CALL" => false,
            _ => return Ok(None),
        };
        if instr.operands.len() != 1 {
            return Err(if instr.operands.is_empty() {
                AsmError::TooFewOperands { line, mnemonic: instr.mnemonic.clone() }
            } else {
                AsmError::TooManyOperands { line, mnemonic: instr.mnemonic.clone() }
            });
        }
        if is_jcc {
            return Ok(Some(JumpForm::Short));
        }
        if instr.mnemonic == "CALL" {
            return Ok(Some(JumpForm::Near));
        }
        if let Some(hint) = instr.jump_hint {
            return Ok(Some(match hint {
                JumpHint::Short => JumpForm::Short,
                JumpHint::Near => JumpForm::Near,
            }));
        }
        let target = match &instr.operands[0] {
            SourceOperand::Label(name) => self.labels.get(name).copied(),
            SourceOperand::Imm { value, .. } => Some((*value & 0xFFFF) as u16),
            _ => {
                return Err(AsmError::ShapeMismatch {
                    line,
                    mnemonic: instr.mnemonic.clone(),
                    detail: "jump target must be a label or address".to_string(),
                })
            }
        };
        match target {
            Some(t) => {
                let disp = i32::from(t) - (i32::from(addr) + 2);
                if disp >= -128 && disp <= 127 {
                    Ok(Some(JumpForm::Short))
                } else {
                    Ok(Some(JumpForm::Near))
                }
            }
            // forward reference: the near form always fits
            None => Ok(Some(JumpForm::Near)),
        }
    }

    fn lower_jump(
        &self,
        instr: &SourceInstruction,
        form: JumpForm,
        addr: u16,
        len: u16,
        line: usize,
    ) -> Result<Instruction, AsmError> {
        let target = match &instr.operands[0] {
            SourceOperand::Label(name) => match self.labels.get(name) {
                Some(t) => *t,
                None => {
                    return Err(AsmError::UndefinedLabel { line, label: name.clone() })
                }
            },
            SourceOperand::Imm { value, .. } => (*value & 0xFFFF) as u16,
            _ => {
                return Err(AsmError::ShapeMismatch {
                    line,
                    mnemonic: instr.mnemonic.clone(),
                    detail: "jump target must be a label or address".to_string(),
                })
            }
        };
        let disp = i32::from(target) - (i32::from(addr) + i32::from(len));

        let op = match (instr.mnemonic.as_str(), form) {
            ("JMP", JumpForm::Short) => Op::JmpShort,
            ("JMP", JumpForm::Near) => Op::JmpNear,
            ("CALL", _) => Op::CallNear,
            ("JE", _) | ("JZ", _) => Op::Jz,
            ("JNE", _) | ("JNZ", _) => Op::Jnz,
            ("JG", _) => Op::Jg,
            ("JGE", _) => Op::Jge,
            ("JL", _) => Op::Jl,
            ("JLE", _) => Op::Jle,
            _ => unreachable!(),
        };
        let param = match form {
            JumpForm::Short => {
                if disp < -128 || disp > 127 {
                    return Err(AsmError::OffsetOutOfRange { line, distance: disp });
                }
                Parameter::ImmS8(disp as i8)
            }
            JumpForm::Near => Parameter::Imm16((disp & 0xFFFF) as u16),
        };
        Ok(Instruction::new1(op, param))
    }

    /// pass-one length: lower with unresolved labels as placeholder
    /// words and measure the encoding. labels always lower to full
    /// words, so the length cannot change in pass two
    fn instruction_len(&mut self, instr: &SourceInstruction, line: usize) -> Result<u16, AsmError> {
        let lowered = self.lower(instr, false, line)?;
        match self.encoder.encode(&lowered) {
            Ok(bytes) => Ok(bytes.len() as u16),
            Err(e) => Err(AsmError::ShapeMismatch {
                line,
                mnemonic: instr.mnemonic.clone(),
                detail: format!("{}", e),
            }),
        }
    }

    /// maps a parsed instruction onto the instruction-set model:
    /// decide the operand width, pick the op of that width and convert
    /// the operands. `resolve` is false during pass one, when labels
    /// may still be undefined
    fn lower(
        &self,
        instr: &SourceInstruction,
        resolve: bool,
        line: usize,
    ) -> Result<Instruction, AsmError> {
        let m = instr.mnemonic.as_str();
        let shape_err = |detail: &str| AsmError::ShapeMismatch {
            line,
            mnemonic: instr.mnemonic.clone(),
            detail: detail.to_string(),
        };

        if !op::is_mnemonic(m) || m == "JMP" || m == "DB" || m == "DW" {
            // jumps are handled by the caller; a JMP reaching this
            // point had a malformed operand list
            return Err(AsmError::UnknownMnemonic { line, name: instr.mnemonic.clone() });
        }

        // zero-operand instructions, including the string primitives
        if let Some(zero_op) = self.zero_operand_op(m) {
            if !instr.operands.is_empty() {
                return Err(AsmError::TooManyOperands { line, mnemonic: instr.mnemonic.clone() });
            }
            if instr.repeat != RepeatMode::None && !zero_op.is_string_op() {
                return Err(AsmError::RepWithoutString { line, mnemonic: instr.mnemonic.clone() });
            }
            let mut ins = Instruction::new(zero_op);
            ins.repeat = instr.repeat;
            return Ok(ins);
        }
        if instr.repeat != RepeatMode::None {
            return Err(AsmError::RepWithoutString { line, mnemonic: instr.mnemonic.clone() });
        }

        match m {
            "INT" => {
                if instr.operands.len() > 1 {
                    return Err(AsmError::TooManyOperands { line, mnemonic: instr.mnemonic.clone() });
                }
                let value = self.expect_imm(instr, 0, line)?;
                if value < 0 || value > 0xFF {
                    return Err(shape_err("interrupt number must fit in a byte"));
                }
                Ok(Instruction::new1(Op::Int, Parameter::Imm8(value as u8)))
            }
            "PUSH" | "POP" => {
                let operand = self.expect_one(instr, line)?;
                match operand {
                    SourceOperand::Reg(r) if !r.is_8bit() && !r.is_segment() => {
                        let op = if m == "PUSH" { Op::Push16 } else { Op::Pop16 };
                        Ok(Instruction::new1(op, Parameter::Reg16(*r)))
                    }
                    _ => Err(shape_err("operand must be a 16-bit general register")),
                }
            }
            "IN" => {
                if instr.operands.len() != 2 {
                    return Err(self.arity_error(instr, line));
                }
                let wide = match instr.operands[0] {
                    SourceOperand::Reg(R::AL) => false,
                    SourceOperand::Reg(R::AX) => true,
                    _ => return Err(shape_err("destination must be AL or AX")),
                };
                let port = self.port_parameter(&instr.operands[1], line, &instr.mnemonic)?;
                let op = if wide { Op::In16 } else { Op::In8 };
                let dst = if wide { Parameter::Reg16(R::AX) } else { Parameter::Reg8(R::AL) };
                Ok(Instruction::new2(op, dst, port))
            }
            "OUT" => {
                if instr.operands.len() != 2 {
                    return Err(self.arity_error(instr, line));
                }
                let wide = match instr.operands[1] {
                    SourceOperand::Reg(R::AL) => false,
                    SourceOperand::Reg(R::AX) => true,
                    _ => return Err(shape_err("source must be AL or AX")),
                };
                let port = self.port_parameter(&instr.operands[0], line, &instr.mnemonic)?;
                let op = if wide { Op::Out16 } else { Op::Out8 };
                let src = if wide { Parameter::Reg16(R::AX) } else { Parameter::Reg8(R::AL) };
                Ok(Instruction::new2(op, port, src))
            }
            "INC" | "DEC" | "NOT" | "NEG" | "MUL" | "IMUL" | "DIV" | "IDIV" => {
                let operand = self.expect_one(instr, line)?;
                let wide = self.unary_width(operand, line, &instr.mnemonic)?;
                let op = op::from_mnemonic(m, wide).unwrap();
                let dst = self.to_parameter(operand, wide, ImmPolicy::Forbid, resolve, line, m)?;
                Ok(Instruction::new1(op, dst))
            }
            "SHL" | "SAL" | "SHR" | "SAR" | "ROL" | "ROR" | "RCL" | "RCR" => {
                if instr.operands.len() != 2 {
                    return Err(self.arity_error(instr, line));
                }
                let wide = self.unary_width(&instr.operands[0], line, &instr.mnemonic)?;
                let op = op::from_mnemonic(m, wide).unwrap();
                let dst =
                    self.to_parameter(&instr.operands[0], wide, ImmPolicy::Forbid, resolve, line, m)?;
                let count = match &instr.operands[1] {
                    SourceOperand::Imm { value: 1, .. } => Parameter::Imm8(1),
                    SourceOperand::Reg(R::CL) => Parameter::Reg8(R::CL),
                    _ => return Err(shape_err("shift count must be 1 or CL")),
                };
                Ok(Instruction::new2(op, dst, count))
            }
            "MOV" | "TEST" | "ADD" | "ADC" | "SUB" | "SBB" | "AND" | "OR" | "XOR" | "CMP" => {
                if instr.operands.len() != 2 {
                    return Err(self.arity_error(instr, line));
                }
                let dst = &instr.operands[0];
                let src = &instr.operands[1];
                let wide = self.binary_width(dst, src, line, &instr.mnemonic)?;
                let op = op::from_mnemonic(m, wide).unwrap();
                let imm_policy = match m {
                    // MOV and TEST have no sign-extended byte form
                    "MOV" | "TEST" => ImmPolicy::Full,
                    _ => ImmPolicy::SignExtend,
                };
                let dst_p = self.to_parameter(dst, wide, ImmPolicy::Forbid, resolve, line, m)?;
                let src_p = self.to_parameter(src, wide, imm_policy, resolve, line, m)?;
                if dst_p.is_ptr() && src_p.is_ptr() {
                    return Err(shape_err("memory to memory is not encodable"));
                }
                Ok(Instruction::new2(op, dst_p, src_p))
            }
            _ => Err(AsmError::UnknownMnemonic { line, name: instr.mnemonic.clone() }),
        }
    }

    fn zero_operand_op(&self, m: &str) -> Option<Op> {
        match m {
            "RET" | "IRET" | "HLT" | "CLC" | "STC" | "CMC" | "CLD" | "STD" | "CLI" | "STI"
            | "MOVSB" | "MOVSW" | "CMPSB" | "CMPSW" | "STOSB" | "STOSW" | "LODSB" | "LODSW"
            | "SCASB" | "SCASW" => op::from_mnemonic(m, false),
            _ => None,
        }
    }

    fn arity_error(&self, instr: &SourceInstruction, line: usize) -> AsmError {
        if instr.operands.len() < 2 {
            AsmError::TooFewOperands { line, mnemonic: instr.mnemonic.clone() }
        } else {
            AsmError::TooManyOperands { line, mnemonic: instr.mnemonic.clone() }
        }
    }

    fn expect_one<'a>(
        &self,
        instr: &'a SourceInstruction,
        line: usize,
    ) -> Result<&'a SourceOperand, AsmError> {
        match instr.operands.len() {
            0 => Err(AsmError::TooFewOperands { line, mnemonic: instr.mnemonic.clone() }),
            1 => Ok(&instr.operands[0]),
            _ => Err(AsmError::TooManyOperands { line, mnemonic: instr.mnemonic.clone() }),
        }
    }

    fn expect_imm(&self, instr: &SourceInstruction, idx: usize, line: usize) -> Result<i32, AsmError> {
        match instr.operands.get(idx) {
            Some(SourceOperand::Imm { value, .. }) => Ok(*value),
            Some(_) => Err(AsmError::ShapeMismatch {
                line,
                mnemonic: instr.mnemonic.clone(),
                detail: "expected an immediate".to_string(),
            }),
            None => Err(AsmError::TooFewOperands { line, mnemonic: instr.mnemonic.clone() }),
        }
    }

    fn port_parameter(
        &self,
        operand: &SourceOperand,
        line: usize,
        mnemonic: &str,
    ) -> Result<Parameter, AsmError> {
        match operand {
            SourceOperand::Imm { value, .. } if *value >= 0 && *value <= 0xFF => {
                Ok(Parameter::Imm8(*value as u8))
            }
            SourceOperand::Reg(R::DX) => Ok(Parameter::Reg16(R::DX)),
            _ => Err(AsmError::ShapeMismatch {
                line,
                mnemonic: mnemonic.to_string(),
                detail: "port must be an immediate 0-255 or DX".to_string(),
            }),
        }
    }

    /// width of a single-operand instruction: register width, or the
    /// BYTE/WORD keyword on a memory operand
    fn unary_width(
        &self,
        operand: &SourceOperand,
        line: usize,
        mnemonic: &str,
    ) -> Result<bool, AsmError> {
        match operand {
            SourceOperand::Reg(r) => Ok(!r.is_8bit()),
            SourceOperand::Mem { width: Some(w), .. } => Ok(*w == Width::Word),
            SourceOperand::Mem { width: None, .. } => Err(AsmError::ShapeMismatch {
                line,
                mnemonic: mnemonic.to_string(),
                detail: "memory operand needs a BYTE or WORD keyword".to_string(),
            }),
            _ => Err(AsmError::ShapeMismatch {
                line,
                mnemonic: mnemonic.to_string(),
                detail: "operand must be a register or memory".to_string(),
            }),
        }
    }

    /// width of a two-operand instruction: a register operand decides;
    /// otherwise a BYTE/WORD keyword on the memory operand is required
    fn binary_width(
        &self,
        dst: &SourceOperand,
        src: &SourceOperand,
        line: usize,
        mnemonic: &str,
    ) -> Result<bool, AsmError> {
        let reg_width = |o: &SourceOperand| match o {
            SourceOperand::Reg(r) => Some(!r.is_8bit()),
            _ => None,
        };
        let mem_width = |o: &SourceOperand| match o {
            SourceOperand::Mem { width: Some(w), .. } => Some(*w == Width::Word),
            _ => None,
        };
        if let (Some(a), Some(b)) = (reg_width(dst), reg_width(src)) {
            if a != b {
                return Err(AsmError::ShapeMismatch {
                    line,
                    mnemonic: mnemonic.to_string(),
                    detail: "register operand widths differ".to_string(),
                });
            }
            return Ok(a);
        }
        if let Some(w) = reg_width(dst).or_else(|| reg_width(src)) {
            return Ok(w);
        }
        if let Some(w) = mem_width(dst).or_else(|| mem_width(src)) {
            return Ok(w);
        }
        Err(AsmError::ShapeMismatch {
            line,
            mnemonic: mnemonic.to_string(),
            detail: "operand width is ambiguous, add a BYTE or WORD keyword".to_string(),
        })
    }

    /// converts a source operand to an encoder parameter of the given
    /// instruction width
    fn to_parameter(
        &self,
        operand: &SourceOperand,
        wide: bool,
        imm_policy: ImmPolicy,
        resolve: bool,
        line: usize,
        mnemonic: &str,
    ) -> Result<Parameter, AsmError> {
        let shape_err = |detail: String| AsmError::ShapeMismatch {
            line,
            mnemonic: mnemonic.to_string(),
            detail,
        };
        match operand {
            SourceOperand::Reg(r) => {
                if r.is_segment() {
                    if !wide {
                        return Err(shape_err("segment registers are 16-bit".to_string()));
                    }
                    Ok(Parameter::SReg16(*r))
                } else if r.is_8bit() {
                    if wide {
                        return Err(shape_err(format!("{} is an 8-bit register", r)));
                    }
                    Ok(Parameter::Reg8(*r))
                } else {
                    if !wide {
                        return Err(shape_err(format!("{} is a 16-bit register", r)));
                    }
                    Ok(Parameter::Reg16(*r))
                }
            }
            SourceOperand::Imm { value, .. } => {
                if imm_policy == ImmPolicy::Forbid {
                    return Err(shape_err("an immediate is not allowed here".to_string()));
                }
                let v = *value;
                if !wide {
                    if v < -128 || v > 255 {
                        return Err(shape_err(format!("{} does not fit in a byte", v)));
                    }
                    return Ok(Parameter::Imm8((v & 0xFF) as u8));
                }
                let word = (v & 0xFFFF) as u16;
                if imm_policy == ImmPolicy::SignExtend {
                    let s = word as i16;
                    if s >= -128 && s <= 127 {
                        return Ok(Parameter::ImmS8(s as i8));
                    }
                }
                Ok(Parameter::Imm16(word))
            }
            SourceOperand::Label(name) => {
                if imm_policy == ImmPolicy::Forbid {
                    return Err(shape_err("a label is not allowed here".to_string()));
                }
                if !wide {
                    return Err(shape_err("label addresses are 16-bit".to_string()));
                }
                // labels always lower to full words so instruction
                // lengths are stable across passes
                let addr = if resolve {
                    match self.labels.get(name) {
                        Some(a) => *a,
                        None => {
                            return Err(AsmError::UndefinedLabel { line, label: name.clone() })
                        }
                    }
                } else {
                    0
                };
                Ok(Parameter::Imm16(addr))
            }
            SourceOperand::Mem { base, index, disp, .. } => {
                self.mem_parameter(*base, *index, *disp, wide, line, mnemonic)
            }
            SourceOperand::Str(_) => {
                Err(shape_err("string literals are only legal in DB".to_string()))
            }
        }
    }

    fn mem_parameter(
        &self,
        base: Option<R>,
        index: Option<R>,
        disp: Option<i32>,
        wide: bool,
        line: usize,
        mnemonic: &str,
    ) -> Result<Parameter, AsmError> {
        let amode = match (base, index) {
            (None, None) => {
                // direct address
                let d = disp.unwrap_or(0);
                let addr = (d & 0xFFFF) as u16;
                return Ok(if wide { Parameter::Ptr16(addr) } else { Parameter::Ptr8(addr) });
            }
            (Some(R::BX), Some(R::SI)) => AMode::BXSI,
            (Some(R::BX), Some(R::DI)) => AMode::BXDI,
            (Some(R::BP), Some(R::SI)) => AMode::BPSI,
            (Some(R::BP), Some(R::DI)) => AMode::BPDI,
            (Some(R::BX), None) => AMode::BX,
            (Some(R::BP), None) => AMode::BP,
            (None, Some(R::SI)) => AMode::SI,
            (None, Some(R::DI)) => AMode::DI,
            _ => {
                return Err(AsmError::ShapeMismatch {
                    line,
                    mnemonic: mnemonic.to_string(),
                    detail: "unsupported base/index combination".to_string(),
                })
            }
        };
        let disp = match disp {
            // [BP] has no displacement-free encoding; mod=00 r/m=110
            // means direct addressing
            None if amode == AMode::BP => Some(0),
            other => other,
        };
        let p = match disp {
            None => {
                if wide {
                    Parameter::Ptr16Amode(amode)
                } else {
                    Parameter::Ptr8Amode(amode)
                }
            }
            Some(d) if d >= -128 && d <= 127 => {
                if wide {
                    Parameter::Ptr16AmodeS8(amode, d as i8)
                } else {
                    Parameter::Ptr8AmodeS8(amode, d as i8)
                }
            }
            Some(d) => {
                let s = (d & 0xFFFF) as u16 as i16;
                if wide {
                    Parameter::Ptr16AmodeS16(amode, s)
                } else {
                    Parameter::Ptr8AmodeS16(amode, s)
                }
            }
        };
        Ok(p)
    }
}

#[derive(Copy, Clone, PartialEq)]
enum ImmPolicy {
    /// immediates are not legal in this slot
    Forbid,
    /// full-width immediate only (MOV, TEST)
    Full,
    /// word immediates that fit a signed byte use the sign-extended form
    SignExtend,
}

fn data_len(data: &DataDirective) -> u16 {
    let mut len = 0u16;
    for item in &data.items {
        len = len.wrapping_add(match item {
            DataItem::Bytes(b) => b.len() as u16,
            DataItem::Value(_) => match data.width {
                DataWidth::Byte => 1,
                DataWidth::Word => 2,
            },
            DataItem::LabelRef(_) => 2,
        });
    }
    len
}

/// assembles a source unit with labels starting at address zero
pub fn assemble(source: &str) -> Result<Vec<u8>, Vec<AsmError>> {
    Assembler::new().assemble(source)
}
