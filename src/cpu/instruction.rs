use std::fmt;

use crate::cpu::op::Op;
use crate::cpu::parameter::{Parameter, ParameterSet};
use crate::hex::hex_bytes;
use crate::string::right_pad;

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub command: Op,
    pub params: ParameterSet,
    /// REPcc prefix, if any
    pub repeat: RepeatMode,
    /// total encoded length in bytes, including any prefix
    pub length: u8,
}

impl Instruction {
    pub fn new(op: Op) -> Self {
        Instruction::new2(op, Parameter::None, Parameter::None)
    }

    pub fn new1(op: Op, dst: Parameter) -> Self {
        Instruction::new2(op, dst, Parameter::None)
    }

    pub fn new2(op: Op, dst: Parameter, src: Parameter) -> Self {
        Instruction {
            command: op,
            params: ParameterSet { dst, src },
            repeat: RepeatMode::None,
            length: 0,
        }
    }

    /// a memory operand's width is spelled out only when no register
    /// operand pins it down
    fn need_width_keyword(&self) -> bool {
        let mem = self.params.dst.is_ptr() || self.params.src.is_ptr();
        let reg = self.params.dst.is_reg() || self.params.src.is_reg();
        mem && !reg
    }

    fn param_str(&self, p: &Parameter) -> String {
        if p.is_ptr() && self.need_width_keyword() {
            let kw = if p.width() == Some(8) { "BYTE" } else { "WORD" };
            format!("{} {}", kw, p)
        } else {
            format!("{}", p)
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = String::new();
        if self.repeat != RepeatMode::None {
            s.push_str(self.repeat.as_str());
            s.push(' ');
        }
        s.push_str(self.command.mnemonic());
        match self.params.dst {
            Parameter::None => {}
            _ => {
                s.push(' ');
                s.push_str(&self.param_str(&self.params.dst));
                if let Parameter::None = self.params.src {
                } else {
                    s.push_str(", ");
                    s.push_str(&self.param_str(&self.params.src));
                }
            }
        }
        write!(f, "{}", s)
    }
}

/// a decoded instruction annotated with its address and raw bytes
#[derive(Debug, PartialEq)]
pub struct InstructionInfo {
    /// physical address of the first byte
    pub address: u32,
    pub bytes: Vec<u8>,
    pub instruction: Instruction,
}

/// width of the raw-byte column in listing lines; fits the longest
/// encoding (6 bytes) with room to spare
const BYTES_COLUMN: usize = 20;

impl fmt::Display for InstructionInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:08X}: {}{}",
            self.address,
            right_pad(&format!("{} ", hex_bytes(&self.bytes)), BYTES_COLUMN),
            self.instruction
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RepeatMode {
    None,
    Rep,
    /// alias REPZ
    Repe,
    /// alias REPNZ
    Repne,
}

impl RepeatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::None => "",
            RepeatMode::Rep => "REP",
            RepeatMode::Repe => "REPE",
            RepeatMode::Repne => "REPNE",
        }
    }

    pub fn from_str(name: &str) -> Option<RepeatMode> {
        match name {
            "REP" => Some(RepeatMode::Rep),
            "REPE" | "REPZ" => Some(RepeatMode::Repe),
            "REPNE" | "REPNZ" => Some(RepeatMode::Repne),
            _ => None,
        }
    }
}
