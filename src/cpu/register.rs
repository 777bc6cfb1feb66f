use std::fmt;

use crate::cpu::flags::Flags;

#[cfg(test)]
#[path = "./register_test.rs"]
mod register_test;

/// 16-bit register with access to the aliased high and low bytes
#[derive(Copy, Clone, Default)]
pub struct Register16 {
    pub val: u16,
}

impl Register16 {
    pub fn set_hi(&mut self, val: u8) {
        self.val = (self.val & 0x00FF) | (u16::from(val) << 8);
    }
    pub fn set_lo(&mut self, val: u8) {
        self.val = (self.val & 0xFF00) | u16::from(val);
    }
    pub fn lo_u8(&self) -> u8 {
        (self.val & 0xFF) as u8
    }
    pub fn hi_u8(&self) -> u8 {
        (self.val >> 8) as u8
    }
}

/// the register namespace: 8-bit halves, 16-bit general registers and
/// segment registers
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum R {
    AL, CL, DL, BL, AH, CH, DH, BH,
    AX, CX, DX, BX, SP, BP, SI, DI,
    ES, CS, SS, DS,
}

impl fmt::Display for R {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl R {
    /// the 3-bit (2-bit for segment registers) hardware encoding.
    /// the same code is used in the ModR/M reg field and in "+reg"
    /// opcode embeddings
    pub fn index(self) -> usize {
        match self {
            R::AL | R::AX | R::ES => 0,
            R::CL | R::CX | R::CS => 1,
            R::DL | R::DX | R::SS => 2,
            R::BL | R::BX | R::DS => 3,
            R::AH | R::SP => 4,
            R::CH | R::BP => 5,
            R::DH | R::SI => 6,
            R::BH | R::DI => 7,
        }
    }

    pub fn is_8bit(self) -> bool {
        match self {
            R::AL | R::CL | R::DL | R::BL | R::AH | R::CH | R::DH | R::BH => true,
            _ => false,
        }
    }

    pub fn is_segment(self) -> bool {
        match self {
            R::ES | R::CS | R::SS | R::DS => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            R::AL => "AL", R::CL => "CL", R::DL => "DL", R::BL => "BL",
            R::AH => "AH", R::CH => "CH", R::DH => "DH", R::BH => "BH",
            R::AX => "AX", R::CX => "CX", R::DX => "DX", R::BX => "BX",
            R::SP => "SP", R::BP => "BP", R::SI => "SI", R::DI => "DI",
            R::ES => "ES", R::CS => "CS", R::SS => "SS", R::DS => "DS",
        }
    }

    /// matches a register name, case-insensitive
    pub fn from_str(name: &str) -> Option<R> {
        let r = match name.to_ascii_uppercase().as_str() {
            "AL" => R::AL, "CL" => R::CL, "DL" => R::DL, "BL" => R::BL,
            "AH" => R::AH, "CH" => R::CH, "DH" => R::DH, "BH" => R::BH,
            "AX" => R::AX, "CX" => R::CX, "DX" => R::DX, "BX" => R::BX,
            "SP" => R::SP, "BP" => R::BP, "SI" => R::SI, "DI" => R::DI,
            "ES" => R::ES, "CS" => R::CS, "SS" => R::SS, "DS" => R::DS,
            _ => return None,
        };
        Some(r)
    }
}

/// decodes a 3-bit value into an 8-bit register: AL CL DL BL AH CH DH BH
pub fn r8(v: u8) -> R {
    match v & 7 {
        0 => R::AL,
        1 => R::CL,
        2 => R::DL,
        3 => R::BL,
        4 => R::AH,
        5 => R::CH,
        6 => R::DH,
        _ => R::BH,
    }
}

/// decodes a 3-bit value into a 16-bit register, hardware order:
/// AX CX DX BX SP BP SI DI
pub fn r16(v: u8) -> R {
    match v & 7 {
        0 => R::AX,
        1 => R::CX,
        2 => R::DX,
        3 => R::BX,
        4 => R::SP,
        5 => R::BP,
        6 => R::SI,
        _ => R::DI,
    }
}

/// decodes a 2-bit value into a segment register: ES CS SS DS
pub fn sr(v: u8) -> R {
    match v & 3 {
        0 => R::ES,
        1 => R::CS,
        2 => R::SS,
        _ => R::DS,
    }
}

/// the 16-bit addressing forms selected by the r/m field
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AMode {
    BXSI, BXDI, BPSI, BPDI, SI, DI, BP, BX,
}

impl AMode {
    pub fn index(self) -> usize {
        match self {
            AMode::BXSI => 0,
            AMode::BXDI => 1,
            AMode::BPSI => 2,
            AMode::BPDI => 3,
            AMode::SI => 4,
            AMode::DI => 5,
            AMode::BP => 6,
            AMode::BX => 7,
        }
    }

    pub fn from(v: u8) -> AMode {
        match v & 7 {
            0 => AMode::BXSI,
            1 => AMode::BXDI,
            2 => AMode::BPSI,
            3 => AMode::BPDI,
            4 => AMode::SI,
            5 => AMode::DI,
            6 => AMode::BP,
            _ => AMode::BX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AMode::BXSI => "BX+SI",
            AMode::BXDI => "BX+DI",
            AMode::BPSI => "BP+SI",
            AMode::BPDI => "BP+DI",
            AMode::SI => "SI",
            AMode::DI => "DI",
            AMode::BP => "BP",
            AMode::BX => "BX",
        }
    }

    /// true when the effective address is based on BP, which defaults
    /// to the stack segment
    pub fn uses_bp(self) -> bool {
        match self {
            AMode::BPSI | AMode::BPDI | AMode::BP => true,
            _ => false,
        }
    }
}

impl fmt::Display for AMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// general registers, segment registers, instruction pointer and flags
#[derive(Clone, Default)]
pub struct RegisterState {
    gpr: [Register16; 8],
    sreg: [Register16; 4],
    pub ip: u16,
    pub flags: Flags,
}

impl RegisterState {
    pub fn get_r16(&self, r: R) -> u16 {
        if r.is_segment() {
            self.sreg[r.index()].val
        } else {
            debug_assert!(!r.is_8bit());
            self.gpr[r.index()].val
        }
    }

    pub fn set_r16(&mut self, r: R, val: u16) {
        if r.is_segment() {
            self.sreg[r.index()].val = val;
        } else {
            debug_assert!(!r.is_8bit());
            self.gpr[r.index()].val = val;
        }
    }

    pub fn get_r8(&self, r: R) -> u8 {
        debug_assert!(r.is_8bit());
        let i = r.index();
        if i & 4 == 0 {
            self.gpr[i & 3].lo_u8()
        } else {
            self.gpr[i & 3].hi_u8()
        }
    }

    pub fn set_r8(&mut self, r: R, val: u8) {
        debug_assert!(r.is_8bit());
        let i = r.index();
        if i & 4 == 0 {
            self.gpr[i & 3].set_lo(val);
        } else {
            self.gpr[i & 3].set_hi(val);
        }
    }

    /// 16-bit register by hardware index 0..7
    pub fn get_gpr16(&self, index: u8) -> u16 {
        self.get_r16(r16(index))
    }

    /// 8-bit register by hardware index 0..7
    pub fn get_gpr8(&self, index: u8) -> u8 {
        self.get_r8(r8(index))
    }

    /// segment register by hardware index 0..3
    pub fn get_sreg(&self, index: u8) -> u16 {
        self.get_r16(sr(index))
    }

    /// zero every register and flag
    pub fn reset(&mut self) {
        *self = RegisterState::default();
    }
}
