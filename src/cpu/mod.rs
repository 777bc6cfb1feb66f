// these modules are re-exported as a single module

pub use self::decoder::*;
mod decoder;

pub use self::encoder::*;
mod encoder;

pub use self::flags::*;
mod flags;

pub use self::instruction::*;
mod instruction;

pub use self::op::*;
pub mod op;

pub use self::parameter::*;
mod parameter;

pub use self::register::*;
mod register;

pub use self::segment::*;
mod segment;

use std::num::Wrapping;

use crate::memory::{MemoryAddress, MMU};

pub struct CPU {
    pub instruction_count: usize,
    pub cycle_count: usize,

    /// general purpose registers, segment registers, ip, flags
    pub regs: RegisterState,

    /// latched by HLT; cleared by reset
    pub halted: bool,

    /// suppresses host input blocking (used by tests)
    pub deterministic: bool,

    pub decoder: Decoder,
}

/// where an operand's value lives once the addressing mode is
/// resolved: a typed register handle or a physical address. writing
/// through this avoids re-walking the ModR/M form and any aliasing
/// between an instruction's two operands
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Lvalue {
    Reg8(R),
    Reg16(R),
    Mem8(u32),
    Mem16(u32),
}

impl CPU {
    pub fn default() -> Self {
        CPU {
            instruction_count: 0,
            cycle_count: 0,
            regs: RegisterState::default(),
            halted: false,
            deterministic: false,
            decoder: Decoder::default(),
        }
    }

    pub fn deterministic() -> Self {
        let mut res = Self::default();
        res.deterministic = true;
        res
    }

    pub fn get_r8(&self, r: R) -> u8 {
        self.regs.get_r8(r)
    }

    pub fn set_r8(&mut self, r: R, val: u8) {
        self.regs.set_r8(r, val);
    }

    pub fn get_r16(&self, r: R) -> u16 {
        self.regs.get_r16(r)
    }

    pub fn set_r16(&mut self, r: R, val: u16) {
        self.regs.set_r16(r, val);
    }

    /// the address of the next fetch, CS:IP
    pub fn get_memory_address(&self) -> MemoryAddress {
        MemoryAddress::new(self.get_r16(R::CS), self.regs.ip)
    }

    pub fn push16(&mut self, mmu: &mut MMU, data: u16) {
        let sp = (Wrapping(self.get_r16(R::SP)) - Wrapping(2)).0;
        self.set_r16(R::SP, sp);
        let ss = self.get_r16(R::SS);
        mmu.write_u16(ss, sp, data);
    }

    pub fn pop16(&mut self, mmu: &mut MMU) -> u16 {
        let ss = self.get_r16(R::SS);
        let sp = self.get_r16(R::SP);
        let data = mmu.read_u16(ss, sp);
        self.set_r16(R::SP, (Wrapping(sp) + Wrapping(2)).0);
        data
    }

    /// the value of a segment selector
    pub fn segment(&self, seg: Segment) -> u16 {
        self.get_r16(seg.as_register())
    }

    /// effective address of an addressing form: base registers summed
    /// with the displacement, offset wrapping at 64k. BP-based forms
    /// address the stack segment, everything else the data segment
    pub fn amode_address(&self, amode: AMode, disp: i32) -> MemoryAddress {
        let base = match amode {
            AMode::BXSI => self.get_r16(R::BX).wrapping_add(self.get_r16(R::SI)),
            AMode::BXDI => self.get_r16(R::BX).wrapping_add(self.get_r16(R::DI)),
            AMode::BPSI => self.get_r16(R::BP).wrapping_add(self.get_r16(R::SI)),
            AMode::BPDI => self.get_r16(R::BP).wrapping_add(self.get_r16(R::DI)),
            AMode::SI => self.get_r16(R::SI),
            AMode::DI => self.get_r16(R::DI),
            AMode::BP => self.get_r16(R::BP),
            AMode::BX => self.get_r16(R::BX),
        };
        let seg = if amode.uses_bp() { Segment::SS } else { Segment::Default };
        MemoryAddress::new(self.segment(seg), base.wrapping_add(disp as u16))
    }

    /// resolves a writable operand to its location
    pub fn resolve(&self, p: &Parameter) -> Lvalue {
        match *p {
            Parameter::Reg8(r) => Lvalue::Reg8(r),
            Parameter::Reg16(r) | Parameter::SReg16(r) => Lvalue::Reg16(r),
            Parameter::Ptr8(addr) => {
                Lvalue::Mem8(MemoryAddress::new(self.segment(Segment::Default), addr).value())
            }
            Parameter::Ptr8Amode(amode) => Lvalue::Mem8(self.amode_address(amode, 0).value()),
            Parameter::Ptr8AmodeS8(amode, d) => {
                Lvalue::Mem8(self.amode_address(amode, i32::from(d)).value())
            }
            Parameter::Ptr8AmodeS16(amode, d) => {
                Lvalue::Mem8(self.amode_address(amode, i32::from(d)).value())
            }
            Parameter::Ptr16(addr) => {
                Lvalue::Mem16(MemoryAddress::new(self.segment(Segment::Default), addr).value())
            }
            Parameter::Ptr16Amode(amode) => Lvalue::Mem16(self.amode_address(amode, 0).value()),
            Parameter::Ptr16AmodeS8(amode, d) => {
                Lvalue::Mem16(self.amode_address(amode, i32::from(d)).value())
            }
            Parameter::Ptr16AmodeS16(amode, d) => {
                Lvalue::Mem16(self.amode_address(amode, i32::from(d)).value())
            }
            _ => panic!("resolve: not an lvalue: {:?}", p),
        }
    }

    pub fn read_lvalue(&self, mmu: &MMU, lv: Lvalue) -> u16 {
        match lv {
            Lvalue::Reg8(r) => u16::from(self.get_r8(r)),
            Lvalue::Reg16(r) => self.get_r16(r),
            Lvalue::Mem8(addr) => u16::from(mmu.memory.read_u8(addr)),
            Lvalue::Mem16(addr) => mmu.memory.read_u16(addr),
        }
    }

    pub fn write_lvalue(&mut self, mmu: &mut MMU, lv: Lvalue, data: u16) {
        match lv {
            Lvalue::Reg8(r) => self.set_r8(r, data as u8),
            Lvalue::Reg16(r) => self.set_r16(r, data),
            Lvalue::Mem8(addr) => mmu.memory.write_u8(addr, data as u8),
            Lvalue::Mem16(addr) => mmu.memory.write_u16(addr, data),
        }
    }

    /// reads a source operand. ImmS8 is sign-extended to 16 bits
    pub fn value_of(&self, mmu: &MMU, p: &Parameter) -> u16 {
        match *p {
            Parameter::Imm8(imm) => u16::from(imm),
            Parameter::ImmS8(imm) => i32::from(imm) as u16,
            Parameter::Imm16(imm) => imm,
            _ => self.read_lvalue(mmu, self.resolve(p)),
        }
    }
}
